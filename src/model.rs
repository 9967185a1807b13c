use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Integer ids handed to us by the surrounding application's identity source.
pub type SpaceId = i64;
pub type UserId = i64;

/// Unix milliseconds, used for request timestamps only. Business time is
/// whole calendar days.
pub type Ms = i64;

/// Inclusive calendar-day range `[from, to]`. A single-day stay is
/// `from == to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        debug_assert!(from <= to, "DateRange from must not be after to");
        Self { from, to }
    }

    /// Number of calendar days covered, inclusive of both endpoints.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    /// Closed intervals: sharing a single day counts as overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.from <= other.to && other.from <= self.to
    }

    /// Returns true if `other` lies entirely within `self`.
    pub fn contains(&self, other: &DateRange) -> bool {
        self.from <= other.from && other.to <= self.to
    }

    #[allow(dead_code)]
    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.from <= day && day <= self.to
    }

    /// Clamp to the intersection with `bounds`. Caller must ensure the two
    /// ranges overlap.
    pub fn clamp_to(&self, bounds: &DateRange) -> DateRange {
        DateRange::new(self.from.max(bounds.from), self.to.min(bounds.to))
    }
}

/// Booking lifecycle. A closed set: the status column is not an open string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    /// Requested, awaiting owner action. Does not block other requests.
    Pending,
    /// Admitted onto the calendar. Blocks overlapping requests.
    Confirmed,
    /// Withdrawn or rejected. Kept for the record, blocks nothing.
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

/// What a calendar entry represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Declared availability: the space may be booked inside this range.
    Window,
    /// A reservation request and its lifecycle state.
    Booking {
        user_id: UserId,
        status: BookingStatus,
        requested_at: Ms,
    },
}

/// A single entry on a space's calendar — windows and bookings are both just
/// dated entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub id: Ulid,
    pub range: DateRange,
    pub kind: EntryKind,
}

impl CalendarEntry {
    pub fn is_window(&self) -> bool {
        matches!(self.kind, EntryKind::Window)
    }

    #[allow(dead_code)]
    pub fn is_booking(&self) -> bool {
        matches!(self.kind, EntryKind::Booking { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SpaceState {
    pub id: SpaceId,
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    /// Nightly price in minor currency units.
    pub price_per_night: i64,
    /// All entries (windows + bookings), sorted by `range.from`.
    pub entries: Vec<CalendarEntry>,
}

impl SpaceState {
    pub fn new(
        id: SpaceId,
        owner_id: UserId,
        name: String,
        description: String,
        price_per_night: i64,
    ) -> Self {
        Self {
            id,
            owner_id,
            name,
            description,
            price_per_night,
            entries: Vec::new(),
        }
    }

    /// Insert an entry maintaining sort order by range.from.
    pub fn insert_entry(&mut self, entry: CalendarEntry) {
        let pos = self
            .entries
            .binary_search_by_key(&entry.range.from, |e| e.range.from)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, entry);
    }

    /// Remove an entry by id.
    pub fn remove_entry(&mut self, id: Ulid) -> Option<CalendarEntry> {
        if let Some(pos) = self.entries.iter().position(|e| e.id == id) {
            Some(self.entries.remove(pos))
        } else {
            None
        }
    }

    pub fn entry(&self, id: Ulid) -> Option<&CalendarEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entry_mut(&mut self, id: Ulid) -> Option<&mut CalendarEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Return only entries whose range overlaps the query range.
    /// Uses binary search to skip entries starting after `query.to`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &CalendarEntry> {
        // Everything at index >= right_bound starts after query.to → can't overlap.
        let right_bound = self
            .entries
            .partition_point(|e| e.range.from <= query.to);
        let from = query.from;
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.range.to >= from)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SpaceCreated {
        id: SpaceId,
        owner_id: UserId,
        name: String,
        description: String,
        price_per_night: i64,
    },
    AvailabilityDeclared {
        id: Ulid,
        space_id: SpaceId,
        window: DateRange,
    },
    AvailabilityWithdrawn {
        id: Ulid,
        space_id: SpaceId,
    },
    BookingRequested {
        id: Ulid,
        space_id: SpaceId,
        user_id: UserId,
        range: DateRange,
        requested_at: Ms,
    },
    BookingConfirmed {
        id: Ulid,
        space_id: SpaceId,
    },
    BookingCancelled {
        id: Ulid,
        space_id: SpaceId,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceInfo {
    pub id: SpaceId,
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    pub price_per_night: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityInfo {
    pub id: Ulid,
    pub space_id: SpaceId,
    pub available_from: NaiveDate,
    pub available_to: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub space_id: SpaceId,
    pub user_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BookingStatus,
    pub requested_at: Ms,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn range_basics() {
        let r = DateRange::new(d(2024, 6, 1), d(2024, 6, 10));
        assert_eq!(r.days(), 10);
        assert!(r.contains_day(d(2024, 6, 1)));
        assert!(r.contains_day(d(2024, 6, 10))); // inclusive end
        assert!(!r.contains_day(d(2024, 6, 11)));
    }

    #[test]
    fn single_day_range() {
        let r = DateRange::new(d(2024, 6, 5), d(2024, 6, 5));
        assert_eq!(r.days(), 1);
        assert!(r.overlaps(&r));
    }

    #[test]
    fn range_overlap() {
        let a = DateRange::new(d(2024, 6, 1), d(2024, 6, 5));
        let b = DateRange::new(d(2024, 6, 5), d(2024, 6, 9));
        let c = DateRange::new(d(2024, 6, 6), d(2024, 6, 9));
        assert!(a.overlaps(&b)); // shared day 5 — closed intervals overlap
        assert!(!a.overlaps(&c)); // adjacent days do not
    }

    #[test]
    fn overlap_is_symmetric_and_reflexive() {
        let a = DateRange::new(d(2024, 6, 1), d(2024, 6, 5));
        let b = DateRange::new(d(2024, 6, 3), d(2024, 6, 9));
        assert_eq!(a.overlaps(&b), b.overlaps(&a));
        assert!(a.overlaps(&a));
        assert!(b.overlaps(&b));
    }

    #[test]
    fn range_contains() {
        let outer = DateRange::new(d(2024, 6, 1), d(2024, 6, 10));
        let inner = DateRange::new(d(2024, 6, 3), d(2024, 6, 5));
        let partial = DateRange::new(d(2024, 6, 9), d(2024, 6, 12));
        assert!(outer.contains(&inner));
        assert!(outer.contains(&outer)); // self-containment
        assert!(!outer.contains(&partial));
    }

    #[test]
    fn contains_implies_overlaps() {
        let outer = DateRange::new(d(2024, 6, 1), d(2024, 6, 10));
        let inner = DateRange::new(d(2024, 6, 3), d(2024, 6, 5));
        assert!(outer.contains(&inner));
        assert!(outer.overlaps(&inner));
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(BookingStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(BookingStatus::parse("paid"), None);
    }

    #[test]
    fn entry_ordering() {
        let mut ss = SpaceState::new(1, 7, "Loft".into(), String::new(), 5000);
        ss.insert_entry(CalendarEntry {
            id: Ulid::new(),
            range: DateRange::new(d(2024, 8, 1), d(2024, 8, 10)),
            kind: EntryKind::Window,
        });
        ss.insert_entry(CalendarEntry {
            id: Ulid::new(),
            range: DateRange::new(d(2024, 6, 1), d(2024, 6, 10)),
            kind: EntryKind::Window,
        });
        ss.insert_entry(CalendarEntry {
            id: Ulid::new(),
            range: DateRange::new(d(2024, 7, 1), d(2024, 7, 10)),
            kind: EntryKind::Window,
        });
        assert_eq!(ss.entries[0].range.from, d(2024, 6, 1));
        assert_eq!(ss.entries[1].range.from, d(2024, 7, 1));
        assert_eq!(ss.entries[2].range.from, d(2024, 8, 1));
    }

    #[test]
    fn entry_remove() {
        let mut ss = SpaceState::new(1, 7, "Loft".into(), String::new(), 5000);
        let id = Ulid::new();
        ss.insert_entry(CalendarEntry {
            id,
            range: DateRange::new(d(2024, 6, 1), d(2024, 6, 10)),
            kind: EntryKind::Window,
        });
        assert_eq!(ss.entries.len(), 1);
        ss.remove_entry(id);
        assert!(ss.entries.is_empty());
        assert!(ss.remove_entry(id).is_none());
    }

    #[test]
    fn overlapping_skips_distant_entries() {
        let mut ss = SpaceState::new(1, 7, "Loft".into(), String::new(), 5000);
        // Past
        ss.insert_entry(CalendarEntry {
            id: Ulid::new(),
            range: DateRange::new(d(2024, 1, 1), d(2024, 1, 10)),
            kind: EntryKind::Window,
        });
        // Overlapping
        ss.insert_entry(CalendarEntry {
            id: Ulid::new(),
            range: DateRange::new(d(2024, 5, 28), d(2024, 6, 3)),
            kind: EntryKind::Window,
        });
        // Future (starts after query end)
        ss.insert_entry(CalendarEntry {
            id: Ulid::new(),
            range: DateRange::new(d(2024, 9, 1), d(2024, 9, 10)),
            kind: EntryKind::Window,
        });

        let query = DateRange::new(d(2024, 6, 1), d(2024, 6, 30));
        let hits: Vec<_> = ss.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].range, DateRange::new(d(2024, 5, 28), d(2024, 6, 3)));
    }

    #[test]
    fn overlapping_includes_shared_boundary_day() {
        let mut ss = SpaceState::new(1, 7, "Loft".into(), String::new(), 5000);
        ss.insert_entry(CalendarEntry {
            id: Ulid::new(),
            range: DateRange::new(d(2024, 6, 1), d(2024, 6, 5)),
            kind: EntryKind::Window,
        });
        // Query starting on the entry's last day still hits it.
        let query = DateRange::new(d(2024, 6, 5), d(2024, 6, 9));
        assert_eq!(ss.overlapping(&query).count(), 1);
        // Query starting the day after does not.
        let query = DateRange::new(d(2024, 6, 6), d(2024, 6, 9));
        assert_eq!(ss.overlapping(&query).count(), 0);
    }

    #[test]
    fn overlapping_entry_spanning_query() {
        let mut ss = SpaceState::new(1, 7, "Loft".into(), String::new(), 5000);
        ss.insert_entry(CalendarEntry {
            id: Ulid::new(),
            range: DateRange::new(d(2024, 1, 1), d(2024, 12, 31)),
            kind: EntryKind::Window,
        });
        let query = DateRange::new(d(2024, 6, 1), d(2024, 6, 2));
        assert_eq!(ss.overlapping(&query).count(), 1);
    }

    #[test]
    fn overlapping_empty_space() {
        let ss = SpaceState::new(1, 7, "Loft".into(), String::new(), 5000);
        let query = DateRange::new(d(2024, 6, 1), d(2024, 6, 30));
        assert_eq!(ss.overlapping(&query).count(), 0);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingRequested {
            id: Ulid::new(),
            space_id: 1,
            user_id: 7,
            range: DateRange::new(d(2024, 6, 3), d(2024, 6, 5)),
            requested_at: 1_717_000_000_000,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
