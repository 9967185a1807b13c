use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_QUERY_WINDOW_DAYS;
use crate::model::*;

use super::calendar::free_ranges;
use super::conflict::validate_range;
use super::{Engine, EngineError, SharedSpaceState};

fn booking_info(space_id: SpaceId, e: &CalendarEntry) -> Option<BookingInfo> {
    match &e.kind {
        EntryKind::Booking {
            user_id,
            status,
            requested_at,
        } => Some(BookingInfo {
            id: e.id,
            space_id,
            user_id: *user_id,
            start_date: e.range.from,
            end_date: e.range.to,
            status: *status,
            requested_at: *requested_at,
        }),
        EntryKind::Window => None,
    }
}

fn availability_info(space_id: SpaceId, e: &CalendarEntry) -> Option<AvailabilityInfo> {
    match e.kind {
        EntryKind::Window => Some(AvailabilityInfo {
            id: e.id,
            space_id,
            available_from: e.range.from,
            available_to: e.range.to,
        }),
        _ => None,
    }
}

impl Engine {
    fn snapshot_spaces(&self) -> Vec<SharedSpaceState> {
        // Clone the Arcs out first — DashMap shards must not be held across
        // await points.
        self.state.iter().map(|e| e.value().clone()).collect()
    }

    pub async fn list_spaces(&self) -> Vec<SpaceInfo> {
        let spaces = self.snapshot_spaces();
        let mut out = Vec::with_capacity(spaces.len());
        for ss in spaces {
            let guard = ss.read().await;
            out.push(SpaceInfo {
                id: guard.id,
                owner_id: guard.owner_id,
                name: guard.name.clone(),
                description: guard.description.clone(),
                price_per_night: guard.price_per_night,
            });
        }
        out.sort_by_key(|s| s.id);
        out
    }

    /// All windows declared for a space. Unknown spaces read as empty.
    pub async fn list_availability(
        &self,
        space_id: SpaceId,
    ) -> Result<Vec<AvailabilityInfo>, EngineError> {
        let ss = match self.get_space(space_id) {
            Some(ss) => ss,
            None => return Ok(vec![]),
        };
        let guard = ss.read().await;
        Ok(guard
            .entries
            .iter()
            .filter_map(|e| availability_info(space_id, e))
            .collect())
    }

    /// Every window across every space (the store's `all()`).
    pub async fn list_all_availabilities(&self) -> Vec<AvailabilityInfo> {
        let spaces = self.snapshot_spaces();
        let mut out = Vec::new();
        for ss in spaces {
            let guard = ss.read().await;
            out.extend(
                guard
                    .entries
                    .iter()
                    .filter_map(|e| availability_info(guard.id, e)),
            );
        }
        out.sort_by_key(|a| a.id);
        out
    }

    pub async fn find_availability(&self, id: Ulid) -> Result<AvailabilityInfo, EngineError> {
        let space_id = self
            .get_space_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let ss = self
            .get_space(space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = ss.read().await;
        guard
            .entry(id)
            .and_then(|e| availability_info(space_id, e))
            .ok_or(EngineError::NotFound(id))
    }

    /// Every booking across every space, in creation order.
    pub async fn list_bookings(&self) -> Vec<BookingInfo> {
        let spaces = self.snapshot_spaces();
        let mut out = Vec::new();
        for ss in spaces {
            let guard = ss.read().await;
            out.extend(
                guard
                    .entries
                    .iter()
                    .filter_map(|e| booking_info(guard.id, e)),
            );
        }
        out.sort_by_key(|b| b.id);
        out
    }

    pub async fn bookings_for_space(
        &self,
        space_id: SpaceId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        let ss = match self.get_space(space_id) {
            Some(ss) => ss,
            None => return Ok(vec![]),
        };
        let guard = ss.read().await;
        Ok(guard
            .entries
            .iter()
            .filter_map(|e| booking_info(space_id, e))
            .filter(|b| status.is_none_or(|s| b.status == s))
            .collect())
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<BookingInfo, EngineError> {
        let space_id = self
            .get_space_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let ss = self
            .get_space(space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = ss.read().await;
        guard
            .entry(id)
            .and_then(|e| booking_info(space_id, e))
            .ok_or(EngineError::NotFound(id))
    }

    /// True iff any booking with the given status overlaps the range.
    pub async fn is_space_booked(
        &self,
        space_id: SpaceId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        status: BookingStatus,
    ) -> Result<bool, EngineError> {
        let range = validate_range(start_date, end_date)?;
        let ss = match self.get_space(space_id) {
            Some(ss) => ss,
            None => return Ok(false),
        };
        let guard = ss.read().await;
        Ok(guard.overlapping(&range).any(|e| {
            matches!(&e.kind, EntryKind::Booking { status: s, .. } if *s == status)
        }))
    }

    /// The space's bookable gaps inside the query window: merged declared
    /// windows minus confirmed bookings. Pending requests don't reduce the
    /// free calendar — only a confirmation takes days off it.
    pub async fn free_calendar(
        &self,
        space_id: SpaceId,
        query_from: NaiveDate,
        query_to: NaiveDate,
        min_days: Option<i64>,
    ) -> Result<Vec<DateRange>, EngineError> {
        if query_from > query_to {
            return Err(EngineError::InvalidRange {
                from: query_from,
                to: query_to,
            });
        }
        let query = DateRange::new(query_from, query_to);
        if query.days() > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let ss = match self.get_space(space_id) {
            Some(ss) => ss,
            None => return Ok(vec![]),
        };
        let guard = ss.read().await;

        let mut windows: Vec<DateRange> = Vec::new();
        let mut confirmed: Vec<DateRange> = Vec::new();
        for e in guard.overlapping(&query) {
            let clamped = e.range.clamp_to(&query);
            match &e.kind {
                EntryKind::Window => windows.push(clamped),
                EntryKind::Booking {
                    status: BookingStatus::Confirmed,
                    ..
                } => confirmed.push(clamped),
                EntryKind::Booking { .. } => {}
            }
        }

        let mut free = free_ranges(&windows, &confirmed);
        if let Some(min) = min_days {
            free.retain(|r| r.days() >= min);
        }
        Ok(free)
    }
}
