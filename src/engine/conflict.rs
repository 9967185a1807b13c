use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_RANGE_DAYS;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Validate raw endpoints and construct the range.
pub(crate) fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<DateRange, EngineError> {
    if from > to {
        return Err(EngineError::InvalidRange { from, to });
    }
    let range = DateRange::new(from, to);
    if range.days() > MAX_RANGE_DAYS {
        return Err(EngineError::LimitExceeded("date range too wide"));
    }
    Ok(range)
}

/// Single-window containment: the requested range must lie entirely inside
/// ONE declared window. Windows are not merged here — a request spanning two
/// adjacent windows is rejected even though every day of it is available.
pub(crate) fn within_declared_window(ss: &SpaceState, range: &DateRange) -> bool {
    ss.overlapping(range)
        .any(|e| e.is_window() && e.range.contains(range))
}

/// No confirmed booking may overlap the range. Pending requests don't block,
/// cancelled bookings never block. `exclude` skips the booking being
/// confirmed so it doesn't conflict with itself.
pub(crate) fn check_no_conflict(
    ss: &SpaceState,
    range: &DateRange,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for entry in ss.overlapping(range) {
        if let EntryKind::Booking {
            status: BookingStatus::Confirmed,
            ..
        } = &entry.kind
        {
            if Some(entry.id) != exclude {
                return Err(EngineError::Conflict(entry.id));
            }
        }
    }
    Ok(())
}
