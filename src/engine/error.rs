use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::SpaceId;

#[derive(Debug)]
pub enum EngineError {
    /// Window or booking id unknown.
    NotFound(Ulid),
    /// Space id unknown.
    SpaceNotFound(SpaceId),
    /// Space id already taken.
    AlreadyExists(SpaceId),
    /// Malformed date range: `from` after `to`.
    InvalidRange { from: NaiveDate, to: NaiveDate },
    /// No single declared window fully contains the requested range.
    NoAvailability(SpaceId),
    /// A confirmed booking already covers part of the requested range.
    Conflict(Ulid),
    /// Confirm requires a pending booking.
    NotPending(Ulid),
    /// Cancel of an already-cancelled booking.
    AlreadyCancelled(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::SpaceNotFound(id) => write!(f, "space not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "space already exists: {id}"),
            EngineError::InvalidRange { from, to } => {
                write!(f, "invalid range: {from} is after {to}")
            }
            EngineError::NoAvailability(id) => {
                write!(f, "space {id} has no availability window covering the requested range")
            }
            EngineError::Conflict(id) => write!(f, "conflict with confirmed booking: {id}"),
            EngineError::NotPending(id) => {
                write!(f, "booking {id} is not pending")
            }
            EngineError::AlreadyCancelled(id) => {
                write!(f, "booking {id} is already cancelled")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
