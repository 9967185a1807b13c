use chrono::NaiveDate;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_range, within_declared_window};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_space(
        &self,
        id: SpaceId,
        owner_id: UserId,
        name: String,
        description: String,
        price_per_night: i64,
    ) -> Result<(), EngineError> {
        if self.state.len() >= MAX_SPACES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many spaces"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("space name too long"));
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(EngineError::LimitExceeded("space description too long"));
        }
        if price_per_night < 0 {
            return Err(EngineError::LimitExceeded("negative nightly price"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::SpaceCreated {
            id,
            owner_id,
            name: name.clone(),
            description: description.clone(),
            price_per_night,
        };
        self.wal_append(&event).await?;
        let ss = SpaceState::new(id, owner_id, name, description, price_per_night);
        self.state.insert(id, std::sync::Arc::new(RwLock::new(ss)));
        self.notify.send(id, &event);
        Ok(())
    }

    /// Declare an availability window for a space. Fails with `InvalidRange`
    /// when `from > to`.
    pub async fn declare_availability(
        &self,
        space_id: SpaceId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<AvailabilityInfo, EngineError> {
        let window = validate_range(from, to)?;
        let ss = self
            .get_space(space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let mut guard = ss.write().await;
        if guard.entries.len() >= MAX_ENTRIES_PER_SPACE {
            return Err(EngineError::LimitExceeded("too many entries on space"));
        }

        let id = Ulid::new();
        let event = Event::AvailabilityDeclared { id, space_id, window };
        self.persist_and_apply(space_id, &mut guard, &event).await?;
        Ok(AvailabilityInfo {
            id,
            space_id,
            available_from: window.from,
            available_to: window.to,
        })
    }

    pub async fn withdraw_availability(&self, id: Ulid) -> Result<SpaceId, EngineError> {
        let (space_id, mut guard) = self.resolve_entity_write(&id).await?;
        match guard.entry(id) {
            Some(e) if e.is_window() => {}
            // Booking ids are not availabilities
            _ => return Err(EngineError::NotFound(id)),
        }
        let event = Event::AvailabilityWithdrawn { id, space_id };
        self.persist_and_apply(space_id, &mut guard, &event).await?;
        Ok(space_id)
    }

    /// Admit or reject a booking request.
    ///
    /// The space's write lock is held across the whole availability check,
    /// conflict check, and WAL append — two concurrent requests for one space
    /// serialize here instead of racing check-then-create.
    pub async fn submit_booking(
        &self,
        user_id: UserId,
        space_id: SpaceId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<BookingInfo, EngineError> {
        let range = validate_range(start_date, end_date)?;
        let ss = self
            .get_space(space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let mut guard = ss.write().await;
        if guard.entries.len() >= MAX_ENTRIES_PER_SPACE {
            return Err(EngineError::LimitExceeded("too many entries on space"));
        }

        if !within_declared_window(&guard, &range) {
            return Err(EngineError::NoAvailability(space_id));
        }
        check_no_conflict(&guard, &range, None)?;

        let id = Ulid::new();
        let requested_at = now_ms();
        let event = Event::BookingRequested {
            id,
            space_id,
            user_id,
            range,
            requested_at,
        };
        self.persist_and_apply(space_id, &mut guard, &event).await?;
        Ok(BookingInfo {
            id,
            space_id,
            user_id,
            start_date: range.from,
            end_date: range.to,
            status: BookingStatus::Pending,
            requested_at,
        })
    }

    /// Promote a pending booking to confirmed. The conflict check runs again
    /// under the space write lock: of two overlapping pending requests, only
    /// the first confirmation succeeds.
    pub async fn confirm_booking(&self, id: Ulid) -> Result<BookingInfo, EngineError> {
        let (space_id, mut guard) = self.resolve_entity_write(&id).await?;
        let (range, user_id, requested_at) = match guard.entry(id) {
            Some(CalendarEntry {
                range,
                kind:
                    EntryKind::Booking {
                        user_id,
                        status,
                        requested_at,
                    },
                ..
            }) => {
                if *status != BookingStatus::Pending {
                    return Err(EngineError::NotPending(id));
                }
                (*range, *user_id, *requested_at)
            }
            _ => return Err(EngineError::NotFound(id)),
        };

        check_no_conflict(&guard, &range, Some(id))?;

        let event = Event::BookingConfirmed { id, space_id };
        self.persist_and_apply(space_id, &mut guard, &event).await?;
        Ok(BookingInfo {
            id,
            space_id,
            user_id,
            start_date: range.from,
            end_date: range.to,
            status: BookingStatus::Confirmed,
            requested_at,
        })
    }

    /// Cancel a pending or confirmed booking. The record stays queryable.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<SpaceId, EngineError> {
        let (space_id, mut guard) = self.resolve_entity_write(&id).await?;
        match guard.entry(id) {
            Some(CalendarEntry {
                kind: EntryKind::Booking { status, .. },
                ..
            }) => {
                if *status == BookingStatus::Cancelled {
                    return Err(EngineError::AlreadyCancelled(id));
                }
            }
            _ => return Err(EngineError::NotFound(id)),
        }
        let event = Event::BookingCancelled { id, space_id };
        self.persist_and_apply(space_id, &mut guard, &event).await?;
        Ok(space_id)
    }

    /// Pending requests the owner never acted on. The reaper cancels these.
    pub fn collect_stale_pending(&self, now: Ms, ttl: Ms) -> Vec<(Ulid, SpaceId)> {
        let mut stale = Vec::new();
        for entry in self.state.iter() {
            let ss = entry.value().clone();
            if let Ok(guard) = ss.try_read() {
                for e in &guard.entries {
                    if let EntryKind::Booking {
                        status: BookingStatus::Pending,
                        requested_at,
                        ..
                    } = &e.kind
                        && requested_at + ttl <= now {
                            stale.push((e.id, guard.id));
                        }
                }
            }
        }
        stale
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let space_ids: Vec<SpaceId> = self.state.iter().map(|e| *e.key()).collect();
        for id in space_ids {
            let entry = match self.state.get(&id) {
                Some(e) => e,
                None => continue,
            };
            let ss = entry.value().clone();
            let guard = ss.try_read().expect("compact: uncontended read");

            events.push(Event::SpaceCreated {
                id: guard.id,
                owner_id: guard.owner_id,
                name: guard.name.clone(),
                description: guard.description.clone(),
                price_per_night: guard.price_per_night,
            });

            for e in &guard.entries {
                match &e.kind {
                    EntryKind::Window => events.push(Event::AvailabilityDeclared {
                        id: e.id,
                        space_id: guard.id,
                        window: e.range,
                    }),
                    EntryKind::Booking {
                        user_id,
                        status,
                        requested_at,
                    } => {
                        events.push(Event::BookingRequested {
                            id: e.id,
                            space_id: guard.id,
                            user_id: *user_id,
                            range: e.range,
                            requested_at: *requested_at,
                        });
                        match status {
                            BookingStatus::Pending => {}
                            BookingStatus::Confirmed => events.push(Event::BookingConfirmed {
                                id: e.id,
                                space_id: guard.id,
                            }),
                            BookingStatus::Cancelled => events.push(Event::BookingCancelled {
                                id: e.id,
                                space_id: guard.id,
                            }),
                        }
                    }
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
