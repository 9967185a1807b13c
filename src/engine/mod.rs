mod calendar;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use calendar::{free_ranges, merge_windows, subtract_ranges};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedSpaceState = Arc<RwLock<SpaceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking/availability consistency engine for one tenant.
///
/// All business rules live here: a request is validated, checked against the
/// space's declared windows and its confirmed bookings, appended to the WAL,
/// and only then applied in memory — all while holding that space's write
/// lock, so concurrent requests for one space serialize at the check.
pub struct Engine {
    pub state: DashMap<SpaceId, SharedSpaceState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: entity (window/booking) id → space id
    pub(super) entity_to_space: DashMap<Ulid, SpaceId>,
}

/// Apply an event directly to a SpaceState (no locking — caller holds the lock).
fn apply_to_space(ss: &mut SpaceState, event: &Event, entity_map: &DashMap<Ulid, SpaceId>) {
    match event {
        Event::AvailabilityDeclared { id, space_id, window } => {
            ss.insert_entry(CalendarEntry {
                id: *id,
                range: *window,
                kind: EntryKind::Window,
            });
            entity_map.insert(*id, *space_id);
        }
        Event::AvailabilityWithdrawn { id, .. } => {
            ss.remove_entry(*id);
            entity_map.remove(id);
        }
        Event::BookingRequested {
            id,
            space_id,
            user_id,
            range,
            requested_at,
        } => {
            ss.insert_entry(CalendarEntry {
                id: *id,
                range: *range,
                kind: EntryKind::Booking {
                    user_id: *user_id,
                    status: BookingStatus::Pending,
                    requested_at: *requested_at,
                },
            });
            entity_map.insert(*id, *space_id);
        }
        Event::BookingConfirmed { id, .. } => {
            if let Some(entry) = ss.entry_mut(*id)
                && let EntryKind::Booking { status, .. } = &mut entry.kind {
                    *status = BookingStatus::Confirmed;
                }
        }
        // Cancelled bookings stay on the calendar for the record; they just
        // stop blocking (the conflict check only looks at Confirmed).
        Event::BookingCancelled { id, .. } => {
            if let Some(entry) = ss.entry_mut(*id)
                && let EntryKind::Booking { status, .. } = &mut entry.kind {
                    *status = BookingStatus::Cancelled;
                }
        }
        // SpaceCreated is handled at the DashMap level, not here
        Event::SpaceCreated { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            entity_to_space: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (e.g. lazy tenant
        // creation).
        for event in &events {
            match event {
                Event::SpaceCreated {
                    id,
                    owner_id,
                    name,
                    description,
                    price_per_night,
                } => {
                    let ss = SpaceState::new(
                        *id,
                        *owner_id,
                        name.clone(),
                        description.clone(),
                        *price_per_night,
                    );
                    engine.state.insert(*id, Arc::new(RwLock::new(ss)));
                }
                other => {
                    if let Some(space_id) = event_space_id(other)
                        && let Some(entry) = engine.state.get(&space_id) {
                            let ss_arc = entry.clone();
                            let mut guard = ss_arc.try_write().expect("replay: uncontended write");
                            apply_to_space(&mut guard, other, &engine.entity_to_space);
                        }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_space(&self, id: SpaceId) -> Option<SharedSpaceState> {
        self.state.get(&id).map(|e| e.value().clone())
    }

    pub fn get_space_for_entity(&self, entity_id: &Ulid) -> Option<SpaceId> {
        self.entity_to_space.get(entity_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        space_id: SpaceId,
        ss: &mut SpaceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_space(ss, event, &self.entity_to_space);
        self.notify.send(space_id, event);
        Ok(())
    }

    /// Lookup entity → space, get space, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(SpaceId, tokio::sync::OwnedRwLockWriteGuard<SpaceState>), EngineError> {
        let space_id = self
            .get_space_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let ss = self
            .get_space(space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = ss.write_owned().await;
        Ok((space_id, guard))
    }
}

/// Extract the space_id from an event (for non-SpaceCreated events).
fn event_space_id(event: &Event) -> Option<SpaceId> {
    match event {
        Event::AvailabilityDeclared { space_id, .. }
        | Event::AvailabilityWithdrawn { space_id, .. }
        | Event::BookingRequested { space_id, .. }
        | Event::BookingConfirmed { space_id, .. }
        | Event::BookingCancelled { space_id, .. } => Some(*space_id),
        Event::SpaceCreated { .. } => None,
    }
}
