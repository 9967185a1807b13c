use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::Ms;

fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Background task that cancels pending bookings the owner never acted on.
pub async fn run_reaper(engine: Arc<Engine>, pending_ttl_ms: Ms) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let stale = engine.collect_stale_pending(now_ms(), pending_ttl_ms);
        for (booking_id, space_id) in stale {
            match engine.cancel_booking(booking_id).await {
                Ok(_) => {
                    metrics::counter!(crate::observability::BOOKINGS_EXPIRED_TOTAL).increment(1);
                    info!("expired stale pending booking {booking_id} on space {space_id}");
                }
                Err(e) => {
                    // May have been confirmed or cancelled since collection
                    tracing::debug!("reaper skip {booking_id}: {e}");
                }
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyHub;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roost_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    #[tokio::test]
    async fn reaper_cancels_stale_pending() {
        let path = test_wal_path("reaper_stale.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        engine
            .create_space(1, 7, "Loft".into(), String::new(), 5000)
            .await
            .unwrap();
        engine.declare_availability(1, d(1), d(10)).await.unwrap();
        let booking = engine.submit_booking(9, 1, d(3), d(5)).await.unwrap();

        // TTL of zero: the request is stale the moment it exists
        let stale = engine.collect_stale_pending(now_ms() + 1, 0);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].0, booking.id);

        engine.cancel_booking(booking.id).await.unwrap();

        let stale_after = engine.collect_stale_pending(now_ms() + 1, 0);
        assert!(stale_after.is_empty());
    }
}
