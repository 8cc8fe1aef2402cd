use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use orario_booking::BookingEngine;
use orario_core::BookingEvent;
use orario_store::EventProducer;

/// Periodic sweep of expired holds. Publishes one event per reclaimed
/// slot so downstream consumers (availability caches, notifications) see
/// the slot reopen.
pub async fn start_hold_reaper(
    engine: Arc<BookingEngine>,
    events: Arc<EventProducer>,
    interval_seconds: u64,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
    info!("Hold reaper started, sweeping every {}s", interval_seconds);

    loop {
        ticker.tick().await;
        match engine.reaper.reap_once().await {
            Ok(expired) => {
                for reservation in expired {
                    let event = BookingEvent::HoldExpired {
                        reservation_id: reservation.id,
                        provider_id: reservation.provider_id,
                        start_at: reservation.start_at,
                    };
                    if let Err(err) = events.publish_event(&event).await {
                        warn!("failed to publish {}: {}", event.topic(), err);
                    }
                }
            }
            Err(err) => error!("hold reaper sweep failed: {}", err),
        }
    }
}
