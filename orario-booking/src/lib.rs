pub mod conflict;
pub mod holds;
pub mod lifecycle;
pub mod memory;
pub mod reaper;

pub use conflict::ConflictChecker;
pub use holds::{HoldGrant, HoldManager, HoldRequest};
pub use lifecycle::{
    BookingLifecycle, ConfirmMode, ProviderDecision, Requester, RequesterRole,
};
pub use reaper::HoldReaper;

use std::sync::Arc;

use uuid::Uuid;

use orario_core::{
    BookingEvent, Clock, Reservation, ReservationStatus, ReservationStore, SlotLockStore,
    StoreError,
};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// A live reservation already overlaps the requested range. Terminal
    /// for this input; the caller must pick another time.
    #[error("slot not available (already booked or held)")]
    SlotUnavailable,

    /// Transient contention on the lock store. Distinct from
    /// `SlotUnavailable` so callers can message "try again in a moment".
    #[error("slot momentarily locked by another user")]
    SlotLocked,

    /// Confirm/cancel against a hold that is gone, wrong-token, or already
    /// transitioned. Retrying cannot succeed.
    #[error("hold expired or invalid")]
    HoldExpiredOrInvalid,

    #[error("reservation not found: {0}")]
    NotFound(Uuid),

    #[error("cannot transition a reservation with status {0}")]
    InvalidState(ReservationStatus),

    #[error("not authorized to modify this reservation")]
    Unauthorized,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Engine tunables, sourced from deployment config.
#[derive(Debug, Clone)]
pub struct EngineRules {
    pub hold_ttl_seconds: u64,
    pub reap_interval_seconds: u64,
    /// When true, confirming a hold lands in `Confirmed` directly instead
    /// of waiting in `Pending` for provider acceptance.
    pub auto_confirm: bool,
}

impl Default for EngineRules {
    fn default() -> Self {
        Self {
            hold_ttl_seconds: 300,
            reap_interval_seconds: 60,
            auto_confirm: false,
        }
    }
}

/// Facade wiring the hold, lifecycle and reaper components over shared
/// store handles.
pub struct BookingEngine {
    pub holds: HoldManager,
    pub lifecycle: BookingLifecycle,
    pub reaper: HoldReaper,
}

impl BookingEngine {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        locks: Arc<dyn SlotLockStore>,
        clock: Arc<dyn Clock>,
        rules: EngineRules,
    ) -> Self {
        let mode = if rules.auto_confirm {
            ConfirmMode::AutoConfirm
        } else {
            ConfirmMode::ProviderAcceptance
        };

        Self {
            holds: HoldManager::new(
                reservations.clone(),
                locks.clone(),
                clock.clone(),
                rules.hold_ttl_seconds,
            ),
            lifecycle: BookingLifecycle::new(
                reservations.clone(),
                locks.clone(),
                clock.clone(),
                mode,
            ),
            reaper: HoldReaper::new(reservations, locks, clock),
        }
    }

    /// Direct booking without a client-visible hold: acquire and
    /// immediately confirm with the freshly minted token.
    pub async fn book_now(
        &self,
        request: HoldRequest,
    ) -> Result<(Reservation, BookingEvent), BookingError> {
        let grant = self.holds.acquire(request).await?;
        self.lifecycle
            .confirm(grant.reservation_id, &grant.hold_token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryLockStore, InMemoryReservationStore, ManualClock};
    use chrono::{TimeZone, Utc};

    fn engine(rules: EngineRules) -> (BookingEngine, Arc<InMemoryLockStore>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap(),
        ));
        let reservations = Arc::new(InMemoryReservationStore::default());
        let locks = Arc::new(InMemoryLockStore::new(clock.clone()));
        (
            BookingEngine::new(reservations, locks.clone(), clock, rules),
            locks,
        )
    }

    fn request() -> HoldRequest {
        HoldRequest {
            provider_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            customer_id: Some(Uuid::new_v4()),
            start_at: Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap(),
            duration_minutes: 30,
            price_cents: 4_500,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn book_now_is_hold_plus_confirm() {
        let (engine, locks) = engine(EngineRules::default());
        let req = request();
        let key = orario_core::slot_key(req.provider_id, req.start_at);

        let (reservation, event) = engine.book_now(req).await.unwrap();

        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert!(reservation.hold_token.is_none());
        assert!(matches!(event, BookingEvent::BookingRequested { .. }));
        assert!(locks.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn book_now_honors_auto_confirm() {
        let (engine, _locks) = engine(EngineRules {
            auto_confirm: true,
            ..EngineRules::default()
        });

        let (reservation, event) = engine.book_now(request()).await.unwrap();

        assert_eq!(reservation.status, ReservationStatus::Confirmed);
        assert!(matches!(event, BookingEvent::BookingConfirmed { .. }));
    }
}
