use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use orario_core::{
    slot_key, Clock, Reservation, ReservationStatus, ReservationStore, SlotLockStore,
};

use crate::{BookingError, ConflictChecker};

#[derive(Debug, Clone, Deserialize)]
pub struct HoldRequest {
    pub provider_id: Uuid,
    pub service_id: Uuid,
    /// `None` for guest flows; attached at confirmation time upstream.
    pub customer_id: Option<Uuid>,
    /// UTC. Timezone conversion happens before the engine is called.
    pub start_at: DateTime<Utc>,
    /// Resolved from the service's configured duration by the caller and
    /// fixed for the lifetime of the reservation.
    pub duration_minutes: u32,
    /// Captured at hold time, immune to later catalog edits.
    pub price_cents: i32,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldGrant {
    pub reservation_id: Uuid,
    /// Capability credential: every subsequent confirm/cancel against the
    /// hold must present it.
    pub hold_token: String,
    pub hold_expires_at: DateTime<Utc>,
    pub expires_in_seconds: u64,
}

/// Acquires time-boxed exclusive holds on (provider, start time) slots,
/// combining the lock store front end with a tentative `Held` record.
pub struct HoldManager {
    reservations: Arc<dyn ReservationStore>,
    locks: Arc<dyn SlotLockStore>,
    clock: Arc<dyn Clock>,
    conflicts: ConflictChecker,
    ttl_seconds: u64,
}

impl HoldManager {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        locks: Arc<dyn SlotLockStore>,
        clock: Arc<dyn Clock>,
        ttl_seconds: u64,
    ) -> Self {
        let conflicts = ConflictChecker::new(reservations.clone());
        Self {
            reservations,
            locks,
            clock,
            conflicts,
            ttl_seconds,
        }
    }

    pub async fn acquire(&self, request: HoldRequest) -> Result<HoldGrant, BookingError> {
        if request.duration_minutes == 0 {
            return Err(BookingError::Validation(
                "duration_minutes must be positive".to_string(),
            ));
        }

        let start_at = request.start_at;
        let end_at = start_at + Duration::minutes(i64::from(request.duration_minutes));

        // Durable records first: a visible overlap is terminal for this
        // input, no point touching the lock store.
        if self
            .conflicts
            .has_conflict(request.provider_id, start_at, end_at, None)
            .await?
        {
            return Err(BookingError::SlotUnavailable);
        }

        let hold_token = Uuid::new_v4().to_string();
        let key = slot_key(request.provider_id, start_at);

        let locked = self
            .locks
            .set_if_absent(&key, &hold_token, self.ttl_seconds)
            .await?;
        if !locked {
            return Err(BookingError::SlotLocked);
        }

        let now = self.clock.now();
        let hold_expires_at = now + Duration::seconds(self.ttl_seconds as i64);
        let reservation = Reservation {
            id: Uuid::new_v4(),
            provider_id: request.provider_id,
            service_id: request.service_id,
            customer_id: request.customer_id,
            start_at,
            end_at,
            status: ReservationStatus::Held,
            hold_token: Some(hold_token.clone()),
            hold_expires_at: Some(hold_expires_at),
            price_cents: request.price_cents,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.reservations.insert(&reservation).await {
            // The TTL reclaims the key eventually; try not to make the
            // slot wait that long.
            if let Err(unlock_err) = self.locks.delete(&key).await {
                warn!(
                    "failed to release lock {} after insert failure: {}",
                    key, unlock_err
                );
            }
            return Err(err.into());
        }

        info!("slot held: {} until {}", key, hold_expires_at);
        Ok(HoldGrant {
            reservation_id: reservation.id,
            hold_token,
            hold_expires_at,
            expires_in_seconds: self.ttl_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryLockStore, InMemoryReservationStore, ManualClock};
    use chrono::TimeZone;

    struct Fixture {
        reservations: Arc<InMemoryReservationStore>,
        locks: Arc<InMemoryLockStore>,
        manager: HoldManager,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap(),
        ));
        let reservations = Arc::new(InMemoryReservationStore::default());
        let locks = Arc::new(InMemoryLockStore::new(clock.clone()));
        let manager = HoldManager::new(reservations.clone(), locks.clone(), clock, 300);
        Fixture {
            reservations,
            locks,
            manager,
        }
    }

    fn request(provider_id: Uuid) -> HoldRequest {
        HoldRequest {
            provider_id,
            service_id: Uuid::new_v4(),
            customer_id: Some(Uuid::new_v4()),
            start_at: Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap(),
            duration_minutes: 30,
            price_cents: 4_500,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn acquire_creates_held_record_and_lock() {
        let fx = fixture();
        let provider = Uuid::new_v4();
        let req = request(provider);
        let key = slot_key(provider, req.start_at);

        let grant = fx.manager.acquire(req).await.unwrap();

        let stored = fx
            .reservations
            .find_by_id(grant.reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ReservationStatus::Held);
        assert_eq!(stored.hold_token.as_deref(), Some(grant.hold_token.as_str()));
        assert_eq!(stored.hold_expires_at, Some(grant.hold_expires_at));
        assert_eq!(stored.end_at - stored.start_at, Duration::minutes(30));

        // Lock value is the hold token itself.
        assert_eq!(fx.locks.get(&key).await.unwrap(), Some(grant.hold_token));
    }

    #[tokio::test]
    async fn visible_overlap_fails_with_slot_unavailable() {
        let fx = fixture();
        let provider = Uuid::new_v4();
        fx.manager.acquire(request(provider)).await.unwrap();

        // Same slot, different caller: the first hold's row is already
        // visible, so the conflict check fires before the lock store.
        let err = fx.manager.acquire(request(provider)).await.unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable));
    }

    #[tokio::test]
    async fn foreign_lock_fails_with_slot_locked() {
        let fx = fixture();
        let provider = Uuid::new_v4();
        let req = request(provider);
        let key = slot_key(provider, req.start_at);

        // Lock held by another writer whose DB row is not yet visible.
        fx.locks
            .set_if_absent(&key, "someone-elses-token", 300)
            .await
            .unwrap();

        let err = fx.manager.acquire(req).await.unwrap_err();
        assert!(matches!(err, BookingError::SlotLocked));
    }

    #[tokio::test]
    async fn concurrent_holds_have_a_single_winner() {
        let fx = fixture();
        let provider = Uuid::new_v4();

        let (a, b) = tokio::join!(
            fx.manager.acquire(request(provider)),
            fx.manager.acquire(request(provider))
        );

        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for loser in [a, b].into_iter().filter(Result::is_err) {
            assert!(matches!(
                loser.unwrap_err(),
                BookingError::SlotLocked | BookingError::SlotUnavailable
            ));
        }
    }

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let fx = fixture();
        let mut req = request(Uuid::new_v4());
        req.duration_minutes = 0;

        let err = fx.manager.acquire(req).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn different_providers_share_nothing() {
        let fx = fixture();
        fx.manager.acquire(request(Uuid::new_v4())).await.unwrap();
        fx.manager.acquire(request(Uuid::new_v4())).await.unwrap();
    }
}
