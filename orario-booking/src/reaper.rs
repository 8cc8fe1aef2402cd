use std::sync::Arc;

use tracing::{error, info, warn};

use orario_core::{
    Clock, Reservation, ReservationStatus, ReservationStore, SlotLockStore, StoreError,
};

/// Background sweep that cancels expired holds and releases their locks.
///
/// A liveness mechanism only: double-booking prevention is carried by the
/// conditional updates, the reaper just reclaims abandoned holds in
/// bounded time. It races confirm/cancel like any other writer and wins
/// or loses through the same conditional update.
pub struct HoldReaper {
    reservations: Arc<dyn ReservationStore>,
    locks: Arc<dyn SlotLockStore>,
    clock: Arc<dyn Clock>,
}

impl HoldReaper {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        locks: Arc<dyn SlotLockStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reservations,
            locks,
            clock,
        }
    }

    /// One sweep. Returns the reservations this pass expired. Holds
    /// already resolved by a racing writer are skipped silently; a
    /// failure on one record does not abort the remainder.
    pub async fn reap_once(&self) -> Result<Vec<Reservation>, StoreError> {
        let now = self.clock.now();
        let candidates = self.reservations.find_expired_holds(now).await?;
        let mut expired = Vec::new();

        for hold in candidates {
            // Not conditioned on the token; the reaper does not possess it.
            match self
                .reservations
                .resolve_hold(hold.id, None, None, ReservationStatus::Cancelled)
                .await
            {
                Ok(Some(cancelled)) => {
                    let key = cancelled.slot_key();
                    if let Err(err) = self.locks.delete(&key).await {
                        warn!("failed to release slot lock {} after expiry: {}", key, err);
                    }
                    expired.push(cancelled);
                }
                // No match: a racing confirm or cancel got there first.
                Ok(None) => {}
                Err(err) => {
                    error!("failed to expire hold {}: {}", hold.id, err);
                }
            }
        }

        if !expired.is_empty() {
            info!("expired holds cleaned: {}", expired.len());
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryLockStore, InMemoryReservationStore, ManualClock};
    use crate::{HoldManager, HoldRequest};
    use chrono::{Duration, TimeZone, Utc};
    use orario_core::slot_key;
    use uuid::Uuid;

    struct Fixture {
        clock: Arc<ManualClock>,
        reservations: Arc<InMemoryReservationStore>,
        locks: Arc<InMemoryLockStore>,
        holds: HoldManager,
        reaper: HoldReaper,
    }

    fn fixture(ttl_seconds: u64) -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap(),
        ));
        let reservations = Arc::new(InMemoryReservationStore::default());
        let locks = Arc::new(InMemoryLockStore::new(clock.clone()));
        let holds = HoldManager::new(
            reservations.clone(),
            locks.clone(),
            clock.clone(),
            ttl_seconds,
        );
        let reaper = HoldReaper::new(reservations.clone(), locks.clone(), clock.clone());
        Fixture {
            clock,
            reservations,
            locks,
            holds,
            reaper,
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
    async fn expired_hold_is_cancelled_and_slot_reopens() {
        let fx = fixture(1);
        let provider = Uuid::new_v4();
        let req = request(provider);
        let key = slot_key(provider, req.start_at);

        let grant = fx.holds.acquire(req.clone()).await.unwrap();
        fx.clock.advance(Duration::seconds(2));

        let expired = fx.reaper.reap_once().await.unwrap();
        assert_eq!(expired.len(), 1);

        let stored = fx
            .reservations
            .find_by_id(grant.reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ReservationStatus::Cancelled);
        assert!(stored.hold_token.is_none());
        assert!(fx.locks.get(&key).await.unwrap().is_none());

        // A fresh hold on the same slot now succeeds.
        fx.holds.acquire(req).await.unwrap();
    }

    #[tokio::test]
    async fn unexpired_holds_are_left_alone() {
        let fx = fixture(300);
        let grant = fx.holds.acquire(request(Uuid::new_v4())).await.unwrap();
        fx.clock.advance(Duration::seconds(10));

        let expired = fx.reaper.reap_once().await.unwrap();
        assert!(expired.is_empty());

        let stored = fx
            .reservations
            .find_by_id(grant.reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ReservationStatus::Held);
    }

    /// Candidate list frozen at query time, the way a racing confirm
    /// between the sweep's find and its conditional update would leave it.
    struct StaleCandidateStore {
        inner: Arc<InMemoryReservationStore>,
        stale: Vec<Reservation>,
    }

    #[async_trait::async_trait]
    impl ReservationStore for StaleCandidateStore {
        async fn insert(&self, reservation: &Reservation) -> Result<(), StoreError> {
            self.inner.insert(reservation).await
        }

        async fn find_by_id(
            &self,
            id: Uuid,
        ) -> Result<Option<Reservation>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn find_overlapping(
            &self,
            provider_id: Uuid,
            start_at: chrono::DateTime<Utc>,
            end_at: chrono::DateTime<Utc>,
            exclude_hold_token: Option<&str>,
        ) -> Result<Option<Reservation>, StoreError> {
            self.inner
                .find_overlapping(provider_id, start_at, end_at, exclude_hold_token)
                .await
        }

        async fn resolve_hold(
            &self,
            id: Uuid,
            hold_token: Option<&str>,
            valid_after: Option<chrono::DateTime<Utc>>,
            next: ReservationStatus,
        ) -> Result<Option<Reservation>, StoreError> {
            self.inner.resolve_hold(id, hold_token, valid_after, next).await
        }

        async fn update_status_from(
            &self,
            id: Uuid,
            expected: ReservationStatus,
            next: ReservationStatus,
        ) -> Result<Option<Reservation>, StoreError> {
            self.inner.update_status_from(id, expected, next).await
        }

        async fn find_expired_holds(
            &self,
            _now: chrono::DateTime<Utc>,
        ) -> Result<Vec<Reservation>, StoreError> {
            Ok(self.stale.clone())
        }
    }

    #[tokio::test]
    async fn racing_confirm_wins_and_reaper_skips() {
        let fx = fixture(1);
        let grant = fx.holds.acquire(request(Uuid::new_v4())).await.unwrap();
        fx.clock.advance(Duration::seconds(2));

        // Freeze the sweep's candidate list, then let a confirm resolve
        // the hold "between" the find and the conditional cancel.
        let stale = fx
            .reservations
            .find_expired_holds(fx.clock.now())
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);

        fx.reservations
            .resolve_hold(
                grant.reservation_id,
                Some(&grant.hold_token),
                None,
                ReservationStatus::Pending,
            )
            .await
            .unwrap()
            .unwrap();

        let racing_reaper = HoldReaper::new(
            Arc::new(StaleCandidateStore {
                inner: fx.reservations.clone(),
                stale,
            }),
            fx.locks.clone(),
            fx.clock.clone(),
        );

        // The no-op conditional update is success-of-skip, not an error.
        let expired = racing_reaper.reap_once().await.unwrap();
        assert!(expired.is_empty());

        let stored = fx
            .reservations
            .find_by_id(grant.reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn sweep_handles_multiple_expired_holds() {
        let fx = fixture(1);
        for _ in 0..3 {
            fx.holds.acquire(request(Uuid::new_v4())).await.unwrap();
        }
        fx.clock.advance(Duration::seconds(2));

        let expired = fx.reaper.reap_once().await.unwrap();
        assert_eq!(expired.len(), 3);
    }
}
