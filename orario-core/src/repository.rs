use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::reservation::{Reservation, ReservationStatus};
use crate::StoreError;

/// Durable record store for reservations.
///
/// Mutual exclusion between racing writers is delegated entirely to the
/// two conditional operations (`resolve_hold`, `update_status_from`):
/// both must atomically match-and-update, and report a miss by returning
/// `Ok(None)` rather than erroring.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn insert(&self, reservation: &Reservation) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reservation>, StoreError>;

    /// First reservation for `provider_id` in a live status whose range
    /// overlaps `[start_at, end_at)`. A record whose own hold token equals
    /// `exclude_hold_token` is not counted.
    async fn find_overlapping(
        &self,
        provider_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude_hold_token: Option<&str>,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Atomic conditional transition out of `Held`.
    ///
    /// Matches on `(id, status = Held)`, plus `hold_token` when a token
    /// guard is supplied, plus `hold_expires_at > valid_after` when an
    /// expiry guard is supplied. On a match the status becomes `next` and
    /// both hold fields are cleared; the updated record is returned.
    /// `Ok(None)` means another writer already resolved the hold.
    async fn resolve_hold(
        &self,
        id: Uuid,
        hold_token: Option<&str>,
        valid_after: Option<DateTime<Utc>>,
        next: ReservationStatus,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Guarded transition for non-held records: matches on
    /// `(id, status = expected)` and sets `next`. `Ok(None)` on a miss.
    async fn update_status_from(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Held reservations whose expiry is at or before `now`.
    async fn find_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError>;
}

/// Shared key-value store backing slot locks. No business logic lives
/// here; the store only needs atomic set-if-absent-with-expiry and
/// delete-by-key.
#[async_trait]
pub trait SlotLockStore: Send + Sync {
    /// Atomically set `key -> value` with a TTL if the key is absent.
    /// Returns false when the key already exists.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
