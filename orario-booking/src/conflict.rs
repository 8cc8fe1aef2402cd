use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use orario_core::{ReservationStore, StoreError};

/// Read-only overlap detection against the record store.
///
/// The lock store cannot answer this question: it only knows exact keys,
/// while overlap is a range predicate over the durable records.
#[derive(Clone)]
pub struct ConflictChecker {
    reservations: Arc<dyn ReservationStore>,
}

impl ConflictChecker {
    pub fn new(reservations: Arc<dyn ReservationStore>) -> Self {
        Self { reservations }
    }

    /// True when a live reservation overlaps `[start_at, end_at)` for the
    /// provider. A record carrying `exclude_hold_token` as its own token
    /// is not counted, so a customer can re-enter their still-valid hold
    /// without tripping over their own tentative record.
    pub async fn has_conflict(
        &self,
        provider_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude_hold_token: Option<&str>,
    ) -> Result<bool, StoreError> {
        let conflict = self
            .reservations
            .find_overlapping(provider_id, start_at, end_at, exclude_hold_token)
            .await?;
        Ok(conflict.is_some())
    }
}
