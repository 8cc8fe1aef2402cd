use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use orario_core::{
    BookingEvent, Clock, Reservation, ReservationStatus, ReservationStore, SlotLockStore,
};

use crate::BookingError;

/// Which status a confirmed hold lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    /// Hold becomes `Pending`; the provider accepts or rejects later.
    ProviderAcceptance,
    /// Hold becomes `Confirmed` immediately.
    AutoConfirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequesterRole {
    Customer,
    Provider,
}

/// Authenticated identity presented to the state machine. Which
/// transitions are legal for whom is intrinsic to the lifecycle, even
/// though authentication itself happens upstream.
#[derive(Debug, Clone, Copy)]
pub struct Requester {
    pub user_id: Uuid,
    pub role: RequesterRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderDecision {
    Accept,
    Reject,
}

/// Transitions held reservations into active or terminal states.
pub struct BookingLifecycle {
    reservations: Arc<dyn ReservationStore>,
    locks: Arc<dyn SlotLockStore>,
    clock: Arc<dyn Clock>,
    mode: ConfirmMode,
}

impl BookingLifecycle {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        locks: Arc<dyn SlotLockStore>,
        clock: Arc<dyn Clock>,
        mode: ConfirmMode,
    ) -> Self {
        Self {
            reservations,
            locks,
            clock,
            mode,
        }
    }

    /// Converts a valid hold into the next active status. The whole
    /// guard — id, token, `Held`, unexpired — is a single conditional
    /// update, so of any number of racing callers (including the reaper)
    /// exactly one can match a given held record.
    pub async fn confirm(
        &self,
        reservation_id: Uuid,
        hold_token: &str,
    ) -> Result<(Reservation, BookingEvent), BookingError> {
        let next = match self.mode {
            ConfirmMode::ProviderAcceptance => ReservationStatus::Pending,
            ConfirmMode::AutoConfirm => ReservationStatus::Confirmed,
        };
        let now = self.clock.now();

        let Some(reservation) = self
            .reservations
            .resolve_hold(reservation_id, Some(hold_token), Some(now), next)
            .await?
        else {
            return Err(BookingError::HoldExpiredOrInvalid);
        };

        self.release_lock(&reservation).await;

        let event = match next {
            ReservationStatus::Pending => BookingEvent::BookingRequested {
                reservation_id: reservation.id,
                provider_id: reservation.provider_id,
                customer_id: reservation.customer_id,
                start_at: reservation.start_at,
            },
            _ => BookingEvent::BookingConfirmed {
                reservation_id: reservation.id,
                provider_id: reservation.provider_id,
                customer_id: reservation.customer_id,
                start_at: reservation.start_at,
            },
        };

        info!(
            "hold confirmed: reservation {} -> {}",
            reservation.id, reservation.status
        );
        Ok((reservation, event))
    }

    /// Owner-initiated cancellation of any live reservation.
    pub async fn cancel(
        &self,
        reservation_id: Uuid,
        requester: Requester,
    ) -> Result<(Reservation, BookingEvent), BookingError> {
        let Some(current) = self.reservations.find_by_id(reservation_id).await? else {
            return Err(BookingError::NotFound(reservation_id));
        };

        let allowed = match requester.role {
            RequesterRole::Customer => current.customer_id == Some(requester.user_id),
            RequesterRole::Provider => current.provider_id == requester.user_id,
        };
        if !allowed {
            return Err(BookingError::Unauthorized);
        }

        if !current.status.is_live() {
            return Err(BookingError::InvalidState(current.status));
        }

        if current.hold_token.is_some() {
            self.release_lock(&current).await;
        }

        // Conditioned on the status we just read, so a concurrently
        // confirmed record is not clobbered with Cancelled.
        let updated = if current.status == ReservationStatus::Held {
            self.reservations
                .resolve_hold(reservation_id, None, None, ReservationStatus::Cancelled)
                .await?
        } else {
            self.reservations
                .update_status_from(
                    reservation_id,
                    current.status,
                    ReservationStatus::Cancelled,
                )
                .await?
        };

        let Some(reservation) = updated else {
            return Err(BookingError::InvalidState(
                self.reread_status(reservation_id, current.status).await?,
            ));
        };

        info!("reservation cancelled: {}", reservation.id);
        let event = BookingEvent::BookingCancelled {
            reservation_id: reservation.id,
            provider_id: reservation.provider_id,
            cancelled_by: Some(requester.user_id),
        };
        Ok((reservation, event))
    }

    /// Provider accepts or rejects a pending request.
    pub async fn decide(
        &self,
        reservation_id: Uuid,
        provider_id: Uuid,
        decision: ProviderDecision,
    ) -> Result<(Reservation, BookingEvent), BookingError> {
        let Some(current) = self.reservations.find_by_id(reservation_id).await? else {
            return Err(BookingError::NotFound(reservation_id));
        };
        if current.provider_id != provider_id {
            return Err(BookingError::Unauthorized);
        }
        if current.status != ReservationStatus::Pending {
            return Err(BookingError::InvalidState(current.status));
        }

        let next = match decision {
            ProviderDecision::Accept => ReservationStatus::Confirmed,
            ProviderDecision::Reject => ReservationStatus::Rejected,
        };
        let Some(reservation) = self
            .reservations
            .update_status_from(reservation_id, ReservationStatus::Pending, next)
            .await?
        else {
            return Err(BookingError::InvalidState(
                self.reread_status(reservation_id, current.status).await?,
            ));
        };

        info!(
            "pending request decided: {} -> {}",
            reservation.id, reservation.status
        );
        let event = match next {
            ReservationStatus::Confirmed => BookingEvent::BookingConfirmed {
                reservation_id: reservation.id,
                provider_id: reservation.provider_id,
                customer_id: reservation.customer_id,
                start_at: reservation.start_at,
            },
            _ => BookingEvent::BookingRejected {
                reservation_id: reservation.id,
                provider_id: reservation.provider_id,
            },
        };
        Ok((reservation, event))
    }

    /// Provider marks a confirmed appointment as completed.
    pub async fn complete(
        &self,
        reservation_id: Uuid,
        provider_id: Uuid,
    ) -> Result<(Reservation, BookingEvent), BookingError> {
        let Some(current) = self.reservations.find_by_id(reservation_id).await? else {
            return Err(BookingError::NotFound(reservation_id));
        };
        if current.provider_id != provider_id {
            return Err(BookingError::Unauthorized);
        }
        if current.status != ReservationStatus::Confirmed {
            return Err(BookingError::InvalidState(current.status));
        }

        let Some(reservation) = self
            .reservations
            .update_status_from(
                reservation_id,
                ReservationStatus::Confirmed,
                ReservationStatus::Completed,
            )
            .await?
        else {
            return Err(BookingError::InvalidState(
                self.reread_status(reservation_id, current.status).await?,
            ));
        };

        let event = BookingEvent::BookingCompleted {
            reservation_id: reservation.id,
            provider_id: reservation.provider_id,
        };
        Ok((reservation, event))
    }

    /// Best-effort: failure is logged, not escalated. The TTL reclaims
    /// the key regardless.
    async fn release_lock(&self, reservation: &Reservation) {
        let key = reservation.slot_key();
        if let Err(err) = self.locks.delete(&key).await {
            warn!("failed to release slot lock {}: {}", key, err);
        }
    }

    /// Status after losing a guarded write race.
    async fn reread_status(
        &self,
        reservation_id: Uuid,
        fallback: ReservationStatus,
    ) -> Result<ReservationStatus, BookingError> {
        Ok(self
            .reservations
            .find_by_id(reservation_id)
            .await?
            .map_or(fallback, |r| r.status))
    }
}
