use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reservation status in the booking lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReservationStatus {
    Held,
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Rejected,
}

impl ReservationStatus {
    /// Live statuses block other reservations on the same slot.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Held | Self::Pending | Self::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Held => "Held",
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Held" => Ok(Self::Held),
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            "Rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown reservation status: {}", other)),
        }
    }
}

/// A provider time-slot reservation.
///
/// Duration and price are captured when the hold is taken and never
/// recomputed from the service catalog, so a provider editing a service
/// mid-hold cannot shift an existing reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    /// Customer, if known. Stays `None` for guest holds until confirmation.
    pub customer_id: Option<Uuid>,
    pub start_at: DateTime<Utc>, // UTC
    pub end_at: DateTime<Utc>,   // UTC
    pub status: ReservationStatus,
    /// Capability credential for the hold. `Some` iff status is `Held`.
    pub hold_token: Option<String>,
    /// `Some` iff status is `Held`.
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub price_cents: i32,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Lock-store key for this reservation's slot.
    pub fn slot_key(&self) -> String {
        slot_key(self.provider_id, self.start_at)
    }
}

/// Lock-store key for a (provider, start time) pair, second precision.
pub fn slot_key(provider_id: Uuid, start_at: DateTime<Utc>) -> String {
    format!(
        "slot:{}:{}",
        provider_id,
        start_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Outbound lifecycle notification, returned by the engine and published
/// by the caller. There is no stateful notifier the engine calls into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookingEvent {
    HoldPlaced {
        reservation_id: Uuid,
        provider_id: Uuid,
        start_at: DateTime<Utc>,
        hold_expires_at: DateTime<Utc>,
    },
    BookingRequested {
        reservation_id: Uuid,
        provider_id: Uuid,
        customer_id: Option<Uuid>,
        start_at: DateTime<Utc>,
    },
    BookingConfirmed {
        reservation_id: Uuid,
        provider_id: Uuid,
        customer_id: Option<Uuid>,
        start_at: DateTime<Utc>,
    },
    BookingCancelled {
        reservation_id: Uuid,
        provider_id: Uuid,
        cancelled_by: Option<Uuid>,
    },
    BookingRejected {
        reservation_id: Uuid,
        provider_id: Uuid,
    },
    BookingCompleted {
        reservation_id: Uuid,
        provider_id: Uuid,
    },
    HoldExpired {
        reservation_id: Uuid,
        provider_id: Uuid,
        start_at: DateTime<Utc>,
    },
}

impl BookingEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::HoldPlaced { .. } => "holds.created",
            Self::BookingRequested { .. } => "booking.requested",
            Self::BookingConfirmed { .. } => "booking.confirmed",
            Self::BookingCancelled { .. } => "booking.cancelled",
            Self::BookingRejected { .. } => "booking.rejected",
            Self::BookingCompleted { .. } => "booking.completed",
            Self::HoldExpired { .. } => "holds.expired",
        }
    }

    pub fn reservation_id(&self) -> Uuid {
        match self {
            Self::HoldPlaced { reservation_id, .. }
            | Self::BookingRequested { reservation_id, .. }
            | Self::BookingConfirmed { reservation_id, .. }
            | Self::BookingCancelled { reservation_id, .. }
            | Self::BookingRejected { reservation_id, .. }
            | Self::BookingCompleted { reservation_id, .. }
            | Self::HoldExpired { reservation_id, .. } => *reservation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slot_key_is_second_precision() {
        let provider = Uuid::nil();
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap();
        assert_eq!(
            slot_key(provider, start),
            format!("slot:{}:2025-01-10T10:00:00Z", provider)
        );
    }

    #[test]
    fn live_statuses_block() {
        assert!(ReservationStatus::Held.is_live());
        assert!(ReservationStatus::Pending.is_live());
        assert!(ReservationStatus::Confirmed.is_live());
        assert!(!ReservationStatus::Cancelled.is_live());
        assert!(!ReservationStatus::Rejected.is_live());
        assert!(!ReservationStatus::Completed.is_live());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ReservationStatus::Held,
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Completed,
            ReservationStatus::Cancelled,
            ReservationStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>(), Ok(status));
        }
    }
}
