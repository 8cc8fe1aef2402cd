pub mod clock;
pub mod repository;
pub mod reservation;

pub use clock::{Clock, SystemClock};
pub use repository::{ReservationStore, SlotLockStore};
pub use reservation::{slot_key, BookingEvent, Reservation, ReservationStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store error: {0}")]
    Record(String),
    #[error("lock store error: {0}")]
    Lock(String),
}
