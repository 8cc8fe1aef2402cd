//! In-memory store doubles. They implement the same contracts as the
//! Postgres/Redis adapters so the engine can be exercised without either,
//! with TTLs measured against the injected clock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use orario_core::{
    Clock, Reservation, ReservationStatus, ReservationStore, SlotLockStore, StoreError,
};

#[derive(Default)]
pub struct InMemoryReservationStore {
    rows: Mutex<HashMap<Uuid, Reservation>>,
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn insert(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        rows.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.get(&id).cloned())
    }

    async fn find_overlapping(
        &self,
        provider_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude_hold_token: Option<&str>,
    ) -> Result<Option<Reservation>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .find(|r| {
                r.provider_id == provider_id
                    && r.status.is_live()
                    && r.start_at < end_at
                    && r.end_at > start_at
                    && match exclude_hold_token {
                        Some(token) => r.hold_token.as_deref() != Some(token),
                        None => true,
                    }
            })
            .cloned())
    }

    async fn resolve_hold(
        &self,
        id: Uuid,
        hold_token: Option<&str>,
        valid_after: Option<DateTime<Utc>>,
        next: ReservationStatus,
    ) -> Result<Option<Reservation>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.status != ReservationStatus::Held {
            return Ok(None);
        }
        if let Some(token) = hold_token {
            if row.hold_token.as_deref() != Some(token) {
                return Ok(None);
            }
        }
        if let Some(after) = valid_after {
            if !row.hold_expires_at.is_some_and(|expiry| expiry > after) {
                return Ok(None);
            }
        }

        row.status = next;
        row.hold_token = None;
        row.hold_expires_at = None;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn update_status_from(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> Result<Option<Reservation>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.status != expected {
            return Ok(None);
        }

        row.status = next;
        row.hold_token = None;
        row.hold_expires_at = None;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn find_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|r| {
                r.status == ReservationStatus::Held
                    && r.hold_expires_at.is_some_and(|expiry| expiry <= now)
            })
            .cloned()
            .collect())
    }
}

struct LockEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryLockStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryLockStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SlotLockStore for InMemoryLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            LockEntry {
                value: value.to_string(),
                expires_at: now + Duration::seconds(ttl_seconds as i64),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
        Ok(())
    }
}

/// Hand-cranked clock for steering expiry in tests.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
