use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use orario_core::repository::ReservationStore;
use orario_core::{Reservation, ReservationStatus, StoreError};

/// `ReservationStore` over Postgres. The two conditional transitions are
/// single `UPDATE ... WHERE ... RETURNING` statements, so "first matching
/// writer wins" comes straight from the database.
pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const COLUMNS: &str = "id, provider_id, service_id, customer_id, start_at, end_at, \
     status, hold_token, hold_expires_at, price_cents, metadata, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    provider_id: Uuid,
    service_id: Uuid,
    customer_id: Option<Uuid>,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    status: String,
    hold_token: Option<String>,
    hold_expires_at: Option<DateTime<Utc>>,
    price_cents: i32,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, StoreError> {
        let status = row
            .status
            .parse::<ReservationStatus>()
            .map_err(StoreError::Record)?;

        Ok(Reservation {
            id: row.id,
            provider_id: row.provider_id,
            service_id: row.service_id,
            customer_id: row.customer_id,
            start_at: row.start_at,
            end_at: row.end_at,
            status,
            hold_token: row.hold_token,
            hold_expires_at: row.hold_expires_at,
            price_cents: row.price_cents,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Record(err.to_string())
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn insert(&self, reservation: &Reservation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reservations \
             (id, provider_id, service_id, customer_id, start_at, end_at, status, \
              hold_token, hold_expires_at, price_cents, metadata, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(reservation.id)
        .bind(reservation.provider_id)
        .bind(reservation.service_id)
        .bind(reservation.customer_id)
        .bind(reservation.start_at)
        .bind(reservation.end_at)
        .bind(reservation.status.as_str())
        .bind(reservation.hold_token.as_deref())
        .bind(reservation.hold_expires_at)
        .bind(reservation.price_cents)
        .bind(reservation.metadata.as_ref())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM reservations WHERE id = $1");
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Reservation::try_from).transpose()
    }

    async fn find_overlapping(
        &self,
        provider_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude_hold_token: Option<&str>,
    ) -> Result<Option<Reservation>, StoreError> {
        // Overlap of half-open ranges; live statuses only. The token
        // exclusion lets a holder re-enter their own tentative record.
        let sql = format!(
            "SELECT {COLUMNS} FROM reservations \
             WHERE provider_id = $1 \
               AND start_at < $3 AND end_at > $2 \
               AND status IN ('Held', 'Pending', 'Confirmed') \
               AND ($4::text IS NULL OR hold_token IS DISTINCT FROM $4) \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(provider_id)
            .bind(start_at)
            .bind(end_at)
            .bind(exclude_hold_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Reservation::try_from).transpose()
    }

    async fn resolve_hold(
        &self,
        id: Uuid,
        hold_token: Option<&str>,
        valid_after: Option<DateTime<Utc>>,
        next: ReservationStatus,
    ) -> Result<Option<Reservation>, StoreError> {
        let sql = format!(
            "UPDATE reservations \
             SET status = $2, hold_token = NULL, hold_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1 \
               AND status = 'Held' \
               AND ($3::text IS NULL OR hold_token = $3) \
               AND ($4::timestamptz IS NULL OR hold_expires_at > $4) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id)
            .bind(next.as_str())
            .bind(hold_token)
            .bind(valid_after)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Reservation::try_from).transpose()
    }

    async fn update_status_from(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> Result<Option<Reservation>, StoreError> {
        let sql = format!(
            "UPDATE reservations \
             SET status = $3, hold_token = NULL, hold_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id)
            .bind(expected.as_str())
            .bind(next.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Reservation::try_from).transpose()
    }

    async fn find_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM reservations \
             WHERE status = 'Held' AND hold_expires_at <= $1 \
             ORDER BY hold_expires_at"
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(Reservation::try_from).collect()
    }
}
