use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::typed_header::TypedHeader;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use orario_booking::{HoldRequest, ProviderDecision, RequesterRole};
use orario_core::{BookingEvent, Reservation};

use crate::auth::decode_claims;
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/hold", post(hold_slot))
        .route("/v1/bookings/confirm", post(confirm_booking))
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/decision", put(decide_booking))
        .route("/v1/bookings/{id}/complete", put(complete_booking))
}

#[derive(Debug, Deserialize)]
struct HoldSlotRequest {
    provider_id: Uuid,
    service_id: Uuid,
    /// UTC. Local-time conversion happens before this API is called.
    start_at: DateTime<Utc>,
    duration_minutes: u32,
    price_cents: i32,
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct HoldSlotResponse {
    message: String,
    booking_id: Uuid,
    hold_token: String,
    hold_expires_at: DateTime<Utc>,
    expires_in_seconds: u64,
}

#[derive(Debug, Serialize)]
struct BookingResponse {
    message: String,
    booking: Reservation,
}

async fn hold_slot(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Json(req): Json<HoldSlotRequest>,
) -> Result<(StatusCode, Json<HoldSlotResponse>), AppError> {
    let claims = decode_claims(bearer.token(), &state.auth.secret)?;
    // Guest subjects are not uuids; the hold stays ownerless until confirmed.
    let customer_id = claims.user_id().ok();

    let provider_id = req.provider_id;
    let start_at = req.start_at;

    let grant = state
        .engine
        .holds
        .acquire(HoldRequest {
            provider_id: req.provider_id,
            service_id: req.service_id,
            customer_id,
            start_at: req.start_at,
            duration_minutes: req.duration_minutes,
            price_cents: req.price_cents,
            metadata: req.metadata,
        })
        .await?;

    publish(
        &state,
        &BookingEvent::HoldPlaced {
            reservation_id: grant.reservation_id,
            provider_id,
            start_at,
            hold_expires_at: grant.hold_expires_at,
        },
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(HoldSlotResponse {
            message: "Slot reserved".to_string(),
            booking_id: grant.reservation_id,
            hold_token: grant.hold_token,
            hold_expires_at: grant.hold_expires_at,
            expires_in_seconds: grant.expires_in_seconds,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct ConfirmRequest {
    booking_id: Uuid,
    hold_token: String,
}

async fn confirm_booking(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    // The hold token is the capability; the token only needs to be valid.
    let _claims = decode_claims(bearer.token(), &state.auth.secret)?;

    let (booking, event) = state
        .engine
        .lifecycle
        .confirm(req.booking_id, &req.hold_token)
        .await?;
    publish(&state, &event).await;

    Ok(Json(BookingResponse {
        message: "Booking request sent successfully".to_string(),
        booking,
    }))
}

async fn create_booking(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Json(req): Json<HoldSlotRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let claims = decode_claims(bearer.token(), &state.auth.secret)?;
    let customer_id = claims.user_id().ok();

    let (booking, event) = state
        .engine
        .book_now(HoldRequest {
            provider_id: req.provider_id,
            service_id: req.service_id,
            customer_id,
            start_at: req.start_at,
            duration_minutes: req.duration_minutes,
            price_cents: req.price_cents,
            metadata: req.metadata,
        })
        .await?;
    publish(&state, &event).await;

    Ok((
        StatusCode::CREATED,
        Json(BookingResponse {
            message: "Booking created successfully".to_string(),
            booking,
        }),
    ))
}

async fn cancel_booking(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let claims = decode_claims(bearer.token(), &state.auth.secret)?;
    let requester = claims.requester()?;

    let (booking, event) = state.engine.lifecycle.cancel(id, requester).await?;
    publish(&state, &event).await;

    Ok(Json(BookingResponse {
        message: "Booking cancelled successfully".to_string(),
        booking,
    }))
}

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    decision: ProviderDecision,
}

async fn decide_booking(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let claims = decode_claims(bearer.token(), &state.auth.secret)?;
    let requester = claims.requester()?;
    if requester.role != RequesterRole::Provider {
        return Err(AppError::AuthorizationError(
            "only providers can decide booking requests".to_string(),
        ));
    }

    let (booking, event) = state
        .engine
        .lifecycle
        .decide(id, requester.user_id, req.decision)
        .await?;
    publish(&state, &event).await;

    Ok(Json(BookingResponse {
        message: "Booking updated".to_string(),
        booking,
    }))
}

async fn complete_booking(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let claims = decode_claims(bearer.token(), &state.auth.secret)?;
    let requester = claims.requester()?;
    if requester.role != RequesterRole::Provider {
        return Err(AppError::AuthorizationError(
            "only providers can complete bookings".to_string(),
        ));
    }

    let (booking, event) = state
        .engine
        .lifecycle
        .complete(id, requester.user_id)
        .await?;
    publish(&state, &event).await;

    Ok(Json(BookingResponse {
        message: "Booking completed".to_string(),
        booking,
    }))
}

/// Event publication never gates the response; a dropped event is a
/// warn-level incident, not a failed booking.
async fn publish(state: &AppState, event: &BookingEvent) {
    if let Err(err) = state.events.publish_event(event).await {
        warn!("failed to publish {}: {}", event.topic(), err);
    }
}
