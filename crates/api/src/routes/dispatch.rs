//! Dispatch engine endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{DriverId, OrderId};
use dispatch::{DispatchEngine, DispatchStatus, InMemoryDispatchStore};
use domain::{InMemoryDriverNotifier, InMemoryDriverRegistry, InMemoryOrderStore};
use outbox::InMemoryOutboxStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// The dispatch engine as wired for the single-process deployment.
pub type DefaultDispatchEngine = DispatchEngine<
    InMemoryOrderStore,
    InMemoryDriverRegistry,
    InMemoryDispatchStore,
    InMemoryDriverNotifier,
    InMemoryOutboxStore,
>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub engine: Arc<DefaultDispatchEngine>,
    pub orders: InMemoryOrderStore,
    pub registry: InMemoryDriverRegistry,
    pub outbox: InMemoryOutboxStore,
}

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferResponseRequest {
    pub driver_id: Uuid,
    pub accepted: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAssignmentRequest {
    pub driver_id: Uuid,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDispatchResponse {
    /// False means no dispatch occurred; safe to retry later.
    pub dispatched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
}

#[derive(Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct ExpireResponse {
    pub expired: usize,
}

// -- Handlers --

/// POST /orders/{id}/dispatch — find a driver and create an offer.
#[tracing::instrument(skip(state))]
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<StartDispatchResponse>, ApiError> {
    let attempt = state.engine.start_dispatch(OrderId::from_uuid(id)).await?;

    Ok(Json(match attempt {
        Some(attempt) => StartDispatchResponse {
            dispatched: true,
            attempt_id: Some(attempt.id.to_string()),
            driver_id: Some(attempt.driver_id.to_string()),
        },
        None => StartDispatchResponse {
            dispatched: false,
            attempt_id: None,
            driver_id: None,
        },
    }))
}

/// POST /orders/{id}/offer-response — a driver accepts or declines.
#[tracing::instrument(skip(state, req))]
pub async fn respond(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<OfferResponseRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let ok = state
        .engine
        .respond_to_offer(
            OrderId::from_uuid(id),
            DriverId::from_uuid(req.driver_id),
            req.accepted,
        )
        .await?;

    Ok(Json(AckResponse { ok }))
}

/// POST /orders/{id}/cancel-assignment — a driver abandons an assignment.
#[tracing::instrument(skip(state, req))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelAssignmentRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let ok = state
        .engine
        .cancel_assignment(OrderId::from_uuid(id), DriverId::from_uuid(req.driver_id))
        .await?;

    Ok(Json(AckResponse { ok }))
}

/// GET /orders/{id}/dispatch — where the order stands in dispatch.
#[tracing::instrument(skip(state))]
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DispatchStatus>, ApiError> {
    let status = state
        .engine
        .dispatch_status(OrderId::from_uuid(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {id}")))?;

    Ok(Json(status))
}

/// POST /dispatch/expire-offers — manually trigger the expiry sweep.
#[tracing::instrument(skip(state))]
pub async fn expire(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExpireResponse>, ApiError> {
    let expired = state.engine.expire_pending_offers().await?;
    Ok(Json(ExpireResponse { expired }))
}
