//! Delivery log and manual retry HTTP handlers.
//!
//! This module implements the organization-wide delivery endpoints:
//! - GET /api/v1/deliveries - List deliveries across all endpoints
//! - GET /api/v1/deliveries/:id - Delivery detail with attempt history
//! - POST /api/v1/deliveries/:id/retry - Re-queue a failed delivery

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{AuthContext, require_admin};
use crate::models::webhook::{
    DeliveryDetailResponse, DeliveryResponse, ListDeliveriesQuery, WebhookDelivery,
    WebhookDeliveryAttempt,
};
use crate::state::AppState;

/// List deliveries across every endpoint in the organization.
///
/// # Endpoint
///
/// `GET /api/v1/deliveries?status=failed&limit=50`
///
/// # Response
///
/// - **Success (200 OK)**: Deliveries newest first, optionally filtered by
///   status, at most `limit` (default 50, capped at 200)
/// - **Error (401)**: Invalid API key
pub async fn list_deliveries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<Json<Vec<DeliveryResponse>>, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    // Deliveries carry no organization id; scope through their config
    let deliveries = sqlx::query_as::<_, WebhookDelivery>(
        r#"
        SELECT d.* FROM webhook_deliveries d
        JOIN webhook_configs c ON c.id = d.webhook_config_id
        WHERE c.organization_id = $1
          AND ($2::text IS NULL OR d.status = $2)
        ORDER BY d.created_at DESC
        LIMIT $3
        "#,
    )
    .bind(auth.organization_id)
    .bind(query.status)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(deliveries.into_iter().map(Into::into).collect()))
}

/// Get one delivery with its full attempt history.
///
/// # Response
///
/// - **Success (200 OK)**: The delivery plus one row per HTTP attempt,
///   oldest attempt first
/// - **Error (404)**: Delivery not found in the caller's organization
pub async fn get_delivery(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(delivery_id): Path<Uuid>,
) -> Result<Json<DeliveryDetailResponse>, AppError> {
    let delivery = fetch_delivery(&state, &auth, delivery_id).await?;

    let attempts = sqlx::query_as::<_, WebhookDeliveryAttempt>(
        r#"
        SELECT * FROM webhook_delivery_attempts
        WHERE webhook_delivery_id = $1
        ORDER BY attempt_number
        "#,
    )
    .bind(delivery.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(DeliveryDetailResponse {
        delivery: delivery.into(),
        attempts,
    }))
}

/// Manually retry a failed delivery.
///
/// # Endpoint
///
/// `POST /api/v1/deliveries/:id/retry`
///
/// # Authentication
///
/// Requires the `admin` or `owner` role.
///
/// # Process
///
/// Resets the attempt counter, clears the recorded outcome, and re-queues
/// the delivery as `pending` due immediately. Attempt history rows from the
/// previous run are kept.
///
/// # Response
///
/// - **Success (202 Accepted)**: The re-queued delivery
/// - **Error (403)**: Caller is not an admin or owner
/// - **Error (404)**: Delivery not found in the caller's organization
/// - **Error (409)**: Delivery is not in the `failed` state
pub async fn retry_delivery(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(delivery_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&auth)?;

    let delivery = fetch_delivery(&state, &auth, delivery_id).await?;
    if delivery.status != "failed" {
        return Err(AppError::RetryNotAllowed(delivery.status));
    }

    let requeued = sqlx::query_as::<_, WebhookDelivery>(
        r#"
        UPDATE webhook_deliveries
        SET status = 'pending', attempt_count = 0, next_attempt_at = NOW(),
            http_status = NULL, response_body = NULL, error_message = NULL,
            delivery_latency_ms = NULL, delivered_at = NULL, updated_at = NOW()
        WHERE id = $1 AND status = 'failed'
        RETURNING *
        "#,
    )
    .bind(delivery.id)
    .fetch_optional(&state.pool)
    .await?
    // Lost a race with another retry; report the state we saw
    .ok_or(AppError::RetryNotAllowed(delivery.status))?;

    tracing::info!(
        "Delivery {} manually re-queued by {}",
        requeued.id,
        auth.member_name
    );
    state.worker_wake.notify_one();

    Ok((
        StatusCode::ACCEPTED,
        Json(DeliveryResponse::from(requeued)),
    ))
}

/// Load a delivery scoped to the caller's organization.
async fn fetch_delivery(
    state: &AppState,
    auth: &AuthContext,
    delivery_id: Uuid,
) -> Result<WebhookDelivery, AppError> {
    sqlx::query_as::<_, WebhookDelivery>(
        r#"
        SELECT d.* FROM webhook_deliveries d
        JOIN webhook_configs c ON c.id = d.webhook_config_id
        WHERE d.id = $1 AND c.organization_id = $2
        "#,
    )
    .bind(delivery_id)
    .bind(auth.organization_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::DeliveryNotFound)
}
