//! HTTP handlers for webhook endpoint management.
//!
//! This module provides API endpoints for organizations to register,
//! inspect, test, and retire webhook endpoints, and to rotate their
//! signing secrets.

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
    CreateWebhookRequest, DeliveryResponse, EVENT_CATALOG, ListDeliveriesQuery,
    ListWebhooksResponse, SecretRotationResponse, TestDeliveryResponse, UpdateWebhookRequest,
    WebhookDelivery, WebhookDetailResponse, WebhookResponse, WebhookWithStats,
};
use crate::services::{event_publisher, webhook_service};
use crate::state::AppState;

/// How many recent deliveries ride along on the endpoint detail response.
const RECENT_DELIVERIES: i64 = 10;

/// Register a new webhook endpoint.
///
/// # Endpoint
///
/// `POST /api/v1/webhooks`
///
/// # Request Body
///
/// ```json
/// {
///   "name": "claims-sync",
///   "url": "https://example.com/hooks/rcm",
///   "events": ["claim.submitted", "claim.denied"],
///   "environment": "production",
///   "timeout_seconds": 30,
///   "max_attempts": 5
/// }
/// ```
///
/// # Response
///
/// Returns 201 Created with the endpoint details. The `secret` is only
/// returned once, here and at rotation; store it immediately.
///
/// # Security
///
/// - Requires the `admin` or `owner` role
/// - HTTPS URLs required (HTTP localhost allowed for development)
/// - Secret is `whsec_` plus 64 hex chars for HMAC-SHA256
pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateWebhookRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&auth)?;

    let endpoint =
        webhook_service::create_webhook(&state.pool, auth.organization_id, request).await?;

    Ok((StatusCode::CREATED, Json(endpoint)))
}

/// List all live webhook endpoints with their delivery counters.
///
/// # Response
///
/// ```json
/// {
///   "webhooks": [
///     {
///       "id": "550e8400-e29b-41d4-a716-446655440000",
///       "name": "claims-sync",
///       "url": "https://example.com/hooks/rcm",
///       "events": ["claim.submitted"],
///       "is_active": true,
///       "stats": { "total_deliveries": 42, "delivered": 40, "failed": 1 }
///     }
///   ],
///   "available_events": ["organization.updated", "..."]
/// }
/// ```
///
/// Secrets are never returned in list operations.
pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ListWebhooksResponse>, AppError> {
    let webhooks = webhook_service::list_webhooks(&state.pool, auth.organization_id).await?;

    Ok(Json(ListWebhooksResponse {
        webhooks,
        available_events: EVENT_CATALOG.to_vec(),
    }))
}

/// Get one webhook endpoint with stats and its most recent deliveries.
///
/// # Response
///
/// - **Success (200 OK)**: Endpoint, counters, and up to 10 recent deliveries
/// - **Error (404)**: Endpoint not found in the caller's organization
pub async fn get_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
) -> Result<Json<WebhookDetailResponse>, AppError> {
    let (config, stats) =
        webhook_service::get_webhook(&state.pool, auth.organization_id, webhook_id).await?;

    let recent = sqlx::query_as::<_, WebhookDelivery>(
        r#"
        SELECT * FROM webhook_deliveries
        WHERE webhook_config_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(config.id)
    .bind(RECENT_DELIVERIES)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(WebhookDetailResponse {
        webhook: WebhookWithStats {
            webhook: WebhookResponse::from(config),
            stats,
        },
        recent_deliveries: recent.into_iter().map(Into::into).collect(),
    }))
}

/// Update a webhook endpoint.
///
/// # Endpoint
///
/// `PATCH /api/v1/webhooks/:id`
///
/// Absent fields keep their current values; supplied ones go through the
/// same validation and clamping as registration. Flipping `is_active` off
/// stops deliveries without losing history.
///
/// # Response
///
/// - **Success (200 OK)**: Updated endpoint (no secret)
/// - **Error (400)**: Invalid URL or event list
/// - **Error (403)**: Caller is not an admin or owner
/// - **Error (404)**: Endpoint not found
/// - **Error (409)**: New name collides with another endpoint
pub async fn update_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
    Json(request): Json<UpdateWebhookRequest>,
) -> Result<Json<WebhookResponse>, AppError> {
    require_admin(&auth)?;

    let endpoint =
        webhook_service::update_webhook(&state.pool, auth.organization_id, webhook_id, request)
            .await?;

    Ok(Json(endpoint))
}

/// Delete a webhook endpoint (soft delete).
///
/// # Response
///
/// Returns 204 No Content on success.
///
/// # Process
///
/// Sets `deleted_at` to preserve delivery history and fails any deliveries
/// still queued for the endpoint. It stops receiving events immediately.
pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_admin(&auth)?;

    webhook_service::delete_webhook(&state.pool, auth.organization_id, webhook_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Rotate a webhook endpoint's signing secret.
///
/// # Endpoint
///
/// `POST /api/v1/webhooks/:id/secret`
///
/// # Response
///
/// ```json
/// {
///   "webhook_id": "550e8400-e29b-41d4-a716-446655440000",
///   "secret": "whsec_4f6a...",
///   "message": "Store this secret now. It will not be shown again."
/// }
/// ```
///
/// The previous secret is retired and stops signing new deliveries at once,
/// though consumers may keep accepting it during their rotation window.
pub async fn rotate_secret(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
) -> Result<Json<SecretRotationResponse>, AppError> {
    require_admin(&auth)?;

    let secret =
        webhook_service::rotate_secret(&state.pool, auth.organization_id, webhook_id).await?;

    Ok(Json(SecretRotationResponse {
        webhook_id,
        secret,
        message: "Store this secret now. It will not be shown again.".to_string(),
    }))
}

/// Queue a test delivery for a webhook endpoint.
///
/// # Endpoint
///
/// `POST /api/v1/webhooks/:id/test`
///
/// # Response
///
/// - **Success (202 Accepted)**: A `webhook.test` delivery is queued; poll
///   the deliveries API to see its outcome
/// - **Error (400)**: Endpoint is disabled
/// - **Error (404)**: Endpoint not found
pub async fn test_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&auth)?;

    let config =
        webhook_service::fetch_config(&state.pool, auth.organization_id, webhook_id).await?;
    if !config.is_active {
        return Err(AppError::InvalidRequest(
            "Cannot test a disabled endpoint".to_string(),
        ));
    }

    let delivery_id =
        event_publisher::enqueue_test_delivery(&state, &config, &auth.member_name).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TestDeliveryResponse {
            delivery_id,
            status: "queued".to_string(),
        }),
    ))
}

/// List recent deliveries for one webhook endpoint.
///
/// # Endpoint
///
/// `GET /api/v1/webhooks/:id/deliveries?status=failed&limit=50`
///
/// # Response
///
/// - **Success (200 OK)**: Deliveries newest first, optionally filtered by
///   status, at most `limit` (default 50, capped at 200)
/// - **Error (404)**: Endpoint not found
pub async fn list_webhook_deliveries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<Json<Vec<DeliveryResponse>>, AppError> {
    // Scope check; 404 before any delivery rows leak
    let config =
        webhook_service::fetch_config(&state.pool, auth.organization_id, webhook_id).await?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    let deliveries = sqlx::query_as::<_, WebhookDelivery>(
        r#"
        SELECT * FROM webhook_deliveries
        WHERE webhook_config_id = $1
          AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(config.id)
    .bind(query.status)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(deliveries.into_iter().map(Into::into).collect()))
}
