//! Claim intake and work queue HTTP handlers.
//!
//! This module implements the claim-related API endpoints:
//! - POST /api/v1/claims - Create a claim
//! - GET /api/v1/claims - List claims in work-queue order
//! - GET /api/v1/claims/:id - Get a claim by ID
//! - PATCH /api/v1/claims/:id/status - Move a claim through its lifecycle

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::claim::{
        Claim, ClaimResponse, CreateClaimRequest, ListClaimsQuery, STATUS_ORDER,
        UpdateClaimStatusRequest, is_valid_status, sort_for_work_queue,
    },
    services::event_publisher,
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::json;
use uuid::Uuid;

/// Create a new claim.
///
/// # Endpoint
///
/// `POST /api/v1/claims`
///
/// # Request Body
///
/// ```json
/// {
///   "patient_name": "Alex Moore",
///   "payer_name": "Blue Shield",
///   "total_amount_cents": 45000,
///   "service_date": "2026-08-01",   // optional
///   "status": "needs_review"        // optional, defaults to needs_review
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: Returns the created claim
/// - **Error (400)**: Missing fields, negative amount, or unknown status
/// - **Error (401)**: Invalid API key
///
/// Publishes a `claim.created` event to subscribed endpoints.
pub async fn create_claim(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateClaimRequest>,
) -> Result<(StatusCode, Json<ClaimResponse>), AppError> {
    let mut missing = Vec::new();
    if request.patient_name.is_none() {
        missing.push("patient_name");
    }
    if request.payer_name.is_none() {
        missing.push("payer_name");
    }
    if request.total_amount_cents.is_none() {
        missing.push("total_amount_cents");
    }
    if !missing.is_empty() {
        return Err(AppError::InvalidRequest(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    // Checked for None above
    let patient_name = request.patient_name.unwrap_or_default();
    let payer_name = request.payer_name.unwrap_or_default();
    let total_amount_cents = request.total_amount_cents.unwrap_or_default();

    if total_amount_cents < 0 {
        return Err(AppError::InvalidRequest(
            "total_amount_cents must be non-negative".to_string(),
        ));
    }

    let status = request.status.unwrap_or_else(|| "needs_review".to_string());
    if !is_valid_status(&status) {
        return Err(invalid_status_error(&status));
    }

    let claim = sqlx::query_as::<_, Claim>(
        r#"
        INSERT INTO claims
            (organization_id, patient_name, payer_name, total_amount_cents, status, service_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(auth.organization_id)
    .bind(&patient_name)
    .bind(&payer_name)
    .bind(total_amount_cents)
    .bind(&status)
    .bind(request.service_date)
    .fetch_one(&state.pool)
    .await?;

    let response = ClaimResponse::from(claim);
    event_publisher::publish_or_log(
        &state,
        auth.organization_id,
        "claim.created",
        "claim",
        response.id.to_string(),
        &response,
    )
    .await;

    Ok((StatusCode::CREATED, Json(response)))
}

/// List the organization's claims in work-queue order.
///
/// # Endpoint
///
/// `GET /api/v1/claims?dollar_first=true`
///
/// # Ordering
///
/// With `dollar_first=true`, claims are ranked by amount (largest first),
/// then by status urgency, then by most recent update. Without it, status
/// urgency leads and amount is ignored. Ties always break the same way, so
/// the two modes differ only in how heavily money weighs.
///
/// # Response
///
/// - **Success (200 OK)**: Array of claims (may be empty)
/// - **Error (401)**: Invalid API key
pub async fn list_claims(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListClaimsQuery>,
) -> Result<Json<Vec<ClaimResponse>>, AppError> {
    let mut claims = sqlx::query_as::<_, Claim>(
        "SELECT * FROM claims WHERE organization_id = $1 AND deleted_at IS NULL",
    )
    .bind(auth.organization_id)
    .fetch_all(&state.pool)
    .await?;

    // Ranking is multi-key, so it happens here rather than in SQL
    sort_for_work_queue(&mut claims, query.dollar_first);

    let responses: Vec<ClaimResponse> = claims.into_iter().map(Into::into).collect();

    Ok(Json(responses))
}

/// Get a specific claim by ID.
///
/// # Response
///
/// - **Success (200 OK)**: Returns claim details
/// - **Error (404)**: Claim not found or belongs to another organization
pub async fn get_claim(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(claim_id): Path<Uuid>,
) -> Result<Json<ClaimResponse>, AppError> {
    let claim = fetch_claim(&state, &auth, claim_id).await?;

    Ok(Json(claim.into()))
}

/// Move a claim to a new lifecycle status.
///
/// # Endpoint
///
/// `PATCH /api/v1/claims/:id/status`
///
/// # Request Body
///
/// ```json
/// { "status": "submitted" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: Returns the updated claim
/// - **Error (400)**: Missing or unknown status
/// - **Error (404)**: Claim not found in the caller's organization
///
/// Publishes `claim.submitted`, `claim.denied`, or `claim.updated`
/// depending on the new status. The event payload carries the claim plus
/// the status it moved from.
pub async fn update_claim_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(claim_id): Path<Uuid>,
    Json(request): Json<UpdateClaimStatusRequest>,
) -> Result<Json<ClaimResponse>, AppError> {
    let Some(status) = request.status else {
        return Err(AppError::InvalidRequest(
            "Missing required fields: status".to_string(),
        ));
    };
    if !is_valid_status(&status) {
        return Err(invalid_status_error(&status));
    }

    let previous = fetch_claim(&state, &auth, claim_id).await?;

    let claim = sqlx::query_as::<_, Claim>(
        r#"
        UPDATE claims
        SET status = $3, updated_at = NOW()
        WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(claim_id)
    .bind(auth.organization_id)
    .bind(&status)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::ClaimNotFound)?;

    let event_type = match status.as_str() {
        "submitted" => "claim.submitted",
        "denied" => "claim.denied",
        _ => "claim.updated",
    };

    let response = ClaimResponse::from(claim);
    event_publisher::publish_or_log(
        &state,
        auth.organization_id,
        event_type,
        "claim",
        response.id.to_string(),
        &json!({
            "claim": response,
            "previous_status": previous.status,
        }),
    )
    .await;

    Ok(Json(response))
}

/// Load a claim scoped to the caller's organization.
async fn fetch_claim(
    state: &AppState,
    auth: &AuthContext,
    claim_id: Uuid,
) -> Result<Claim, AppError> {
    sqlx::query_as::<_, Claim>(
        "SELECT * FROM claims WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL",
    )
    .bind(claim_id)
    // Prevents reading other organizations' claims
    .bind(auth.organization_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::ClaimNotFound)
}

fn invalid_status_error(status: &str) -> AppError {
    AppError::InvalidRequest(format!(
        "Invalid status '{status}'. Expected one of: {}",
        STATUS_ORDER.join(", ")
    ))
}
