//! Organization profile HTTP handlers.
//!
//! This module implements the organization-related API endpoints:
//! - GET /api/v1/organization - Fetch the authenticated organization
//! - PATCH /api/v1/organization - Update the organization profile

use crate::{
    error::AppError,
    middleware::auth::{AuthContext, require_admin},
    models::organization::{Organization, OrganizationResponse, UpdateOrganizationRequest},
    services::event_publisher,
    state::AppState,
};
use axum::{Extension, Json, extract::State};

/// Fetch the authenticated caller's organization.
///
/// # Endpoint
///
/// `GET /api/v1/organization`
///
/// # Authentication
///
/// Requires valid API key in Authorization header. The organization is
/// always the one the key belongs to; there is no cross-tenant lookup.
///
/// # Response
///
/// - **Success (200 OK)**: Returns the organization profile
/// - **Error (401)**: Invalid API key
/// - **Error (404)**: Organization has been deleted
pub async fn get_organization(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<OrganizationResponse>, AppError> {
    let organization = fetch_organization(&state, &auth).await?;

    Ok(Json(organization.into()))
}

/// Update the organization profile.
///
/// # Endpoint
///
/// `PATCH /api/v1/organization`
///
/// # Authentication
///
/// Requires an API key whose team member has the `admin` or `owner` role.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "Mercy Health Partners"
/// }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: Returns the updated organization
/// - **Error (400)**: No updatable fields supplied
/// - **Error (403)**: Caller is not an admin or owner
///
/// Publishes an `organization.updated` event to subscribed endpoints.
pub async fn update_organization(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<UpdateOrganizationRequest>,
) -> Result<Json<OrganizationResponse>, AppError> {
    require_admin(&auth)?;

    let name = match request.name.map(|n| n.trim().to_string()) {
        Some(name) if !name.is_empty() => name,
        Some(_) => {
            return Err(AppError::InvalidRequest(
                "Organization name cannot be empty".to_string(),
            ));
        }
        None => {
            return Err(AppError::InvalidRequest(
                "Missing required fields: name".to_string(),
            ));
        }
    };

    let organization = sqlx::query_as::<_, Organization>(
        r#"
        UPDATE organizations
        SET name = $2, updated_at = NOW()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(auth.organization_id)
    .bind(&name)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::OrganizationNotFound)?;

    let response = OrganizationResponse::from(organization);
    event_publisher::publish_or_log(
        &state,
        auth.organization_id,
        "organization.updated",
        "organization",
        response.id.to_string(),
        &response,
    )
    .await;

    Ok(Json(response))
}

/// Load the caller's organization, filtering out soft-deleted rows.
async fn fetch_organization(
    state: &AppState,
    auth: &AuthContext,
) -> Result<Organization, AppError> {
    sqlx::query_as::<_, Organization>(
        "SELECT * FROM organizations WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(auth.organization_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::OrganizationNotFound)
}
