//! Team membership HTTP handlers.
//!
//! This module implements the team-member API endpoints:
//! - GET /api/v1/team-members - List active members of the organization
//! - POST /api/v1/team-members - Add a member
//! - DELETE /api/v1/team-members/:id - Remove a member (soft delete)

use crate::{
    error::{AppError, on_unique_violation},
    middleware::auth::{AuthContext, require_admin},
    models::team_member::{
        CreateTeamMemberRequest, TeamMember, TeamMemberResponse, is_valid_role,
    },
    services::event_publisher,
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// List the organization's team members.
///
/// # Endpoint
///
/// `GET /api/v1/team-members`
///
/// # Response
///
/// - **Success (200 OK)**: Array of members, newest first. Soft-deleted
///   members are never included.
/// - **Error (401)**: Invalid API key
pub async fn list_team_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<TeamMemberResponse>>, AppError> {
    let members = sqlx::query_as::<_, TeamMember>(
        r#"
        SELECT * FROM team_members
        WHERE organization_id = $1 AND deleted_at IS NULL
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth.organization_id)
    .fetch_all(&state.pool)
    .await?;

    let responses: Vec<TeamMemberResponse> = members.into_iter().map(Into::into).collect();

    Ok(Json(responses))
}

/// Add a team member to the organization.
///
/// # Endpoint
///
/// `POST /api/v1/team-members`
///
/// # Authentication
///
/// Requires the `admin` or `owner` role.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "Dana Reyes",
///   "email": "dana@example.com",
///   "role": "member"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: Returns the new member
/// - **Error (400)**: Missing fields, bad email, or unknown role
/// - **Error (403)**: Caller is not an admin or owner
/// - **Error (409)**: Email already belongs to an active member
///
/// Publishes a `team_member.added` event to subscribed endpoints.
pub async fn create_team_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateTeamMemberRequest>,
) -> Result<(StatusCode, Json<TeamMemberResponse>), AppError> {
    require_admin(&auth)?;

    let mut missing = Vec::new();
    if request.name.is_none() {
        missing.push("name");
    }
    if request.email.is_none() {
        missing.push("email");
    }
    if request.role.is_none() {
        missing.push("role");
    }
    if !missing.is_empty() {
        return Err(AppError::InvalidRequest(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    // Checked for None above
    let name = request.name.unwrap_or_default();
    let email = request.email.unwrap_or_default().to_lowercase();
    let role = request.role.unwrap_or_default();

    if !email.contains('@') {
        return Err(AppError::InvalidRequest(
            "Invalid email address".to_string(),
        ));
    }
    if !is_valid_role(&role) {
        return Err(AppError::InvalidRequest(format!(
            "Invalid role '{role}'. Expected one of: owner, admin, member"
        )));
    }

    let member = sqlx::query_as::<_, TeamMember>(
        r#"
        INSERT INTO team_members (organization_id, name, email, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(auth.organization_id)
    .bind(&name)
    .bind(&email)
    .bind(&role)
    .fetch_one(&state.pool)
    .await
    // Partial unique index on (organization_id, email) for live rows
    .map_err(|e| on_unique_violation(e, AppError::DuplicateTeamMember))?;

    tracing::info!("Team member {} added by {}", member.id, auth.member_name);

    let response = TeamMemberResponse::from(member);
    event_publisher::publish_or_log(
        &state,
        auth.organization_id,
        "team_member.added",
        "team_member",
        response.id.to_string(),
        &response,
    )
    .await;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Remove a team member.
///
/// # Endpoint
///
/// `DELETE /api/v1/team-members/:id`
///
/// # Authentication
///
/// Requires the `admin` or `owner` role. Callers cannot remove their own
/// membership.
///
/// # Response
///
/// - **Success (204 No Content)**: Member soft-deleted and deactivated
/// - **Error (400)**: Attempted self-removal
/// - **Error (403)**: Caller is not an admin or owner
/// - **Error (404)**: No active member with that id in the organization
///
/// Publishes a `team_member.removed` event to subscribed endpoints.
pub async fn delete_team_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(member_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_admin(&auth)?;

    if member_id == auth.team_member_id {
        return Err(AppError::InvalidRequest(
            "Cannot remove your own membership".to_string(),
        ));
    }

    let member = sqlx::query_as::<_, TeamMember>(
        r#"
        UPDATE team_members
        SET deleted_at = NOW(), is_active = FALSE, updated_at = NOW()
        WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(member_id)
    // Scope to the caller's organization
    .bind(auth.organization_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::TeamMemberNotFound)?;

    tracing::info!("Team member {} removed by {}", member.id, auth.member_name);

    let response = TeamMemberResponse::from(member);
    event_publisher::publish_or_log(
        &state,
        auth.organization_id,
        "team_member.removed",
        "team_member",
        response.id.to_string(),
        &response,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
