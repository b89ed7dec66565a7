//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Missing, invalid, or inactive API keys
/// - **Authorization Errors**: Role checks (admin/owner gates)
/// - **Resource Errors**: Rows absent or outside the caller's organization
/// - **Conflict Errors**: Unique-key duplicates, invalid retry requests
/// - **Validation Errors**: Invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Caller's role is not admin or owner.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Admin permissions required")]
    AdminRequired,

    /// Organization row is missing or soft-deleted.
    #[error("Organization not found")]
    OrganizationNotFound,

    /// Team member does not exist in the caller's organization.
    #[error("Team member not found")]
    TeamMemberNotFound,

    /// Claim does not exist in the caller's organization.
    #[error("Claim not found")]
    ClaimNotFound,

    /// Webhook endpoint does not exist in the caller's organization.
    #[error("Webhook endpoint not found")]
    WebhookNotFound,

    /// Webhook delivery does not exist in the caller's organization.
    #[error("Delivery not found")]
    DeliveryNotFound,

    /// An endpoint with this name already exists for the organization
    /// and environment.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("A webhook with this name already exists")]
    DuplicateWebhookName,

    /// A live team member with this email already exists in the organization.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("A team member with this email already exists")]
    DuplicateTeamMember,

    /// Manual retry requested for a delivery that is not in a retryable state.
    ///
    /// Returns HTTP 409 Conflict. The String names the delivery's current state.
    #[error("Delivery cannot be retried")]
    RetryNotAllowed(String),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Map a unique-constraint violation to a domain conflict error.
///
/// Inserts that race a duplicate (webhook name, team member email) surface
/// as database errors; this rewrites just those into the 409 variant the
/// caller supplies and passes everything else through unchanged.
pub fn on_unique_violation(err: sqlx::Error, conflict: AppError) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => conflict,
        _ => AppError::Database(err),
    }
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidApiKey` → 401 Unauthorized
/// - `AdminRequired` → 403 Forbidden
/// - `*NotFound` → 404 Not Found
/// - `Duplicate*`, `RetryNotAllowed` → 409 Conflict
/// - `InvalidRequest` → 400 Bad Request
/// - `Database` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Map each error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::AdminRequired => {
                (StatusCode::FORBIDDEN, "admin_required", self.to_string())
            }
            AppError::OrganizationNotFound => (
                StatusCode::NOT_FOUND,
                "organization_not_found",
                self.to_string(),
            ),
            AppError::TeamMemberNotFound => (
                StatusCode::NOT_FOUND,
                "team_member_not_found",
                self.to_string(),
            ),
            AppError::ClaimNotFound => {
                (StatusCode::NOT_FOUND, "claim_not_found", self.to_string())
            }
            AppError::WebhookNotFound => {
                (StatusCode::NOT_FOUND, "webhook_not_found", self.to_string())
            }
            AppError::DeliveryNotFound => (
                StatusCode::NOT_FOUND,
                "delivery_not_found",
                self.to_string(),
            ),
            AppError::DuplicateWebhookName => (
                StatusCode::CONFLICT,
                "duplicate_webhook_name",
                self.to_string(),
            ),
            AppError::DuplicateTeamMember => (
                StatusCode::CONFLICT,
                "duplicate_team_member",
                self.to_string(),
            ),
            AppError::RetryNotAllowed(ref state) => (
                StatusCode::CONFLICT,
                "retry_not_allowed",
                format!("Delivery cannot be retried from state '{state}'"),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Database(ref err) => {
                // Keep details out of the response body
                tracing::error!("Database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        // Return the response with status code and JSON body
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(status_of(AppError::InvalidApiKey), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AppError::AdminRequired), StatusCode::FORBIDDEN);
        assert_eq!(status_of(AppError::WebhookNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(AppError::ClaimNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(AppError::DuplicateWebhookName),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AppError::RetryNotAllowed("delivered".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AppError::InvalidRequest("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::Database(sqlx::Error::PoolClosed)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unique_violation_passthrough() {
        // A non-unique-violation error stays a Database error
        let err = on_unique_violation(sqlx::Error::PoolClosed, AppError::DuplicateWebhookName);
        assert!(matches!(err, AppError::Database(_)));
    }
}
