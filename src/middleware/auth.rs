//! API key authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and resolve it to a team member and organization
//! 3. Inject authentication context into the request
//! 4. Reject unauthorized requests with HTTP 401

use crate::{error::AppError, state::AppState};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
///
/// This struct is inserted into the request's extension map and can be
/// extracted by route handlers to know who made the request and which
/// organization's rows they may touch.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthContext {
    /// ID of the authenticated API key
    pub api_key_id: Uuid,

    /// Team member the key belongs to
    pub team_member_id: Uuid,

    /// Organization every query must be scoped to
    pub organization_id: Uuid,

    /// Display name of the team member making the request
    pub member_name: String,

    /// Role within the organization: `owner`, `admin`, or `member`
    pub role: String,
}

/// Extract the bearer token from an Authorization header, if present.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// SHA-256 hash of an API key, hex encoded.
///
/// Keys are never stored in plaintext; `api_keys.key_hash` holds this value.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Reject callers whose role is not `admin` or `owner`.
///
/// Webhook mutations, team management, and organization updates are gated
/// on this check and return 403 otherwise.
pub fn require_admin(auth: &AuthContext) -> Result<(), AppError> {
    if matches!(auth.role.as_str(), "admin" | "owner") {
        Ok(())
    } else {
        Err(AppError::AdminRequired)
    }
}

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Resolve the hash to an active key, a live team member, and a live
///    organization in one joined query
/// 4. If found: inject `AuthContext` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
///
/// # Headers
///
/// Expected header format:
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = bearer_token(request.headers()).ok_or(AppError::InvalidApiKey)?;

    let key_hash = hash_api_key(api_key);

    // A key is only valid while its member and organization are live
    let auth_context = sqlx::query_as::<_, AuthContext>(
        r#"
        SELECT k.id AS api_key_id,
               m.id AS team_member_id,
               m.organization_id,
               m.name AS member_name,
               m.role
        FROM api_keys k
        JOIN team_members m ON m.id = k.team_member_id
        JOIN organizations o ON o.id = m.organization_id
        WHERE k.key_hash = $1
          AND k.is_active = TRUE
          AND m.is_active = TRUE
          AND m.deleted_at IS NULL
          AND o.deleted_at IS NULL
        "#,
    )
    .bind(&key_hash)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    // Route handlers can now extract this using Extension<AuthContext>
    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ctx(role: &str) -> AuthContext {
        AuthContext {
            api_key_id: Uuid::new_v4(),
            team_member_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            member_name: "Test Member".to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn bearer_token_parses_well_formed_header() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer rcm_key"));
        assert_eq!(bearer_token(&headers), Some("rcm_key"));
    }

    #[test]
    fn bearer_token_rejects_missing_or_wrong_scheme() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = hash_api_key("some-key");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_api_key("some-key"));
        assert_ne!(h, hash_api_key("other-key"));
    }

    #[test]
    fn admin_gate_allows_admin_and_owner_only() {
        assert!(require_admin(&ctx("owner")).is_ok());
        assert!(require_admin(&ctx("admin")).is_ok());
        assert!(matches!(
            require_admin(&ctx("member")),
            Err(AppError::AdminRequired)
        ));
    }
}
