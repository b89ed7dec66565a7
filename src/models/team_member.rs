//! Team member model and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles a team member can hold within an organization.
///
/// `owner` and `admin` may manage webhooks, team membership, and
/// organization settings; `member` is read/work-queue only.
pub const ROLES: [&str; 3] = ["owner", "admin", "member"];

/// Whether `role` is one of the known roles.
pub fn is_valid_role(role: &str) -> bool {
    ROLES.contains(&role)
}

/// Represents a team member record from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TeamMember {
    /// Unique identifier for this team member
    pub id: Uuid,

    /// Organization this member belongs to
    pub organization_id: Uuid,

    /// Display name
    pub name: String,

    /// Email address, unique among live members of the organization
    pub email: String,

    /// Role within the organization, one of [`ROLES`]
    pub role: String,

    /// Whether this member may currently authenticate
    pub is_active: bool,

    /// Timestamp when the member was added
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last update
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker; live members have NULL here
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Request body for adding a team member.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "Sam Biller",
///   "email": "sam@example.com",
///   "role": "member"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateTeamMemberRequest {
    pub name: Option<String>,

    pub email: Option<String>,

    /// One of [`ROLES`]
    pub role: Option<String>,
}

/// Response body for team member endpoints.
#[derive(Debug, Serialize)]
pub struct TeamMemberResponse {
    /// Member unique identifier
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Email address
    pub email: String,

    /// Role within the organization
    pub role: String,

    /// Whether this member may currently authenticate
    pub is_active: bool,

    /// Timestamp when the member was added
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl From<TeamMember> for TeamMemberResponse {
    fn from(member: TeamMember) -> Self {
        Self {
            id: member.id,
            name: member.name,
            email: member.email,
            role: member.role,
            is_active: member.is_active,
            created_at: member.created_at,
            updated_at: member.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_validation_accepts_catalog_only() {
        for role in ROLES {
            assert!(is_valid_role(role));
        }
        assert!(!is_valid_role("superadmin"));
        assert!(!is_valid_role(""));
    }
}
