//! Organization model and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an organization record from the database.
///
/// Organizations are the tenancy root: team members, API keys, claims, and
/// webhook endpoints all hang off one. Soft-deleting an organization (setting
/// `deleted_at`) makes every API key under it stop authenticating.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Organization {
    /// Unique identifier for this organization
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// URL-safe unique short name
    pub slug: String,

    /// Whether this organization is currently active
    pub is_active: bool,

    /// Timestamp when the organization was created
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last update
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker; live organizations have NULL here
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Request body for updating the caller's organization.
///
/// # JSON Example
///
/// ```json
/// { "name": "Sunrise Medical Group" }
/// ```
#[derive(Debug, Deserialize)]
pub struct UpdateOrganizationRequest {
    pub name: Option<String>,
}

/// Response body for organization endpoints.
#[derive(Debug, Serialize)]
pub struct OrganizationResponse {
    /// Organization unique identifier
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// URL-safe unique short name
    pub slug: String,

    /// Whether this organization is currently active
    pub is_active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl From<Organization> for OrganizationResponse {
    fn from(org: Organization) -> Self {
        Self {
            id: org.id,
            name: org.name,
            slug: org.slug,
            is_active: org.is_active,
            created_at: org.created_at,
            updated_at: org.updated_at,
        }
    }
}
