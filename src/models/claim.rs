//! Claim data models, status lifecycle, and work-queue ordering.
//!
//! This module defines:
//! - `Claim`: Database entity representing a billing claim
//! - `CreateClaimRequest` / `UpdateClaimStatusRequest`: Request bodies
//! - `ClaimResponse`: Response body returned to clients
//! - The work-queue comparator used by the claims listing endpoint

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claim statuses in work-queue priority order.
///
/// Lower index means more urgent: claims needing human review sort ahead of
/// rejected and denied ones, which sort ahead of claims that are moving
/// through submission, with paid claims last. The array doubles as the set
/// of valid status values (also enforced by a database CHECK constraint).
pub const STATUS_ORDER: [&str; 8] = [
    "needs_review",
    "rejected_277ca",
    "denied",
    "built",
    "submitted",
    "awaiting_277ca",
    "accepted_277ca",
    "paid",
];

/// Whether `status` is one of the known claim statuses.
pub fn is_valid_status(status: &str) -> bool {
    STATUS_ORDER.contains(&status)
}

/// Work-queue priority of a status (index into [`STATUS_ORDER`]).
///
/// Unknown statuses cannot come out of the database, but sort last rather
/// than panicking if one ever does.
fn status_priority(status: &str) -> usize {
    STATUS_ORDER
        .iter()
        .position(|s| *s == status)
        .unwrap_or(STATUS_ORDER.len())
}

/// Represents a claim record from the database.
///
/// # Amount Storage
///
/// Amounts are stored as `i64` cents to avoid floating-point precision
/// issues: $150.00 is stored as 15000.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Claim {
    /// Unique identifier for this claim
    pub id: Uuid,

    /// Organization this claim belongs to
    ///
    /// Every query filters by `organization_id` so one tenant can never
    /// see another tenant's claims.
    pub organization_id: Uuid,

    /// Patient the claim bills for
    pub patient_name: String,

    /// Payer the claim is submitted to
    pub payer_name: String,

    /// Billed amount in cents (not dollars)
    pub total_amount_cents: i64,

    /// Current lifecycle status, one of [`STATUS_ORDER`]
    pub status: String,

    /// Date of service, if recorded
    pub service_date: Option<NaiveDate>,

    /// Timestamp when the claim was created
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last status or field change
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker; live claims have NULL here
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Sort claims for the work queue.
///
/// Two modes:
/// - `dollar_first = true`: highest amount first, ties broken by status
///   priority, then by most recently updated.
/// - `dollar_first = false` (default): status priority first, ties broken
///   by most recently updated.
///
/// The sort is stable, so claims equal under every key keep their
/// original relative order.
pub fn sort_for_work_queue(claims: &mut [Claim], dollar_first: bool) {
    claims.sort_by(|a, b| {
        if dollar_first {
            b.total_amount_cents
                .cmp(&a.total_amount_cents)
                .then_with(|| status_first_cmp(a, b))
        } else {
            status_first_cmp(a, b)
        }
    });
}

/// Request body for creating a new claim.
///
/// # JSON Example
///
/// ```json
/// {
///   "patient_name": "Jane Doe",
///   "payer_name": "Acme Health",
///   "total_amount_cents": 15000,
///   "service_date": "2024-01-01"
/// }
/// ```
///
/// Required fields are modeled as `Option` so their absence surfaces as a
/// 400 with a field list instead of a generic deserialization failure.
#[derive(Debug, Deserialize)]
pub struct CreateClaimRequest {
    pub patient_name: Option<String>,

    pub payer_name: Option<String>,

    pub total_amount_cents: Option<i64>,

    /// Date of service (optional)
    #[serde(default)]
    pub service_date: Option<NaiveDate>,

    /// Initial status; defaults to `needs_review` when omitted
    #[serde(default)]
    pub status: Option<String>,
}

/// Request body for transitioning a claim's status.
#[derive(Debug, Deserialize)]
pub struct UpdateClaimStatusRequest {
    pub status: Option<String>,
}

/// Query parameters for the claims listing endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListClaimsQuery {
    /// `true` puts the highest-dollar claims first
    #[serde(default)]
    pub dollar_first: bool,
}

/// Response body for claim endpoints.
#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    /// Claim unique identifier
    pub id: Uuid,

    /// Patient name
    pub patient_name: String,

    /// Payer name
    pub payer_name: String,

    /// Billed amount in cents
    pub total_amount_cents: i64,

    /// Current lifecycle status
    pub status: String,

    /// Date of service
    pub service_date: Option<NaiveDate>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Convert database Claim to API ClaimResponse.
///
/// Drops the internal `organization_id` and `deleted_at` fields.
impl From<Claim> for ClaimResponse {
    fn from(claim: Claim) -> Self {
        Self {
            id: claim.id,
            patient_name: claim.patient_name,
            payer_name: claim.payer_name,
            total_amount_cents: claim.total_amount_cents,
            status: claim.status,
            service_date: claim.service_date,
            created_at: claim.created_at,
            updated_at: claim.updated_at,
        }
    }
}

/// Compare two claims under the default (status-first) ordering.
///
/// Exposed for callers that need the ordering without sorting a whole
/// buffer; [`sort_for_work_queue`] is the usual entry point.
pub fn status_first_cmp(a: &Claim, b: &Claim) -> Ordering {
    status_priority(&a.status)
        .cmp(&status_priority(&b.status))
        .then_with(|| b.updated_at.cmp(&a.updated_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(n: u128, status: &str, cents: i64, updated_at: &str) -> Claim {
        let updated = DateTime::parse_from_rfc3339(updated_at)
            .unwrap()
            .with_timezone(&Utc);
        Claim {
            id: Uuid::from_u128(n),
            organization_id: Uuid::from_u128(999),
            patient_name: format!("Patient {n}"),
            payer_name: "Test Payer".to_string(),
            total_amount_cents: cents,
            status: status.to_string(),
            service_date: None,
            created_at: updated,
            updated_at: updated,
            deleted_at: None,
        }
    }

    fn sample_claims() -> Vec<Claim> {
        vec![
            mk(1, "needs_review", 15000, "2024-01-01T10:00:00Z"),
            mk(2, "built", 30000, "2024-01-01T11:00:00Z"),
            mk(3, "rejected_277ca", 7500, "2024-01-01T09:00:00Z"),
            mk(4, "paid", 20000, "2024-01-01T12:00:00Z"),
            mk(5, "needs_review", 50000, "2024-01-01T08:00:00Z"),
            mk(6, "submitted", 12000, "2024-01-01T13:00:00Z"),
            mk(7, "denied", 40000, "2024-01-01T14:00:00Z"),
            mk(8, "awaiting_277ca", 9000, "2024-01-01T15:00:00Z"),
        ]
    }

    fn ids(claims: &[Claim]) -> Vec<u128> {
        claims.iter().map(|c| c.id.as_u128()).collect()
    }

    #[test]
    fn dollar_first_orders_by_amount_descending() {
        let mut claims = sample_claims();
        sort_for_work_queue(&mut claims, true);

        let amounts: Vec<i64> = claims.iter().map(|c| c.total_amount_cents).collect();
        assert_eq!(
            amounts,
            vec![50000, 40000, 30000, 20000, 15000, 12000, 9000, 7500]
        );
        assert_eq!(ids(&claims), vec![5, 7, 2, 4, 1, 6, 8, 3]);
    }

    #[test]
    fn equal_amounts_fall_back_to_status_priority() {
        let mut claims = vec![
            mk(1, "paid", 10000, "2024-01-01T10:00:00Z"),
            mk(2, "needs_review", 10000, "2024-01-01T10:00:00Z"),
            mk(3, "built", 10000, "2024-01-01T10:00:00Z"),
            mk(4, "rejected_277ca", 10000, "2024-01-01T10:00:00Z"),
        ];
        sort_for_work_queue(&mut claims, true);

        let statuses: Vec<&str> = claims.iter().map(|c| c.status.as_str()).collect();
        assert_eq!(
            statuses,
            vec!["needs_review", "rejected_277ca", "built", "paid"]
        );
    }

    #[test]
    fn equal_amounts_and_status_fall_back_to_recency() {
        let mut claims = vec![
            mk(1, "needs_review", 10000, "2024-01-01T08:00:00Z"),
            mk(2, "needs_review", 10000, "2024-01-01T10:00:00Z"),
            mk(3, "needs_review", 10000, "2024-01-01T09:00:00Z"),
        ];
        sort_for_work_queue(&mut claims, true);

        // Most recent first
        assert_eq!(ids(&claims), vec![2, 3, 1]);
    }

    #[test]
    fn default_mode_orders_by_status_then_recency() {
        let mut claims = sample_claims();
        sort_for_work_queue(&mut claims, false);

        let statuses: Vec<&str> = claims.iter().map(|c| c.status.as_str()).collect();
        assert_eq!(
            statuses,
            vec![
                "needs_review",
                "needs_review",
                "rejected_277ca",
                "denied",
                "built",
                "submitted",
                "awaiting_277ca",
                "paid"
            ]
        );

        // The two needs_review claims order by most recent update
        assert_eq!(ids(&claims), vec![1, 5, 3, 7, 2, 6, 8, 4]);
    }

    #[test]
    fn toggle_produces_distinct_orders() {
        let mut dollar = sample_claims();
        let mut status = sample_claims();
        sort_for_work_queue(&mut dollar, true);
        sort_for_work_queue(&mut status, false);

        assert_ne!(ids(&dollar), ids(&status));
    }

    #[test]
    fn status_validation_accepts_catalog_only() {
        for status in STATUS_ORDER {
            assert!(is_valid_status(status));
        }
        assert!(!is_valid_status("pending"));
        assert!(!is_valid_status(""));
    }
}
