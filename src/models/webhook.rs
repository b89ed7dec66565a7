//! Webhook models: endpoint configs, signing secrets, events, deliveries,
//! and per-attempt history.
//!
//! # Webhook Flow
//!
//! 1. An admin registers an endpoint via `POST /api/v1/webhooks` and stores
//!    the returned signing secret
//! 2. Application code publishes events (claim created, member added, ...)
//! 3. Each event fans out into one delivery row per subscribed endpoint
//! 4. The delivery worker POSTs the signed envelope and retries on failure
//! 5. Consumers verify the `X-Webhook-Signature` header using the secret
//!
//! # Security
//!
//! - Secrets are returned exactly once, at registration or rotation
//! - Envelopes are signed with HMAC-SHA256 over `timestamp.payload`
//! - HTTPS is required for endpoint URLs (localhost exempt in development)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Event types that can be published and subscribed to.
pub const EVENT_CATALOG: [&str; 8] = [
    "organization.updated",
    "team_member.added",
    "team_member.removed",
    "claim.created",
    "claim.updated",
    "claim.submitted",
    "claim.denied",
    "webhook.test",
];

/// Subscription entry matching every event type.
///
/// Valid in a config's `events` list but not publishable itself.
pub const SUBSCRIPTION_WILDCARD: &str = "all";

/// Environments an endpoint can be registered for.
pub const ENVIRONMENTS: [&str; 2] = ["staging", "production"];

/// Whether `event_type` is a publishable event.
pub fn is_valid_event_type(event_type: &str) -> bool {
    EVENT_CATALOG.contains(&event_type)
}

/// Whether `entry` may appear in a config's subscription list.
pub fn is_valid_subscription(entry: &str) -> bool {
    entry == SUBSCRIPTION_WILDCARD || is_valid_event_type(entry)
}

/// Whether `environment` is one of the known environments.
pub fn is_valid_environment(environment: &str) -> bool {
    ENVIRONMENTS.contains(&environment)
}

/// Whether a subscription list matches a published event type.
///
/// A list matches when it names the event type exactly or contains the
/// `all` wildcard.
pub fn matches_subscription(subscriptions: &[String], event_type: &str) -> bool {
    subscriptions
        .iter()
        .any(|s| s == SUBSCRIPTION_WILDCARD || s == event_type)
}

/// Whether a config receives an event published in `environment`.
///
/// Fan-out delivers only to endpoints that are live (not soft-deleted),
/// active, registered for the publishing environment, and subscribed to
/// the event type.
pub fn receives_event(config: &WebhookConfig, environment: &str, event_type: &str) -> bool {
    config.deleted_at.is_none()
        && config.is_active
        && config.environment == environment
        && matches_subscription(&config.events, event_type)
}

/// Webhook endpoint configuration registered by an organization.
///
/// # Database Table
///
/// Maps to the `webhook_configs` table. The signing secret lives in
/// `webhook_secrets`, never on this row.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookConfig {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub url: String,
    /// `staging` or `production`; events only fan out to endpoints whose
    /// environment matches the publishing deployment
    pub environment: String,
    /// Subscribed event types, possibly containing the `all` wildcard
    pub events: Vec<String>,
    pub user_agent: String,
    /// Per-request HTTP timeout applied to every delivery POST
    pub timeout_seconds: i32,
    /// Attempt ceiling copied onto each delivery at enqueue
    pub max_attempts: i32,
    pub is_active: bool,
    pub last_delivery_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Signing secret row for a webhook endpoint.
///
/// Exactly one active row exists per config; rotation retires the old row
/// (`is_active = false`, `retired_at` set) and inserts a fresh one. Retired
/// rows stick around so consumers can verify during a rotation window.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookSecret {
    pub id: Uuid,
    pub webhook_config_id: Uuid,
    pub secret: String,
    pub algorithm: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
}

/// Published event record.
///
/// One row per business event; fan-out creates deliveries referencing it.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub event_type: String,
    pub environment: String,
    /// Id of the entity the event describes (claim id, member id, ...)
    pub entity_id: Option<String>,
    pub entity_type: Option<String>,
    pub payload: serde_json::Value,
    /// Set once fan-out has created the delivery rows
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Webhook delivery queue row.
///
/// # Lifecycle
///
/// `pending` → `delivering` (claimed by the worker) → `delivered`, or back
/// to `retrying` with a backed-off `next_attempt_at` until `attempt_count`
/// reaches `max_attempts`, at which point the row goes `failed` (terminal
/// until a manual retry resets it).
#[derive(Debug, Clone, FromRow)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_config_id: Uuid,
    pub webhook_event_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    /// When the row becomes due; doubles as the claim lease while the
    /// worker holds it in `delivering`
    pub next_attempt_at: DateTime<Utc>,
    pub http_status: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub delivery_latency_ms: Option<i64>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row per HTTP attempt at a delivery.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookDeliveryAttempt {
    pub id: Uuid,
    pub webhook_delivery_id: Uuid,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub http_status: Option<i32>,
    pub response_time_ms: Option<i64>,
    /// `timeout`, `connection`, or `http_error`
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub response_body_preview: Option<String>,
}

/// Request to register a new webhook endpoint.
///
/// # Example
///
/// ```json
/// {
///   "name": "claims-sync",
///   "url": "https://example.com/hooks/rcm",
///   "events": ["claim.submitted", "claim.denied"],
///   "environment": "production"
/// }
/// ```
///
/// # Validation
///
/// - `name`, `url`, and `events` are required (400 when missing)
/// - URL must be valid HTTPS (HTTP allowed for localhost in development)
///   and at most 2048 characters
/// - Every `events` entry must be in the catalog (or `all`)
/// - `timeout_seconds` is clamped to 5..=300, `max_attempts` to 1..=10
#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<i32>,
    #[serde(default)]
    pub max_attempts: Option<i32>,
}

/// Request to update an existing webhook endpoint.
///
/// Every field is optional; absent fields keep their current value.
#[derive(Debug, Deserialize)]
pub struct UpdateWebhookRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub timeout_seconds: Option<i32>,
    pub max_attempts: Option<i32>,
}

/// Response for webhook endpoint operations.
///
/// # Security Note
///
/// The `secret` field is ONLY included when creating an endpoint or
/// rotating its secret. It is never returned in list/get operations.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub environment: String,
    pub events: Vec<String>,
    pub user_agent: String,
    pub timeout_seconds: i32,
    pub max_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub is_active: bool,
    pub last_delivery_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WebhookConfig> for WebhookResponse {
    fn from(config: WebhookConfig) -> Self {
        Self {
            id: config.id,
            name: config.name,
            url: config.url,
            environment: config.environment,
            events: config.events,
            user_agent: config.user_agent,
            timeout_seconds: config.timeout_seconds,
            max_attempts: config.max_attempts,
            secret: None, // Never include secret by default
            is_active: config.is_active,
            last_delivery_at: config.last_delivery_at,
            last_success_at: config.last_success_at,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

impl WebhookResponse {
    /// Create response with secret included (registration and rotation only).
    pub fn with_secret(mut self, secret: String) -> Self {
        self.secret = Some(secret);
        self
    }
}

/// Delivery counters shown next to each endpoint in list/get responses.
#[derive(Debug, Default, FromRow, Serialize)]
pub struct DeliveryStats {
    pub total_deliveries: i64,
    pub delivered: i64,
    pub failed: i64,
}

/// A webhook endpoint together with its delivery counters.
#[derive(Debug, Serialize)]
pub struct WebhookWithStats {
    #[serde(flatten)]
    pub webhook: WebhookResponse,
    pub stats: DeliveryStats,
}

/// Response for `GET /api/v1/webhooks`.
///
/// Carries the event catalog so clients can build subscription pickers
/// without a separate request.
#[derive(Debug, Serialize)]
pub struct ListWebhooksResponse {
    pub webhooks: Vec<WebhookWithStats>,
    pub available_events: Vec<&'static str>,
}

/// Endpoint detail including its most recent deliveries.
#[derive(Debug, Serialize)]
pub struct WebhookDetailResponse {
    #[serde(flatten)]
    pub webhook: WebhookWithStats,
    pub recent_deliveries: Vec<DeliveryResponse>,
}

/// Response for secret rotation. The plaintext appears here and nowhere
/// else afterwards.
#[derive(Debug, Serialize)]
pub struct SecretRotationResponse {
    pub webhook_id: Uuid,
    pub secret: String,
    pub message: String,
}

/// Response for `POST /api/v1/webhooks/:id/test`.
#[derive(Debug, Serialize)]
pub struct TestDeliveryResponse {
    pub delivery_id: Uuid,
    pub status: String,
}

/// Response for delivery listing and detail endpoints.
#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub id: Uuid,
    pub webhook_config_id: Uuid,
    pub webhook_event_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub http_status: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub delivery_latency_ms: Option<i64>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WebhookDelivery> for DeliveryResponse {
    fn from(d: WebhookDelivery) -> Self {
        Self {
            id: d.id,
            webhook_config_id: d.webhook_config_id,
            webhook_event_id: d.webhook_event_id,
            event_type: d.event_type,
            payload: d.payload,
            status: d.status,
            attempt_count: d.attempt_count,
            max_attempts: d.max_attempts,
            next_attempt_at: d.next_attempt_at,
            http_status: d.http_status,
            response_body: d.response_body,
            error_message: d.error_message,
            delivery_latency_ms: d.delivery_latency_ms,
            delivered_at: d.delivered_at,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

/// Delivery detail including its attempt history.
#[derive(Debug, Serialize)]
pub struct DeliveryDetailResponse {
    #[serde(flatten)]
    pub delivery: DeliveryResponse,
    pub attempts: Vec<WebhookDeliveryAttempt>,
}

/// Query parameters for delivery listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListDeliveriesQuery {
    /// Filter to one status (`pending`, `delivering`, `retrying`,
    /// `delivered`, `failed`)
    pub status: Option<String>,

    /// Page size, defaults to 50, capped at 200
    pub limit: Option<i64>,
}

/// Envelope POSTed to the registered endpoint.
///
/// # Format
///
/// ```json
/// {
///   "event_type": "claim.submitted",
///   "event_id": "550e8400-e29b-41d4-a716-446655440000",
///   "organization_id": "661e8400-e29b-41d4-a716-446655440111",
///   "environment": "production",
///   "timestamp": 1713812345,
///   "source": "rcm-platform",
///   "data": { "id": "...", "status": "submitted" },
///   "metadata": { "entity_id": "...", "entity_type": "claim" }
/// }
/// ```
///
/// # Signature Verification
///
/// The POST carries an `X-Webhook-Signature` header of the form
/// `sha256=<hex>`, an HMAC-SHA256 over `"{timestamp}.{body}"` where
/// `timestamp` is the `X-Webhook-Timestamp` header (unix seconds, also
/// embedded here) and `body` is the exact JSON sent.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event_type: String,

    /// Identifier of the published event (shared by every delivery the
    /// event fanned out to)
    pub event_id: Uuid,

    pub organization_id: Uuid,

    pub environment: String,

    /// Unix seconds at send time; matches the signed timestamp
    pub timestamp: i64,

    /// Always `rcm-platform`
    pub source: String,

    pub data: serde_json::Value,

    pub metadata: EnvelopeMetadata,
}

/// Entity pointers carried alongside the event data.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub entity_id: Option<String>,
    pub entity_type: Option<String>,
}

impl WebhookEnvelope {
    /// Build the envelope for one send attempt of `event`.
    ///
    /// `timestamp` is the send-time unix-seconds value that also goes into
    /// the signature, so the envelope must be rebuilt per attempt.
    pub fn new(event: &WebhookEvent, timestamp: i64) -> Self {
        Self {
            event_type: event.event_type.clone(),
            event_id: event.id,
            organization_id: event.organization_id,
            environment: event.environment.clone(),
            timestamp,
            source: "rcm-platform".to_string(),
            data: event.payload.clone(),
            metadata: EnvelopeMetadata {
                entity_id: event.entity_id.clone(),
                entity_type: event.entity_type.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subs(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    fn live_config() -> WebhookConfig {
        WebhookConfig {
            id: Uuid::from_u128(1),
            organization_id: Uuid::from_u128(2),
            name: "claims-sync".to_string(),
            url: "https://example.com/hooks".to_string(),
            environment: "production".to_string(),
            events: subs(&["claim.created"]),
            user_agent: "RCM-Webhooks/1.0".to_string(),
            timeout_seconds: 30,
            max_attempts: 5,
            is_active: true,
            last_delivery_at: None,
            last_success_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn subscription_matching() {
        assert!(matches_subscription(
            &subs(&["claim.created", "claim.denied"]),
            "claim.denied"
        ));
        assert!(!matches_subscription(
            &subs(&["claim.created", "claim.denied"]),
            "claim.submitted"
        ));
        assert!(matches_subscription(&subs(&["all"]), "webhook.test"));
        assert!(!matches_subscription(&subs(&[]), "claim.created"));
    }

    #[test]
    fn fan_out_eligibility() {
        let config = live_config();
        assert!(receives_event(&config, "production", "claim.created"));

        // A staging endpoint never sees production events, and vice versa
        let staging = WebhookConfig {
            environment: "staging".to_string(),
            ..live_config()
        };
        assert!(!receives_event(&staging, "production", "claim.created"));
        assert!(receives_event(&staging, "staging", "claim.created"));

        // Disabled and soft-deleted endpoints are skipped
        let disabled = WebhookConfig {
            is_active: false,
            ..live_config()
        };
        assert!(!receives_event(&disabled, "production", "claim.created"));

        let deleted = WebhookConfig {
            deleted_at: Some(Utc::now()),
            ..live_config()
        };
        assert!(!receives_event(&deleted, "production", "claim.created"));

        // Subscription still decides; the wildcard takes everything
        assert!(!receives_event(&config, "production", "claim.denied"));
        let wildcard = WebhookConfig {
            events: subs(&["all"]),
            ..live_config()
        };
        assert!(receives_event(&wildcard, "production", "claim.denied"));
    }

    #[test]
    fn catalog_validation() {
        assert!(is_valid_event_type("claim.submitted"));
        assert!(!is_valid_event_type("claim.deleted"));
        // The wildcard subscribes but is not publishable
        assert!(!is_valid_event_type("all"));
        assert!(is_valid_subscription("all"));
        assert!(is_valid_subscription("team_member.added"));
        assert!(!is_valid_subscription("everything"));
    }

    #[test]
    fn environment_validation() {
        assert!(is_valid_environment("staging"));
        assert!(is_valid_environment("production"));
        assert!(!is_valid_environment("prod"));
    }

    #[test]
    fn envelope_serialization_shape() {
        let event = WebhookEvent {
            id: Uuid::from_u128(1),
            organization_id: Uuid::from_u128(2),
            event_type: "claim.submitted".to_string(),
            environment: "production".to_string(),
            entity_id: Some("claim-123".to_string()),
            entity_type: Some("claim".to_string()),
            payload: json!({"id": "claim-123", "status": "submitted"}),
            processed_at: None,
            created_at: Utc::now(),
        };

        let envelope = WebhookEnvelope::new(&event, 1713812345);
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["event_type"], "claim.submitted");
        assert_eq!(value["source"], "rcm-platform");
        assert_eq!(value["timestamp"], 1713812345);
        assert_eq!(value["data"]["status"], "submitted");
        assert_eq!(value["metadata"]["entity_type"], "claim");
    }

    #[test]
    fn webhook_response_hides_secret_by_default() {
        let config = live_config();

        let plain = serde_json::to_value(WebhookResponse::from(config.clone())).unwrap();
        assert!(plain.get("secret").is_none());

        let with_secret = serde_json::to_value(
            WebhookResponse::from(config).with_secret("whsec_abc".to_string()),
        )
        .unwrap();
        assert_eq!(with_secret["secret"], "whsec_abc");
    }
}
