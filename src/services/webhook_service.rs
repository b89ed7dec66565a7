//! Webhook endpoint management: registration, validation, secret lifecycle,
//! and delivery statistics.
//!
//! Delivery itself lives in [`crate::services::delivery_worker`]; event
//! fan-out in [`crate::services::event_publisher`].

use std::collections::HashMap;

use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, on_unique_violation};
use crate::models::webhook::{
    CreateWebhookRequest, DeliveryStats, UpdateWebhookRequest, WebhookConfig, WebhookResponse,
    WebhookSecret, WebhookWithStats, is_valid_environment, is_valid_subscription,
};

/// Schema defaults, mirrored here for request clamping.
const DEFAULT_TIMEOUT_SECONDS: i32 = 30;
const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Register a new webhook endpoint.
///
/// # Process
///
/// 1. Validate required fields, URL, event subscriptions, environment
/// 2. Clamp `timeout_seconds` and `max_attempts` to their allowed ranges
/// 3. Generate a `whsec_`-prefixed signing secret
/// 4. Insert the config row and its active secret row in one transaction
/// 5. Return the endpoint with the secret (only time it's shown)
///
/// A duplicate (organization, environment, name) surfaces as 409.
pub async fn create_webhook(
    pool: &DbPool,
    organization_id: Uuid,
    request: CreateWebhookRequest,
) -> Result<WebhookResponse, AppError> {
    let mut missing = Vec::new();
    if request.name.is_none() {
        missing.push("name");
    }
    if request.url.is_none() {
        missing.push("url");
    }
    if request.events.is_none() {
        missing.push("events");
    }
    if !missing.is_empty() {
        return Err(AppError::InvalidRequest(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    // Presence checked above
    let name = request.name.unwrap_or_default();
    let url = request.url.unwrap_or_default();
    let events = request.events.unwrap_or_default();

    validate_webhook_url(&url)?;
    validate_events(&events)?;

    let environment = request
        .environment
        .unwrap_or_else(|| "production".to_string());
    if !is_valid_environment(&environment) {
        return Err(AppError::InvalidRequest(format!(
            "Invalid environment '{environment}': expected 'staging' or 'production'"
        )));
    }

    let timeout_seconds = clamp_timeout_seconds(request.timeout_seconds);
    let max_attempts = clamp_max_attempts(request.max_attempts);
    let secret = generate_secret();

    let mut tx = pool.begin().await?;

    let config = sqlx::query_as::<_, WebhookConfig>(
        r#"
        INSERT INTO webhook_configs
            (organization_id, name, url, environment, events, timeout_seconds, max_attempts)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(organization_id)
    .bind(&name)
    .bind(&url)
    .bind(&environment)
    .bind(&events)
    .bind(timeout_seconds)
    .bind(max_attempts)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| on_unique_violation(e, AppError::DuplicateWebhookName))?;

    sqlx::query(
        "INSERT INTO webhook_secrets (webhook_config_id, secret) VALUES ($1, $2)",
    )
    .bind(config.id)
    .bind(&secret)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Registered webhook endpoint '{}' ({}) for organization {}",
        config.name,
        config.id,
        organization_id
    );

    Ok(WebhookResponse::from(config).with_secret(secret))
}

/// List an organization's webhook endpoints with delivery counters.
///
/// Secrets are never included.
pub async fn list_webhooks(
    pool: &DbPool,
    organization_id: Uuid,
) -> Result<Vec<WebhookWithStats>, AppError> {
    let configs = sqlx::query_as::<_, WebhookConfig>(
        r#"
        SELECT * FROM webhook_configs
        WHERE organization_id = $1 AND deleted_at IS NULL
        ORDER BY created_at DESC
        "#,
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;

    let ids: Vec<Uuid> = configs.iter().map(|c| c.id).collect();
    let mut stats = stats_for_configs(pool, &ids).await?;

    Ok(configs
        .into_iter()
        .map(|config| {
            let stat = stats.remove(&config.id).unwrap_or_default();
            WebhookWithStats {
                webhook: config.into(),
                stats: stat,
            }
        })
        .collect())
}

/// Fetch one endpoint (org-scoped) together with its delivery counters.
///
/// Returns 404 whether the row is absent or belongs to another
/// organization.
pub async fn get_webhook(
    pool: &DbPool,
    organization_id: Uuid,
    webhook_id: Uuid,
) -> Result<(WebhookConfig, DeliveryStats), AppError> {
    let config = fetch_config(pool, organization_id, webhook_id).await?;

    let stats = stats_for_configs(pool, &[config.id])
        .await?
        .remove(&config.id)
        .unwrap_or_default();

    Ok((config, stats))
}

/// Update an endpoint. Absent fields keep their current values.
pub async fn update_webhook(
    pool: &DbPool,
    organization_id: Uuid,
    webhook_id: Uuid,
    request: UpdateWebhookRequest,
) -> Result<WebhookResponse, AppError> {
    let existing = fetch_config(pool, organization_id, webhook_id).await?;

    if let Some(url) = &request.url {
        validate_webhook_url(url)?;
    }
    if let Some(events) = &request.events {
        validate_events(events)?;
    }

    let name = request.name.unwrap_or(existing.name);
    let url = request.url.unwrap_or(existing.url);
    let events = request.events.unwrap_or(existing.events);
    let is_active = request.is_active.unwrap_or(existing.is_active);
    let timeout_seconds = request
        .timeout_seconds
        .map_or(existing.timeout_seconds, |t| clamp_timeout_seconds(Some(t)));
    let max_attempts = request
        .max_attempts
        .map_or(existing.max_attempts, |m| clamp_max_attempts(Some(m)));

    let config = sqlx::query_as::<_, WebhookConfig>(
        r#"
        UPDATE webhook_configs
        SET name = $3, url = $4, events = $5, is_active = $6,
            timeout_seconds = $7, max_attempts = $8, updated_at = NOW()
        WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(webhook_id)
    .bind(organization_id)
    .bind(&name)
    .bind(&url)
    .bind(&events)
    .bind(is_active)
    .bind(timeout_seconds)
    .bind(max_attempts)
    .fetch_optional(pool)
    .await
    .map_err(|e| on_unique_violation(e, AppError::DuplicateWebhookName))?
    .ok_or(AppError::WebhookNotFound)?;

    Ok(config.into())
}

/// Soft-delete an endpoint and cancel its queued deliveries.
///
/// The config row is kept (`deleted_at` set) so delivery history stays
/// readable; anything still waiting in the queue is marked failed so the
/// worker never picks it up.
pub async fn delete_webhook(
    pool: &DbPool,
    organization_id: Uuid,
    webhook_id: Uuid,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE webhook_configs
        SET deleted_at = NOW(), is_active = FALSE, updated_at = NOW()
        WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL
        "#,
    )
    .bind(webhook_id)
    .bind(organization_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::WebhookNotFound);
    }

    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'failed', error_message = 'Endpoint deleted', updated_at = NOW()
        WHERE webhook_config_id = $1 AND status IN ('pending', 'retrying', 'delivering')
        "#,
    )
    .bind(webhook_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Rotate an endpoint's signing secret.
///
/// Retires the active secret row(s) in place and inserts a fresh one; the
/// new plaintext is returned exactly once. Retired secrets stay in the
/// table so consumers can verify during a rotation window.
pub async fn rotate_secret(
    pool: &DbPool,
    organization_id: Uuid,
    webhook_id: Uuid,
) -> Result<String, AppError> {
    // Scope check before touching secret rows
    fetch_config(pool, organization_id, webhook_id).await?;

    let secret = generate_secret();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE webhook_secrets
        SET is_active = FALSE, retired_at = NOW()
        WHERE webhook_config_id = $1 AND is_active = TRUE
        "#,
    )
    .bind(webhook_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO webhook_secrets (webhook_config_id, secret) VALUES ($1, $2)",
    )
    .bind(webhook_id)
    .bind(&secret)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!("Rotated signing secret for webhook {webhook_id}");

    Ok(secret)
}

/// Fetch a live config scoped to an organization, or 404.
pub async fn fetch_config(
    pool: &DbPool,
    organization_id: Uuid,
    webhook_id: Uuid,
) -> Result<WebhookConfig, AppError> {
    sqlx::query_as::<_, WebhookConfig>(
        r#"
        SELECT * FROM webhook_configs
        WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL
        "#,
    )
    .bind(webhook_id)
    .bind(organization_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::WebhookNotFound)
}

/// Fetch the active signing secret for a config, if one exists.
///
/// The delivery worker cannot sign without it; a config whose secrets were
/// all retired out of band fails its deliveries with a reason.
pub async fn fetch_active_secret(
    pool: &DbPool,
    webhook_config_id: Uuid,
) -> Result<Option<WebhookSecret>, AppError> {
    let secret = sqlx::query_as::<_, WebhookSecret>(
        r#"
        SELECT * FROM webhook_secrets
        WHERE webhook_config_id = $1 AND is_active = TRUE
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(webhook_config_id)
    .fetch_optional(pool)
    .await?;

    Ok(secret)
}

/// Delivery counters for a set of configs, keyed by config id.
async fn stats_for_configs(
    pool: &DbPool,
    config_ids: &[Uuid],
) -> Result<HashMap<Uuid, DeliveryStats>, AppError> {
    if config_ids.is_empty() {
        return Ok(HashMap::new());
    }

    #[derive(sqlx::FromRow)]
    struct StatsRow {
        webhook_config_id: Uuid,
        total_deliveries: i64,
        delivered: i64,
        failed: i64,
    }

    let rows = sqlx::query_as::<_, StatsRow>(
        r#"
        SELECT webhook_config_id,
               COUNT(*) AS total_deliveries,
               COUNT(*) FILTER (WHERE status = 'delivered') AS delivered,
               COUNT(*) FILTER (WHERE status = 'failed') AS failed
        FROM webhook_deliveries
        WHERE webhook_config_id = ANY($1)
        GROUP BY webhook_config_id
        "#,
    )
    .bind(config_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            (
                r.webhook_config_id,
                DeliveryStats {
                    total_deliveries: r.total_deliveries,
                    delivered: r.delivered,
                    failed: r.failed,
                },
            )
        })
        .collect())
}

/// Generate a signing secret: `whsec_` plus 64 hex characters
/// (32 random bytes).
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("whsec_{}", hex::encode(bytes))
}

/// Clamp a requested per-delivery attempt ceiling to 1..=10.
fn clamp_max_attempts(requested: Option<i32>) -> i32 {
    requested.unwrap_or(DEFAULT_MAX_ATTEMPTS).clamp(1, 10)
}

/// Clamp a requested HTTP timeout to 5..=300 seconds.
fn clamp_timeout_seconds(requested: Option<i32>) -> i32 {
    requested.unwrap_or(DEFAULT_TIMEOUT_SECONDS).clamp(5, 300)
}

/// Validate event subscription entries against the catalog.
fn validate_events(events: &[String]) -> Result<(), AppError> {
    if events.is_empty() {
        return Err(AppError::InvalidRequest(
            "At least one event type is required".to_string(),
        ));
    }

    let invalid: Vec<&str> = events
        .iter()
        .map(String::as_str)
        .filter(|e| !is_valid_subscription(e))
        .collect();

    if !invalid.is_empty() {
        return Err(AppError::InvalidRequest(format!(
            "Invalid event types: {}",
            invalid.join(", ")
        )));
    }

    Ok(())
}

/// Validate webhook URL format.
///
/// # Rules
///
/// - Must be a valid URL
/// - Must be HTTPS (HTTP localhost allowed for development)
/// - Maximum 2048 characters
fn validate_webhook_url(url: &str) -> Result<(), AppError> {
    if url.len() > 2048 {
        return Err(AppError::InvalidRequest(
            "URL exceeds 2048 characters".to_string(),
        ));
    }

    let parsed = url::Url::parse(url)
        .map_err(|_| AppError::InvalidRequest("Invalid URL format".to_string()))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            // Allow HTTP for localhost (testing)
            if matches!(
                parsed.host_str(),
                Some("localhost") | Some("127.0.0.1") | Some("0.0.0.0")
            ) {
                Ok(())
            } else {
                Err(AppError::InvalidRequest(
                    "HTTP is only allowed for localhost. Use HTTPS for production.".to_string(),
                ))
            }
        }
        _ => Err(AppError::InvalidRequest(
            "URL must use HTTP or HTTPS".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation_rules() {
        assert!(validate_webhook_url("https://example.com/hooks").is_ok());
        assert!(validate_webhook_url("http://localhost:4000/hooks").is_ok());
        assert!(validate_webhook_url("http://127.0.0.1/hooks").is_ok());
        assert!(validate_webhook_url("http://example.com/hooks").is_err());
        assert!(validate_webhook_url("ftp://example.com/hooks").is_err());
        assert!(validate_webhook_url("not a url").is_err());

        let long = format!("https://example.com/{}", "a".repeat(2048));
        assert!(validate_webhook_url(&long).is_err());
    }

    #[test]
    fn secret_format() {
        let secret = generate_secret();
        assert!(secret.starts_with("whsec_"));
        assert_eq!(secret.len(), "whsec_".len() + 64);
        assert!(secret["whsec_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn clamping_bounds() {
        assert_eq!(clamp_max_attempts(None), 5);
        assert_eq!(clamp_max_attempts(Some(0)), 1);
        assert_eq!(clamp_max_attempts(Some(3)), 3);
        assert_eq!(clamp_max_attempts(Some(99)), 10);

        assert_eq!(clamp_timeout_seconds(None), 30);
        assert_eq!(clamp_timeout_seconds(Some(1)), 5);
        assert_eq!(clamp_timeout_seconds(Some(45)), 45);
        assert_eq!(clamp_timeout_seconds(Some(10_000)), 300);
    }

    #[test]
    fn event_list_validation() {
        assert!(validate_events(&["claim.created".to_string()]).is_ok());
        assert!(validate_events(&["all".to_string()]).is_ok());
        assert!(validate_events(&[]).is_err());

        let err = validate_events(&["claim.created".to_string(), "bogus.event".to_string()])
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(msg) if msg.contains("bogus.event")));
    }
}
