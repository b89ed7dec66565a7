//! Background webhook delivery worker.
//!
//! A single long-running task claims due deliveries from Postgres and
//! executes them on spawned tasks, bounded by a semaphore. Claiming uses
//! `FOR UPDATE SKIP LOCKED` plus a lease: a claimed row is parked in
//! `delivering` with `next_attempt_at` pushed out by the lease interval, so
//! a worker that dies mid-send leaves a row that simply becomes due again.
//! That gives at-least-once delivery without any broker.
//!
//! Retry policy: after a failed attempt the delay grows by
//! `base * multiplier^(n-1)`, capped at the configured ceiling, until
//! `attempt_count` reaches the delivery's `max_attempts`, which marks the
//! row `failed` (terminal until a manual retry resets it).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::Config;
use crate::models::webhook::{WebhookConfig, WebhookDelivery, WebhookEnvelope, WebhookEvent};
use crate::services::{signature, webhook_service};
use crate::state::AppState;

/// Response body size kept on the delivery row.
const RESPONSE_BODY_LIMIT: usize = 2000;

/// Response body size kept on each attempt row.
const ATTEMPT_PREVIEW_LIMIT: usize = 1000;

/// Backoff parameters, derived from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay_seconds: i64,
    pub multiplier: f64,
    pub max_delay_seconds: i64,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_delay_seconds: config.retry_base_delay_seconds,
            multiplier: config.retry_backoff_multiplier,
            max_delay_seconds: config.retry_max_delay_seconds,
        }
    }
}

/// Delay before the next try once `completed_attempts` have failed.
///
/// Grows exponentially from the base and saturates at the ceiling.
pub fn retry_delay_seconds(policy: &RetryPolicy, completed_attempts: i32) -> i64 {
    let exponent = completed_attempts.max(1) - 1;
    let raw = policy.base_delay_seconds as f64 * policy.multiplier.powi(exponent);
    (raw as i64).min(policy.max_delay_seconds)
}

/// What happens to a delivery after a failed attempt.
#[derive(Debug, PartialEq)]
pub enum FailureDisposition {
    /// Schedule another try after this many seconds
    Retry { delay_seconds: i64 },
    /// Attempts exhausted; the row goes terminal
    Fail,
}

/// Decide between another retry and terminal failure.
pub fn after_failed_attempt(
    policy: &RetryPolicy,
    attempt_number: i32,
    max_attempts: i32,
) -> FailureDisposition {
    if attempt_number >= max_attempts {
        FailureDisposition::Fail
    } else {
        FailureDisposition::Retry {
            delay_seconds: retry_delay_seconds(policy, attempt_number),
        }
    }
}

/// Truncate a response body on a char boundary, marking the cut.
fn truncate_body(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &body[..end])
}

/// Run the delivery worker until the process exits.
///
/// The loop claims one due delivery at a time and hands it to a spawned
/// task holding a semaphore permit, so at most `worker_concurrency` sends
/// are in flight. When the queue is empty it sleeps for the poll interval
/// or until the publisher wakes it, whichever comes first.
pub async fn run(state: AppState) {
    let concurrency = state.config.worker_concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let poll_interval = Duration::from_millis(state.config.worker_poll_interval_ms);

    // One shared client; timeouts are per-request because they vary per config
    let client = match reqwest::Client::builder().build() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to build HTTP client, delivery worker not running: {e}");
            return;
        }
    };

    tracing::info!("Delivery worker started (concurrency {concurrency})");

    loop {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            // Closed only if the semaphore is dropped, which never happens here
            Err(_) => return,
        };

        match claim_due_delivery(&state).await {
            Ok(Some(delivery)) => {
                let state = state.clone();
                let client = client.clone();
                tokio::spawn(async move {
                    process_delivery(&state, &client, delivery).await;
                    drop(permit);
                });
            }
            Ok(None) => {
                drop(permit);
                tokio::select! {
                    _ = state.worker_wake.notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(e) => {
                drop(permit);
                tracing::error!("Failed to claim delivery: {e}");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

/// Claim the next due delivery, if any.
///
/// The subselect takes the oldest due row with `SKIP LOCKED` so concurrent
/// workers never double-claim; the update parks it in `delivering` with the
/// lease as its new `next_attempt_at`.
async fn claim_due_delivery(state: &AppState) -> Result<Option<WebhookDelivery>, sqlx::Error> {
    sqlx::query_as::<_, WebhookDelivery>(
        r#"
        UPDATE webhook_deliveries
        SET status = 'delivering',
            next_attempt_at = NOW() + make_interval(secs => $1),
            updated_at = NOW()
        WHERE id = (
            SELECT id FROM webhook_deliveries
            WHERE status IN ('pending', 'retrying', 'delivering')
              AND next_attempt_at <= NOW()
            ORDER BY next_attempt_at
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *
        "#,
    )
    .bind(state.config.delivery_lease_seconds as f64)
    .fetch_optional(&state.pool)
    .await
}

/// Execute one claimed delivery end to end.
///
/// Bookkeeping failures are logged rather than propagated; the lease means
/// anything left half-done becomes claimable again.
async fn process_delivery(state: &AppState, client: &reqwest::Client, delivery: WebhookDelivery) {
    if let Err(e) = attempt_delivery(state, client, &delivery).await {
        tracing::error!("Delivery {} bookkeeping failed: {e}", delivery.id);
    }
}

async fn attempt_delivery(
    state: &AppState,
    client: &reqwest::Client,
    delivery: &WebhookDelivery,
) -> Result<(), sqlx::Error> {
    // The config row outlives soft deletion, so fetch without the liveness
    // filters and check them here
    let config = sqlx::query_as::<_, WebhookConfig>(
        "SELECT * FROM webhook_configs WHERE id = $1",
    )
    .bind(delivery.webhook_config_id)
    .fetch_optional(&state.pool)
    .await?;

    let config = match config {
        Some(config) if config.deleted_at.is_none() && config.is_active => config,
        _ => {
            return mark_failed_without_attempt(state, delivery, "Endpoint disabled or deleted")
                .await;
        }
    };

    let secret = match webhook_service::fetch_active_secret(&state.pool, config.id).await {
        Ok(Some(secret)) => secret,
        Ok(None) => {
            return mark_failed_without_attempt(state, delivery, "No active signing secret").await;
        }
        Err(_) => {
            // Transient lookup failure: leave the row leased, it will be retried
            return Ok(());
        }
    };

    let event = sqlx::query_as::<_, WebhookEvent>("SELECT * FROM webhook_events WHERE id = $1")
        .bind(delivery.webhook_event_id)
        .fetch_optional(&state.pool)
        .await?;

    let Some(event) = event else {
        return mark_failed_without_attempt(state, delivery, "Source event missing").await;
    };

    let attempt_number = delivery.attempt_count + 1;
    let started_at = Utc::now();
    let timestamp = started_at.timestamp();

    let envelope = WebhookEnvelope::new(&event, timestamp);
    let body = match serde_json::to_string(&envelope) {
        Ok(body) => body,
        Err(e) => {
            let reason = format!("Failed to serialize envelope: {e}");
            return mark_failed_without_attempt(state, delivery, &reason).await;
        }
    };

    let signature_header = signature::sign(&secret.secret, timestamp, &body);

    let started = Instant::now();
    let response = client
        .post(&config.url)
        .timeout(Duration::from_secs(config.timeout_seconds.max(1) as u64))
        .header("Content-Type", "application/json")
        .header("User-Agent", &config.user_agent)
        .header("X-Webhook-Id", config.id.to_string())
        .header("X-Webhook-Delivery", delivery.id.to_string())
        .header("X-Webhook-Event", &delivery.event_type)
        .header("X-Webhook-Timestamp", timestamp.to_string())
        .header("X-Webhook-Signature", &signature_header)
        .body(body)
        .send()
        .await;

    let latency_ms = started.elapsed().as_millis() as i64;

    match response {
        Ok(resp) => {
            let http_status = resp.status().as_u16() as i32;
            let success = resp.status().is_success();
            let text = resp.text().await.unwrap_or_default();

            if success {
                record_success(
                    state,
                    delivery,
                    &config,
                    attempt_number,
                    http_status,
                    &text,
                    latency_ms,
                )
                .await?;
            } else {
                record_failure(
                    state,
                    delivery,
                    &config,
                    attempt_number,
                    Some(http_status),
                    "http_error",
                    format!("Endpoint responded with HTTP {http_status}"),
                    Some(text.as_str()),
                    latency_ms,
                )
                .await?;
            }
        }
        Err(e) => {
            let kind = if e.is_timeout() { "timeout" } else { "connection" };
            record_failure(
                state,
                delivery,
                &config,
                attempt_number,
                None,
                kind,
                format!("Request failed: {e}"),
                None,
                latency_ms,
            )
            .await?;
        }
    }

    Ok(())
}

/// Terminal failure with no HTTP attempt made (disabled endpoint, missing
/// secret). No attempt row is written and the counter is left alone.
async fn mark_failed_without_attempt(
    state: &AppState,
    delivery: &WebhookDelivery,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'failed', error_message = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(delivery.id)
    .bind(reason)
    .execute(&state.pool)
    .await?;

    tracing::warn!("Delivery {} failed without attempt: {reason}", delivery.id);

    Ok(())
}

async fn insert_attempt(
    state: &AppState,
    delivery_id: Uuid,
    attempt_number: i32,
    started_at: chrono::DateTime<Utc>,
    http_status: Option<i32>,
    response_time_ms: i64,
    error_kind: Option<&str>,
    error_message: Option<&str>,
    body_preview: Option<String>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO webhook_delivery_attempts
            (webhook_delivery_id, attempt_number, started_at, http_status,
             response_time_ms, error_kind, error_message, response_body_preview)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(delivery_id)
    .bind(attempt_number)
    .bind(started_at)
    .bind(http_status)
    .bind(response_time_ms)
    .bind(error_kind)
    .bind(error_message)
    .bind(body_preview)
    .execute(&state.pool)
    .await?;

    Ok(())
}

async fn record_success(
    state: &AppState,
    delivery: &WebhookDelivery,
    config: &WebhookConfig,
    attempt_number: i32,
    http_status: i32,
    response_body: &str,
    latency_ms: i64,
) -> Result<(), sqlx::Error> {
    let started_at = Utc::now() - chrono::Duration::milliseconds(latency_ms);

    insert_attempt(
        state,
        delivery.id,
        attempt_number,
        started_at,
        Some(http_status),
        latency_ms,
        None,
        None,
        Some(truncate_body(response_body, ATTEMPT_PREVIEW_LIMIT)),
    )
    .await?;

    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'delivered', attempt_count = $2, http_status = $3,
            response_body = $4, delivery_latency_ms = $5, delivered_at = NOW(),
            error_message = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(delivery.id)
    .bind(attempt_number)
    .bind(http_status)
    .bind(truncate_body(response_body, RESPONSE_BODY_LIMIT))
    .bind(latency_ms)
    .execute(&state.pool)
    .await?;

    sqlx::query(
        "UPDATE webhook_configs SET last_delivery_at = NOW(), last_success_at = NOW() WHERE id = $1",
    )
    .bind(config.id)
    .execute(&state.pool)
    .await?;

    tracing::info!(
        "Delivered {} to {} in {latency_ms} ms (attempt {attempt_number})",
        delivery.event_type,
        config.url
    );

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn record_failure(
    state: &AppState,
    delivery: &WebhookDelivery,
    config: &WebhookConfig,
    attempt_number: i32,
    http_status: Option<i32>,
    error_kind: &str,
    error_message: String,
    response_body: Option<&str>,
    latency_ms: i64,
) -> Result<(), sqlx::Error> {
    let started_at = Utc::now() - chrono::Duration::milliseconds(latency_ms);

    insert_attempt(
        state,
        delivery.id,
        attempt_number,
        started_at,
        http_status,
        latency_ms,
        Some(error_kind),
        Some(error_message.as_str()),
        response_body.map(|b| truncate_body(b, ATTEMPT_PREVIEW_LIMIT)),
    )
    .await?;

    sqlx::query("UPDATE webhook_configs SET last_delivery_at = NOW() WHERE id = $1")
        .bind(config.id)
        .execute(&state.pool)
        .await?;

    let policy = RetryPolicy::from_config(&state.config);
    match after_failed_attempt(&policy, attempt_number, delivery.max_attempts) {
        FailureDisposition::Retry { delay_seconds } => {
            sqlx::query(
                r#"
                UPDATE webhook_deliveries
                SET status = 'retrying', attempt_count = $2,
                    next_attempt_at = NOW() + make_interval(secs => $3),
                    http_status = $4, response_body = $5, error_message = $6,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(delivery.id)
            .bind(attempt_number)
            .bind(delay_seconds as f64)
            .bind(http_status)
            .bind(response_body.map(|b| truncate_body(b, RESPONSE_BODY_LIMIT)))
            .bind(&error_message)
            .execute(&state.pool)
            .await?;

            tracing::debug!(
                "Delivery {} attempt {attempt_number}/{} failed ({error_message}), retrying in {delay_seconds}s",
                delivery.id,
                delivery.max_attempts
            );
        }
        FailureDisposition::Fail => {
            sqlx::query(
                r#"
                UPDATE webhook_deliveries
                SET status = 'failed', attempt_count = $2,
                    http_status = $3, response_body = $4, error_message = $5,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(delivery.id)
            .bind(attempt_number)
            .bind(http_status)
            .bind(response_body.map(|b| truncate_body(b, RESPONSE_BODY_LIMIT)))
            .bind(&error_message)
            .execute(&state.pool)
            .await?;

            tracing::warn!(
                "Delivery {} to {} failed permanently after {attempt_number} attempts: {error_message}",
                delivery.id,
                config.url
            );

            check_failure_rate(state, config.organization_id).await?;
        }
    }

    Ok(())
}

/// Warn when an organization's failed deliveries in the trailing hour reach
/// the alert threshold.
async fn check_failure_rate(state: &AppState, organization_id: Uuid) -> Result<(), sqlx::Error> {
    let failed: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM webhook_deliveries d
        JOIN webhook_configs c ON c.id = d.webhook_config_id
        WHERE c.organization_id = $1
          AND d.status = 'failed'
          AND d.updated_at > NOW() - INTERVAL '1 hour'
        "#,
    )
    .bind(organization_id)
    .fetch_one(&state.pool)
    .await?;

    if failed >= state.config.failure_alert_threshold {
        tracing::warn!(
            "High webhook failure rate for organization {organization_id}: {failed} failed deliveries in the last hour"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay_seconds: 60,
            multiplier: 2.0,
            max_delay_seconds: 3600,
        }
    }

    #[test]
    fn backoff_schedule_doubles_until_cap() {
        let p = policy();
        let delays: Vec<i64> = (1..=8).map(|n| retry_delay_seconds(&p, n)).collect();
        assert_eq!(delays, vec![60, 120, 240, 480, 960, 1920, 3600, 3600]);
    }

    #[test]
    fn backoff_handles_degenerate_inputs() {
        let p = policy();
        // Attempt counts below one are treated as the first attempt
        assert_eq!(retry_delay_seconds(&p, 0), 60);
        // A huge attempt count saturates at the cap instead of overflowing
        assert_eq!(retry_delay_seconds(&p, 1000), 3600);
    }

    #[test]
    fn disposition_fails_exactly_at_max_attempts() {
        let p = policy();
        assert_eq!(
            after_failed_attempt(&p, 4, 5),
            FailureDisposition::Retry { delay_seconds: 480 }
        );
        assert_eq!(after_failed_attempt(&p, 5, 5), FailureDisposition::Fail);
        assert_eq!(after_failed_attempt(&p, 6, 5), FailureDisposition::Fail);
        // A single-attempt delivery fails on its first miss
        assert_eq!(after_failed_attempt(&p, 1, 1), FailureDisposition::Fail);
    }

    #[test]
    fn body_truncation_marks_the_cut() {
        assert_eq!(truncate_body("ok", 2000), "ok");

        let long = "x".repeat(2500);
        let cut = truncate_body(&long, 2000);
        assert!(cut.ends_with("... [truncated]"));
        assert_eq!(cut.len(), 2000 + "... [truncated]".len());

        // Multibyte content is cut on a char boundary
        let emoji = "⚠".repeat(1000);
        let cut = truncate_body(&emoji, 1000);
        assert!(cut.ends_with("... [truncated]"));
    }
}
