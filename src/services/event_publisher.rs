//! Event publishing and fan-out.
//!
//! `publish` records a business event and expands it into one pending
//! delivery per subscribed endpoint; the delivery worker takes it from
//! there. Publishing is fire-and-forget from the API's point of view:
//! handlers use [`publish_or_log`] so a webhook bookkeeping failure never
//! fails the operation that triggered it.

use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::webhook::{WebhookConfig, WebhookEvent, receives_event};
use crate::state::AppState;

/// Publish an event and fan it out to subscribed endpoints.
///
/// # Process
///
/// 1. Insert the `webhook_events` row (payload is the serialized `data`)
/// 2. Select the organization's endpoints for this deployment's environment
/// 3. Insert one pending delivery per endpoint passing [`receives_event`]
///    (live, active, environment match, subscribed to the event type)
/// 4. Stamp the event processed and wake the worker
///
/// Returns the number of deliveries enqueued. Zero is normal: an event
/// with no subscribers is recorded and immediately complete.
pub async fn publish<T: Serialize>(
    state: &AppState,
    organization_id: Uuid,
    event_type: &str,
    entity_type: &str,
    entity_id: String,
    data: &T,
) -> Result<usize, AppError> {
    let payload = serde_json::to_value(data)
        .map_err(|e| AppError::InvalidRequest(format!("Failed to serialize payload: {e}")))?;

    let event = sqlx::query_as::<_, WebhookEvent>(
        r#"
        INSERT INTO webhook_events
            (organization_id, event_type, environment, entity_id, entity_type, payload)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(organization_id)
    .bind(event_type)
    .bind(&state.config.environment)
    .bind(&entity_id)
    .bind(entity_type)
    .bind(&payload)
    .fetch_one(&state.pool)
    .await?;

    let configs = sqlx::query_as::<_, WebhookConfig>(
        r#"
        SELECT * FROM webhook_configs
        WHERE organization_id = $1
          AND environment = $2
          AND is_active = TRUE
          AND deleted_at IS NULL
        "#,
    )
    .bind(organization_id)
    .bind(&state.config.environment)
    .fetch_all(&state.pool)
    .await?;

    // The query narrows by environment and liveness; the predicate is
    // authoritative either way
    let matching: Vec<&WebhookConfig> = configs
        .iter()
        .filter(|c| receives_event(c, &state.config.environment, event_type))
        .collect();

    let mut tx = state.pool.begin().await?;

    for config in &matching {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries
                (webhook_config_id, webhook_event_id, event_type, payload, max_attempts)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(config.id)
        .bind(event.id)
        .bind(event_type)
        .bind(&payload)
        .bind(config.max_attempts)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE webhook_events SET processed_at = NOW() WHERE id = $1")
        .bind(event.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    if !matching.is_empty() {
        state.worker_wake.notify_one();
    }

    tracing::debug!(
        "Published {event_type} for organization {organization_id}: {} deliveries enqueued",
        matching.len()
    );

    Ok(matching.len())
}

/// Publish an event, logging instead of propagating failures.
///
/// API mutations call this after their own writes succeed; the response to
/// the caller must not depend on webhook bookkeeping.
pub async fn publish_or_log<T: Serialize>(
    state: &AppState,
    organization_id: Uuid,
    event_type: &str,
    entity_type: &str,
    entity_id: String,
    data: &T,
) {
    if let Err(e) = publish(state, organization_id, event_type, entity_type, entity_id, data).await
    {
        tracing::error!("Failed to publish {event_type} for {entity_type} {organization_id}: {e}");
    }
}

/// Body of a `webhook.test` event.
#[derive(Debug, Serialize)]
struct TestEventData {
    message: String,
    webhook_id: Uuid,
    webhook_url: String,
    webhook_name: String,
    triggered_by: String,
    triggered_at: chrono::DateTime<chrono::Utc>,
}

/// Enqueue a `webhook.test` delivery targeted at a single endpoint.
///
/// Bypasses subscription matching: the point is to exercise this endpoint's
/// URL and signature regardless of what it subscribes to. Returns the
/// delivery id so the caller can poll its outcome.
pub async fn enqueue_test_delivery(
    state: &AppState,
    config: &WebhookConfig,
    triggered_by: &str,
) -> Result<Uuid, AppError> {
    let data = TestEventData {
        message: "Test delivery from the RCM platform".to_string(),
        webhook_id: config.id,
        webhook_url: config.url.clone(),
        webhook_name: config.name.clone(),
        triggered_by: triggered_by.to_string(),
        triggered_at: chrono::Utc::now(),
    };
    let payload = serde_json::to_value(&data)
        .map_err(|e| AppError::InvalidRequest(format!("Failed to serialize payload: {e}")))?;

    let mut tx = state.pool.begin().await?;

    let event = sqlx::query_as::<_, WebhookEvent>(
        r#"
        INSERT INTO webhook_events
            (organization_id, event_type, environment, entity_id, entity_type, payload, processed_at)
        VALUES ($1, 'webhook.test', $2, $3, 'webhook_config', $4, NOW())
        RETURNING *
        "#,
    )
    .bind(config.organization_id)
    .bind(&config.environment)
    .bind(config.id.to_string())
    .bind(&payload)
    .fetch_one(&mut *tx)
    .await?;

    let delivery_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO webhook_deliveries
            (webhook_config_id, webhook_event_id, event_type, payload, max_attempts)
        VALUES ($1, $2, 'webhook.test', $3, $4)
        RETURNING id
        "#,
    )
    .bind(config.id)
    .bind(event.id)
    .bind(&payload)
    .bind(config.max_attempts)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    state.worker_wake.notify_one();

    Ok(delivery_id)
}
