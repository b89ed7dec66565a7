//! RCM Platform Server - Main Application Entry Point
//!
//! This is a REST API server for healthcare revenue-cycle operations. It
//! manages organizations, team members, and claims, and delivers signed
//! webhook notifications for the events those resources emit.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries, delivery queue)
//! - **Authentication**: API key with SHA-256 hashing, role-checked per route
//! - **Webhooks**: HMAC-SHA256 signed envelopes, background worker with
//!   exponential backoff
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Spawn the webhook delivery worker
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

use rcm_platform_server::{config::Config, db, handlers, middleware, services, state::AppState};

use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, patch, post},
};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded for {} environment", config.environment);

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let server_port = config.server_port;
    let state = AppState::new(pool, config);

    // Background delivery worker; the publisher wakes it through AppState
    tokio::spawn(services::delivery_worker::run(state.clone()));

    // Create authenticated routes (API endpoints)
    let authenticated_routes = Router::new()
        // Organization profile routes
        .route(
            "/api/v1/organization",
            get(handlers::organizations::get_organization),
        )
        .route(
            "/api/v1/organization",
            patch(handlers::organizations::update_organization),
        )
        // Team membership routes
        .route(
            "/api/v1/team-members",
            get(handlers::team_members::list_team_members),
        )
        .route(
            "/api/v1/team-members",
            post(handlers::team_members::create_team_member),
        )
        .route(
            "/api/v1/team-members/{id}",
            delete(handlers::team_members::delete_team_member),
        )
        // Claim routes
        .route("/api/v1/claims", post(handlers::claims::create_claim))
        .route("/api/v1/claims", get(handlers::claims::list_claims))
        .route("/api/v1/claims/{id}", get(handlers::claims::get_claim))
        .route(
            "/api/v1/claims/{id}/status",
            patch(handlers::claims::update_claim_status),
        )
        // Webhook endpoint management routes
        .route("/api/v1/webhooks", post(handlers::webhooks::create_webhook))
        .route("/api/v1/webhooks", get(handlers::webhooks::list_webhooks))
        .route(
            "/api/v1/webhooks/{id}",
            get(handlers::webhooks::get_webhook),
        )
        .route(
            "/api/v1/webhooks/{id}",
            patch(handlers::webhooks::update_webhook),
        )
        .route(
            "/api/v1/webhooks/{id}",
            delete(handlers::webhooks::delete_webhook),
        )
        .route(
            "/api/v1/webhooks/{id}/secret",
            post(handlers::webhooks::rotate_secret),
        )
        .route(
            "/api/v1/webhooks/{id}/test",
            post(handlers::webhooks::test_webhook),
        )
        .route(
            "/api/v1/webhooks/{id}/deliveries",
            get(handlers::webhooks::list_webhook_deliveries),
        )
        // Delivery log routes
        .route(
            "/api/v1/deliveries",
            get(handlers::deliveries::list_deliveries),
        )
        .route(
            "/api/v1/deliveries/{id}",
            get(handlers::deliveries::get_delivery),
        )
        .route(
            "/api/v1/deliveries/{id}/retry",
            post(handlers::deliveries::retry_delivery),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    // Combine authenticated routes with public routes
    let app = Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        // Merge authenticated routes
        .merge(authenticated_routes)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        // Share pool, config, and worker wake handle with all handlers
        .with_state(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{server_port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}
