//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Performs business logic (database queries, validation)
//! 3. Returns HTTP response (JSON, status code)

/// Claim intake and work queue endpoints
pub mod claims;
/// Delivery log and manual retry endpoints
pub mod deliveries;
/// Liveness and database health endpoint
pub mod health;
/// Organization profile endpoints
pub mod organizations;
/// Team membership endpoints
pub mod team_members;
/// Webhook endpoint management
pub mod webhooks;
