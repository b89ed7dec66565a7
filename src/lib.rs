//! RCM platform server library.
//!
//! Backend for healthcare revenue-cycle operations: organizations, team
//! members, claims, and an outbound webhook subsystem that signs and
//! delivers event notifications with at-least-once semantics.
//!
//! The binary in `main.rs` wires these modules into an axum server plus a
//! background delivery worker. The library surface also exists for webhook
//! consumers: [`services::signature::verify`] implements the exact check
//! a receiving service should run against the `X-Webhook-Signature` and
//! `X-Webhook-Timestamp` headers.
//!
//! # Module Map
//!
//! - [`config`]: environment-driven configuration
//! - [`db`]: connection pool and migrations
//! - [`error`]: the `AppError` type and its JSON error contract
//! - [`middleware`]: API key authentication
//! - [`models`]: database rows, request/response DTOs, domain rules
//! - [`handlers`]: axum route handlers
//! - [`services`]: signing, endpoint management, event fan-out, delivery
//! - [`state`]: shared state for handlers and the worker

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
