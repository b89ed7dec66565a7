//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, validation, and complex operations.

pub mod delivery_worker;
pub mod event_publisher;
pub mod signature;
pub mod webhook_service;
