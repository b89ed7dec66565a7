//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables.

/// Claim model and work-queue ordering
pub mod claim;
/// Organization tenancy model
pub mod organization;
/// Team member and role model
pub mod team_member;
/// Webhook configs, secrets, events, deliveries, and attempts
pub mod webhook;
