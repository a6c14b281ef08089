//! fleetgate - token-based identity and session service
//!
//! Issues encrypted-identity access tokens and server-tracked refresh tokens
//! for the fleet management platform, and provides the axum middleware that
//! authenticates requests and gates them by role.

pub mod core;
