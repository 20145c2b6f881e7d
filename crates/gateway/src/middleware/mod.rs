//! HTTP middleware for the gateway.
//!
//! # Components
//!
//! - `auth` - Authentication and scope middleware for protected routes

pub mod auth;

pub use auth::{require_auth, require_scopes, AuthState};
