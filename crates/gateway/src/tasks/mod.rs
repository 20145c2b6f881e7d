//! Background tasks for the gateway.
//!
//! # Tasks
//!
//! - `jwks_refresh` - Periodically re-fetches the identity provider's signing keys

pub mod jwks_refresh;

pub use jwks_refresh::start_jwks_refresh;
