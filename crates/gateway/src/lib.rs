//! Authentication Gateway Library
//!
//! A small HTTP service that puts OIDC bearer-token authentication in front
//! of its resources:
//!
//! - Signing keys are fetched from the identity provider's JWKS endpoint,
//!   cached, and re-fetched when an unknown key id appears
//! - Tokens are verified for algorithm, signature, issuer, audience and
//!   validity window
//! - Routes declare the scopes they accept; holding any one is sufficient
//!
//! # Modules
//!
//! - `auth` - Key resolver, token verifier, scope check, bearer pipeline
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication and scope middleware
//! - `routes` - Axum router setup
//! - `tasks` - Background JWKS refresh

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod tasks;
