//! Request authentication and authorization.
//!
//! # Components
//!
//! - `jwks` - Key resolver: fetches and caches the provider's signing keys
//! - `jwt` - Token verifier: algorithm, signature and registered claims
//! - `claims` - Verified claims attached to a request
//! - `scopes` - Any-of scope authorization
//! - `authenticator` - `Authorization: Bearer` header to verified claims

pub mod authenticator;
pub mod claims;
pub mod jwks;
pub mod jwt;
pub mod scopes;

pub use authenticator::{AuthError, Authenticator};
pub use claims::VerifiedClaims;
pub use jwks::{KeyFetchError, KeyResolver};
pub use jwt::{AuthConfig, TokenVerifier, VerificationError};
pub use scopes::{authorize, InsufficientScope, RequiredScopes};
