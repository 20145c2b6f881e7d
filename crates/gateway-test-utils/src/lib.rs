//! # Gateway Test Utilities
//!
//! Shared test utilities for the authentication gateway.
//!
//! This crate provides:
//! - Signing key fixtures that publish matching JWKs (RSA, P-384, Ed25519)
//! - Test data builders (TestTokenBuilder)
//! - Mock identity provider JWKS endpoint with rotation and fetch counting
//! - Server test harness (TestGatewayServer for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = RsaTestKey::new("rsa-1");
//!     let jwks = MockJwksServer::start(&[&key]).await;
//!     let server = TestGatewayServer::spawn(&jwks).await?;
//!
//!     let token = TestTokenBuilder::new(&jwks.issuer_url(), TEST_AUDIENCE)
//!         .for_user("alice")
//!         .with_scope("read:generic_data")
//!         .sign(&key);
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_mock;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_mock::*;
pub use server_harness::*;
pub use token_builders::*;
