//! Common utilities and types shared across the gateway and the operator CLI.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (header decoding, time-claim checks, constants)
pub mod jwt;

/// Module for the OAuth 2.0 token-exchange client (personal access token to access token)
pub mod token_exchange;
