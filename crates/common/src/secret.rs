//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate. The personal access token, the
//! OAuth client secret and every access token handled by this workspace are
//! held as `SecretString`, so a `{:?}` on any struct that contains one prints
//! a redaction marker instead of the value.
//!
//! Secrets are zeroized when dropped.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Credential {
//!     tenant: String,
//!     pat: SecretString,
//! }
//!
//! let cred = Credential {
//!     tenant: "acme".to_string(),
//!     pat: SecretString::from("pat_live_123"),
//! };
//!
//! assert!(!format!("{cred:?}").contains("pat_live_123"));
//!
//! // The value is only reachable through an explicit call
//! let pat: &str = cred.pat.expose_secret();
//! assert_eq!(pat, "pat_live_123");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
