//! Mock identity provider JWKS endpoint
//!
//! Wraps a wiremock server that serves `GET /jwks`. The published key set
//! can be swapped at runtime to simulate rotation, and every fetch is
//! counted so tests can assert on refresh behaviour.

use crate::crypto_fixtures::{jwks_json, TestSigningKey};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/jwks";

#[derive(Clone)]
enum Behavior {
    Serve(Value),
    Fail(u16),
}

struct JwksResponder {
    behavior: Arc<Mutex<Behavior>>,
    delay: Arc<Mutex<Option<Duration>>>,
    fetches: Arc<AtomicUsize>,
}

impl Respond for JwksResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let behavior = self
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let template = match behavior {
            Behavior::Serve(body) => ResponseTemplate::new(200).set_body_json(body),
            Behavior::Fail(status) => ResponseTemplate::new(status),
        };

        match *self.delay.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}

/// Mock JWKS server for tests.
///
/// # Example
/// ```rust,ignore
/// let old = RsaTestKey::new("old");
/// let jwks = MockJwksServer::start(&[&old]).await;
///
/// let new = EcP384TestKey::generate("new");
/// jwks.publish(&[&new]);
/// ```
pub struct MockJwksServer {
    server: MockServer,
    behavior: Arc<Mutex<Behavior>>,
    delay: Arc<Mutex<Option<Duration>>>,
    fetches: Arc<AtomicUsize>,
}

impl MockJwksServer {
    /// Start a server publishing `keys`.
    pub async fn start(keys: &[&dyn TestSigningKey]) -> Self {
        let server = MockServer::start().await;
        let behavior = Arc::new(Mutex::new(Behavior::Serve(jwks_json(keys))));
        let delay = Arc::new(Mutex::new(None));
        let fetches = Arc::new(AtomicUsize::new(0));

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(JwksResponder {
                behavior: Arc::clone(&behavior),
                delay: Arc::clone(&delay),
                fetches: Arc::clone(&fetches),
            })
            .mount(&server)
            .await;

        Self {
            server,
            behavior,
            delay,
            fetches,
        }
    }

    /// Base URL of the mock, used as the token issuer.
    pub fn issuer_url(&self) -> String {
        self.server.uri()
    }

    /// Full JWKS endpoint URL.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Replace the published key set.
    pub fn publish(&self, keys: &[&dyn TestSigningKey]) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) =
            Behavior::Serve(jwks_json(keys));
    }

    /// Publish an arbitrary document (malformed or empty key sets).
    pub fn publish_raw(&self, body: Value) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = Behavior::Serve(body);
    }

    /// Answer every subsequent fetch with `status` and no body.
    pub fn fail_with(&self, status: u16) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = Behavior::Fail(status);
    }

    /// Delay every subsequent response.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Number of JWKS fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto_fixtures::RsaTestKey;

    #[tokio::test]
    async fn test_serves_and_counts() {
        let key = RsaTestKey::new("rsa-1");
        let jwks = MockJwksServer::start(&[&key]).await;

        let body: Value = reqwest::get(jwks.jwks_url())
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["keys"][0]["kid"], "rsa-1");
        assert_eq!(jwks.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_and_fail() {
        let jwks = MockJwksServer::start(&[&RsaTestKey::new("old")]).await;

        jwks.publish(&[&RsaTestKey::new("new")]);
        let body: Value = reqwest::get(jwks.jwks_url())
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["keys"][0]["kid"], "new");

        jwks.fail_with(503);
        let response = reqwest::get(jwks.jwks_url()).await.unwrap();
        assert_eq!(response.status().as_u16(), 503);

        assert_eq!(jwks.fetch_count(), 2);
    }
}
