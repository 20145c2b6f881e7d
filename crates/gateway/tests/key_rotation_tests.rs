//! Key rotation integration tests.
//!
//! The identity provider replaces its published key set while the gateway
//! is running; verification must follow without a restart.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use futures::future::join_all;
use gateway_test_utils::{
    Ed25519TestKey, MockJwksServer, RsaTestKey, TestGatewayServer, TestSigningKey,
    TestTokenBuilder, TEST_AUDIENCE,
};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;

fn signed(jwks: &MockJwksServer, key: &dyn TestSigningKey) -> String {
    TestTokenBuilder::new(&jwks.issuer_url(), TEST_AUDIENCE)
        .with_scope("read:generic_data")
        .sign(key)
}

async fn get_data(server: &TestGatewayServer, token: &str) -> Result<StatusCode> {
    let response = reqwest::Client::new()
        .get(format!("{}/api/data", server.url()))
        .bearer_auth(token)
        .send()
        .await?;
    Ok(response.status())
}

fn allow_eddsa() -> HashMap<String, String> {
    HashMap::from([(
        "ALLOWED_ALGORITHMS".to_string(),
        "RS256,EdDSA".to_string(),
    )])
}

#[tokio::test]
async fn test_rotated_key_is_picked_up_on_demand() -> Result<()> {
    let old = RsaTestKey::new("rsa-old");
    let new = Ed25519TestKey::from_seed(11, "ed-new");
    let jwks = MockJwksServer::start(&[&old]).await;
    let server = TestGatewayServer::spawn_with_vars(&jwks, allow_eddsa()).await?;

    assert_eq!(get_data(&server, &signed(&jwks, &old)).await?, StatusCode::OK);

    // Provider publishes a new key alongside the old one
    jwks.publish(&[&old, &new]);

    assert_eq!(get_data(&server, &signed(&jwks, &new)).await?, StatusCode::OK);
    assert_eq!(jwks.fetch_count(), 2);

    // Both keys now resolve from cache
    assert_eq!(get_data(&server, &signed(&jwks, &old)).await?, StatusCode::OK);
    assert_eq!(get_data(&server, &signed(&jwks, &new)).await?, StatusCode::OK);
    assert_eq!(jwks.fetch_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_retired_key_stops_verifying_after_refresh() -> Result<()> {
    let old = RsaTestKey::new("rsa-old");
    let new = RsaTestKey::new("rsa-new");
    let jwks = MockJwksServer::start(&[&old]).await;
    let server = TestGatewayServer::spawn(&jwks).await?;

    let old_token = signed(&jwks, &old);
    assert_eq!(get_data(&server, &old_token).await?, StatusCode::OK);

    jwks.publish(&[&new]);
    server.resolver().refresh().await?;

    assert_eq!(
        get_data(&server, &old_token).await?,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(get_data(&server, &signed(&jwks, &new)).await?, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_each_unknown_kid_triggers_one_refresh() -> Result<()> {
    let published = RsaTestKey::new("rsa-1");
    let jwks = MockJwksServer::start(&[&published]).await;
    let server = TestGatewayServer::spawn(&jwks).await?;

    let stranger = RsaTestKey::new("rsa-unknown");
    let token = signed(&jwks, &stranger);

    for expected_fetches in 2..=4 {
        assert_eq!(get_data(&server, &token).await?, StatusCode::UNAUTHORIZED);
        assert_eq!(jwks.fetch_count(), expected_fetches);
    }
    Ok(())
}

#[tokio::test]
async fn test_disallowed_algorithm_never_fetches_keys() -> Result<()> {
    let published = RsaTestKey::new("rsa-1");
    let jwks = MockJwksServer::start(&[&published]).await;
    let server = TestGatewayServer::spawn(&jwks).await?;

    // EdDSA is outside the default allow-list
    let ed = Ed25519TestKey::from_seed(5, "ed-unknown");

    assert_eq!(
        get_data(&server, &signed(&jwks, &ed)).await?,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(jwks.fetch_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_provider_outage_keeps_cached_keys() -> Result<()> {
    let key = RsaTestKey::new("rsa-1");
    let jwks = MockJwksServer::start(&[&key]).await;
    let server = TestGatewayServer::spawn(&jwks).await?;

    jwks.fail_with(503);
    assert!(server.resolver().refresh().await.is_err());

    assert_eq!(get_data(&server, &signed(&jwks, &key)).await?, StatusCode::OK);

    // Unknown kid during the outage is a 401, not a 5xx
    let stranger = RsaTestKey::new("rsa-2");
    assert_eq!(
        get_data(&server, &signed(&jwks, &stranger)).await?,
        StatusCode::UNAUTHORIZED
    );
    Ok(())
}

#[tokio::test]
async fn test_key_set_without_usable_keys_keeps_cached_keys() -> Result<()> {
    let key = RsaTestKey::new("rsa-1");
    let jwks = MockJwksServer::start(&[&key]).await;
    let server = TestGatewayServer::spawn(&jwks).await?;

    // Only a symmetric key, which the gateway never accepts
    jwks.publish_raw(serde_json::json!({
        "keys": [{ "kty": "oct", "kid": "hmac-1", "k": "c2VjcmV0" }]
    }));
    assert!(server.resolver().refresh().await.is_err());

    assert_eq!(get_data(&server, &signed(&jwks, &key)).await?, StatusCode::OK);

    // An unknown kid still refreshes, fails the same way, and is a 401
    let stranger = RsaTestKey::new("rsa-2");
    assert_eq!(
        get_data(&server, &signed(&jwks, &stranger)).await?,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(jwks.fetch_count(), 3);
    assert_eq!(server.resolver().snapshot().await.key_ids().collect::<Vec<_>>(), vec!["rsa-1"]);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_during_refresh_see_complete_key_set() -> Result<()> {
    let key = RsaTestKey::new("rsa-1");
    let jwks = MockJwksServer::start(&[&key]).await;
    let server = TestGatewayServer::spawn(&jwks).await?;
    let token = signed(&jwks, &key);

    // Slow refreshes overlap with in-flight verifications
    jwks.set_delay(Some(Duration::from_millis(100)));
    let resolver = std::sync::Arc::clone(server.resolver());
    let refresher = tokio::spawn(async move {
        for _ in 0..3 {
            resolver.refresh().await.unwrap();
        }
    });

    let statuses = join_all((0..20).map(|_| get_data(&server, &token))).await;
    refresher.await?;

    for status in statuses {
        assert_eq!(status?, StatusCode::OK);
    }
    assert!(!server.resolver().snapshot().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_unknown_kid_requests_share_one_refresh() -> Result<()> {
    let old = RsaTestKey::new("rsa-old");
    let new = RsaTestKey::new("rsa-new");
    let jwks = MockJwksServer::start(&[&old]).await;
    let server = TestGatewayServer::spawn(&jwks).await?;

    jwks.publish(&[&old, &new]);
    jwks.set_delay(Some(Duration::from_millis(100)));
    let token = signed(&jwks, &new);

    let statuses = join_all((0..10).map(|_| get_data(&server, &token))).await;

    for status in statuses {
        assert_eq!(status?, StatusCode::OK);
    }
    assert_eq!(jwks.fetch_count(), 2);
    Ok(())
}
