//! Key resolver behavior against a mock JWKS endpoint
//!
//! Covers:
//! - Cache hits served without network access
//! - Refresh on miss, single retry, rotation
//! - Fetch failures (status, timeout, bad documents)
//! - Optional TTL and refresh cooldown
//! - Concurrent lookups

use std::sync::Arc;
use std::time::Duration;

use idgate_auth::testutil::{MockIdentityProvider, TestKey};
use idgate_auth::{KeyResolver, ResolverError, VerificationConfig};
use jsonwebtoken::Algorithm;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::ResponseTemplate;

#[tokio::test]
async fn test_cache_hit_does_not_refetch() {
    let provider = MockIdentityProvider::start().await;
    provider.serve_keys(&[&TestKey::primary()], Some(1)).await;
    let resolver = KeyResolver::new(&provider.config()).unwrap();

    for _ in 0..5 {
        let key = resolver.resolve("test-key-1").await.unwrap();
        assert_eq!(key.kid(), "test-key-1");
        assert_eq!(key.algorithm(), Algorithm::RS256);
    }

    let stats = resolver.stats();
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.cache_hits, 4);
    assert_eq!(stats.refreshes, 1);
}

#[tokio::test]
async fn test_unknown_kid_refreshes_once_then_fails() {
    let provider = MockIdentityProvider::start().await;
    provider.serve_keys(&[&TestKey::primary()], Some(2)).await;
    let resolver = KeyResolver::new(&provider.config()).unwrap();

    resolver.resolve("test-key-1").await.unwrap();

    // Miss forces exactly one more fetch, no further retries
    let err = resolver.resolve("missing-key").await.unwrap_err();
    assert_eq!(
        err,
        ResolverError::UnknownKey {
            kid: "missing-key".to_string()
        }
    );
    assert_eq!(provider.jwks_fetches().await, 2);
}

#[tokio::test]
async fn test_rotation_picks_up_new_key_and_drops_old() {
    let provider = MockIdentityProvider::start().await;
    provider.serve_keys(&[&TestKey::primary()], None).await;
    let resolver = KeyResolver::new(&provider.config()).unwrap();
    resolver.resolve("test-key-1").await.unwrap();

    // GIVEN: the provider now publishes a different key
    provider.rotate_to(&[&TestKey::rogue()], None).await;

    // WHEN: a token names the new key
    let key = resolver.resolve("rogue-key").await.unwrap();

    // THEN: the whole set was replaced
    assert_eq!(key.kid(), "rogue-key");
    assert_eq!(resolver.cached_key_ids(), vec!["rogue-key".to_string()]);

    let err = resolver.resolve("test-key-1").await.unwrap_err();
    assert!(matches!(err, ResolverError::UnknownKey { .. }));
}

#[tokio::test]
async fn test_error_status_is_fetch_failure() {
    let provider = MockIdentityProvider::start().await;
    provider.serve_status(500, Some(1)).await;
    let resolver = KeyResolver::new(&provider.config()).unwrap();

    let err = resolver.resolve("test-key-1").await.unwrap_err();
    assert!(matches!(err, ResolverError::KeyFetch(ref msg) if msg.contains("500")));
    assert_eq!(resolver.stats().fetch_failures, 1);
    assert!(resolver.cached_key_ids().is_empty());
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_keys() {
    let provider = MockIdentityProvider::start().await;
    provider.serve_keys(&[&TestKey::primary()], None).await;
    let resolver = KeyResolver::new(&provider.config()).unwrap();
    resolver.resolve("test-key-1").await.unwrap();

    provider.server.reset().await;
    provider.serve_status(503, None).await;

    let err = resolver.resolve("new-key").await.unwrap_err();
    assert!(matches!(err, ResolverError::KeyFetch(_)));

    // Known key still served from the cache
    let key = resolver.resolve("test-key-1").await.unwrap();
    assert_eq!(key.kid(), "test-key-1");

    let stats = resolver.stats();
    assert_eq!(stats.refreshes, 1);
    assert_eq!(stats.fetch_failures, 1);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let provider = MockIdentityProvider::start().await;
    provider
        .serve_keys_slowly(&[&TestKey::primary()], Duration::from_secs(5))
        .await;
    let config = provider
        .config()
        .with_jwks_timeout(Duration::from_millis(200));
    let resolver = KeyResolver::new(&config).unwrap();

    let started = std::time::Instant::now();
    let err = resolver.resolve("test-key-1").await.unwrap_err();

    assert!(matches!(err, ResolverError::KeyFetch(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_unusable_documents_are_fetch_failures() {
    let modulus = TestKey::primary().jwk()["n"].clone();
    let cases = [
        ResponseTemplate::new(200).set_body_string("not json"),
        ResponseTemplate::new(200).set_body_json(json!({ "keys": [] })),
        // Only an encryption key
        ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{
                "kty": "RSA", "kid": "enc-key", "use": "enc",
                "n": modulus, "e": "AQAB"
            }]
        })),
    ];

    for response in cases {
        let provider = MockIdentityProvider::start().await;
        provider.serve_response(response, Some(1)).await;
        let resolver = KeyResolver::new(&provider.config()).unwrap();

        let err = resolver.resolve("enc-key").await.unwrap_err();
        assert!(matches!(err, ResolverError::KeyFetch(_)), "got {err:?}");
    }
}

#[tokio::test]
async fn test_unavailable_resolver_never_touches_network() {
    let provider = MockIdentityProvider::start().await;
    provider.serve_keys(&[&TestKey::primary()], Some(0)).await;

    let resolver = KeyResolver::from_config(VerificationConfig::cognito("us-east-1", ""));
    assert!(!resolver.is_available());

    let err = resolver.resolve("test-key-1").await.unwrap_err();
    assert!(matches!(err, ResolverError::ConfigurationUnavailable { .. }));
    assert!(resolver.refresh().await.is_err());
}

#[tokio::test]
async fn test_cooldown_suppresses_back_to_back_refreshes() {
    let provider = MockIdentityProvider::start().await;
    provider.serve_keys(&[&TestKey::primary()], Some(2)).await;
    let config = provider
        .config()
        .with_refresh_cooldown(Duration::from_secs(60));
    let resolver = KeyResolver::new(&config).unwrap();

    resolver.resolve("test-key-1").await.unwrap();

    // First unknown kid refetches and starts the cooldown, the rest do not
    for _ in 0..3 {
        let err = resolver.resolve("random-kid").await.unwrap_err();
        assert!(matches!(err, ResolverError::UnknownKey { .. }));
    }
    assert_eq!(resolver.stats().cache_misses, 4);
    assert_eq!(provider.jwks_fetches().await, 2);

    // Published keys keep resolving during the cooldown
    resolver.resolve("test-key-1").await.unwrap();
}

#[tokio::test]
async fn test_cooldown_serves_expired_keys_without_refetch() {
    let provider = MockIdentityProvider::start().await;
    provider.serve_keys(&[&TestKey::primary()], Some(2)).await;
    let config = provider
        .config()
        .with_cache_ttl(Duration::from_millis(100))
        .with_refresh_cooldown(Duration::from_secs(60));
    let resolver = KeyResolver::new(&config).unwrap();

    resolver.resolve("test-key-1").await.unwrap();
    assert!(resolver.resolve("random-kid").await.is_err());

    tokio::time::sleep(Duration::from_millis(150)).await;

    // TTL has passed but the cooldown holds; the last fetched set answers
    let key = resolver.resolve("test-key-1").await.unwrap();
    assert_eq!(key.kid(), "test-key-1");
    assert_eq!(provider.jwks_fetches().await, 2);
}

#[tokio::test]
async fn test_ttl_shorter_than_cooldown_still_refetches() {
    let provider = MockIdentityProvider::start().await;
    provider.serve_keys(&[&TestKey::primary()], Some(2)).await;
    let config = provider
        .config()
        .with_cache_ttl(Duration::from_millis(100))
        .with_refresh_cooldown(Duration::from_secs(60));
    let resolver = KeyResolver::new(&config).unwrap();

    resolver.resolve("test-key-1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // A successful refresh never started the cooldown
    resolver.resolve("test-key-1").await.unwrap();
    assert_eq!(resolver.stats().refreshes, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cold_start_concurrent_lookups_with_cooldown() {
    let provider = MockIdentityProvider::start().await;
    provider
        .serve_keys_slowly(&[&TestKey::primary()], Duration::from_millis(300))
        .await;
    let config = provider
        .config()
        .with_refresh_cooldown(Duration::from_secs(60));
    let resolver = Arc::new(KeyResolver::new(&config).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.resolve("test-key-1").await })
        })
        .collect();

    // Lookups racing an in-flight fetch are not refused
    for handle in handles {
        let key = handle.await.unwrap().unwrap();
        assert_eq!(key.kid(), "test-key-1");
    }
}

#[tokio::test]
async fn test_ttl_expiry_refetches() {
    let provider = MockIdentityProvider::start().await;
    provider.serve_keys(&[&TestKey::primary()], Some(2)).await;
    let config = provider.config().with_cache_ttl(Duration::from_millis(100));
    let resolver = KeyResolver::new(&config).unwrap();

    resolver.resolve("test-key-1").await.unwrap();
    resolver.resolve("test-key-1").await.unwrap();
    assert_eq!(provider.jwks_fetches().await, 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    resolver.resolve("test-key-1").await.unwrap();
    assert_eq!(provider.jwks_fetches().await, 2);
}

#[tokio::test]
async fn test_refresh_and_clear() {
    let provider = MockIdentityProvider::start().await;
    provider
        .serve_keys(&[&TestKey::primary(), &TestKey::rogue()], Some(2))
        .await;
    let resolver = KeyResolver::new(&provider.config()).unwrap();

    assert_eq!(resolver.refresh().await.unwrap(), 2);
    assert_eq!(
        resolver.cached_key_ids(),
        vec!["rogue-key".to_string(), "test-key-1".to_string()]
    );

    resolver.clear();
    assert!(resolver.cached_key_ids().is_empty());

    // Cleared cache means the next lookup fetches again
    resolver.resolve("rogue-key").await.unwrap();
    assert_eq!(resolver.stats().refreshes, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_all_succeed() {
    let provider = MockIdentityProvider::start().await;
    provider.serve_keys(&[&TestKey::primary()], None).await;
    let resolver = Arc::new(KeyResolver::new(&provider.config()).unwrap());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.resolve("test-key-1").await })
        })
        .collect();

    for handle in handles {
        let key = handle.await.unwrap().unwrap();
        assert_eq!(key.kid(), "test-key-1");
    }

    // Racing misses may each refresh, but never more than once per lookup
    let fetches = provider.jwks_fetches().await;
    assert!((1..=16).contains(&fetches), "fetched {fetches} times");
    assert_eq!(resolver.cached_key_ids(), vec!["test-key-1".to_string()]);
}
