//! HTTP provider against a mock upstream: records extraction, key in query,
//! provider classes 401/403 -> AUTH_FAILED, 5xx -> SNAPSHOT_MISSING,
//! slow -> UPSTREAM_TIMEOUT. Placeholders built from these keep
//! `error.code = SNAPSHOT_MISSING` and carry the class as `meta.reason`.

use std::time::Duration;

use httpmock::prelude::*;
use rv_config::resolve_secret_with;
use rv_md::{fetch_with_policy, FetchPolicy, HttpJsonProvider, Provider, ProviderError};
use rv_schemas::ErrorCode;
use serde_json::json;

fn policy(timeout_ms: u64) -> FetchPolicy {
    FetchPolicy {
        timeout: Duration::from_millis(timeout_ms),
        retries: 0,
        backoff: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn records_are_extracted_and_key_is_sent() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/eod").query_param("api_token", "k-123");
            then.status(200)
                .json_body(json!({"data": [{"symbol": "AAPL", "close": 190.1}, {"symbol": "MSFT", "close": 410.0}]}));
        })
        .await;

    let key = resolve_secret_with("EODHD_API_KEY", |_| Some("k-123".into())).unwrap();
    let p = HttpJsonProvider::new("eodhd", server.url("/eod"))
        .with_api_key("api_token", key)
        .with_records_pointer(Some("/data".into()));

    let payload = p.fetch().await.unwrap();
    mock.assert_async().await;
    assert_eq!(payload.records.len(), 2);
    assert_eq!(payload.records[0]["symbol"], "AAPL");
}

#[tokio::test]
async fn auth_rejection_maps_to_auth_failed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/news");
            then.status(403).body("forbidden");
        })
        .await;

    let p = HttpJsonProvider::new("marketaux", server.url("/news"));
    let err = fetch_with_policy("news", &p, None, policy(2000)).await.unwrap_err();
    assert_eq!(err, ProviderError::Auth { status: 403 });
    assert_eq!(err.code(), ErrorCode::AuthFailed);
}

#[tokio::test]
async fn server_error_degrades_to_snapshot_missing() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/fx");
            then.status(502).body("bad gateway");
        })
        .await;

    let p = HttpJsonProvider::new("ecb", server.url("/fx"));
    let err = fetch_with_policy("fx", &p, None, policy(2000)).await.unwrap_err();
    assert!(matches!(err, ProviderError::Http { status: 502, .. }));
    assert_eq!(err.code(), ErrorCode::SnapshotMissing);
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/pulse");
            then.status(200)
                .delay(Duration::from_millis(800))
                .json_body(json!([]));
        })
        .await;

    let p = HttpJsonProvider::new("ops", server.url("/pulse"));
    let err = fetch_with_policy("pulse", &p, None, policy(50)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::UpstreamTimeout);
}
