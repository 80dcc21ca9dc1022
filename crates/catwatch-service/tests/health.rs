//! Health endpoint integration tests.

mod common;

use common::TestHarness;
use serde_json::Value;

#[tokio::test]
async fn health_reports_store_and_gateway() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "ok");
    assert_eq!(body["gateway_configured"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn health_does_not_call_gateway() {
    let harness = TestHarness::new().await;

    // No Stripe mock is mounted: the check must not touch the gateway.
    harness.server.get("/health").await.assert_status_ok();
    assert!(harness.stripe.received_requests().await.unwrap().is_empty());
}
