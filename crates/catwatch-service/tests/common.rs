//! Common test utilities for catwatch integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use catwatch_core::{default_plans, CreditCard, PlanCatalog, User, UserId};
use catwatch_service::auth::JwtClaims;
use catwatch_service::{
    create_router, AppState, JobQueue, JobRunner, ServiceConfig, StripeClient,
};
use catwatch_store::{MemoryStore, Store};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const ADMIN_KEY: &str = "test-admin-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Stands in for the Stripe API.
    pub stripe: MockServer,
    /// The backing store, for arranging and inspecting rows directly.
    pub store: Arc<MemoryStore>,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a new test harness with an empty store and a fresh Stripe mock.
    pub async fn new() -> Self {
        let stripe = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            stripe_api_key: Some("sk_test_xxx".into()),
            stripe_api_base: stripe.uri(),
            stripe_timeout_seconds: 5,
            jwt_secret: Some(JWT_SECRET.into()),
            admin_api_key: Some(ADMIN_KEY.into()),
            plans: PlanCatalog::new(default_plans()),
            ..ServiceConfig::default()
        };

        let gateway = StripeClient::new(
            "sk_test_xxx",
            stripe.uri(),
            Duration::from_secs(config.stripe_timeout_seconds),
        )
        .expect("Failed to build Stripe client");

        let (jobs, rx) = JobQueue::channel();
        let state = AppState::new(store.clone(), Arc::new(gateway), config, jobs);
        JobRunner::new(&state).spawn(rx);

        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            stripe,
            store,
            test_user_id: UserId::generate(),
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        Self::auth_header_for(self.test_user_id)
    }

    /// Mint a bearer token for any user.
    pub fn auth_header_for(user_id: UserId) -> String {
        let claims = JwtClaims {
            sub: user_id.to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
            iat: None,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("Failed to sign token");
        format!("Bearer {token}")
    }

    /// Register the test user.
    pub async fn register(&self) {
        self.server
            .post("/users")
            .add_header("authorization", self.user_auth_header())
            .json(&json!({ "email": "foo@example.com", "name": "Foo" }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    /// Register the test user and subscribe them to `plan` through the API.
    pub async fn subscribe(&self, plan: &str) {
        self.register().await;
        self.mock_customer_create().await;

        self.server
            .post("/subscription/create")
            .add_header("authorization", self.user_auth_header())
            .json(&json!({ "plan": plan, "stripe_token": "tok_visa", "name": "Foo" }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    /// Stripe answers customer creation with `cus_000` and a Visa card.
    pub async fn mock_customer_create(&self) {
        Mock::given(method("POST"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(customer_json("gold")))
            .mount(&self.stripe)
            .await;
    }

    /// Stripe answers customer retrieval for `cus_000`.
    pub async fn mock_customer_get(&self, plan: &str) {
        Mock::given(method("GET"))
            .and(path("/customers/cus_000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(customer_json(plan)))
            .mount(&self.stripe)
            .await;
    }

    /// Put a user with a card on file straight into the store.
    pub async fn seed_user_with_card(&self, email: &str, payment_id: &str) -> User {
        let mut user = User::new(UserId::generate(), email);
        user.payment_id = Some(payment_id.into());
        let card = CreditCard::from_details(
            user.id,
            &catwatch_core::CardDetails {
                brand: "Visa".into(),
                last4: "4242".into(),
                exp_month: 6,
                exp_year: 2030,
            },
            chrono::Utc::now().date_naive(),
        )
        .expect("valid card");
        self.store
            .replace_credit_card(&user, &card)
            .await
            .expect("Failed to seed user");
        user
    }

    /// Poll until `check` passes or give up after about a second.
    pub async fn eventually<F, Fut>(&self, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..50 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

/// A Stripe customer with one card and one subscription on `plan`.
pub fn customer_json(plan: &str) -> Value {
    json!({
        "id": "cus_000",
        "object": "customer",
        "sources": {
            "object": "list",
            "data": [{
                "id": "card_000",
                "brand": "Visa",
                "last4": "4242",
                "exp_month": 6,
                "exp_year": 2030
            }],
            "has_more": false
        },
        "subscriptions": {
            "object": "list",
            "data": [{
                "id": "sub_000",
                "status": "active",
                "plan": { "id": plan }
            }],
            "has_more": false
        }
    })
}

/// A Stripe error body.
pub fn stripe_error(error_type: &str, message: &str) -> Value {
    json!({ "error": { "type": error_type, "message": message } })
}

/// A Stripe invoice object billed to `customer`.
pub fn invoice_object(customer: &str) -> Value {
    json!({
        "object": "invoice",
        "date": 1_433_018_770,
        "customer": customer,
        "currency": "usd",
        "total": 500,
        "amount_due": 500,
        "lines": { "data": [{
            "period": { "start": 1_433_161_742, "end": 1_434_371_342 },
            "plan": {
                "id": "gold",
                "name": "Gold",
                "interval": "month",
                "statement_descriptor": "GOLD MONTHLY"
            }
        }]}
    })
}

/// A Stripe event wrapping `object`.
pub fn event_json(id: &str, event_type: &str, object: Value) -> Value {
    json!({ "id": id, "object": "event", "type": event_type, "data": { "object": object } })
}
