//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, health, subscriptions, users, webhooks};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Store health check
/// - `GET /subscription/plans` - Plan catalog
///
/// ## Users (bearer token)
/// - `POST /users` - Register
/// - `GET /users/me` - Account, subscription and card
///
/// ## Subscription (bearer token)
/// - `POST /subscription/create`
/// - `POST /subscription/update`
/// - `POST /subscription/cancel`
/// - `POST /subscription/update_payment_method`
/// - `GET /subscription/billing_details`
/// - `POST /subscription/coupon_code` - Discount code lookup (form body)
///
/// ## Webhooks (no auth, event is re-fetched)
/// - `POST /subscription/stripe_webhook/event`
///
/// ## Admin (`X-Admin-Key`)
/// - `POST /admin/coupons`, `GET /admin/coupons`
/// - `POST /admin/coupons/bulk_delete`
/// - `POST /admin/users/bulk_delete`
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health::health))
        // Users
        .route("/users", post(users::create_user))
        .route("/users/me", get(users::get_settings))
        // Subscription
        .route("/subscription/plans", get(subscriptions::list_plans))
        .route("/subscription/create", post(subscriptions::create_subscription))
        .route("/subscription/update", post(subscriptions::update_subscription))
        .route("/subscription/cancel", post(subscriptions::cancel_subscription))
        .route(
            "/subscription/update_payment_method",
            post(subscriptions::update_payment_method),
        )
        .route(
            "/subscription/billing_details",
            get(subscriptions::billing_details),
        )
        .route("/subscription/coupon_code", post(subscriptions::coupon_code))
        // Webhooks
        .route(
            "/subscription/stripe_webhook/event",
            post(webhooks::stripe_event),
        )
        // Admin
        .route(
            "/admin/coupons",
            post(admin::create_coupon).get(admin::list_coupons),
        )
        .route(
            "/admin/coupons/bulk_delete",
            post(admin::bulk_delete_coupons),
        )
        .route("/admin/users/bulk_delete", post(admin::bulk_delete_users))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
