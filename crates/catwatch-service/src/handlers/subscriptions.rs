//! Subscription handlers.
//!
//! Successful actions answer with a flash message for the client to show.
//! Gateway failures come back as [`ApiError::Gateway`], which carries the
//! user-facing message and the settings page to return to.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use catwatch_core::{CouponView, Invoice, Plan, Subscription, UpcomingInvoice};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::users::current_user;
use crate::state::AppState;

/// Invoices shown on the billing details page.
pub const BILLING_HISTORY_LIMIT: usize = 12;

const MISSING_TOKEN: &str = "You must enable Javascript for this request.";

/// Flash severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    /// The action succeeded.
    Success,
    /// The action was not attempted.
    Warning,
}

/// A message for the client to display.
#[derive(Debug, Serialize)]
pub struct Flash {
    /// Severity.
    pub level: FlashLevel,
    /// Text.
    pub message: String,
}

/// Response for subscription actions.
#[derive(Debug, Serialize)]
pub struct FlashResponse {
    /// Message to show.
    pub flash: Flash,
    /// The resulting subscription, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}

fn flash(status: StatusCode, level: FlashLevel, message: &str) -> (StatusCode, Json<FlashResponse>) {
    (
        status,
        Json(FlashResponse {
            flash: Flash {
                level,
                message: message.to_string(),
            },
            subscription: None,
        }),
    )
}

/// Plan selection: an explicit `plan`, or one `submit_<planId>` key per plan button.
#[derive(Debug, Deserialize)]
pub struct PlanSelection {
    /// Plan id.
    #[serde(default)]
    pub plan: Option<String>,
    /// Remaining fields, scanned for `submit_<planId>` keys.
    #[serde(flatten)]
    pub fields: HashMap<String, serde_json::Value>,
}

impl PlanSelection {
    fn resolve(&self, state: &AppState) -> Result<String, ApiError> {
        if let Some(plan) = self.plan.as_deref().filter(|p| !p.is_empty()) {
            return Ok(plan.to_string());
        }
        state
            .plans
            .resolve_submitted_plan(self.fields.keys().map(String::as_str))
            .map(|plan| plan.id.clone())
            .ok_or_else(|| ApiError::Unprocessable("Please choose a plan".into()))
    }
}

/// Create subscription request.
#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    /// Tokenized payment method collected client-side.
    #[serde(default)]
    pub stripe_token: Option<String>,
    /// Name on the card.
    #[serde(default)]
    pub name: Option<String>,
    /// Discount code.
    #[serde(default)]
    pub coupon: Option<String>,
    /// Chosen plan.
    #[serde(flatten)]
    pub selection: PlanSelection,
}

/// Update subscription request.
#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    /// Discount code.
    #[serde(default)]
    pub coupon: Option<String>,
    /// Chosen plan.
    #[serde(flatten)]
    pub selection: PlanSelection,
}

/// Update payment method request.
#[derive(Debug, Deserialize)]
pub struct UpdatePaymentMethodRequest {
    /// Tokenized payment method collected client-side.
    #[serde(default)]
    pub stripe_token: Option<String>,
    /// Name on the card.
    #[serde(default)]
    pub name: Option<String>,
}

/// Billing details response.
#[derive(Debug, Serialize)]
pub struct BillingDetailsResponse {
    /// Most recent invoices, newest first.
    pub invoices: Vec<Invoice>,
    /// Next bill preview, if subscribed.
    pub upcoming: Option<UpcomingInvoice>,
    /// Coupon applied to the subscription.
    pub coupon: Option<CouponView>,
}

/// Discount code form.
#[derive(Debug, Deserialize)]
pub struct CouponCodeForm {
    /// Code as typed by the user.
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// List the plan catalog.
pub async fn list_plans(State(state): State<Arc<AppState>>) -> Json<Vec<Plan>> {
    Json(state.plans.list().into_iter().cloned().collect())
}

/// Subscribe the current user.
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(body): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<FlashResponse>), ApiError> {
    let mut user = current_user(&state, &auth).await?;
    let plan = body.selection.resolve(&state)?;
    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok());

    let created = state
        .subscriptions
        .create(
            &mut user,
            body.name,
            &plan,
            body.coupon.as_deref(),
            body.stripe_token.as_deref(),
            idempotency_key,
        )
        .await?;

    if !created {
        return Ok(flash(StatusCode::BAD_REQUEST, FlashLevel::Warning, MISSING_TOKEN));
    }

    let mut response = flash(
        StatusCode::CREATED,
        FlashLevel::Success,
        "Awesome, thanks for subscribing!",
    );
    response.1.subscription = state.store.get_subscription(&user.id).await?;
    Ok(response)
}

/// Change the current user's plan.
pub async fn update_subscription(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<UpdateSubscriptionRequest>,
) -> Result<(StatusCode, Json<FlashResponse>), ApiError> {
    let user = current_user(&state, &auth).await?;
    let plan = body.selection.resolve(&state)?;

    let subscription = state
        .subscriptions
        .update(&user, &plan, body.coupon.as_deref())
        .await?;

    let mut response = flash(
        StatusCode::OK,
        FlashLevel::Success,
        "Your subscription has been updated.",
    );
    response.1.subscription = Some(subscription);
    Ok(response)
}

/// Cancel the current user's subscription.
pub async fn cancel_subscription(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<(StatusCode, Json<FlashResponse>), ApiError> {
    let mut user = current_user(&state, &auth).await?;

    state.subscriptions.cancel(&mut user, true).await?;

    Ok(flash(
        StatusCode::OK,
        FlashLevel::Success,
        "Sorry to see you go, your subscription has been cancelled.",
    ))
}

/// Replace the current user's card.
pub async fn update_payment_method(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<UpdatePaymentMethodRequest>,
) -> Result<(StatusCode, Json<FlashResponse>), ApiError> {
    let mut user = current_user(&state, &auth).await?;

    let updated = state
        .subscriptions
        .update_payment_method(&mut user, body.name, body.stripe_token.as_deref())
        .await?;

    if !updated {
        return Ok(flash(StatusCode::BAD_REQUEST, FlashLevel::Warning, MISSING_TOKEN));
    }

    Ok(flash(
        StatusCode::OK,
        FlashLevel::Success,
        "Your payment method has been updated.",
    ))
}

/// Billing history, next bill and active coupon.
pub async fn billing_details(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BillingDetailsResponse>, ApiError> {
    let user = current_user(&state, &auth).await?;
    let invoices = state
        .invoices
        .billing_history(&user.id, BILLING_HISTORY_LIMIT)
        .await?;
    let subscription = state.store.get_subscription(&user.id).await?;

    let upcoming = match (&subscription, user.payment_id.as_deref()) {
        (Some(_), Some(customer_id)) => Some(state.invoices.upcoming(customer_id).await?),
        _ => None,
    };

    let coupon = match subscription.and_then(|s| s.coupon) {
        Some(code) => state
            .store
            .get_coupon_by_code(&code)
            .await?
            .map(|c| c.view()),
        None => None,
    };

    Ok(Json(BillingDetailsResponse {
        invoices,
        upcoming,
        coupon,
    }))
}

/// Look up a discount code for the subscribe form.
pub async fn coupon_code(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Form(form): Form<CouponCodeForm>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Some(code) = form.coupon_code.filter(|c| !c.trim().is_empty()) else {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "Discount code cannot be processed." })),
        ));
    };

    match state.coupons.find_by_code(code.trim()).await? {
        Some(coupon) => Ok((StatusCode::OK, Json(json!({ "data": coupon.view() })))),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Discount code not found." })),
        )),
    }
}
