//! Payment gateway port.
//!
//! Billing services talk to the gateway of record only through
//! [`PaymentGateway`]. The Stripe adapter in [`crate::stripe`] implements it
//! over HTTP; unit tests use the generated `MockPaymentGateway`.

use async_trait::async_trait;
use serde::Serialize;

use catwatch_core::{CardDetails, CouponTerms};

/// Errors returned by every gateway operation.
///
/// Each kind maps to a fixed message shown to the user. Raw gateway text is
/// only logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The card was declined.
    #[error("card declined: {0}")]
    CardDeclined(String),

    /// The gateway rejected the request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The gateway rejected our credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The gateway could not be reached or timed out.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Any other gateway failure.
    #[error("gateway error: {0}")]
    Api(String),
}

impl GatewayError {
    /// Message safe to show the user.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::CardDeclined(_) => "Sorry, your card was declined. Try again perhaps?",
            Self::InvalidRequest(_) => "Our payment gateway did not like that request.",
            Self::Authentication(_) => "Authentication with our payment gateway failed.",
            Self::Connection(_) => {
                "Our payment gateway is experiencing connectivity issues, please try again."
            }
            Self::Api(_) => "Our payment gateway is having issues, please try again.",
        }
    }

    /// Stable machine-readable kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CardDeclined(_) => "card_declined",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Authentication(_) => "gateway_authentication",
            Self::Connection(_) => "gateway_connection",
            Self::Api(_) => "gateway_error",
        }
    }
}

/// Parameters for opening a customer with a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    /// Tokenized payment method collected client-side.
    pub token: String,
    /// Customer e-mail.
    pub email: String,
    /// Plan id.
    pub plan: String,
    /// Uppercase coupon code.
    pub coupon: Option<String>,
    /// Sent as `Idempotency-Key` so retries do not open a second customer.
    pub idempotency_key: String,
}

/// A gateway subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteSubscription {
    /// Gateway subscription id.
    pub id: String,
    /// Plan id, if the gateway reported one.
    pub plan: Option<String>,
    /// Gateway status (`active`, `trialing`, `canceled`, ...).
    pub status: String,
}

impl RemoteSubscription {
    /// Whether the gateway is still billing this subscription.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self.status.as_str(), "active" | "trialing" | "past_due")
    }
}

/// A gateway customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteCustomer {
    /// Gateway customer id, stored as `User::payment_id`.
    pub id: String,
    /// The first card on file.
    pub card: Option<CardDetails>,
    /// Subscriptions held by the customer.
    pub subscriptions: Vec<RemoteSubscription>,
}

/// A gateway event as re-fetched by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteEvent {
    /// Event id.
    pub id: String,
    /// Event type such as `invoice.created`.
    pub event_type: String,
    /// The complete event object.
    pub payload: serde_json::Value,
}

/// The operations billing needs from the gateway of record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a customer and subscribe them to a plan in one call.
    async fn create_customer_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<RemoteCustomer, GatewayError>;

    /// Move the customer's subscription to `plan`, optionally applying a coupon.
    async fn update_subscription(
        &self,
        customer_id: &str,
        plan: &str,
        coupon: Option<String>,
    ) -> Result<RemoteSubscription, GatewayError>;

    /// Cancel the customer's subscription.
    async fn cancel_subscription(&self, customer_id: &str)
        -> Result<RemoteSubscription, GatewayError>;

    /// Replace the customer's card with the one behind `token`.
    async fn update_card(&self, customer_id: &str, token: &str)
        -> Result<RemoteCustomer, GatewayError>;

    /// Preview the customer's next invoice.
    async fn upcoming_invoice(&self, customer_id: &str) -> Result<serde_json::Value, GatewayError>;

    /// Create a coupon whose gateway id is its code.
    async fn create_coupon(&self, terms: &CouponTerms) -> Result<(), GatewayError>;

    /// Delete a coupon by code. Returns whether the gateway deleted it.
    async fn delete_coupon(&self, code: &str) -> Result<bool, GatewayError>;

    /// Fetch an event by id.
    async fn retrieve_event(&self, event_id: &str) -> Result<RemoteEvent, GatewayError>;

    /// Fetch a customer, or `None` if the gateway doesn't know it.
    async fn retrieve_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<RemoteCustomer>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_user_message() {
        let errors = [
            GatewayError::CardDeclined(String::new()),
            GatewayError::InvalidRequest(String::new()),
            GatewayError::Authentication(String::new()),
            GatewayError::Connection(String::new()),
            GatewayError::Api(String::new()),
        ];
        for err in &errors {
            assert!(!err.user_message().is_empty());
        }
        assert_eq!(
            errors[0].user_message(),
            "Sorry, your card was declined. Try again perhaps?"
        );
    }

    #[test]
    fn live_statuses() {
        let sub = |status: &str| RemoteSubscription {
            id: "sub_000".into(),
            plan: Some("gold".into()),
            status: status.into(),
        };
        assert!(sub("active").is_live());
        assert!(sub("trialing").is_live());
        assert!(!sub("canceled").is_live());
    }
}
