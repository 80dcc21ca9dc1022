//! Stripe API types.
//!
//! Only the fields billing reads are modelled; everything else is ignored.

use serde::Deserialize;

use catwatch_core::CardDetails;

use crate::gateway::{RemoteCustomer, RemoteSubscription};

/// Stripe list response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    /// Data items.
    pub data: Vec<T>,
    /// Whether there are more items.
    #[serde(default)]
    pub has_more: bool,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            has_more: false,
        }
    }
}

/// Stripe card source.
#[derive(Debug, Clone, Deserialize)]
pub struct Card {
    /// Card ID.
    pub id: String,
    /// Brand, e.g. `Visa`.
    #[serde(default)]
    pub brand: String,
    /// Last four digits.
    #[serde(default)]
    pub last4: String,
    /// Expiry month.
    pub exp_month: u32,
    /// Expiry year.
    pub exp_year: i32,
}

/// Stripe plan reference on a subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanRef {
    /// Plan ID.
    pub id: String,
}

/// Stripe subscription object.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    /// Subscription ID.
    pub id: String,
    /// Status (`active`, `trialing`, `canceled`, ...).
    #[serde(default)]
    pub status: String,
    /// Subscribed plan.
    #[serde(default)]
    pub plan: Option<PlanRef>,
}

impl From<Subscription> for RemoteSubscription {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            plan: sub.plan.map(|p| p.id),
            status: sub.status,
        }
    }
}

/// Stripe customer object.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    /// Stripe customer ID.
    pub id: String,
    /// Set on customers that have been deleted.
    #[serde(default)]
    pub deleted: bool,
    /// Payment sources; cards first.
    #[serde(default)]
    pub sources: StripeList<Card>,
    /// Subscriptions.
    #[serde(default)]
    pub subscriptions: StripeList<Subscription>,
}

impl From<Customer> for RemoteCustomer {
    fn from(customer: Customer) -> Self {
        let card = customer.sources.data.into_iter().next().map(|c| CardDetails {
            brand: c.brand,
            last4: c.last4,
            exp_month: c.exp_month,
            exp_year: c.exp_year,
        });
        Self {
            id: customer.id,
            card,
            subscriptions: customer
                .subscriptions
                .data
                .into_iter()
                .map(RemoteSubscription::from)
                .collect(),
        }
    }
}

/// Stripe event object header. The full body is kept as JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct EventHeader {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "invoice.created").
    #[serde(rename = "type")]
    pub event_type: String,
}

/// Response to a delete call.
#[derive(Debug, Clone, Deserialize)]
pub struct Deleted {
    /// Whether the object was deleted.
    #[serde(default)]
    pub deleted: bool,
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}
