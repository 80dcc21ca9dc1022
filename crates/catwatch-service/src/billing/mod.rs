//! Billing services.
//!
//! Every operation that touches the gateway calls it first and writes the
//! local rows only after it succeeds. A gateway failure therefore leaves the
//! database untouched.

pub mod coupons;
pub mod credit_cards;
pub mod invoices;
pub mod reconcile;
pub mod subscriptions;

pub use coupons::CouponService;
pub use credit_cards::CreditCardService;
pub use invoices::InvoiceService;
pub use reconcile::{DriftReport, Reconciler};
pub use subscriptions::SubscriptionService;

use catwatch_core::BillingError;
use catwatch_store::StoreError;

use crate::gateway::GatewayError;

/// Errors from billing operations.
#[derive(Debug, thiserror::Error)]
pub enum BillingServiceError {
    /// The gateway refused or failed the call.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Input or payload failed a domain rule.
    #[error(transparent)]
    Invalid(#[from] BillingError),

    /// The user already has a subscription.
    #[error("You already have an active subscription.")]
    AlreadySubscribed,

    /// The user has no subscription.
    #[error("You do not have an active subscription.")]
    NotSubscribed,

    /// The user has no card on file.
    #[error("You do not have a payment method on file.")]
    NoPaymentMethod,

    /// The requested plan is the current plan.
    #[error("You are already subscribed to the {0} plan.")]
    SamePlan(String),
}

/// Result type for billing operations.
pub type Result<T> = std::result::Result<T, BillingServiceError>;
