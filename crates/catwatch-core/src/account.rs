//! User and subscription records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{SubscriptionId, UserId};

/// A user account as seen by the billing core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,

    /// E-mail address, sent to the gateway when subscribing.
    pub email: String,

    /// Name on the card.
    pub name: Option<String>,

    /// Gateway customer id. Set while a subscription is active.
    pub payment_id: Option<String>,

    /// When the last subscription was cancelled.
    pub cancelled_subscription_on: Option<DateTime<Utc>>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with no billing state.
    #[must_use]
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            name: None,
            payment_id: None,
            cancelled_subscription_on: None,
            created_at: Utc::now(),
        }
    }

    /// Record a gateway-confirmed subscription on the account.
    pub fn begin_subscription(&mut self, payment_id: impl Into<String>, name: Option<String>) {
        self.payment_id = Some(payment_id.into());
        self.name = name;
        self.cancelled_subscription_on = None;
    }

    /// Record a gateway-confirmed cancellation on the account.
    pub fn end_subscription(&mut self, at: DateTime<Utc>) {
        self.payment_id = None;
        self.cancelled_subscription_on = Some(at);
    }
}

/// The local mirror of a user's active gateway subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Row id.
    pub id: SubscriptionId,

    /// Owning user (one subscription per user).
    pub user_id: UserId,

    /// Plan id from the catalog.
    pub plan: String,

    /// Uppercase coupon code applied to the subscription.
    pub coupon: Option<String>,

    /// When the subscription was created.
    pub created_at: DateTime<Utc>,

    /// When the subscription was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create a new subscription row. The coupon code is uppercased.
    #[must_use]
    pub fn new(user_id: UserId, plan: impl Into<String>, coupon: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: SubscriptionId::generate(),
            user_id,
            plan: plan.into(),
            coupon: coupon.map(str::to_uppercase),
            created_at: now,
            updated_at: now,
        }
    }
}
