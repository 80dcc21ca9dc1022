//! Subscription state machine.
//!
//! Per user: `NoSubscription -> Active -> Cancelled`, with plan, coupon and
//! payment-method changes as `Active -> Active` transitions.

use std::sync::Arc;

use chrono::Utc;

use catwatch_core::{BillingError, CreditCard, PlanCatalog, Subscription, User};
use catwatch_store::Store;

use super::{BillingServiceError, Result};
use crate::gateway::{GatewayError, PaymentGateway, RemoteCustomer, SubscriptionRequest};

/// Drives subscription changes through the gateway and mirrors them locally.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    plans: Arc<PlanCatalog>,
}

fn normalize_coupon(coupon: Option<&str>) -> Option<String> {
    coupon
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_uppercase)
}

fn card_from_customer(user: &User, customer: &RemoteCustomer) -> Result<CreditCard> {
    let details = customer.card.as_ref().ok_or_else(|| {
        tracing::error!(user_id = %user.id, customer_id = %customer.id, "Gateway customer has no card");
        GatewayError::Api(format!("customer {} has no card", customer.id))
    })?;
    Ok(CreditCard::from_details(
        user.id,
        details,
        Utc::now().date_naive(),
    )?)
}

impl SubscriptionService {
    /// Create the service.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        plans: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            store,
            gateway,
            plans,
        }
    }

    fn require_plan(&self, plan: &str) -> Result<()> {
        if self.plans.contains(plan) {
            Ok(())
        } else {
            Err(BillingError::UnknownPlan(plan.to_string()).into())
        }
    }

    /// Subscribe `user` to `plan`.
    ///
    /// Returns `Ok(false)` without side effects when `token` is missing. On
    /// success the user, subscription, card and coupon redemption are written
    /// in one atomic store operation and `user` is updated in place.
    pub async fn create(
        &self,
        user: &mut User,
        name: Option<String>,
        plan: &str,
        coupon: Option<&str>,
        token: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<bool> {
        let Some(token) = token else {
            return Ok(false);
        };
        self.require_plan(plan)?;
        if self.store.get_subscription(&user.id).await?.is_some() {
            return Err(BillingServiceError::AlreadySubscribed);
        }

        let coupon = normalize_coupon(coupon);
        let request = SubscriptionRequest {
            token: token.to_string(),
            email: user.email.clone(),
            plan: plan.to_string(),
            coupon: coupon.clone(),
            idempotency_key: idempotency_key
                .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string),
        };

        let customer = self.gateway.create_customer_subscription(&request).await?;
        let card = card_from_customer(user, &customer)?;

        let mut updated = user.clone();
        updated.begin_subscription(customer.id.clone(), name);
        let subscription = Subscription::new(user.id, plan, coupon.as_deref());

        let redeemed = self
            .store
            .activate_subscription(&updated, &subscription, &card)
            .await?;
        *user = updated;

        tracing::info!(
            user_id = %user.id,
            customer_id = %customer.id,
            plan = %plan,
            coupon = ?redeemed.as_ref().map(|c| &c.code),
            "Subscription created"
        );
        Ok(true)
    }

    /// Move `user` to `plan`, optionally applying a coupon.
    pub async fn update(
        &self,
        user: &User,
        plan: &str,
        coupon: Option<&str>,
    ) -> Result<Subscription> {
        let current = self
            .store
            .get_subscription(&user.id)
            .await?
            .ok_or(BillingServiceError::NotSubscribed)?;
        let customer_id = user
            .payment_id
            .as_deref()
            .ok_or(BillingServiceError::NotSubscribed)?;
        self.require_plan(plan)?;
        if current.plan == plan {
            return Err(BillingServiceError::SamePlan(plan.to_string()));
        }

        let coupon = normalize_coupon(coupon);
        self.gateway
            .update_subscription(customer_id, plan, coupon.clone())
            .await?;

        let (subscription, redeemed) = self
            .store
            .change_subscription(&user.id, plan, coupon.as_deref())
            .await?;

        tracing::info!(
            user_id = %user.id,
            from = %current.plan,
            to = %plan,
            coupon = ?redeemed.as_ref().map(|c| &c.code),
            "Subscription updated"
        );
        Ok(subscription)
    }

    /// Cancel `user`'s subscription, dropping the card unless `discard_card` is false.
    pub async fn cancel(&self, user: &mut User, discard_card: bool) -> Result<()> {
        if self.store.get_subscription(&user.id).await?.is_none() {
            return Err(BillingServiceError::NotSubscribed);
        }
        let customer_id = user
            .payment_id
            .clone()
            .ok_or(BillingServiceError::NotSubscribed)?;

        self.gateway.cancel_subscription(&customer_id).await?;

        let mut updated = user.clone();
        updated.end_subscription(Utc::now());
        self.store
            .deactivate_subscription(&updated, discard_card)
            .await?;
        *user = updated;

        tracing::info!(user_id = %user.id, customer_id = %customer_id, discard_card, "Subscription cancelled");
        Ok(())
    }

    /// Replace `user`'s card on file.
    ///
    /// Returns `Ok(false)` without side effects when `token` is missing.
    pub async fn update_payment_method(
        &self,
        user: &mut User,
        name: Option<String>,
        token: Option<&str>,
    ) -> Result<bool> {
        let Some(token) = token else {
            return Ok(false);
        };
        if self.store.get_credit_card(&user.id).await?.is_none() {
            return Err(BillingServiceError::NoPaymentMethod);
        }
        let customer_id = user
            .payment_id
            .clone()
            .ok_or(BillingServiceError::NoPaymentMethod)?;

        let customer = self.gateway.update_card(&customer_id, token).await?;
        let card = card_from_customer(user, &customer)?;

        let mut updated = user.clone();
        updated.name = name;
        self.store.replace_credit_card(&updated, &card).await?;
        *user = updated;

        tracing::info!(user_id = %user.id, brand = %card.brand, last4 = %card.last4, "Payment method updated");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catwatch_core::{default_plans, CardDetails, Coupon, CouponParams, UserId};
    use catwatch_store::MemoryStore;

    use crate::gateway::{MockPaymentGateway, RemoteSubscription};

    fn customer() -> RemoteCustomer {
        RemoteCustomer {
            id: "cus_000".into(),
            card: Some(CardDetails {
                brand: "Visa".into(),
                last4: "4242".into(),
                exp_month: 6,
                exp_year: 2030,
            }),
            subscriptions: vec![],
        }
    }

    fn remote_sub(status: &str) -> RemoteSubscription {
        RemoteSubscription {
            id: "sub_000".into(),
            plan: Some("gold".into()),
            status: status.into(),
        }
    }

    fn service(store: Arc<MemoryStore>, gateway: MockPaymentGateway) -> SubscriptionService {
        SubscriptionService::new(
            store,
            Arc::new(gateway),
            Arc::new(PlanCatalog::new(default_plans())),
        )
    }

    async fn subscribed_user(store: &Arc<MemoryStore>) -> User {
        let mut user = User::new(UserId::generate(), "foo@example.com");
        user.begin_subscription("cus_000", Some("Foo".into()));
        let card = CreditCard::from_details(
            user.id,
            customer().card.as_ref().unwrap(),
            Utc::now().date_naive(),
        )
        .unwrap();
        store
            .activate_subscription(&user, &Subscription::new(user.id, "gold", None), &card)
            .await
            .unwrap();
        user
    }

    #[tokio::test]
    async fn test_create_without_token_does_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_customer_subscription().never();
        let service = service(store.clone(), gateway);

        let mut user = User::new(UserId::generate(), "foo@example.com");
        let created = service
            .create(&mut user, None, "gold", None, None, None)
            .await
            .unwrap();

        assert!(!created);
        assert!(user.payment_id.is_none());
        assert!(store.get_subscription(&user.id).await.unwrap().is_none());
        assert!(store.get_credit_card(&user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_writes_rows_and_redeems_coupon() {
        let store = Arc::new(MemoryStore::new());
        let terms = CouponParams {
            code: Some("10PCTOFF".into()),
            percent_off: Some(10),
            max_redemptions: Some(1),
            ..CouponParams::default()
        }
        .into_terms()
        .unwrap();
        store.insert_coupon(&Coupon::from_terms(terms)).await.unwrap();

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_customer_subscription()
            .withf(|req| {
                req.plan == "gold"
                    && req.coupon.as_deref() == Some("10PCTOFF")
                    && req.idempotency_key == "idem-1"
            })
            .times(1)
            .returning(|_| Ok(customer()));
        let service = service(store.clone(), gateway);

        let mut user = User::new(UserId::generate(), "foo@example.com");
        let created = service
            .create(
                &mut user,
                Some("Foo".into()),
                "gold",
                Some("10pctoff"),
                Some("tok_visa"),
                Some("idem-1"),
            )
            .await
            .unwrap();

        assert!(created);
        assert_eq!(user.payment_id.as_deref(), Some("cus_000"));
        assert_eq!(user.name.as_deref(), Some("Foo"));

        let sub = store.get_subscription(&user.id).await.unwrap().unwrap();
        assert_eq!(sub.plan, "gold");
        assert_eq!(sub.coupon.as_deref(), Some("10PCTOFF"));

        let card = store.get_credit_card(&user.id).await.unwrap().unwrap();
        assert_eq!(card.last4, "4242");

        let coupon = store.get_coupon_by_code("10PCTOFF").await.unwrap().unwrap();
        assert_eq!(coupon.times_redeemed, 1);
        assert!(!coupon.valid);
    }

    #[tokio::test]
    async fn test_create_gateway_failure_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_customer_subscription()
            .returning(|_| Err(GatewayError::CardDeclined("declined".into())));
        let service = service(store.clone(), gateway);

        let mut user = User::new(UserId::generate(), "foo@example.com");
        let err = service
            .create(&mut user, None, "gold", None, Some("tok_bad"), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BillingServiceError::Gateway(GatewayError::CardDeclined(_))
        ));
        assert!(user.payment_id.is_none());
        assert!(store.get_subscription(&user.id).await.unwrap().is_none());
        assert!(store.get_user(&user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_unknown_plan_skips_gateway() {
        let store = Arc::new(MemoryStore::new());
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_customer_subscription().never();
        let service = service(store, gateway);

        let mut user = User::new(UserId::generate(), "foo@example.com");
        let err = service
            .create(&mut user, None, "diamond", None, Some("tok_visa"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingServiceError::Invalid(BillingError::UnknownPlan(_))
        ));
    }

    #[tokio::test]
    async fn test_create_twice_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let mut user = subscribed_user(&store).await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_customer_subscription().never();
        let service = service(store, gateway);

        let err = service
            .create(&mut user, None, "gold", None, Some("tok_visa"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingServiceError::AlreadySubscribed));
    }

    #[tokio::test]
    async fn test_update_changes_plan_and_tolerates_missing_coupon() {
        let store = Arc::new(MemoryStore::new());
        let user = subscribed_user(&store).await;
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_update_subscription()
            .withf(|customer_id, plan, coupon| {
                customer_id == "cus_000" && plan == "platinum" && coupon.as_deref() == Some("GONE")
            })
            .times(1)
            .returning(|_, _, _| Ok(remote_sub("active")));
        let service = service(store.clone(), gateway);

        let sub = service
            .update(&user, "platinum", Some("gone"))
            .await
            .unwrap();

        assert_eq!(sub.plan, "platinum");
        assert_eq!(sub.coupon.as_deref(), Some("GONE"));
    }

    #[tokio::test]
    async fn test_update_to_same_plan_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let user = subscribed_user(&store).await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_update_subscription().never();
        let service = service(store, gateway);

        let err = service.update(&user, "gold", None).await.unwrap_err();
        assert!(matches!(err, BillingServiceError::SamePlan(_)));
    }

    #[tokio::test]
    async fn test_cancel_keeps_card_when_asked() {
        let store = Arc::new(MemoryStore::new());
        let mut user = subscribed_user(&store).await;
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_cancel_subscription()
            .withf(|customer_id| customer_id == "cus_000")
            .times(1)
            .returning(|_| Ok(remote_sub("canceled")));
        let service = service(store.clone(), gateway);

        service.cancel(&mut user, false).await.unwrap();

        assert!(user.payment_id.is_none());
        assert!(user.cancelled_subscription_on.is_some());
        assert!(store.get_subscription(&user.id).await.unwrap().is_none());
        assert!(store.get_credit_card(&user.id).await.unwrap().is_some());
        let saved = store.get_user(&user.id).await.unwrap().unwrap();
        assert!(saved.payment_id.is_none());
    }

    #[tokio::test]
    async fn test_cancel_discards_card_by_default_flag() {
        let store = Arc::new(MemoryStore::new());
        let mut user = subscribed_user(&store).await;
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_cancel_subscription()
            .returning(|_| Ok(remote_sub("canceled")));
        let service = service(store.clone(), gateway);

        service.cancel(&mut user, true).await.unwrap();
        assert!(store.get_credit_card(&user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_gateway_failure_keeps_subscription() {
        let store = Arc::new(MemoryStore::new());
        let mut user = subscribed_user(&store).await;
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_cancel_subscription()
            .returning(|_| Err(GatewayError::Connection("timeout".into())));
        let service = service(store.clone(), gateway);

        assert!(service.cancel(&mut user, true).await.is_err());
        assert_eq!(user.payment_id.as_deref(), Some("cus_000"));
        assert!(store.get_subscription(&user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_payment_method_replaces_card() {
        let store = Arc::new(MemoryStore::new());
        let mut user = subscribed_user(&store).await;
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_update_card()
            .withf(|customer_id, token| customer_id == "cus_000" && token == "tok_mastercard")
            .returning(|_, _| {
                let mut c = customer();
                c.card = Some(CardDetails {
                    brand: "MasterCard".into(),
                    last4: "4444".into(),
                    exp_month: 1,
                    exp_year: 2031,
                });
                Ok(c)
            });
        let service = service(store.clone(), gateway);

        let updated = service
            .update_payment_method(&mut user, Some("Bar".into()), Some("tok_mastercard"))
            .await
            .unwrap();

        assert!(updated);
        assert_eq!(user.name.as_deref(), Some("Bar"));
        let card = store.get_credit_card(&user.id).await.unwrap().unwrap();
        assert_eq!(card.brand, "MasterCard");
        assert_eq!(card.last4, "4444");
    }

    #[tokio::test]
    async fn test_update_payment_method_without_token() {
        let store = Arc::new(MemoryStore::new());
        let mut user = subscribed_user(&store).await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_update_card().never();
        let service = service(store, gateway);

        let updated = service
            .update_payment_method(&mut user, None, None)
            .await
            .unwrap();
        assert!(!updated);
    }
}
