//! In-memory storage backend.
//!
//! Every table sits behind one lock so compound operations are atomic in the
//! same sense as a database transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use catwatch_core::{Coupon, CouponId, CreditCard, Invoice, Subscription, User, UserId};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    subscriptions: HashMap<UserId, Subscription>,
    credit_cards: HashMap<UserId, CreditCard>,
    coupons: HashMap<CouponId, Coupon>,
    invoices: Vec<Invoice>,
}

impl Tables {
    fn put_user(&mut self, user: &User) -> Result<()> {
        let taken = self
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email);
        if taken {
            return Err(StoreError::Conflict(format!("email {} is taken", user.email)));
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    fn redeem(&mut self, code: &str) -> Option<Coupon> {
        let coupon = self.coupons.values_mut().find(|c| c.code == code)?;
        coupon.redeem();
        Some(coupon.clone())
    }
}

/// Storage backend that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invoices across all users, including orphaned ones.
    pub async fn invoice_count(&self) -> usize {
        self.tables.read().await.invoices.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn put_user(&self, user: &User) -> Result<()> {
        self.tables.write().await.put_user(user)
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(user_id).cloned())
    }

    async fn find_user_by_payment_id(&self, payment_id: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(user_id).is_none() {
            return Err(StoreError::not_found("user", user_id));
        }
        tables.subscriptions.remove(user_id);
        tables.credit_cards.remove(user_id);
        for invoice in &mut tables.invoices {
            if invoice.user_id.as_ref() == Some(user_id) {
                invoice.user_id = None;
            }
        }
        Ok(())
    }

    async fn get_subscription(&self, user_id: &UserId) -> Result<Option<Subscription>> {
        Ok(self.tables.read().await.subscriptions.get(user_id).cloned())
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let tables = self.tables.read().await;
        let mut subscriptions: Vec<_> = tables.subscriptions.values().cloned().collect();
        subscriptions.sort_by_key(|s| s.created_at);
        Ok(subscriptions)
    }

    async fn get_credit_card(&self, user_id: &UserId) -> Result<Option<CreditCard>> {
        Ok(self.tables.read().await.credit_cards.get(user_id).cloned())
    }

    async fn mark_expiring_cards(&self, threshold: NaiveDate) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut updated = 0;
        for card in tables.credit_cards.values_mut() {
            if card.exp_date <= threshold {
                card.is_expiring = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn activate_subscription(
        &self,
        user: &User,
        subscription: &Subscription,
        card: &CreditCard,
    ) -> Result<Option<Coupon>> {
        let mut tables = self.tables.write().await;
        if tables.subscriptions.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!(
                "user {} already has a subscription",
                user.id
            )));
        }

        tables.put_user(user)?;
        tables.subscriptions.insert(user.id, subscription.clone());
        tables.credit_cards.insert(user.id, card.clone());

        Ok(subscription
            .coupon
            .as_deref()
            .and_then(|code| tables.redeem(code)))
    }

    async fn change_subscription(
        &self,
        user_id: &UserId,
        plan: &str,
        coupon: Option<&str>,
    ) -> Result<(Subscription, Option<Coupon>)> {
        let mut tables = self.tables.write().await;
        let subscription = tables
            .subscriptions
            .get_mut(user_id)
            .ok_or_else(|| StoreError::not_found("subscription", user_id))?;

        subscription.plan = plan.to_string();
        subscription.updated_at = Utc::now();
        if let Some(code) = coupon {
            subscription.coupon = Some(code.to_uppercase());
        }
        let updated = subscription.clone();

        let redeemed = coupon.and_then(|code| tables.redeem(&code.to_uppercase()));
        Ok((updated, redeemed))
    }

    async fn deactivate_subscription(&self, user: &User, discard_card: bool) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.subscriptions.contains_key(&user.id) {
            return Err(StoreError::not_found("subscription", user.id));
        }

        tables.put_user(user)?;
        tables.subscriptions.remove(&user.id);
        if discard_card {
            tables.credit_cards.remove(&user.id);
        }
        Ok(())
    }

    async fn replace_credit_card(&self, user: &User, card: &CreditCard) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.put_user(user)?;
        tables.credit_cards.insert(user.id, card.clone());
        Ok(())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.coupons.values().any(|c| c.code == coupon.code) {
            return Err(StoreError::Conflict(format!(
                "coupon code {} is taken",
                coupon.code
            )));
        }
        tables.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn get_coupon(&self, coupon_id: &CouponId) -> Result<Option<Coupon>> {
        Ok(self.tables.read().await.coupons.get(coupon_id).cloned())
    }

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let tables = self.tables.read().await;
        Ok(tables.coupons.values().find(|c| c.code == code).cloned())
    }

    async fn find_redeemable_coupon(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Coupon>> {
        let tables = self.tables.read().await;
        Ok(tables
            .coupons
            .values()
            .find(|c| c.code == code && c.is_redeemable(now))
            .cloned())
    }

    async fn list_coupons(&self, limit: usize, offset: usize) -> Result<Vec<Coupon>> {
        let tables = self.tables.read().await;
        let mut coupons: Vec<_> = tables.coupons.values().cloned().collect();
        coupons.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(coupons.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_coupon(&self, coupon_id: &CouponId) -> Result<bool> {
        Ok(self.tables.write().await.coupons.remove(coupon_id).is_some())
    }

    async fn redeem_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.tables.write().await.redeem(code))
    }

    async fn expire_coupons(&self, compare: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut updated = 0;
        for coupon in tables.coupons.values_mut() {
            if coupon.is_expired_at(compare) {
                coupon.valid = false;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<()> {
        self.tables.write().await.invoices.push(invoice.clone());
        Ok(())
    }

    async fn list_invoices_by_user(&self, user_id: &UserId, limit: usize) -> Result<Vec<Invoice>> {
        let tables = self.tables.read().await;
        let mut invoices: Vec<_> = tables
            .invoices
            .iter()
            .filter(|i| i.user_id.as_ref() == Some(user_id))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| {
            b.period_start_on
                .cmp(&a.period_start_on)
                .then(b.created_at.cmp(&a.created_at))
        });
        invoices.truncate(limit);
        Ok(invoices)
    }
}
