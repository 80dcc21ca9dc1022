//! Storage layer for catwatch billing.
//!
//! This crate persists users and the four billing tables that reference them:
//!
//! - `subscriptions`: the local mirror of a user's active gateway subscription
//! - `credit_cards`: a snapshot of the card held by the gateway
//! - `coupons`: discount codes and their redemption counters
//! - `invoices`: the append-only billing history
//!
//! Two backends implement [`Store`]: [`PgStore`] for PostgreSQL and
//! [`MemoryStore`] for tests and local development.
//!
//! # Example
//!
//! ```no_run
//! use catwatch_core::{User, UserId};
//! use catwatch_store::{MemoryStore, Store};
//!
//! # async fn demo() -> catwatch_store::Result<()> {
//! let store = MemoryStore::new();
//! let user = User::new(UserId::generate(), "foo@example.com");
//! store.put_user(&user).await?;
//!
//! let found = store.get_user(&user.id).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use catwatch_core::{Coupon, CouponId, CreditCard, Invoice, Subscription, User, UserId};

/// The storage trait defining all database operations.
///
/// Compound operations apply every write in a single atomic unit: either all
/// of them are visible afterwards or none are.
#[async_trait]
pub trait Store: Send + Sync {
    /// Check that the backend answers a trivial query.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn ping(&self) -> Result<()>;

    // =========================================================================
    // User Operations
    // =========================================================================

    /// Insert or update a user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the e-mail belongs to another user.
    async fn put_user(&self, user: &User) -> Result<()>;

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>>;

    /// Find the user holding a gateway customer id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_user_by_payment_id(&self, payment_id: &str) -> Result<Option<User>>;

    /// Delete a user along with their subscription and card.
    ///
    /// Invoices are kept with their owner cleared.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn delete_user(&self, user_id: &UserId) -> Result<()>;

    // =========================================================================
    // Subscription and Card Reads
    // =========================================================================

    /// Get a user's subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_subscription(&self, user_id: &UserId) -> Result<Option<Subscription>>;

    /// List every subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Get a user's card on file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_credit_card(&self, user_id: &UserId) -> Result<Option<CreditCard>>;

    /// Flag every card expiring on or before `threshold`.
    ///
    /// Returns the number of cards updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn mark_expiring_cards(&self, threshold: NaiveDate) -> Result<u64>;

    // =========================================================================
    // Compound Subscription Operations
    // =========================================================================

    /// Save the user, insert the subscription and card, and redeem the
    /// subscription's coupon, atomically.
    ///
    /// Returns the coupon after redemption, or `None` if no coupon was given
    /// or it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the user already has a subscription.
    async fn activate_subscription(
        &self,
        user: &User,
        subscription: &Subscription,
        card: &CreditCard,
    ) -> Result<Option<Coupon>>;

    /// Change a subscription's plan and, if given, apply and redeem a coupon.
    ///
    /// Returns the updated subscription and the redeemed coupon, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user has no subscription.
    async fn change_subscription(
        &self,
        user_id: &UserId,
        plan: &str,
        coupon: Option<&str>,
    ) -> Result<(Subscription, Option<Coupon>)>;

    /// Save the user, delete the subscription and, optionally, the card.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user has no subscription.
    async fn deactivate_subscription(&self, user: &User, discard_card: bool) -> Result<()>;

    /// Save the user and swap their card on file for `card`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn replace_credit_card(&self, user: &User, card: &CreditCard) -> Result<()>;

    // =========================================================================
    // Coupon Operations
    // =========================================================================

    /// Insert a new coupon.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the code is taken.
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()>;

    /// Get a coupon by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_coupon(&self, coupon_id: &CouponId) -> Result<Option<Coupon>>;

    /// Get a coupon by its exact (uppercase) code, redeemable or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    /// Get a coupon by exact code if it is redeemable at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_redeemable_coupon(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Coupon>>;

    /// List coupons, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_coupons(&self, limit: usize, offset: usize) -> Result<Vec<Coupon>>;

    /// Delete a coupon. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn delete_coupon(&self, coupon_id: &CouponId) -> Result<bool>;

    /// Count one redemption of `code` as a single conditional update.
    ///
    /// `valid` is cleared in the same write once `max_redemptions` is reached.
    /// Returns the coupon after the update, or `None` if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn redeem_coupon(&self, code: &str) -> Result<Option<Coupon>>;

    /// Invalidate every coupon whose `redeem_by` is at or before `compare`.
    ///
    /// Returns the number of coupons updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn expire_coupons(&self, compare: DateTime<Utc>) -> Result<u64>;

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    /// Append an invoice to the ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<()>;

    /// List a user's invoices, newest billing period first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_invoices_by_user(&self, user_id: &UserId, limit: usize) -> Result<Vec<Invoice>>;
}
