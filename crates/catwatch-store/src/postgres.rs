//! PostgreSQL storage backend.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use catwatch_core::{
    Coupon, CouponId, CreditCard, CreditCardId, Duration, Invoice, InvoiceId, Subscription,
    SubscriptionId, User, UserId,
};

use crate::error::{Result, StoreError};
use crate::Store;

const COUPON_COLUMNS: &str = "id, code, duration, amount_off, percent_off, currency, \
     duration_in_months, max_redemptions, redeem_by, times_redeemed, valid, created_at";

const INVOICE_COLUMNS: &str = "id, user_id, plan, receipt_number, description, \
     period_start_on, period_end_on, currency, tax, tax_percent, total, brand, last4, \
     exp_date, created_at";

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    payment_id: Option<String>,
    cancelled_subscription_on: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_uuid(row.id),
            email: row.email,
            name: row.name,
            payment_id: row.payment_id,
            cancelled_subscription_on: row.cancelled_subscription_on,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    plan: String,
    coupon: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            plan: row.plan,
            coupon: row.coupon,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CreditCardRow {
    id: Uuid,
    user_id: Uuid,
    brand: String,
    last4: String,
    exp_date: NaiveDate,
    is_expiring: bool,
}

impl From<CreditCardRow> for CreditCard {
    fn from(row: CreditCardRow) -> Self {
        Self {
            id: CreditCardId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            brand: row.brand,
            last4: row.last4,
            exp_date: row.exp_date,
            is_expiring: row.is_expiring,
        }
    }
}

#[derive(FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    duration: String,
    amount_off: Option<i64>,
    percent_off: Option<i32>,
    currency: Option<String>,
    duration_in_months: Option<i32>,
    max_redemptions: Option<i32>,
    redeem_by: Option<DateTime<Utc>>,
    times_redeemed: i32,
    valid: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;

    fn try_from(row: CouponRow) -> Result<Self> {
        Ok(Self {
            id: CouponId::from_uuid(row.id),
            code: row.code,
            duration: row.duration.parse::<Duration>()?,
            amount_off: row.amount_off,
            percent_off: row.percent_off,
            currency: row.currency,
            duration_in_months: row.duration_in_months,
            max_redemptions: row.max_redemptions,
            redeem_by: row.redeem_by,
            times_redeemed: row.times_redeemed,
            valid: row.valid,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct InvoiceRow {
    id: Uuid,
    user_id: Option<Uuid>,
    plan: String,
    receipt_number: Option<String>,
    description: Option<String>,
    period_start_on: NaiveDate,
    period_end_on: NaiveDate,
    currency: String,
    tax: Option<i64>,
    tax_percent: Option<f64>,
    total: i64,
    brand: String,
    last4: String,
    exp_date: NaiveDate,
    created_at: DateTime<Utc>,
}

impl From<InvoiceRow> for Invoice {
    fn from(row: InvoiceRow) -> Self {
        Self {
            id: InvoiceId::from_uuid(row.id),
            user_id: row.user_id.map(UserId::from_uuid),
            plan: row.plan,
            receipt_number: row.receipt_number,
            description: row.description,
            period_start_on: row.period_start_on,
            period_end_on: row.period_end_on,
            currency: row.currency,
            tax: row.tax,
            tax_percent: row.tax_percent,
            total: row.total,
            brand: row.brand,
            last4: row.last4,
            exp_date: row.exp_date,
            created_at: row.created_at,
        }
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// PostgreSQL-backed storage.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    async fn upsert_user(tx: &mut Transaction<'_, Postgres>, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, name, payment_id, cancelled_subscription_on, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                 email = EXCLUDED.email,
                 name = EXCLUDED.name,
                 payment_id = EXCLUDED.payment_id,
                 cancelled_subscription_on = EXCLUDED.cancelled_subscription_on",
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.payment_id)
        .bind(user.cancelled_subscription_on)
        .bind(user.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn redeem_in(
        tx: &mut Transaction<'_, Postgres>,
        code: &str,
    ) -> Result<Option<Coupon>> {
        let row: Option<CouponRow> = sqlx::query_as(&format!(
            "UPDATE coupons SET
                 times_redeemed = times_redeemed + 1,
                 valid = CASE
                     WHEN max_redemptions IS NOT NULL AND times_redeemed + 1 >= max_redemptions
                     THEN FALSE
                     ELSE valid
                 END
             WHERE code = $1
             RETURNING {COUPON_COLUMNS}"
        ))
        .bind(code)
        .fetch_optional(&mut **tx)
        .await?;

        if row.is_none() {
            tracing::warn!(code, "Redeemed coupon does not exist");
        }
        row.map(Coupon::try_from).transpose()
    }

    async fn insert_card(tx: &mut Transaction<'_, Postgres>, card: &CreditCard) -> Result<()> {
        sqlx::query(
            "INSERT INTO credit_cards (id, user_id, brand, last4, exp_date, is_expiring)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(card.id.as_uuid())
        .bind(card.user_id.as_uuid())
        .bind(&card.brand)
        .bind(&card.last4)
        .bind(card.exp_date)
        .bind(card.is_expiring)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn put_user(&self, user: &User) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_user(&mut tx, user).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_payment_id(&self, payment_id: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE payment_id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", user_id));
        }
        Ok(())
    }

    async fn get_subscription(&self, user_id: &UserId) -> Result<Option<Subscription>> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as("SELECT * FROM subscriptions WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Subscription::from))
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> =
            sqlx::query_as("SELECT * FROM subscriptions ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn get_credit_card(&self, user_id: &UserId) -> Result<Option<CreditCard>> {
        let row: Option<CreditCardRow> = sqlx::query_as(
            "SELECT * FROM credit_cards WHERE user_id = $1 ORDER BY exp_date DESC LIMIT 1",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CreditCard::from))
    }

    async fn mark_expiring_cards(&self, threshold: NaiveDate) -> Result<u64> {
        let result = sqlx::query("UPDATE credit_cards SET is_expiring = TRUE WHERE exp_date <= $1")
            .bind(threshold)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn activate_subscription(
        &self,
        user: &User,
        subscription: &Subscription,
        card: &CreditCard,
    ) -> Result<Option<Coupon>> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_user(&mut tx, user).await?;

        sqlx::query(
            "INSERT INTO subscriptions (id, user_id, plan, coupon, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_uuid())
        .bind(&subscription.plan)
        .bind(&subscription.coupon)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM credit_cards WHERE user_id = $1")
            .bind(user.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        Self::insert_card(&mut tx, card).await?;

        let redeemed = match subscription.coupon.as_deref() {
            Some(code) => Self::redeem_in(&mut tx, code).await?,
            None => None,
        };

        tx.commit().await?;
        Ok(redeemed)
    }

    async fn change_subscription(
        &self,
        user_id: &UserId,
        plan: &str,
        coupon: Option<&str>,
    ) -> Result<(Subscription, Option<Coupon>)> {
        let code = coupon.map(str::to_uppercase);
        let mut tx = self.pool.begin().await?;

        let row: Option<SubscriptionRow> = sqlx::query_as(
            "UPDATE subscriptions SET
                 plan = $2,
                 coupon = COALESCE($3, coupon),
                 updated_at = NOW()
             WHERE user_id = $1
             RETURNING *",
        )
        .bind(user_id.as_uuid())
        .bind(plan)
        .bind(&code)
        .fetch_optional(&mut *tx)
        .await?;
        let subscription = row
            .map(Subscription::from)
            .ok_or_else(|| StoreError::not_found("subscription", user_id))?;

        let redeemed = match code.as_deref() {
            Some(code) => Self::redeem_in(&mut tx, code).await?,
            None => None,
        };

        tx.commit().await?;
        Ok((subscription, redeemed))
    }

    async fn deactivate_subscription(&self, user: &User, discard_card: bool) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1")
            .bind(user.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("subscription", user.id));
        }

        Self::upsert_user(&mut tx, user).await?;
        if discard_card {
            sqlx::query("DELETE FROM credit_cards WHERE user_id = $1")
                .bind(user.id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn replace_credit_card(&self, user: &User, card: &CreditCard) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_user(&mut tx, user).await?;
        sqlx::query("DELETE FROM credit_cards WHERE user_id = $1")
            .bind(user.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        Self::insert_card(&mut tx, card).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        sqlx::query(
            "INSERT INTO coupons (id, code, duration, amount_off, percent_off, currency,
                 duration_in_months, max_redemptions, redeem_by, times_redeemed, valid, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(coupon.id.as_uuid())
        .bind(&coupon.code)
        .bind(coupon.duration.as_str())
        .bind(coupon.amount_off)
        .bind(coupon.percent_off)
        .bind(&coupon.currency)
        .bind(coupon.duration_in_months)
        .bind(coupon.max_redemptions)
        .bind(coupon.redeem_by)
        .bind(coupon.times_redeemed)
        .bind(coupon.valid)
        .bind(coupon.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_coupon(&self, coupon_id: &CouponId) -> Result<Option<Coupon>> {
        let row: Option<CouponRow> =
            sqlx::query_as(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"))
                .bind(coupon_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Coupon::try_from).transpose()
    }

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let row: Option<CouponRow> =
            sqlx::query_as(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"))
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Coupon::try_from).transpose()
    }

    async fn find_redeemable_coupon(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Coupon>> {
        let row: Option<CouponRow> = sqlx::query_as(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons
             WHERE code = $1 AND valid AND (redeem_by IS NULL OR redeem_by >= $2)"
        ))
        .bind(code)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Coupon::try_from).transpose()
    }

    async fn list_coupons(&self, limit: usize, offset: usize) -> Result<Vec<Coupon>> {
        let rows: Vec<CouponRow> = sqlx::query_as(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Coupon::try_from).collect()
    }

    async fn delete_coupon(&self, coupon_id: &CouponId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = $1")
            .bind(coupon_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn redeem_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        let mut tx = self.pool.begin().await?;
        let coupon = Self::redeem_in(&mut tx, code).await?;
        tx.commit().await?;
        Ok(coupon)
    }

    async fn expire_coupons(&self, compare: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("UPDATE coupons SET valid = FALSE WHERE redeem_by <= $1")
            .bind(compare)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO invoices ({INVOICE_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(invoice.id.as_uuid())
        .bind(invoice.user_id.map(|id| *id.as_uuid()))
        .bind(&invoice.plan)
        .bind(&invoice.receipt_number)
        .bind(&invoice.description)
        .bind(invoice.period_start_on)
        .bind(invoice.period_end_on)
        .bind(&invoice.currency)
        .bind(invoice.tax)
        .bind(invoice.tax_percent)
        .bind(invoice.total)
        .bind(&invoice.brand)
        .bind(&invoice.last4)
        .bind(invoice.exp_date)
        .bind(invoice.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_invoices_by_user(&self, user_id: &UserId, limit: usize) -> Result<Vec<Invoice>> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices
             WHERE user_id = $1
             ORDER BY period_start_on DESC, created_at DESC
             LIMIT $2"
        ))
        .bind(user_id.as_uuid())
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Invoice::from).collect())
    }
}
