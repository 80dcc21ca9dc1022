//! Coupon engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use catwatch_core::{Coupon, CouponId, CouponParams};
use catwatch_store::Store;

use super::Result;
use crate::gateway::PaymentGateway;

/// Creates, looks up, expires and deletes coupons.
#[derive(Clone)]
pub struct CouponService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CouponService {
    /// Create the service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Create a coupon on the gateway, then locally.
    ///
    /// Nothing is stored if validation or the gateway call fails.
    pub async fn create(&self, params: CouponParams) -> Result<Coupon> {
        let terms = params.into_terms()?;
        self.gateway.create_coupon(&terms).await?;

        let coupon = Coupon::from_terms(terms);
        self.store.insert_coupon(&coupon).await?;

        tracing::info!(code = %coupon.code, duration = %coupon.duration, "Coupon created");
        Ok(coupon)
    }

    /// Find a redeemable coupon by code, ignoring case.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let code = code.trim().to_uppercase();
        Ok(self.store.find_redeemable_coupon(&code, Utc::now()).await?)
    }

    /// List coupons, newest first.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Coupon>> {
        Ok(self.store.list_coupons(limit, offset).await?)
    }

    /// Delete each coupon on the gateway and then locally.
    ///
    /// Missing ids and per-item failures are skipped. Returns how many
    /// coupons were actually deleted.
    pub async fn bulk_delete(&self, ids: &[CouponId]) -> usize {
        let mut deleted = 0;

        for id in ids {
            let coupon = match self.store.get_coupon(id).await {
                Ok(Some(coupon)) => coupon,
                Ok(None) => {
                    tracing::debug!(coupon_id = %id, "Coupon already gone, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(coupon_id = %id, error = %e, "Failed to load coupon, skipping");
                    continue;
                }
            };

            match self.gateway.delete_coupon(&coupon.code).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(code = %coupon.code, "Gateway did not delete coupon, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(code = %coupon.code, error = %e, "Gateway coupon delete failed, skipping");
                    continue;
                }
            }

            match self.store.delete_coupon(id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(code = %coupon.code, error = %e, "Coupon deleted on gateway but not locally");
                }
            }
        }

        tracing::info!(requested = ids.len(), deleted, "Bulk coupon delete finished");
        deleted
    }

    /// Invalidate every coupon whose redeem-by date is at or before `compare`.
    pub async fn expire_old_coupons(&self, compare: DateTime<Utc>) -> Result<u64> {
        let expired = self.store.expire_coupons(compare).await?;
        tracing::info!(expired, compare = %compare, "Expired old coupons");
        Ok(expired)
    }
}
