//! Application state.

use std::sync::Arc;

use catwatch_core::PlanCatalog;
use catwatch_store::Store;

use crate::billing::{
    CouponService, CreditCardService, InvoiceService, Reconciler, SubscriptionService,
};
use crate::config::ServiceConfig;
use crate::gateway::PaymentGateway;
use crate::jobs::JobQueue;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Plan catalog shared with the billing services.
    pub plans: Arc<PlanCatalog>,

    /// Payment gateway of record.
    pub gateway: Arc<dyn PaymentGateway>,

    /// Subscription lifecycle.
    pub subscriptions: SubscriptionService,

    /// Coupon engine.
    pub coupons: CouponService,

    /// Card expiry sweep.
    pub credit_cards: CreditCardService,

    /// Invoice ledger.
    pub invoices: InvoiceService,

    /// Gateway reconciliation.
    pub reconciler: Reconciler,

    /// Background job queue.
    pub jobs: JobQueue,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        config: ServiceConfig,
        jobs: JobQueue,
    ) -> Self {
        let plans = Arc::new(config.plans.clone());
        tracing::info!(plans = plans.len(), "Plan catalog loaded");

        Self {
            subscriptions: SubscriptionService::new(store.clone(), gateway.clone(), plans.clone()),
            coupons: CouponService::new(store.clone(), gateway.clone()),
            credit_cards: CreditCardService::new(store.clone()),
            invoices: InvoiceService::new(store.clone(), gateway.clone()),
            reconciler: Reconciler::new(store.clone(), gateway.clone()),
            store,
            config,
            plans,
            gateway,
            jobs,
        }
    }
}
