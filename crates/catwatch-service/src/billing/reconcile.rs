//! Gateway reconciliation sweep.
//!
//! A gateway call can succeed and the process die before the local commit.
//! This sweep compares every local subscription with the gateway and reports
//! the users whose local row has no live remote subscription behind it.

use std::sync::Arc;

use serde::Serialize;

use catwatch_core::UserId;
use catwatch_store::Store;

use super::Result;
use crate::gateway::PaymentGateway;

/// Why a subscription is considered drifted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Drift {
    /// The subscription's user row is gone.
    MissingUser,
    /// The user has a subscription row but no gateway customer id.
    MissingPaymentId,
    /// The gateway doesn't know the customer.
    MissingCustomer,
    /// The customer has no live subscription.
    NoRemoteSubscription,
    /// The live remote plan differs from the local one.
    PlanMismatch {
        /// Local plan id.
        local: String,
        /// Remote plan id.
        remote: String,
    },
}

/// One drifted subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftEntry {
    /// Affected user.
    pub user_id: UserId,
    /// What is wrong.
    pub drift: Drift,
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    /// Subscriptions compared.
    pub checked: usize,
    /// Subscriptions that could not be compared because the gateway failed.
    pub errors: usize,
    /// Subscriptions that differ from the gateway.
    pub drifted: Vec<DriftEntry>,
}

/// Compares local subscriptions with the gateway.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
}

impl Reconciler {
    /// Create the reconciler.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Run one pass. Nothing is modified; drift is logged and returned.
    pub async fn run(&self) -> Result<DriftReport> {
        let mut report = DriftReport::default();

        for subscription in self.store.list_subscriptions().await? {
            report.checked += 1;
            let user_id = subscription.user_id;

            let drift = match self.store.get_user(&user_id).await? {
                None => Some(Drift::MissingUser),
                Some(user) => match user.payment_id {
                    None => Some(Drift::MissingPaymentId),
                    Some(customer_id) => match self.gateway.retrieve_customer(&customer_id).await {
                        Err(e) => {
                            tracing::warn!(user_id = %user_id, error = %e, "Could not reconcile subscription");
                            report.errors += 1;
                            None
                        }
                        Ok(None) => Some(Drift::MissingCustomer),
                        Ok(Some(customer)) => {
                            match customer.subscriptions.iter().find(|s| s.is_live()) {
                                None => Some(Drift::NoRemoteSubscription),
                                Some(remote) => match &remote.plan {
                                    Some(plan) if *plan != subscription.plan => {
                                        Some(Drift::PlanMismatch {
                                            local: subscription.plan.clone(),
                                            remote: plan.clone(),
                                        })
                                    }
                                    _ => None,
                                },
                            }
                        }
                    },
                },
            };

            if let Some(drift) = drift {
                tracing::warn!(user_id = %user_id, drift = ?drift, "Subscription drifted from gateway");
                report.drifted.push(DriftEntry { user_id, drift });
            }
        }

        tracing::info!(
            checked = report.checked,
            drifted = report.drifted.len(),
            errors = report.errors,
            "Reconciliation finished"
        );
        Ok(report)
    }
}
