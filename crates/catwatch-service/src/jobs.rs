//! Background job queue.
//!
//! Sweeps and bulk admin actions run outside the request path. Handlers and
//! the scheduler submit a [`Job`] and return immediately; a single worker task
//! executes jobs in order and logs each outcome.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use catwatch_core::{CouponId, UserId};
use catwatch_store::Store;

use crate::billing::{
    BillingServiceError, CouponService, CreditCardService, Reconciler, SubscriptionService,
};
use crate::state::AppState;

/// Pending jobs held before submissions are refused.
pub const QUEUE_CAPACITY: usize = 1024;

/// A unit of background work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Flag cards expiring soon.
    MarkOldCreditCards,
    /// Invalidate coupons past their redeem-by date.
    ExpireOldCoupons,
    /// Delete coupons on the gateway and locally.
    DeleteCoupons(Vec<CouponId>),
    /// Cancel subscriptions and delete users.
    DeleteUsers(Vec<UserId>),
    /// Compare local subscriptions with the gateway.
    Reconcile,
}

impl Job {
    /// Name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MarkOldCreditCards => "mark_old_credit_cards",
            Self::ExpireOldCoupons => "expire_old_coupons",
            Self::DeleteCoupons(_) => "delete_coupons",
            Self::DeleteUsers(_) => "delete_users",
            Self::Reconcile => "reconcile",
        }
    }
}

/// Errors from submitting a job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The queue is full.
    #[error("job queue is full")]
    Full,
    /// The worker has stopped.
    #[error("job worker is not running")]
    Closed,
}

/// Sending half of the job queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Create a queue and the receiver its worker consumes.
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Submit a job without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or the worker has stopped.
    pub fn submit(&self, job: Job) -> Result<(), JobError> {
        let name = job.name();
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => JobError::Full,
            mpsc::error::TrySendError::Closed(_) => JobError::Closed,
        })?;
        tracing::debug!(job = name, "Job queued");
        Ok(())
    }
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Executes jobs.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn Store>,
    subscriptions: SubscriptionService,
    coupons: CouponService,
    credit_cards: CreditCardService,
    reconciler: Reconciler,
}

impl JobRunner {
    /// Build a runner sharing the application's services.
    #[must_use]
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            subscriptions: state.subscriptions.clone(),
            coupons: state.coupons.clone(),
            credit_cards: state.credit_cards.clone(),
            reconciler: state.reconciler.clone(),
        }
    }

    /// Consume jobs until every sender is dropped.
    pub fn spawn(self, mut rx: mpsc::Receiver<Job>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Job worker started");
            while let Some(job) = rx.recv().await {
                let name = job.name();
                match self.run(job).await {
                    Ok(count) => tracing::info!(job = name, count, "Job finished"),
                    Err(e) => tracing::error!(job = name, error = %e, "Job failed"),
                }
            }
            tracing::info!("Job worker stopped");
        })
    }

    /// Run one job. Returns the number of rows or items it affected.
    ///
    /// # Errors
    ///
    /// Returns an error if a sweep's storage call fails. Bulk jobs skip failed
    /// items instead of failing.
    pub async fn run(&self, job: Job) -> Result<u64, BillingServiceError> {
        match job {
            Job::MarkOldCreditCards => {
                self.credit_cards
                    .mark_old_cards(Utc::now().date_naive())
                    .await
            }
            Job::ExpireOldCoupons => self.coupons.expire_old_coupons(Utc::now()).await,
            Job::DeleteCoupons(ids) => Ok(count(self.coupons.bulk_delete(&ids).await)),
            Job::DeleteUsers(ids) => Ok(self.delete_users(&ids).await),
            Job::Reconcile => {
                let report = self.reconciler.run().await?;
                Ok(count(report.drifted.len()))
            }
        }
    }

    /// Cancel each user's subscription, then delete the user.
    ///
    /// A user whose cancellation fails is skipped so nobody is deleted while
    /// still being billed.
    async fn delete_users(&self, ids: &[UserId]) -> u64 {
        let mut deleted = 0;

        for id in ids {
            let mut user = match self.store.get_user(id).await {
                Ok(Some(user)) => user,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(user_id = %id, error = %e, "Failed to load user, skipping");
                    continue;
                }
            };

            match self.store.get_subscription(id).await {
                Ok(Some(_)) => {
                    if let Err(e) = self.subscriptions.cancel(&mut user, true).await {
                        tracing::warn!(user_id = %id, error = %e, "Cancel failed, not deleting user");
                        continue;
                    }
                }
                Ok(None) => {
                    if let Some(payment_id) = &user.payment_id {
                        tracing::warn!(
                            user_id = %id,
                            payment_id = %payment_id,
                            "Deleting user with a gateway customer but no local subscription"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id = %id, error = %e, "Failed to load subscription, skipping");
                    continue;
                }
            }

            match self.store.delete_user(id).await {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!(user_id = %id, error = %e, "Failed to delete user"),
            }
        }

        tracing::info!(requested = ids.len(), deleted, "Bulk user delete finished");
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_refuses_jobs() {
        let (queue, _rx) = JobQueue::channel();
        for _ in 0..QUEUE_CAPACITY {
            queue.submit(Job::Reconcile).unwrap();
        }
        assert!(matches!(
            queue.submit(Job::Reconcile),
            Err(JobError::Full)
        ));
    }

    #[test]
    fn closed_queue_refuses_jobs() {
        let (queue, rx) = JobQueue::channel();
        drop(rx);
        assert!(matches!(
            queue.submit(Job::ExpireOldCoupons),
            Err(JobError::Closed)
        ));
    }
}
