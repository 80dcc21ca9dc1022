//! Recurring sweeps.
//!
//! The scheduler only enqueues jobs; the job worker runs them.

use tokio_cron_scheduler::{Job as CronJob, JobScheduler, JobSchedulerError};

use crate::config::ServiceConfig;
use crate::jobs::{Job, JobQueue};

fn enqueue_on(schedule: &str, queue: &JobQueue, jobs: Vec<Job>) -> Result<CronJob, JobSchedulerError> {
    let queue = queue.clone();
    CronJob::new_async(schedule, move |_uuid, _l| {
        let queue = queue.clone();
        let jobs = jobs.clone();
        Box::pin(async move {
            for job in jobs {
                let name = job.name();
                if let Err(e) = queue.submit(job) {
                    tracing::error!(job = name, error = %e, "Failed to enqueue scheduled job");
                }
            }
        })
    })
}

/// Start the scheduler with the card/coupon sweeps and the reconciliation sweep.
///
/// # Errors
///
/// Returns an error if a cron expression is invalid or the scheduler fails
/// to start.
pub async fn start(config: &ServiceConfig, queue: &JobQueue) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    scheduler
        .add(enqueue_on(
            &config.sweep_schedule,
            queue,
            vec![Job::MarkOldCreditCards, Job::ExpireOldCoupons],
        )?)
        .await?;
    tracing::info!(schedule = %config.sweep_schedule, "Scheduled: credit card and coupon sweeps");

    scheduler
        .add(enqueue_on(&config.reconcile_schedule, queue, vec![Job::Reconcile])?)
        .await?;
    tracing::info!(schedule = %config.reconcile_schedule, "Scheduled: gateway reconciliation");

    scheduler.start().await?;
    Ok(scheduler)
}
