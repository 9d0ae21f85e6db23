use std::sync::Arc;
use tilly_core::notifications::{ChannelOutcome, NotificationService};
use tilly_shared::NOTIFY_JOB;
use tilly_store::RedisClient;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Polls the delayed queue and fans due notification jobs out.
pub async fn start_notification_worker(
    redis: Arc<RedisClient>,
    service: Arc<NotificationService>,
    poll_interval: Duration,
    batch_size: usize,
    lease: Duration,
) {
    info!("Notification worker started, polling every {:?}", poll_interval);
    match redis.pending(NOTIFY_JOB).await {
        Ok(count) => info!("{} notification jobs waiting in the delayed queue", count),
        Err(e) => warn!("Could not read the delayed queue size: {}", e),
    }

    loop {
        match redis.claim_due(NOTIFY_JOB, batch_size, lease).await {
            Ok(jobs) if jobs.is_empty() => sleep(poll_interval).await,
            Ok(jobs) => {
                for claimed in jobs {
                    let job = &claimed.job;
                    info!("Processing {} job {}", job.name, job.id);
                    let reports = service.process_job(&job.data).await;
                    for report in reports {
                        for (channel, outcome) in [("in_app", &report.in_app), ("chat", &report.chat)] {
                            if let ChannelOutcome::Failed(reason) = outcome {
                                warn!(
                                    "Job {}: {} delivery to user {} failed: {}",
                                    job.id, channel, report.recipient_id, reason
                                );
                            }
                        }
                    }
                    if let Err(e) = redis.ack(&claimed).await {
                        error!("Failed to ack job {}, it will be retried: {}", job.id, e);
                    }
                }
            }
            Err(e) => {
                error!("Failed to claim notification jobs: {}", e);
                sleep(poll_interval).await;
            }
        }
    }
}
