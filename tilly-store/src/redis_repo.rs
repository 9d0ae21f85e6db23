use async_trait::async_trait;
use chrono::Utc;
use redis::RedisResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tilly_core::notifications::{DeliveryError, NotificationQueue};
use tilly_shared::{NotificationJob, NOTIFY_JOB};
use tracing::{info, warn};
use uuid::Uuid;

use crate::StoreError;

/// A job parked in the delayed set. The id keeps identical payloads apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedJob {
    pub id: Uuid,
    pub name: String,
    pub data: NotificationJob,
}

/// A job held under a lease. `payload` is the exact member stored in redis.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: QueuedJob,
    payload: String,
}

/// Processing-set score of a job claimed at `now_ms`: the moment its lease runs out.
fn lease_deadline(now_ms: i64, lease: Duration) -> i64 {
    now_ms.saturating_add(i64::try_from(lease.as_millis()).unwrap_or(i64::MAX))
}

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    fn delayed_key(name: &str) -> String {
        format!("tilly:queue:{}:delayed", name)
    }

    /// Adds `job` to the delayed set, due `delay` from now.
    pub async fn schedule(&self, job: &QueuedJob, delay: Duration) -> Result<(), StoreError> {
        let payload = serde_json::to_string(job)?;
        let due_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("ZADD")
            .arg(Self::delayed_key(&job.name))
            .arg(due_at)
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    fn processing_key(name: &str) -> String {
        format!("tilly:queue:{}:processing", name)
    }

    /// Claims up to `limit` due jobs under a lease.
    ///
    /// Claimed jobs move to the processing set and stay there until acked.
    /// Leases that expire before an ack are returned to the delayed set first,
    /// so a job whose worker died is handed out again.
    pub async fn claim_due(&self, name: &str, limit: usize, lease: Duration) -> RedisResult<Vec<ClaimedJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = redis::Script::new(
            r#"
            local now = tonumber(ARGV[1])
            local expired = redis.call("ZRANGEBYSCORE", KEYS[2], "-inf", now)
            for _, member in ipairs(expired) do
                redis.call("ZREM", KEYS[2], member)
                redis.call("ZADD", KEYS[1], now, member)
            end
            local due = redis.call("ZRANGEBYSCORE", KEYS[1], "-inf", now, "LIMIT", 0, ARGV[2])
            for _, member in ipairs(due) do
                redis.call("ZREM", KEYS[1], member)
                redis.call("ZADD", KEYS[2], ARGV[3], member)
            end
            return due
        "#,
        );

        let now = Utc::now().timestamp_millis();
        let raw: Vec<String> = script
            .key(Self::delayed_key(name))
            .key(Self::processing_key(name))
            .arg(now)
            .arg(limit)
            .arg(lease_deadline(now, lease))
            .invoke_async(&mut conn)
            .await?;

        let mut jobs = Vec::with_capacity(raw.len());
        for payload in raw {
            match serde_json::from_str::<QueuedJob>(&payload) {
                Ok(job) => jobs.push(ClaimedJob { job, payload }),
                Err(e) => {
                    warn!("Dropping malformed job on queue {}: {}", name, e);
                    redis::cmd("ZREM")
                        .arg(Self::processing_key(name))
                        .arg(&payload)
                        .query_async::<()>(&mut conn)
                        .await?;
                }
            }
        }
        Ok(jobs)
    }

    /// Marks a claimed job as done.
    pub async fn ack(&self, claimed: &ClaimedJob) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("ZREM")
            .arg(Self::processing_key(&claimed.job.name))
            .arg(&claimed.payload)
            .query_async(&mut conn)
            .await
    }

    pub async fn pending(&self, name: &str) -> RedisResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("ZCARD")
            .arg(Self::delayed_key(name))
            .query_async(&mut conn)
            .await
    }
}

#[async_trait]
impl NotificationQueue for RedisClient {
    async fn enqueue(&self, job: &NotificationJob, delay: Duration) -> Result<(), DeliveryError> {
        let queued = QueuedJob {
            id: Uuid::new_v4(),
            name: NOTIFY_JOB.to_string(),
            data: job.clone(),
        };
        self.schedule(&queued, delay)
            .await
            .map_err(|e| DeliveryError::Unavailable(e.to_string()))?;
        info!("Queued {} job {} due in {:?}", queued.name, queued.id, delay);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::RedisConfig;
    use tilly_shared::{NotificationEvent, NotificationType};

    fn job(id: Uuid, name: &str) -> QueuedJob {
        QueuedJob {
            id,
            name: name.to_string(),
            data: NotificationJob {
                notification_type: NotificationType::Mention,
                event: NotificationEvent {
                    workspace_id: 3,
                    actor_id: None,
                    recipient_ids: vec![8],
                    related_resource_id: "1".into(),
                    related_resource_type: "card".into(),
                    title: "Mentioned".into(),
                    message: "You were mentioned".into(),
                    color: None,
                    url: None,
                },
            },
        }
    }

    #[test]
    fn test_queued_job_payload_shape() {
        let value = serde_json::to_value(job(Uuid::nil(), NOTIFY_JOB)).unwrap();
        assert_eq!(value["name"], "notify");
        assert_eq!(value["data"]["type"], "MENTION");
        assert_eq!(value["data"]["event"]["recipientIds"][0], 8);
        assert_eq!(RedisClient::delayed_key("notify"), "tilly:queue:notify:delayed");
        assert_eq!(RedisClient::processing_key("notify"), "tilly:queue:notify:processing");
    }

    #[test]
    fn test_lease_deadline() {
        assert_eq!(lease_deadline(1_000, Duration::from_millis(30_000)), 31_000);
        assert_eq!(lease_deadline(1_000, Duration::ZERO), 1_000);
        assert_eq!(lease_deadline(1_000, Duration::MAX), i64::MAX);
    }

    /// Needs a live server: `TW_REDIS__HOST=localhost cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_expired_lease_is_claimed_again() {
        let Ok(host) = std::env::var("TW_REDIS__HOST") else {
            return;
        };
        let port = std::env::var("TW_REDIS__PORT").ok().and_then(|p| p.parse().ok());
        let url = RedisConfig { host: Some(host), port }.url().unwrap();
        let redis = RedisClient::new(&url).await.unwrap();
        let queue = format!("test-{}", Uuid::new_v4());
        let lease = Duration::from_millis(200);

        let queued = job(Uuid::new_v4(), &queue);
        redis.schedule(&queued, Duration::ZERO).await.unwrap();
        assert_eq!(redis.pending(&queue).await.unwrap(), 1);

        let first = redis.claim_due(&queue, 10, lease).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].job.id, queued.id);
        assert_eq!(redis.pending(&queue).await.unwrap(), 0);
        assert!(redis.claim_due(&queue, 10, lease).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let again = redis.claim_due(&queue, 10, lease).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].job.id, queued.id);

        redis.ack(&again[0]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(redis.claim_due(&queue, 10, lease).await.unwrap().is_empty());
        assert_eq!(redis.pending(&queue).await.unwrap(), 0);
    }
}
