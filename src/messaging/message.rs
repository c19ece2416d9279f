use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::JobType;

/// Queue message for a sync job. Jobs carry no business payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJobMessage {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub max_retries: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl SyncJobMessage {
    pub fn new(job_type: JobType, max_retries: u32) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            job_type,
            max_retries,
            enqueued_at: Utc::now(),
        }
    }
}

/// Handle returned by a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub job_type: JobType,
    /// Broker-assigned message id
    pub message_id: i64,
    pub queue_name: String,
}

/// A job handed to a worker by the broker
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message_id: i64,
    pub message: SyncJobMessage,
    /// 1-based delivery count
    pub attempt: u32,
}

impl Delivery {
    /// True when a failure on this attempt exhausts the retry budget
    pub fn is_final_attempt(&self) -> bool {
        self.attempt > self.message.max_retries
    }

    pub fn job_type(&self) -> JobType {
        self.message.job_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_attempt_after_max_retries() {
        let message = SyncJobMessage::new(JobType::Orders, 3);
        let delivery = |attempt| Delivery {
            message_id: 1,
            message: message.clone(),
            attempt,
        };

        assert!(!delivery(1).is_final_attempt());
        assert!(!delivery(3).is_final_attempt());
        assert!(delivery(4).is_final_attempt());
    }

    #[test]
    fn test_message_serializes_job_tag() {
        let message = SyncJobMessage::new(JobType::Customers, 3);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["job_type"], "sync:customers");
        let parsed: SyncJobMessage = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, message);
    }
}
