use crate::payments::error::PaymentResult;
use crate::payments::types::OrderId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CANCEL_EXPIRED_ORDER_TASK: &str = "payuni_cancel_expired_order";
pub const TASK_GROUP: &str = "payuni";

/// A deferred task, identified by name plus arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub name: String,
    pub group: String,
    pub order_id: OrderId,
}

impl ScheduledTask {
    pub fn cancel_expired_order(order_id: OrderId) -> Self {
        Self {
            name: CANCEL_EXPIRED_ORDER_TASK.to_string(),
            group: TASK_GROUP.to_string(),
            order_id,
        }
    }
}

/// One-shot deferred execution, keyed by task identity.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    async fn schedule_once(&self, task: &ScheduledTask, fire_at: DateTime<Utc>)
        -> PaymentResult<()>;

    /// Removes every pending run of `task`. Unknown tasks are not an error.
    async fn unschedule(&self, task: &ScheduledTask) -> PaymentResult<()>;

    async fn next_scheduled(&self, task: &ScheduledTask) -> PaymentResult<Option<DateTime<Utc>>>;
}

/// Callback the scheduler invokes when a task comes due.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn handles(&self, task_name: &str) -> bool;

    async fn run(&self, task: &ScheduledTask) -> PaymentResult<()>;
}
