use crate::payments::error::PaymentResult;
use crate::payments::scheduler::{ScheduledTask, TaskHandler, TaskScheduler};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

/// One pending entry per task identity; scheduling again replaces the fire time.
#[derive(Default)]
pub struct InMemoryTaskScheduler {
    entries: Mutex<HashMap<ScheduledTask, DateTime<Utc>>>,
}

impl InMemoryTaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Removes and returns every task due at `now`, earliest first.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        let mut entries = self.entries.lock().await;
        let mut due: Vec<(ScheduledTask, DateTime<Utc>)> = entries
            .iter()
            .filter(|(_, fire_at)| **fire_at <= now)
            .map(|(task, fire_at)| (task.clone(), *fire_at))
            .collect();
        due.sort_by_key(|(_, fire_at)| *fire_at);
        for (task, _) in &due {
            entries.remove(task);
        }
        due.into_iter().map(|(task, _)| task).collect()
    }
}

#[async_trait]
impl TaskScheduler for InMemoryTaskScheduler {
    async fn schedule_once(
        &self,
        task: &ScheduledTask,
        fire_at: DateTime<Utc>,
    ) -> PaymentResult<()> {
        self.entries.lock().await.insert(task.clone(), fire_at);
        Ok(())
    }

    async fn unschedule(&self, task: &ScheduledTask) -> PaymentResult<()> {
        self.entries.lock().await.remove(task);
        Ok(())
    }

    async fn next_scheduled(&self, task: &ScheduledTask) -> PaymentResult<Option<DateTime<Utc>>> {
        Ok(self.entries.lock().await.get(task).copied())
    }
}

/// Polls the in-memory scheduler and hands due tasks to their handler.
pub struct ScheduledTaskWorker {
    scheduler: Arc<InMemoryTaskScheduler>,
    handlers: Vec<Arc<dyn TaskHandler>>,
    poll_interval: Duration,
}

impl ScheduledTaskWorker {
    pub fn new(
        scheduler: Arc<InMemoryTaskScheduler>,
        handlers: Vec<Arc<dyn TaskHandler>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            handlers,
            poll_interval,
        }
    }

    /// Runs every task due at `now`; returns how many ran successfully.
    pub async fn run_due(&self, now: DateTime<Utc>) -> usize {
        let mut completed = 0;
        for task in self.scheduler.take_due(now).await {
            let Some(handler) = self.handlers.iter().find(|h| h.handles(&task.name)) else {
                warn!(task = %task.name, order_id = task.order_id, "no handler for scheduled task");
                continue;
            };
            match handler.run(&task).await {
                Ok(()) => completed += 1,
                Err(e) => {
                    error!(
                        task = %task.name,
                        order_id = task.order_id,
                        error = %e,
                        "scheduled task failed"
                    );
                }
            }
        }
        completed
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            handlers = self.handlers.len(),
            "scheduled task worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("scheduled task worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    let count = self.run_due(Utc::now()).await;
                    if count > 0 {
                        info!(processed = count, "ran scheduled tasks");
                    }
                }
            }
        }

        info!("scheduled task worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::scheduler::CANCEL_EXPIRED_ORDER_TASK;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl TaskHandler for CountingHandler {
        fn handles(&self, task_name: &str) -> bool {
            task_name == CANCEL_EXPIRED_ORDER_TASK
        }

        async fn run(&self, _task: &ScheduledTask) -> PaymentResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_schedule_replaces_previous_fire_time() {
        let scheduler = InMemoryTaskScheduler::new();
        let task = ScheduledTask::cancel_expired_order(1);
        let first = Utc.with_ymd_and_hms(2024, 1, 10, 16, 10, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 1, 12, 16, 10, 0).unwrap();

        scheduler.schedule_once(&task, first).await.unwrap();
        scheduler.schedule_once(&task, second).await.unwrap();

        assert_eq!(scheduler.len().await, 1);
        assert_eq!(scheduler.next_scheduled(&task).await.unwrap(), Some(second));

        scheduler.unschedule(&task).await.unwrap();
        scheduler.unschedule(&task).await.unwrap();
        assert!(scheduler.is_empty().await);
    }

    #[tokio::test]
    async fn test_worker_runs_only_due_tasks() {
        let scheduler = Arc::new(InMemoryTaskScheduler::new());
        let handler = Arc::new(CountingHandler {
            runs: AtomicUsize::new(0),
        });
        let now = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();

        scheduler
            .schedule_once(
                &ScheduledTask::cancel_expired_order(1),
                now - chrono::Duration::minutes(1),
            )
            .await
            .unwrap();
        scheduler
            .schedule_once(
                &ScheduledTask::cancel_expired_order(2),
                now + chrono::Duration::hours(1),
            )
            .await
            .unwrap();

        let worker = ScheduledTaskWorker::new(
            scheduler.clone(),
            vec![handler.clone() as Arc<dyn TaskHandler>],
            Duration::from_secs(60),
        );
        assert_eq!(worker.run_due(now).await, 1);
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.len().await, 1);
    }
}
