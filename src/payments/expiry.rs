//! Deferred auto-cancellation for ATM and convenience-store orders.
//!
//! Those methods hand the shopper a payment code with a deadline. Once a callback
//! reports the deadline, a one-shot task is (re)scheduled for the following midnight
//! in the business timezone plus a grace delay. Terminal trade statuses and manual
//! status changes remove the task again.

use crate::config::SettingsHandle;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::locks::OrderLocks;
use crate::payments::meta;
use crate::payments::method::PaymentMethod;
use crate::payments::methods::EXPIRY_METHOD_IDS;
use crate::payments::order::{Order, OrderStore};
use crate::payments::registry::MethodRegistry;
use crate::payments::scheduler::{
    ScheduledTask, TaskHandler, TaskScheduler, CANCEL_EXPIRED_ORDER_TASK,
};
use crate::payments::types::{OrderId, OrderStatus, TradeStatus};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{info, warn};

pub const SCHEDULE_REMOVED_NOTE: &str = "Auto-cancellation schedule removed.";
pub const AUTO_CANCELLED_NOTE: &str = "Order auto-cancelled: payment has expired.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Method has no payment window, or scheduling is switched off.
    NotApplicable,
    Unscheduled { had_task: bool },
    Scheduled { fire_at: DateTime<FixedOffset> },
    /// Expiry date missing or unreadable; nothing scheduled.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryOutcome {
    Cancelled,
    FeatureDisabled,
    OrderMissing,
    NotEligible,
    AlreadySettled,
    NotAwaitingPayment(OrderStatus),
}

/// Fire time for a payment deadline: midnight after `expire_date`, plus `delay_minutes`.
///
/// Accepts `Y-m-d H:i:s` and `Y-m-d`; the time part is ignored.
pub fn compute_fire_time(
    expire_date: &str,
    offset: FixedOffset,
    delay_minutes: u32,
) -> Option<DateTime<FixedOffset>> {
    let raw = expire_date.trim();
    let date = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()?;
    let midnight = date.succ_opt()?.and_hms_opt(0, 0, 0)?;
    let local = offset.from_local_datetime(&midnight).single()?;
    Some(local + Duration::minutes(i64::from(delay_minutes)))
}

pub struct ExpiryScheduler {
    settings: SettingsHandle,
    store: Arc<dyn OrderStore>,
    scheduler: Arc<dyn TaskScheduler>,
    registry: Arc<MethodRegistry>,
    locks: Arc<OrderLocks>,
}

impl ExpiryScheduler {
    pub fn new(
        settings: SettingsHandle,
        store: Arc<dyn OrderStore>,
        scheduler: Arc<dyn TaskScheduler>,
        registry: Arc<MethodRegistry>,
        locks: Arc<OrderLocks>,
    ) -> Self {
        Self {
            settings,
            store,
            scheduler,
            registry,
            locks,
        }
    }

    pub fn order_locks(&self) -> Arc<OrderLocks> {
        self.locks.clone()
    }

    async fn load(&self, order_id: OrderId) -> PaymentResult<Order> {
        self.store
            .load(order_id)
            .await?
            .ok_or_else(|| PaymentError::UnknownOrder {
                reference: order_id.to_string(),
            })
    }

    fn eligible_method(&self, order: &Order) -> Option<Arc<dyn PaymentMethod>> {
        self.registry
            .for_order(order)
            .filter(|method| EXPIRY_METHOD_IDS.contains(&method.id()) && method.has_expiry_window())
    }

    async fn remove_schedule(&self, order: &mut Order) -> PaymentResult<bool> {
        let task = ScheduledTask::cancel_expired_order(order.id);
        let had_task = self.scheduler.next_scheduled(&task).await?.is_some();
        self.scheduler.unschedule(&task).await?;
        if had_task {
            self.store.append_note(order, SCHEDULE_REMOVED_NOTE).await?;
            info!(order_id = order.id, "auto-cancellation unscheduled");
        }
        Ok(had_task)
    }

    async fn replace_schedule(
        &self,
        order: &mut Order,
        fire_at: DateTime<FixedOffset>,
    ) -> PaymentResult<()> {
        let task = ScheduledTask::cancel_expired_order(order.id);
        self.scheduler.unschedule(&task).await?;
        self.scheduler
            .schedule_once(&task, fire_at.with_timezone(&Utc))
            .await?;

        let note = format!(
            "Auto-cancellation scheduled for {}.",
            fire_at.format("%Y-%m-%d %H:%M:%S %:z")
        );
        self.store.append_note(order, &note).await?;
        info!(order_id = order.id, fire_at = %fire_at, "auto-cancellation scheduled");
        Ok(())
    }

    /// Keeps the schedule in line with the trade status just persisted on `order`.
    ///
    /// Runs inside the caller's order lock and never takes it itself.
    pub async fn on_trade_status_updated(&self, order: &mut Order) -> PaymentResult<ScheduleOutcome> {
        let Some(method) = self.eligible_method(order) else {
            return Ok(ScheduleOutcome::NotApplicable);
        };

        let trade_status = meta::read(order, meta::TRADE_STATUS).and_then(TradeStatus::from_code);
        if trade_status.is_some_and(|status| status.is_terminal()) {
            let had_task = self.remove_schedule(order).await?;
            return Ok(ScheduleOutcome::Unscheduled { had_task });
        }

        let settings = self.settings.snapshot();
        if !settings.auto_cancel_enabled {
            return Ok(ScheduleOutcome::NotApplicable);
        }

        let Some(expiry_key) = method.expiry_meta_key() else {
            return Ok(ScheduleOutcome::NotApplicable);
        };
        let Some(expire_date) = meta::read(order, expiry_key).map(str::to_string) else {
            warn!(order_id = order.id, "payment deadline missing; auto-cancellation skipped");
            return Ok(ScheduleOutcome::Skipped {
                reason: "expiry date missing".to_string(),
            });
        };
        let Some(fire_at) = compute_fire_time(
            &expire_date,
            settings.business_offset,
            settings.auto_cancel_delay_minutes,
        ) else {
            warn!(
                order_id = order.id,
                expire_date = %expire_date,
                "unparseable payment deadline; auto-cancellation skipped"
            );
            return Ok(ScheduleOutcome::Skipped {
                reason: format!("unparseable expiry date {}", expire_date),
            });
        };

        self.replace_schedule(order, fire_at).await?;
        Ok(ScheduleOutcome::Scheduled { fire_at })
    }

    /// Operator-triggered (re)scheduling; every precondition failure is an error.
    pub async fn schedule_manually(&self, order_id: OrderId) -> PaymentResult<DateTime<FixedOffset>> {
        let settings = self.settings.snapshot();
        if !settings.auto_cancel_enabled {
            return Err(PaymentError::domain("auto-cancellation is disabled"));
        }

        let _guard = self.locks.lock(order_id).await;
        let mut order = self.load(order_id).await?;
        let method = self.eligible_method(&order).ok_or_else(|| {
            PaymentError::domain(format!(
                "payment method {} has no payment deadline",
                order.payment_method
            ))
        })?;
        if order.is_paid() || !order.status.is_awaiting_payment() {
            return Err(PaymentError::domain(format!(
                "order in status {} cannot be auto-cancelled",
                order.status
            )));
        }

        let expire_date = method
            .expiry_meta_key()
            .and_then(|key| meta::read(&order, key))
            .map(str::to_string)
            .ok_or_else(|| PaymentError::validation("order has no payment deadline yet", None))?;
        let fire_at = compute_fire_time(
            &expire_date,
            settings.business_offset,
            settings.auto_cancel_delay_minutes,
        )
        .ok_or_else(|| {
            PaymentError::validation(format!("unparseable expiry date {}", expire_date), None)
        })?;

        self.replace_schedule(&mut order, fire_at).await?;
        Ok(fire_at)
    }

    /// Applies an operator status change and drops the schedule unless the order
    /// is still awaiting payment.
    pub async fn apply_manual_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> PaymentResult<Order> {
        let _guard = self.locks.lock(order_id).await;
        let mut order = self.load(order_id).await?;

        let note = format!("Order status changed from {} to {} by operator.", order.status, status);
        self.store.mark_status(&mut order, status, Some(&note)).await?;

        if !status.is_awaiting_payment() && self.eligible_method(&order).is_some() {
            self.remove_schedule(&mut order).await?;
        }
        Ok(order)
    }

    /// Body of the deferred task.
    pub async fn cancel_if_expired(&self, order_id: OrderId) -> PaymentResult<ExpiryOutcome> {
        if !self.settings.snapshot().auto_cancel_enabled {
            return Ok(ExpiryOutcome::FeatureDisabled);
        }

        let _guard = self.locks.lock(order_id).await;
        let Some(mut order) = self.store.load(order_id).await? else {
            warn!(order_id = order_id, "expired order no longer exists");
            return Ok(ExpiryOutcome::OrderMissing);
        };
        if self.eligible_method(&order).is_none() {
            return Ok(ExpiryOutcome::NotEligible);
        }

        let trade_status = meta::read(&order, meta::TRADE_STATUS).and_then(TradeStatus::from_code);
        if order.is_paid() || trade_status.is_some_and(|status| status.is_terminal()) {
            return Ok(ExpiryOutcome::AlreadySettled);
        }
        if !order.status.is_awaiting_payment() {
            return Ok(ExpiryOutcome::NotAwaitingPayment(order.status));
        }

        self.store
            .mark_status(&mut order, OrderStatus::Cancelled, Some(AUTO_CANCELLED_NOTE))
            .await?;
        info!(order_id = order_id, "order auto-cancelled after payment deadline");
        Ok(ExpiryOutcome::Cancelled)
    }
}

#[async_trait]
impl TaskHandler for ExpiryScheduler {
    fn handles(&self, task_name: &str) -> bool {
        task_name == CANCEL_EXPIRED_ORDER_TASK
    }

    async fn run(&self, task: &ScheduledTask) -> PaymentResult<()> {
        let outcome = self.cancel_if_expired(task.order_id).await?;
        info!(order_id = task.order_id, outcome = ?outcome, "expiry task finished");
        Ok(())
    }
}
