use crate::payments::callback::CallbackChannel;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::expiry::ExpiryScheduler;
use crate::payments::locks::{OrderLockGuard, OrderLocks};
use crate::payments::meta;
use crate::payments::order::{Order, OrderStore};
use crate::payments::types::{FieldMap, OrderId, OrderStatus, PaymentType, TradeStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    MarkedPaid,
    MarkedFailed,
    /// Fields stored; the trade status does not move the order.
    Recorded,
    /// Order was already paid; only the audit note was added.
    Duplicate,
}

const BASE_FIELDS: &[(&str, &str)] = &[
    (meta::STATUS, "Status"),
    (meta::MESSAGE, "Message"),
    (meta::ORDER_NO, "MerTradeNo"),
    (meta::TRADE_NO, "TradeNo"),
    (meta::TRADE_STATUS, "TradeStatus"),
    (meta::TRADE_AMOUNT, "TradeAmt"),
    (meta::PAYMENT_TYPE, "PaymentType"),
    (meta::CREDIT_RES_CODE, "ResCode"),
    (meta::CREDIT_RES_CODE_MSG, "ResCodeMsg"),
];

const CREDIT_FIELDS: &[(&str, &str)] = &[
    (meta::CREDIT_AUTH_TYPE, "AuthType"),
    (meta::CREDIT_CARD_4NO, "Card4No"),
    (meta::CREDIT_AUTH_DAY, "AuthDay"),
    (meta::CREDIT_AUTH_TIME, "AuthTime"),
];

const CREDIT_INSTALLMENT_FIELDS: &[(&str, &str)] = &[
    (meta::CREDIT_INSTALL, "CardInst"),
    (meta::CREDIT_FIRST_AMT, "FirstAmt"),
    (meta::CREDIT_EACH_AMT, "EachAmt"),
];

const ATM_FIELDS: &[(&str, &str)] = &[
    (meta::ATM_PAY_NO, "PayNo"),
    (meta::ATM_BANK_TYPE, "BankType"),
    (meta::ATM_PAY_TIME, "PayTime"),
    (meta::ATM_ACCOUNT_5NO, "Account5No"),
    (meta::ATM_PAY_SET, "PaySet"),
    (meta::ATM_EXPIRE_DATE, "ExpireDate"),
];

const CVS_FIELDS: &[(&str, &str)] = &[
    (meta::CVS_PAY_NO, "PayNo"),
    (meta::CVS_STORE, "Store"),
    (meta::CVS_EXPIRE_DATE, "ExpireDate"),
];

const AFTEE_FIELDS: &[(&str, &str)] = &[
    (meta::AFTEE_PAY_NO, "PayNo"),
    (meta::AFTEE_PAY_TIME, "PayTime"),
];

const LINE_PAY_FIELDS: &[(&str, &str)] = &[(meta::LINE_PAY_NO, "PayNo")];

fn field<'a>(payload: &'a FieldMap, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Method-specific fields to persist for a callback's `PaymentType`.
fn method_fields(payload: &FieldMap) -> Vec<&'static [(&'static str, &'static str)]> {
    match field(payload, "PaymentType").and_then(PaymentType::from_code) {
        Some(PaymentType::Credit) => {
            if field(payload, "AuthType") == Some("2") {
                vec![CREDIT_FIELDS, CREDIT_INSTALLMENT_FIELDS]
            } else {
                vec![CREDIT_FIELDS]
            }
        }
        Some(PaymentType::Atm) => vec![ATM_FIELDS],
        Some(PaymentType::Cvs) => vec![CVS_FIELDS],
        Some(PaymentType::Aftee) => vec![AFTEE_FIELDS],
        Some(PaymentType::LinePay) => vec![LINE_PAY_FIELDS],
        _ => Vec::new(),
    }
}

/// Writes callback fields onto the order under the current key generation.
pub fn persist_transaction_fields(order: &mut Order, payload: &FieldMap) {
    let tables = std::iter::once(BASE_FIELDS).chain(method_fields(payload));
    for table in tables {
        for (meta_key, data_key) in table.iter() {
            let Some(value) = field(payload, data_key) else {
                continue;
            };
            let value = if *data_key == "Store" && value == "SEVEN" {
                "7-11"
            } else {
                value
            };
            order.set_meta(*meta_key, value);
        }
    }
    order.set_meta(meta::PLUGIN_VERSION, meta::META_SCHEMA_VERSION);
}

pub fn audit_note(channel: CallbackChannel, payload: &FieldMap) -> String {
    let get = |key: &str| field(payload, key).unwrap_or_default();
    let trade_status = field(payload, "TradeStatus")
        .and_then(TradeStatus::from_code)
        .map(|s| s.label())
        .unwrap_or("Unknown");
    let payment_type = field(payload, "PaymentType")
        .and_then(PaymentType::from_code)
        .map(|t| t.label())
        .unwrap_or("Unknown");

    format!(
        "{}\nStatus code: {}\nTrade status: {} ({})\nTransaction message: {}\nMerTradeNo: {}\nUNi number: {}\nPayment type: {}",
        channel.label(),
        get("Status"),
        trade_status,
        get("TradeStatus"),
        get("Message"),
        get("MerTradeNo"),
        get("TradeNo"),
        payment_type,
    )
}

pub struct Reconciler {
    store: Arc<dyn OrderStore>,
    expiry: Arc<ExpiryScheduler>,
    locks: Arc<OrderLocks>,
}

impl Reconciler {
    /// Takes its order locks from `expiry`; both must serialise on the same set.
    pub fn new(store: Arc<dyn OrderStore>, expiry: Arc<ExpiryScheduler>) -> Self {
        let locks = expiry.order_locks();
        Self {
            store,
            expiry,
            locks,
        }
    }

    /// Exclusive access to `order_id` for writers outside reconciliation.
    pub async fn lock_order(&self, order_id: OrderId) -> OrderLockGuard<'_> {
        self.locks.lock(order_id).await
    }

    /// Applies one decrypted callback to the order, at most once per payment.
    pub async fn apply(
        &self,
        order_id: OrderId,
        payload: &FieldMap,
        channel: CallbackChannel,
    ) -> PaymentResult<ReconcileOutcome> {
        let _guard = self.locks.lock(order_id).await;
        self.apply_locked(order_id, payload, channel).await
    }

    async fn apply_locked(
        &self,
        order_id: OrderId,
        payload: &FieldMap,
        channel: CallbackChannel,
    ) -> PaymentResult<ReconcileOutcome> {
        // Reload inside the lock so the guard sees the latest durable state.
        let mut order = self
            .store
            .load(order_id)
            .await?
            .ok_or_else(|| PaymentError::UnknownOrder {
                reference: order_id.to_string(),
            })?;

        self.store
            .append_note(&mut order, &audit_note(channel, payload))
            .await?;

        let stored_status = meta::read(&order, meta::TRADE_STATUS);
        if order.is_paid() || stored_status == Some(TradeStatus::Paid.code()) {
            info!(
                order_id = order_id,
                channel = channel.as_str(),
                "order already paid; callback recorded only"
            );
            return Ok(ReconcileOutcome::Duplicate);
        }

        persist_transaction_fields(&mut order, payload);
        self.store.save(&order).await?;

        let trade_status = field(payload, "TradeStatus").and_then(TradeStatus::from_code);
        let outcome = match trade_status {
            Some(TradeStatus::Paid) => {
                let reference = field(payload, "TradeNo")
                    .or_else(|| field(payload, "MerTradeNo"))
                    .unwrap_or_default()
                    .to_string();
                self.store.mark_paid(&mut order, &reference).await?;
                info!(
                    order_id = order_id,
                    trade_no = %reference,
                    channel = channel.as_str(),
                    "payment completed"
                );
                ReconcileOutcome::MarkedPaid
            }
            Some(status @ (TradeStatus::Fail | TradeStatus::Cancel | TradeStatus::Expired)) => {
                let note = format!("PAYUNi trade status: {}.", status.label());
                self.store
                    .mark_status(&mut order, OrderStatus::Failed, Some(&note))
                    .await?;
                info!(
                    order_id = order_id,
                    trade_status = status.code(),
                    channel = channel.as_str(),
                    "order marked failed"
                );
                ReconcileOutcome::MarkedFailed
            }
            other => {
                debug!(
                    order_id = order_id,
                    trade_status = ?other,
                    "informational trade status recorded"
                );
                ReconcileOutcome::Recorded
            }
        };

        if let Err(e) = self.expiry.on_trade_status_updated(&mut order).await {
            warn!(order_id = order_id, error = %e, "failed to update auto-cancellation schedule");
        }

        Ok(outcome)
    }
}
