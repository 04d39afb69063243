//! Inbound gateway callbacks.
//!
//! PAYUNi reports results twice: a server-to-server notify (authoritative, may be
//! retried) and a browser return (best effort). Both are validated and decrypted
//! here, then handed to the [`Reconciler`]. Nothing on this surface propagates an
//! error; every path ends in a [`CallbackOutcome`].

use crate::config::SettingsHandle;
use crate::payments::crypto;
use crate::payments::error::PaymentError;
use crate::payments::meta;
use crate::payments::order::OrderStore;
use crate::payments::order_ref;
use crate::payments::reconciler::{ReconcileOutcome, Reconciler};
use crate::payments::types::{FieldMap, OrderId};
use crate::payments::utils::secure_eq;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackChannel {
    Notify,
    Return,
}

impl CallbackChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackChannel::Notify => "notify",
            CallbackChannel::Return => "return",
        }
    }

    /// Heading of the audit note a callback leaves on the order.
    pub fn label(&self) -> &'static str {
        match self {
            CallbackChannel::Notify => "PAYUNi Notify",
            CallbackChannel::Return => "PAYUNi Return",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Unauthenticated or undecryptable; nothing was read from the payload.
    Rejected { reason: String },
    /// Authentic, but could not be applied to an order.
    Ignored { reason: String },
    Invoice { order_id: OrderId },
    Reconciled {
        order_id: OrderId,
        outcome: ReconcileOutcome,
    },
    Duplicate { order_id: OrderId },
}

impl CallbackOutcome {
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            CallbackOutcome::Invoice { order_id }
            | CallbackOutcome::Reconciled { order_id, .. }
            | CallbackOutcome::Duplicate { order_id } => Some(*order_id),
            CallbackOutcome::Rejected { .. } | CallbackOutcome::Ignored { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnRedirect {
    pub location: String,
    pub outcome: CallbackOutcome,
}

const EINVOICE_FIELDS: &[(&str, &str)] = &[
    (meta::EINVOICE_NO, "InvoiceNo"),
    (meta::EINVOICE_AMT, "TradeAmt"),
    (meta::EINVOICE_TIME, "InvoiceTime"),
    (meta::EINVOICE_TYPE, "InvoiceNotifyType"),
    (meta::EINVOICE_INFO, "InvoiceInfo"),
    (meta::EINVOICE_STATUS, "InvoiceStatus"),
];

fn is_invoice_notification(payload: &FieldMap) -> bool {
    payload
        .get("InvoiceNo")
        .is_some_and(|value| !value.trim().is_empty())
}

pub struct CallbackReceiver {
    settings: SettingsHandle,
    store: Arc<dyn OrderStore>,
    reconciler: Arc<Reconciler>,
}

impl CallbackReceiver {
    pub fn new(
        settings: SettingsHandle,
        store: Arc<dyn OrderStore>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            settings,
            store,
            reconciler,
        }
    }

    /// Backend webhook. The caller answers the gateway with an empty 200 regardless.
    pub async fn receive_notify(&self, form: &FieldMap) -> CallbackOutcome {
        self.receive(CallbackChannel::Notify, form).await
    }

    /// Browser return. Always redirects: to the receipt page once the order is
    /// known, to the shop home otherwise.
    pub async fn receive_return(&self, form: &FieldMap) -> ReturnRedirect {
        let outcome = self.receive(CallbackChannel::Return, form).await;
        let settings = self.settings.snapshot();
        let location = match outcome.order_id() {
            Some(order_id) => settings.receipt_url(order_id),
            None => settings.home_url.clone(),
        };
        ReturnRedirect { location, outcome }
    }

    async fn receive(&self, channel: CallbackChannel, form: &FieldMap) -> CallbackOutcome {
        let payload = match self.open(form) {
            Ok(payload) => payload,
            Err(reason) => {
                warn!(channel = channel.as_str(), reason = %reason, "callback rejected");
                return CallbackOutcome::Rejected { reason };
            }
        };
        debug!(channel = channel.as_str(), payload = ?payload, "callback decrypted");

        let Some(merchant_trade_no) = payload
            .get("MerTradeNo")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
        else {
            warn!(channel = channel.as_str(), "callback without MerTradeNo");
            return CallbackOutcome::Ignored {
                reason: "missing MerTradeNo".to_string(),
            };
        };

        let preferred = self.settings.snapshot().trade_no_format;
        let order =
            match order_ref::resolve_order(self.store.as_ref(), merchant_trade_no, preferred).await
            {
                Ok(order) => order,
                Err(e) => {
                    warn!(
                        channel = channel.as_str(),
                        mer_trade_no = merchant_trade_no,
                        error = %e,
                        "callback for unknown order dropped"
                    );
                    return CallbackOutcome::Ignored {
                        reason: format!("unknown order {}", merchant_trade_no),
                    };
                }
            };

        if channel == CallbackChannel::Notify && is_invoice_notification(&payload) {
            return self.record_invoice(order.id, &payload).await;
        }

        let order_id = order.id;
        match self.reconciler.apply(order_id, &payload, channel).await {
            Ok(ReconcileOutcome::Duplicate) => CallbackOutcome::Duplicate { order_id },
            Ok(outcome) => CallbackOutcome::Reconciled { order_id, outcome },
            Err(e) => {
                error!(
                    order_id = order_id,
                    channel = channel.as_str(),
                    error = %e,
                    "failed to reconcile callback"
                );
                CallbackOutcome::Ignored {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Authenticates the posted envelope and returns its decrypted fields.
    fn open(&self, form: &FieldMap) -> Result<FieldMap, String> {
        if form.is_empty() {
            return Err("empty callback".to_string());
        }

        let settings = self.settings.snapshot();
        let credentials = settings.active_credentials();
        let posted_mer_id = form.get("MerID").map(|v| v.trim()).unwrap_or_default();
        if posted_mer_id.is_empty()
            || !secure_eq(posted_mer_id.as_bytes(), credentials.merchant_id().as_bytes())
        {
            return Err("MerID not found or not matching".to_string());
        }

        let encrypt_info = form
            .get("EncryptInfo")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| "EncryptInfo missing".to_string())?;

        if let Some(posted_hash) = form.get("HashInfo").map(|v| v.trim()).filter(|v| !v.is_empty())
        {
            let expected = crypto::hash(credentials, encrypt_info);
            if !secure_eq(posted_hash.to_ascii_uppercase().as_bytes(), expected.as_bytes()) {
                return Err("HashInfo mismatch".to_string());
            }
        }

        crypto::decrypt(credentials, encrypt_info).map_err(|e| match e {
            PaymentError::CryptoError { message } => format!("decrypt failed: {}", message),
            other => other.to_string(),
        })
    }

    async fn record_invoice(&self, order_id: OrderId, payload: &FieldMap) -> CallbackOutcome {
        let _guard = self.reconciler.lock_order(order_id).await;
        let mut order = match self.store.load(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                return CallbackOutcome::Ignored {
                    reason: format!("order {} vanished", order_id),
                }
            }
            Err(e) => {
                error!(order_id = order_id, error = %e, "failed to reload order for e-invoice");
                return CallbackOutcome::Ignored {
                    reason: e.to_string(),
                };
            }
        };
        for (meta_key, data_key) in EINVOICE_FIELDS {
            if let Some(value) = payload.get(*data_key).filter(|v| !v.is_empty()) {
                order.set_meta(*meta_key, value.as_str());
            }
        }

        let get = |key: &str| payload.get(key).map(String::as_str).unwrap_or_default();
        let note = format!(
            "PAYUNi E-Invoice Notify. InvoiceStatus:{}, InvoiceNo:{}",
            get("InvoiceStatus"),
            get("InvoiceNo")
        );

        let saved = match self.store.save(&order).await {
            Ok(()) => self.store.append_note(&mut order, &note).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            error!(order_id = order_id, error = %e, "failed to store e-invoice notification");
            return CallbackOutcome::Ignored {
                reason: e.to_string(),
            };
        }

        info!(
            order_id = order_id,
            invoice_no = get("InvoiceNo"),
            "e-invoice notification recorded"
        );
        CallbackOutcome::Invoice { order_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support;
    use crate::database::InMemoryOrderStore;
    use crate::payments::crypto::Credentials;
    use crate::payments::expiry::ExpiryScheduler;
    use crate::payments::locks::OrderLocks;
    use crate::payments::methods::CREDIT_ID;
    use crate::payments::order::Order;
    use crate::payments::registry::MethodRegistry;
    use crate::payments::types::{Endpoint, OrderStatus};
    use crate::workers::InMemoryTaskScheduler;
    use rust_decimal::Decimal;

    struct Fixture {
        store: Arc<InMemoryOrderStore>,
        receiver: Arc<CallbackReceiver>,
        reconciler: Arc<Reconciler>,
        settings: SettingsHandle,
    }

    fn fixture() -> Fixture {
        let settings = test_support::handle();
        let store = Arc::new(InMemoryOrderStore::new());
        let registry = Arc::new(MethodRegistry::from_settings(&settings.snapshot()));
        let expiry = Arc::new(ExpiryScheduler::new(
            settings.clone(),
            store.clone(),
            Arc::new(InMemoryTaskScheduler::new()),
            registry,
            Arc::new(OrderLocks::new()),
        ));
        let reconciler = Arc::new(Reconciler::new(store.clone(), expiry));
        let receiver = Arc::new(CallbackReceiver::new(
            settings.clone(),
            store.clone(),
            reconciler.clone(),
        ));
        Fixture {
            store,
            receiver,
            reconciler,
            settings,
        }
    }

    fn sealed_form(credentials: &Credentials, pairs: &[(&str, &str)]) -> FieldMap {
        let fields: FieldMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let envelope = crypto::seal(credentials, Endpoint::Upp.version(), &fields).unwrap();
        envelope.form_fields().into_iter().collect()
    }

    async fn stamped_order(store: &InMemoryOrderStore, id: OrderId) {
        let mut order = Order::new(id, CREDIT_ID, Decimal::new(1200, 0));
        order_ref::encode(&mut order, order_ref::TradeNoFormat::Delimited);
        store.insert(order).await;
    }

    const PAID: &[(&str, &str)] = &[
        ("Status", "SUCCESS"),
        ("MerTradeNo", "500-1"),
        ("TradeNo", "T123"),
        ("TradeStatus", "1"),
        ("PaymentType", "1"),
    ];

    #[tokio::test]
    async fn test_notify_marks_order_paid() {
        let fx = fixture();
        stamped_order(&fx.store, 500).await;
        let form = sealed_form(fx.settings.snapshot().active_credentials(), PAID);

        let outcome = fx.receiver.receive_notify(&form).await;
        assert_eq!(
            outcome,
            CallbackOutcome::Reconciled {
                order_id: 500,
                outcome: ReconcileOutcome::MarkedPaid
            }
        );
        let order = fx.store.get(500).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.transaction_id.as_deref(), Some("T123"));

        let again = fx.receiver.receive_notify(&form).await;
        assert_eq!(again, CallbackOutcome::Duplicate { order_id: 500 });
    }

    #[tokio::test]
    async fn test_rejects_foreign_merchant_id() {
        let fx = fixture();
        stamped_order(&fx.store, 500).await;
        let mut form = sealed_form(fx.settings.snapshot().active_credentials(), PAID);
        form.insert("MerID".to_string(), "S99999999".to_string());

        let outcome = fx.receiver.receive_notify(&form).await;
        assert!(matches!(outcome, CallbackOutcome::Rejected { .. }));
        assert!(fx.store.get(500).await.unwrap().notes.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_and_tampered_forms() {
        let fx = fixture();
        stamped_order(&fx.store, 500).await;
        assert!(matches!(
            fx.receiver.receive_notify(&FieldMap::new()).await,
            CallbackOutcome::Rejected { .. }
        ));

        let mut form = sealed_form(fx.settings.snapshot().active_credentials(), PAID);
        form.remove("HashInfo");
        let info = form.get_mut("EncryptInfo").unwrap();
        let flipped = if info.starts_with('0') { "1" } else { "0" };
        info.replace_range(0..1, flipped);

        assert!(matches!(
            fx.receiver.receive_notify(&form).await,
            CallbackOutcome::Rejected { .. }
        ));
        assert_eq!(fx.store.get(500).await.unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_test_mode_switch_changes_expected_merchant() {
        let fx = fixture();
        stamped_order(&fx.store, 500).await;
        let sandbox_form = sealed_form(fx.settings.snapshot().active_credentials(), PAID);

        fx.settings.set_test_mode(false);
        let outcome = fx.receiver.receive_notify(&sandbox_form).await;
        assert!(matches!(outcome, CallbackOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_unknown_order_is_ignored() {
        let fx = fixture();
        let form = sealed_form(fx.settings.snapshot().active_credentials(), PAID);
        assert!(matches!(
            fx.receiver.receive_notify(&form).await,
            CallbackOutcome::Ignored { .. }
        ));
    }

    #[tokio::test]
    async fn test_invoice_notification_leaves_trade_status_alone() {
        let fx = fixture();
        stamped_order(&fx.store, 500).await;
        let form = sealed_form(
            fx.settings.snapshot().active_credentials(),
            &[
                ("MerTradeNo", "500-1"),
                ("InvoiceNo", "AB12345678"),
                ("InvoiceStatus", "1"),
                ("TradeAmt", "1200"),
                ("TradeStatus", "1"),
            ],
        );

        let outcome = fx.receiver.receive_notify(&form).await;
        assert_eq!(outcome, CallbackOutcome::Invoice { order_id: 500 });

        let order = fx.store.get(500).await.unwrap();
        assert_eq!(order.meta(meta::EINVOICE_NO), Some("AB12345678"));
        assert_eq!(order.meta(meta::EINVOICE_AMT), Some("1200"));
        assert_eq!(order.meta(meta::TRADE_STATUS), None);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(
            order.notes.last().map(String::as_str),
            Some("PAYUNi E-Invoice Notify. InvoiceStatus:1, InvoiceNo:AB12345678")
        );
    }

    #[tokio::test]
    async fn test_invoice_during_settlement_keeps_payment() {
        let fx = fixture();
        stamped_order(&fx.store, 500).await;
        let mut snapshot = fx.store.get(500).await.unwrap();
        let form = sealed_form(
            fx.settings.snapshot().active_credentials(),
            &[
                ("MerTradeNo", "500-1"),
                ("InvoiceNo", "AB12345678"),
                ("InvoiceStatus", "1"),
            ],
        );

        let guard = fx.reconciler.lock_order(500).await;
        let invoice = {
            let receiver = fx.receiver.clone();
            tokio::spawn(async move { receiver.receive_notify(&form).await })
        };
        tokio::task::yield_now().await;
        fx.store.mark_paid(&mut snapshot, "T123").await.unwrap();
        drop(guard);

        assert_eq!(
            invoice.await.unwrap(),
            CallbackOutcome::Invoice { order_id: 500 }
        );
        let order = fx.store.get(500).await.unwrap();
        assert!(order.is_paid());
        assert_eq!(order.transaction_id.as_deref(), Some("T123"));
        assert_eq!(order.meta(meta::EINVOICE_NO), Some("AB12345678"));
    }

    #[tokio::test]
    async fn test_return_redirects_to_receipt_or_home() {
        let fx = fixture();
        stamped_order(&fx.store, 500).await;
        let form = sealed_form(fx.settings.snapshot().active_credentials(), PAID);

        let redirect = fx.receiver.receive_return(&form).await;
        assert_eq!(
            redirect.location,
            "https://shop.example/checkout/order-received/500"
        );

        let rejected = fx.receiver.receive_return(&FieldMap::new()).await;
        assert_eq!(rejected.location, "https://shop.example/");
    }
}
