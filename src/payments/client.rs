use crate::config::{GatewaySettings, SettingsHandle};
use crate::payments::crypto;
use crate::payments::error::{PaymentError, PaymentResult, QueryFailure};
use crate::payments::locks::OrderLocks;
use crate::payments::meta;
use crate::payments::order::{Order, OrderStore};
use crate::payments::registry::MethodRegistry;
use crate::payments::request_builder::trade_amount;
use crate::payments::types::{Endpoint, FieldMap, OrderId, TradeStatus, TransactionRecord};
use crate::payments::utils::HttpTransport;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SUCCESS_STATUS: &str = "SUCCESS";
/// Query responses nest result rows as `Result[<n>][<Field>]`.
const RESULT_ROW_PREFIX: &str = "Result[0][";

/// How a refund was carried out at the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundOperation {
    /// Authorization voided before capture; the whole charge is released.
    CancelAuthorization,
    /// Captured funds returned through `/trade/close`.
    CloseRefund,
}

impl RefundOperation {
    fn endpoint(&self) -> Endpoint {
        match self {
            RefundOperation::CancelAuthorization => Endpoint::Cancel,
            RefundOperation::CloseRefund => Endpoint::Close,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub operation: RefundOperation,
    pub provider_status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct GatewayResponseBody {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(rename = "EncryptInfo", default)]
    encrypt_info: Option<String>,
}

#[derive(Debug)]
struct GatewayReply {
    status: String,
    message: String,
    decrypted: FieldMap,
}

impl GatewayReply {
    fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }
}

/// Flattens row 0 of a query response into plain field names.
fn first_result_row(decrypted: &FieldMap) -> FieldMap {
    decrypted
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(RESULT_ROW_PREFIX)
                .and_then(|rest| rest.strip_suffix(']'))
                .map(|field| (field.to_string(), value.clone()))
        })
        .collect()
}

/// Active calls against the gateway: transaction query and refund.
pub struct TradeClient {
    settings: SettingsHandle,
    store: Arc<dyn OrderStore>,
    registry: Arc<MethodRegistry>,
    transport: Arc<dyn HttpTransport>,
    locks: Arc<OrderLocks>,
}

impl TradeClient {
    pub fn new(
        settings: SettingsHandle,
        store: Arc<dyn OrderStore>,
        registry: Arc<MethodRegistry>,
        transport: Arc<dyn HttpTransport>,
        locks: Arc<OrderLocks>,
    ) -> Self {
        Self {
            settings,
            store,
            registry,
            transport,
            locks,
        }
    }

    async fn post(
        &self,
        settings: &GatewaySettings,
        endpoint: Endpoint,
        fields: &FieldMap,
    ) -> Result<GatewayReply, QueryFailure> {
        let credentials = settings.active_credentials();
        let envelope = crypto::seal(credentials, endpoint.version(), fields)
            .map_err(|e| QueryFailure::Crypto(e.to_string()))?;
        let url = settings.endpoint_url(endpoint);
        let timeout = Duration::from_secs(settings.http_timeout_secs);

        debug!(url = %url, fields = ?fields, "posting to gateway");
        let response = self
            .transport
            .post_form(&url, &envelope.form_fields(), timeout)
            .await
            .map_err(|e| QueryFailure::Transport(e.to_string()))?;
        if !response.is_success() {
            return Err(QueryFailure::Transport(format!(
                "gateway answered HTTP {}",
                response.status
            )));
        }
        debug!(url = %url, body = %response.body, "gateway response");

        let body: GatewayResponseBody = serde_json::from_str(&response.body)
            .map_err(|e| QueryFailure::MalformedResponse(e.to_string()))?;

        let decrypted = match body.encrypt_info.as_deref().map(str::trim) {
            Some(info) if !info.is_empty() => match crypto::decrypt(credentials, info) {
                Ok(fields) => fields,
                Err(e) if body.status == SUCCESS_STATUS => {
                    return Err(QueryFailure::Crypto(e.to_string()))
                }
                Err(e) => {
                    warn!(url = %url, status = %body.status, error = %e, "undecryptable error response");
                    FieldMap::new()
                }
            },
            _ => FieldMap::new(),
        };

        let message = decrypted
            .get("Message")
            .cloned()
            .or(body.message)
            .unwrap_or_default();

        Ok(GatewayReply {
            status: body.status,
            message,
            decrypted,
        })
    }

    async fn load(&self, order_id: OrderId) -> Result<Order, QueryFailure> {
        self.store
            .load(order_id)
            .await
            .map_err(|e| QueryFailure::Store(e.to_string()))?
            .ok_or(QueryFailure::UnknownOrder(order_id))
    }

    /// Appends `note` to the stored order as it is now, not as it was before
    /// the gateway round trip.
    async fn append_note(&self, order_id: OrderId, note: &str) -> PaymentResult<()> {
        let _guard = self.locks.lock(order_id).await;
        let mut order = self
            .store
            .load(order_id)
            .await?
            .ok_or_else(|| PaymentError::UnknownOrder {
                reference: order_id.to_string(),
            })?;
        self.store.append_note(&mut order, note).await
    }

    /// Queries the gateway for the order's latest attempt.
    ///
    /// With `add_note`, the decrypted result is attached to the order as an audit note.
    pub async fn query(
        &self,
        order_id: OrderId,
        add_note: bool,
    ) -> Result<TransactionRecord, QueryFailure> {
        let order = self.load(order_id).await?;
        let merchant_trade_no = meta::read(&order, meta::ORDER_NO)
            .map(str::to_string)
            .ok_or(QueryFailure::NotSubmitted)?;

        let settings = self.settings.snapshot();
        let mut fields = FieldMap::new();
        fields.insert(
            "MerID".to_string(),
            settings.active_credentials().merchant_id().to_string(),
        );
        fields.insert("MerTradeNo".to_string(), merchant_trade_no.clone());
        fields.insert("Timestamp".to_string(), Utc::now().timestamp().to_string());

        let reply = match self.post(&settings, Endpoint::Query, &fields).await {
            Ok(reply) => reply,
            Err(failure) => {
                warn!(order_id = order_id, error = %failure, "PAYUNi query failed");
                return Err(failure);
            }
        };
        if !reply.is_success() {
            warn!(
                order_id = order_id,
                status = %reply.status,
                message = %reply.message,
                "PAYUNi query rejected"
            );
            return Err(QueryFailure::ProviderStatus {
                status: reply.status,
                message: reply.message,
            });
        }

        let row = first_result_row(&reply.decrypted);
        if row.is_empty() {
            return Err(QueryFailure::NoResult);
        }
        let record = TransactionRecord::from_fields(row).map_err(QueryFailure::MalformedResponse)?;

        if add_note {
            let dump = serde_json::to_string(&reply.decrypted)
                .map_err(|e| QueryFailure::MalformedResponse(e.to_string()))?;
            self.append_note(order_id, &format!("PAYUNi query succeed. Query result: {}", dump))
                .await
                .map_err(|e| QueryFailure::Store(e.to_string()))?;
        }

        info!(
            order_id = order_id,
            mer_trade_no = %merchant_trade_no,
            trade_status = record.trade_status.code(),
            "PAYUNi query succeeded"
        );
        Ok(record)
    }

    /// Refunds `amount` of a paid card order, choosing between voiding the
    /// authorization and a close-type refund from the live capture state.
    pub async fn refund(
        &self,
        order_id: OrderId,
        amount: Decimal,
        reason: Option<&str>,
    ) -> PaymentResult<RefundReceipt> {
        let order = self
            .store
            .load(order_id)
            .await?
            .ok_or_else(|| PaymentError::UnknownOrder {
                reference: order_id.to_string(),
            })?;

        let method = self
            .registry
            .for_order(&order)
            .filter(|method| method.supports_refund())
            .ok_or_else(|| {
                PaymentError::domain(format!(
                    "Payment method {} of order #{} does not support refunds.",
                    order.payment_method, order_id
                ))
            })?;
        if method.is_installment() && amount != order.total {
            return Err(PaymentError::domain(format!(
                "The refund amount for order #{} should be the same as the order total for installment payment.",
                order_id
            )));
        }
        let Some(transaction_id) = order.transaction_id().map(str::to_string) else {
            return Err(PaymentError::domain(format!(
                "Unable to find transaction id for order #{}",
                order_id
            )));
        };
        if amount <= Decimal::ZERO {
            return Err(PaymentError::validation(
                format!("refund amount {} must be positive", amount),
                Some("amount"),
            ));
        }
        let refund_amount = trade_amount(amount)?;

        info!(
            order_id = order_id,
            amount = %amount,
            reason = reason.unwrap_or_default(),
            "PAYUNi refund requested"
        );

        let record = self.query(order_id, false).await.map_err(|failure| {
            error!(order_id = order_id, error = %failure, "unable to query order before refund");
            PaymentError::from(failure)
        })?;

        if record.trade_status != TradeStatus::Paid {
            return Err(PaymentError::domain(format!(
                "Unable to Refund this Order. TradeStatus: {}",
                record.trade_status.code()
            )));
        }

        let settings = self.settings.snapshot();
        let mut fields = FieldMap::new();
        fields.insert(
            "MerID".to_string(),
            settings.active_credentials().merchant_id().to_string(),
        );
        fields.insert("TradeNo".to_string(), transaction_id);
        fields.insert("Timestamp".to_string(), Utc::now().timestamp().to_string());

        let operation = match record.close_status {
            Some(status) if status.allows_cancel_authorization() => {
                RefundOperation::CancelAuthorization
            }
            Some(status) if status.allows_close_refund() => {
                fields.insert("CloseType".to_string(), "2".to_string());
                fields.insert("TradeAmt".to_string(), refund_amount.to_string());
                RefundOperation::CloseRefund
            }
            other => {
                return Err(PaymentError::domain(format!(
                    "Unable to Refund this Order. TradeStatus: {}, CloseStatus: {}",
                    record.trade_status.code(),
                    other.map(|s| s.code()).unwrap_or("none")
                )));
            }
        };

        let reply = match self.post(&settings, operation.endpoint(), &fields).await {
            Ok(reply) => reply,
            Err(failure) => {
                error!(order_id = order_id, error = %failure, "PAYUNi refund request failed");
                self.append_note(
                    order_id,
                    &format!("PAYUNi payment refund failed. Error: {}", failure),
                )
                .await?;
                return Err(failure.into());
            }
        };

        if !reply.is_success() {
            self.append_note(
                order_id,
                &format!(
                    "PAYUNi payment refund failed. Status:{}, Message:{}",
                    reply.status, reply.message
                ),
            )
            .await?;
            warn!(
                order_id = order_id,
                status = %reply.status,
                message = %reply.message,
                "PAYUNi refund rejected"
            );
            return Err(PaymentError::GatewayError {
                message: format!("PAYUNi refund failed. Status:{}", reply.status),
                provider_status: Some(reply.status),
            });
        }

        self.append_note(
            order_id,
            &format!(
                "PAYUNi payment refund success. Status: {}, Message: {}, Refund Amount: {}",
                reply.status, reply.message, amount
            ),
        )
        .await?;
        info!(
            order_id = order_id,
            operation = ?operation,
            amount = %amount,
            "PAYUNi refund succeeded"
        );

        Ok(RefundReceipt {
            order_id,
            amount,
            operation,
            provider_status: reply.status,
            message: reply.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support;
    use crate::database::InMemoryOrderStore;
    use crate::payments::crypto::Credentials;
    use crate::payments::methods::{ATM_ID, CREDIT_ID};
    use crate::payments::types::OrderStatus;
    use crate::payments::utils::{TransportError, TransportResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Replays canned responses and records every decrypted request.
    struct ScriptedTransport {
        credentials: Credentials,
        responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        requests: Mutex<Vec<(String, FieldMap)>>,
    }

    impl ScriptedTransport {
        fn new(credentials: Credentials) -> Self {
            Self {
                credentials,
                responses: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        async fn push_json(&self, status: &str, fields: &[(&str, &str)]) {
            let fields: FieldMap = fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            let body = serde_json::json!({
                "Status": status,
                "EncryptInfo": crypto::encrypt(&self.credentials, &fields).unwrap(),
            });
            self.responses.lock().await.push_back(Ok(TransportResponse {
                status: 200,
                body: body.to_string(),
            }));
        }

        async fn push(&self, response: Result<TransportResponse, TransportError>) {
            self.responses.lock().await.push_back(response);
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn post_form(
            &self,
            url: &str,
            fields: &[(String, String)],
            _timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            let form: FieldMap = fields.iter().cloned().collect();
            let decrypted = crypto::decrypt(&self.credentials, &form["EncryptInfo"]).unwrap();
            self.requests.lock().await.push((url.to_string(), decrypted));
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connection("no response scripted".into())))
        }
    }

    /// Settles the order at the gateway while the request is in flight.
    struct SettlingTransport {
        inner: Arc<ScriptedTransport>,
        store: Arc<InMemoryOrderStore>,
        order_id: OrderId,
    }

    #[async_trait]
    impl HttpTransport for SettlingTransport {
        async fn post_form(
            &self,
            url: &str,
            fields: &[(String, String)],
            timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            let mut order = self.store.get(self.order_id).await.unwrap();
            self.store.mark_paid(&mut order, "T123").await.unwrap();
            self.inner.post_form(url, fields, timeout).await
        }
    }

    struct Fixture {
        store: Arc<InMemoryOrderStore>,
        transport: Arc<ScriptedTransport>,
        client: TradeClient,
    }

    async fn fixture() -> Fixture {
        let settings = test_support::handle();
        let snapshot = settings.snapshot();
        let store = Arc::new(InMemoryOrderStore::new());
        let transport = Arc::new(ScriptedTransport::new(
            snapshot.active_credentials().clone(),
        ));
        let registry = Arc::new(MethodRegistry::from_settings(&snapshot));
        let client = TradeClient::new(
            settings,
            store.clone(),
            registry,
            transport.clone(),
            Arc::new(OrderLocks::new()),
        );

        let mut order = Order::new(500, CREDIT_ID, Decimal::new(1200, 0));
        order.set_meta(meta::PLUGIN_VERSION, meta::META_SCHEMA_VERSION);
        order.set_meta(meta::ORDER_NO, "500-1");
        order.transaction_id = Some("T123".to_string());
        store.insert(order).await;

        Fixture {
            store,
            transport,
            client,
        }
    }

    fn paid_row(close_status: &'static str) -> Vec<(&'static str, &'static str)> {
        vec![
            ("Status", "SUCCESS"),
            ("Message", "query ok"),
            ("Result[0][MerTradeNo]", "500-1"),
            ("Result[0][TradeNo]", "T123"),
            ("Result[0][TradeStatus]", "1"),
            ("Result[0][PaymentType]", "1"),
            ("Result[0][CloseStatus]", close_status),
        ]
    }

    #[tokio::test]
    async fn test_query_extracts_first_row() {
        let fx = fixture().await;
        fx.transport.push_json("SUCCESS", &paid_row("2")).await;

        let record = fx.client.query(500, true).await.unwrap();
        assert_eq!(record.trade_status, TradeStatus::Paid);
        assert_eq!(record.gateway_trade_no.as_deref(), Some("T123"));
        assert!(record.close_status.is_some());

        let requests = fx.transport.requests.lock().await;
        assert_eq!(requests[0].0, "https://sandbox-api.payuni.com.tw/api/trade/query");
        assert_eq!(requests[0].1["MerTradeNo"], "500-1");

        let order = fx.store.get(500).await.unwrap();
        assert!(order.notes[0].starts_with("PAYUNi query succeed. Query result: {"));
    }

    #[tokio::test]
    async fn test_query_failures_are_typed() {
        let fx = fixture().await;
        fx.transport.push_json("QUERY_FAIL", &[("Message", "no trade")]).await;
        assert_eq!(
            fx.client.query(500, true).await.unwrap_err(),
            QueryFailure::ProviderStatus {
                status: "QUERY_FAIL".to_string(),
                message: "no trade".to_string()
            }
        );

        fx.transport
            .push(Err(TransportError::Timeout(Duration::from_secs(30))))
            .await;
        assert!(matches!(
            fx.client.query(500, false).await,
            Err(QueryFailure::Transport(_))
        ));

        fx.transport
            .push(Ok(TransportResponse {
                status: 200,
                body: "<html>".to_string(),
            }))
            .await;
        assert!(matches!(
            fx.client.query(500, false).await,
            Err(QueryFailure::MalformedResponse(_))
        ));

        fx.transport.push_json("SUCCESS", &[("Message", "empty")]).await;
        assert_eq!(
            fx.client.query(500, false).await.unwrap_err(),
            QueryFailure::NoResult
        );

        assert_eq!(
            fx.client.query(404, false).await.unwrap_err(),
            QueryFailure::UnknownOrder(404)
        );
        assert!(fx.store.get(500).await.unwrap().notes.is_empty());
    }

    #[tokio::test]
    async fn test_query_note_keeps_concurrent_settlement() {
        let fx = fixture().await;
        fx.transport.push_json("SUCCESS", &paid_row("1")).await;
        let settings = test_support::handle();
        let registry = Arc::new(MethodRegistry::from_settings(&settings.snapshot()));
        let client = TradeClient::new(
            settings,
            fx.store.clone(),
            registry,
            Arc::new(SettlingTransport {
                inner: fx.transport.clone(),
                store: fx.store.clone(),
                order_id: 500,
            }),
            Arc::new(OrderLocks::new()),
        );

        client.query(500, true).await.unwrap();

        let order = fx.store.get(500).await.unwrap();
        assert!(order.is_paid());
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.transaction_id.as_deref(), Some("T123"));
        assert_eq!(order.notes.len(), 1);
        assert!(order.notes[0].starts_with("PAYUNi query succeed."));
    }

    #[tokio::test]
    async fn test_refund_refused_for_method_without_refunds() {
        let fx = fixture().await;
        let mut order = Order::new(601, ATM_ID, Decimal::new(1200, 0));
        order.set_meta(meta::PLUGIN_VERSION, meta::META_SCHEMA_VERSION);
        order.set_meta(meta::ORDER_NO, "601-1");
        order.transaction_id = Some("T601".to_string());
        fx.store.insert(order).await;

        let err = fx
            .client
            .refund(601, Decimal::new(1200, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::DomainError { .. }));
        assert!(err.to_string().contains("does not support refunds"));
        assert!(fx.transport.requests.lock().await.is_empty());
    }

    #[test]
    fn test_first_result_row() {
        let mut decrypted = FieldMap::new();
        decrypted.insert("Result[0][TradeNo]".to_string(), "T1".to_string());
        decrypted.insert("Result[1][TradeNo]".to_string(), "T2".to_string());
        decrypted.insert("Status".to_string(), "SUCCESS".to_string());

        let row = first_result_row(&decrypted);
        assert_eq!(row.len(), 1);
        assert_eq!(row["TradeNo"], "T1");
    }

    #[tokio::test]
    async fn test_refund_cancels_unsettled_authorization() {
        let fx = fixture().await;
        fx.transport.push_json("SUCCESS", &paid_row("1")).await;
        fx.transport
            .push_json("SUCCESS", &[("Message", "cancelled")])
            .await;

        let receipt = fx
            .client
            .refund(500, Decimal::new(1200, 0), Some("customer request"))
            .await
            .unwrap();
        assert_eq!(receipt.operation, RefundOperation::CancelAuthorization);

        let requests = fx.transport.requests.lock().await;
        assert_eq!(requests.len(), 2);
        assert!(requests[1].0.ends_with("/trade/cancel"));
        assert_eq!(requests[1].1["TradeNo"], "T123");
        assert!(!requests[1].1.contains_key("TradeAmt"));

        let order = fx.store.get(500).await.unwrap();
        assert_eq!(
            order.notes.last().map(String::as_str),
            Some("PAYUNi payment refund success. Status: SUCCESS, Message: cancelled, Refund Amount: 1200")
        );
    }

    #[tokio::test]
    async fn test_refund_closes_captured_payment() {
        let fx = fixture().await;
        fx.transport.push_json("SUCCESS", &paid_row("2")).await;
        fx.transport.push_json("SUCCESS", &[("Message", "refunded")]).await;

        let receipt = fx
            .client
            .refund(500, Decimal::new(300, 0), None)
            .await
            .unwrap();
        assert_eq!(receipt.operation, RefundOperation::CloseRefund);

        let requests = fx.transport.requests.lock().await;
        assert!(requests[1].0.ends_with("/trade/close"));
        assert_eq!(requests[1].1["CloseType"], "2");
        assert_eq!(requests[1].1["TradeAmt"], "300");
    }

    #[tokio::test]
    async fn test_refund_refused_for_failed_capture() {
        let fx = fixture().await;
        fx.transport.push_json("SUCCESS", &paid_row("8")).await;

        let err = fx
            .client
            .refund(500, Decimal::new(1200, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::DomainError { .. }));
        assert_eq!(fx.transport.requests.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_refund_rejection_is_noted() {
        let fx = fixture().await;
        fx.transport.push_json("SUCCESS", &paid_row("2")).await;
        fx.transport
            .push_json("CLOSE_FAIL", &[("Message", "over limit")])
            .await;

        let err = fx
            .client
            .refund(500, Decimal::new(1200, 0), None)
            .await
            .unwrap_err();
        match err {
            PaymentError::GatewayError {
                provider_status, ..
            } => assert_eq!(provider_status.as_deref(), Some("CLOSE_FAIL")),
            other => panic!("unexpected error: {other:?}"),
        }
        let order = fx.store.get(500).await.unwrap();
        assert_eq!(
            order.notes.last().map(String::as_str),
            Some("PAYUNi payment refund failed. Status:CLOSE_FAIL, Message:over limit")
        );
    }

    #[tokio::test]
    async fn test_refund_preconditions() {
        let fx = fixture().await;

        let err = fx.client.refund(500, Decimal::ZERO, None).await.unwrap_err();
        assert!(matches!(err, PaymentError::ValidationError { .. }));

        let mut order = fx.store.get(500).await.unwrap();
        order.transaction_id = None;
        fx.store.insert(order).await;
        let err = fx
            .client
            .refund(500, Decimal::new(100, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::DomainError { .. }));
        assert!(fx.transport.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_refund_of_installment_rejected_offline() {
        let fx = fixture().await;
        let mut order = Order::new(600, "payuni-upp-installment-3", Decimal::new(3000, 0));
        order.set_meta(meta::PLUGIN_VERSION, meta::META_SCHEMA_VERSION);
        order.set_meta(meta::ORDER_NO, "600-1");
        order.transaction_id = Some("T600".to_string());
        fx.store.insert(order).await;

        let err = fx
            .client
            .refund(600, Decimal::new(1000, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::DomainError { .. }));
        assert!(fx.transport.requests.lock().await.is_empty());
    }
}
