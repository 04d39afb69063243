#![allow(dead_code)]

use async_trait::async_trait;
use chrono::FixedOffset;
use payuni_payment::api::AppState;
use payuni_payment::config::{GatewaySettings, SettingsHandle};
use payuni_payment::database::InMemoryOrderStore;
use payuni_payment::payments::crypto::{self, Credentials};
use payuni_payment::payments::order_ref::TradeNoFormat;
use payuni_payment::payments::types::{Endpoint, FieldMap};
use payuni_payment::payments::utils::{HttpTransport, TransportError, TransportResponse};
use payuni_payment::workers::InMemoryTaskScheduler;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const MERCHANT_ID: &str = "S01234567";
pub const HASH_KEY: &str = "12345678901234567890123456789012";
pub const HASH_IV: &str = "1234567890123456";

pub fn settings() -> GatewaySettings {
    GatewaySettings {
        test_mode: true,
        live: Credentials::new(
            "L09876543",
            "abcdefghijabcdefghijabcdefghijab",
            "abcdefghijabcdef",
        ),
        test: Credentials::new(MERCHANT_ID, HASH_KEY, HASH_IV),
        language: "zh-tw".to_string(),
        einvoice_enabled: false,
        auto_cancel_enabled: true,
        auto_cancel_delay_minutes: 10,
        business_offset: FixedOffset::east_opt(8 * 3600).unwrap(),
        trade_no_format: TradeNoFormat::Delimited,
        atm_expire_days: 7,
        cvs_expire_days: 7,
        installments: vec![3, 6],
        installment_min_amount: Decimal::ZERO,
        aftee_min_amount: Decimal::ZERO,
        http_timeout_secs: 30,
        notify_url: "https://shop.example/payuni/notify".to_string(),
        return_url: "https://shop.example/payuni/return".to_string(),
        receipt_url_template: "https://shop.example/checkout/order-received/{order_id}"
            .to_string(),
        home_url: "https://shop.example/".to_string(),
    }
}

pub fn credentials() -> Credentials {
    Credentials::new(MERCHANT_ID, HASH_KEY, HASH_IV)
}

pub fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// The posted form a gateway callback would carry for `pairs`.
pub fn sealed_form(pairs: &[(&str, &str)]) -> FieldMap {
    let envelope = crypto::seal(&credentials(), Endpoint::Upp.version(), &fields(pairs)).unwrap();
    envelope.form_fields().into_iter().collect()
}

pub fn form_body(form: &FieldMap) -> String {
    serde_urlencoded::to_string(form).unwrap()
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub version: String,
    pub fields: FieldMap,
}

/// Fake gateway: answers from a script and records every decrypted request.
#[derive(Default)]
pub struct RecordingTransport {
    responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn respond(&self, status: &str, pairs: &[(&str, &str)]) {
        let encrypt_info = crypto::encrypt(&credentials(), &fields(pairs)).unwrap();
        let body = serde_json::json!({ "Status": status, "EncryptInfo": encrypt_info });
        self.responses.lock().await.push_back(Ok(TransportResponse {
            status: 200,
            body: body.to_string(),
        }));
    }

    pub async fn fail_with(&self, error: TransportError) {
        self.responses.lock().await.push_back(Err(error));
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let form: FieldMap = fields.iter().cloned().collect();
        let decrypted = crypto::decrypt(&credentials(), &form["EncryptInfo"]).unwrap();
        self.requests.lock().await.push(RecordedRequest {
            url: url.to_string(),
            version: form["Version"].clone(),
            fields: decrypted,
        });
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connection("no scripted response".to_string())))
    }
}

pub struct Harness {
    pub settings: SettingsHandle,
    pub store: Arc<InMemoryOrderStore>,
    pub scheduler: Arc<InMemoryTaskScheduler>,
    pub transport: Arc<RecordingTransport>,
    pub state: AppState,
}

pub fn harness() -> Harness {
    harness_with(settings())
}

pub fn harness_with(settings: GatewaySettings) -> Harness {
    let settings = SettingsHandle::new(settings);
    let store = Arc::new(InMemoryOrderStore::new());
    let scheduler = Arc::new(InMemoryTaskScheduler::new());
    let transport = Arc::new(RecordingTransport::new());
    let state = AppState::new(
        settings.clone(),
        store.clone(),
        scheduler.clone(),
        transport.clone(),
    );
    Harness {
        settings,
        store,
        scheduler,
        transport,
        state,
    }
}
