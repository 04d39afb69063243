use crate::payments::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Flat string map used for plaintext payloads in both directions.
pub type FieldMap = BTreeMap<String, String>;

pub type OrderId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GatewayEnvironment {
    Sandbox,
    Production,
}

impl GatewayEnvironment {
    pub fn api_base_url(&self) -> &'static str {
        match self {
            GatewayEnvironment::Sandbox => "https://sandbox-api.payuni.com.tw/api",
            GatewayEnvironment::Production => "https://api.payuni.com.tw/api",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayEnvironment::Sandbox => "sandbox",
            GatewayEnvironment::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Upp,
    Query,
    Cancel,
    Close,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Upp => "/upp",
            Endpoint::Query => "/trade/query",
            Endpoint::Cancel => "/trade/cancel",
            Endpoint::Close => "/trade/close",
        }
    }

    /// Envelope `Version` the endpoint expects.
    pub fn version(&self) -> &'static str {
        match self {
            Endpoint::Query => "2.0",
            Endpoint::Upp | Endpoint::Cancel | Endpoint::Close => "1.0",
        }
    }

    pub fn url(&self, environment: GatewayEnvironment) -> String {
        format!("{}{}", environment.api_base_url(), self.path())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    NumberIssued,
    Paid,
    Fail,
    Cancel,
    Expired,
    ToBeConfirmed,
    Unpaid,
}

impl TradeStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "0" => Some(TradeStatus::NumberIssued),
            "1" => Some(TradeStatus::Paid),
            "2" => Some(TradeStatus::Fail),
            "3" => Some(TradeStatus::Cancel),
            "4" => Some(TradeStatus::Expired),
            "8" => Some(TradeStatus::ToBeConfirmed),
            "9" => Some(TradeStatus::Unpaid),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TradeStatus::NumberIssued => "0",
            TradeStatus::Paid => "1",
            TradeStatus::Fail => "2",
            TradeStatus::Cancel => "3",
            TradeStatus::Expired => "4",
            TradeStatus::ToBeConfirmed => "8",
            TradeStatus::Unpaid => "9",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TradeStatus::NumberIssued => "Number issued",
            TradeStatus::Paid => "Paid",
            TradeStatus::Fail => "Payment failed",
            TradeStatus::Cancel => "Cancelled",
            TradeStatus::Expired => "Expired",
            TradeStatus::ToBeConfirmed => "To be confirmed",
            TradeStatus::Unpaid => "Unpaid",
        }
    }

    /// Paid, failed, cancelled and expired trades never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Paid | TradeStatus::Fail | TradeStatus::Cancel | TradeStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CloseStatus {
    Applying,
    Ok,
    Cancelled,
    Processing,
    Unapplied,
}

impl CloseStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(CloseStatus::Applying),
            "2" => Some(CloseStatus::Ok),
            "3" => Some(CloseStatus::Cancelled),
            "7" => Some(CloseStatus::Processing),
            "9" => Some(CloseStatus::Unapplied),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CloseStatus::Applying => "1",
            CloseStatus::Ok => "2",
            CloseStatus::Cancelled => "3",
            CloseStatus::Processing => "7",
            CloseStatus::Unapplied => "9",
        }
    }

    /// The authorization has not been captured yet and can still be voided.
    pub fn allows_cancel_authorization(&self) -> bool {
        matches!(
            self,
            CloseStatus::Applying | CloseStatus::Cancelled | CloseStatus::Unapplied
        )
    }

    /// Captured (or capturing) funds can only be returned through a close request.
    pub fn allows_close_refund(&self) -> bool {
        matches!(self, CloseStatus::Ok | CloseStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Credit,
    Atm,
    Cvs,
    C2c,
    ICash,
    Aftee,
    LinePay,
    Delivery,
}

impl PaymentType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(PaymentType::Credit),
            "2" => Some(PaymentType::Atm),
            "3" => Some(PaymentType::Cvs),
            "5" => Some(PaymentType::C2c),
            "6" => Some(PaymentType::ICash),
            "7" => Some(PaymentType::Aftee),
            "9" => Some(PaymentType::LinePay),
            "10" => Some(PaymentType::Delivery),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PaymentType::Credit => "1",
            PaymentType::Atm => "2",
            PaymentType::Cvs => "3",
            PaymentType::C2c => "5",
            PaymentType::ICash => "6",
            PaymentType::Aftee => "7",
            PaymentType::LinePay => "9",
            PaymentType::Delivery => "10",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentType::Credit => "Credit Card",
            PaymentType::Atm => "ATM Virtual Account",
            PaymentType::Cvs => "Convenience Store Code",
            PaymentType::C2c => "C2C Store Pickup",
            PaymentType::ICash => "iCash Pay",
            PaymentType::Aftee => "AFTEE",
            PaymentType::LinePay => "LINE Pay",
            PaymentType::Delivery => "Cash on Delivery",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    OneTime,
    Installment,
    Points,
    ApplePay,
    GooglePay,
    SamsungPay,
    UnionPay,
}

impl AuthType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(AuthType::OneTime),
            "2" => Some(AuthType::Installment),
            "3" => Some(AuthType::Points),
            "4" => Some(AuthType::ApplePay),
            "5" => Some(AuthType::GooglePay),
            "6" => Some(AuthType::SamsungPay),
            "7" => Some(AuthType::UnionPay),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuthType::OneTime => "One-time payment",
            AuthType::Installment => "Installments",
            AuthType::Points => "Reward points",
            AuthType::ApplePay => "Apple Pay",
            AuthType::GooglePay => "Google Pay",
            AuthType::SamsungPay => "Samsung Pay",
            AuthType::UnionPay => "UnionPay",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BankType {
    TaiwanBank,
    Ctbc,
    Cathay,
}

impl BankType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "004" => Some(BankType::TaiwanBank),
            "822" => Some(BankType::Ctbc),
            "013" => Some(BankType::Cathay),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BankType::TaiwanBank => "Bank of Taiwan",
            BankType::Ctbc => "CTBC Bank",
            BankType::Cathay => "Cathay United Bank",
        }
    }
}

/// Host order lifecycle, mirrored from the storefront.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    OnHold,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::OnHold => "on-hold",
        }
    }

    /// Statuses in which the shopper may still be completing an offline payment.
    pub fn is_awaiting_payment(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::OnHold)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().trim_start_matches("wc-") {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "on-hold" | "on_hold" => Ok(OrderStatus::OnHold),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported order status: {}", value),
                field: Some("status".to_string()),
            }),
        }
    }
}

/// Outbound request wrapper: cleartext merchant id and version plus the sealed payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedEnvelope {
    #[serde(rename = "MerID")]
    pub merchant_id: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "EncryptInfo")]
    pub encrypt_info: String,
    #[serde(rename = "HashInfo")]
    pub hash_info: String,
}

impl SignedEnvelope {
    pub fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("MerID".to_string(), self.merchant_id.clone()),
            ("Version".to_string(), self.version.clone()),
            ("EncryptInfo".to_string(), self.encrypt_info.clone()),
            ("HashInfo".to_string(), self.hash_info.clone()),
        ]
    }
}

/// One transaction as reported by the gateway query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionRecord {
    pub merchant_trade_no: String,
    pub gateway_trade_no: Option<String>,
    pub trade_status: TradeStatus,
    pub trade_amount: Option<String>,
    pub payment_type: Option<PaymentType>,
    /// Capture state; only meaningful for card payments.
    pub close_status: Option<CloseStatus>,
    pub payment_day: Option<String>,
    pub create_day: Option<String>,
    pub fields: FieldMap,
}

impl TransactionRecord {
    /// Builds a record from one flattened result row.
    pub fn from_fields(fields: FieldMap) -> Result<Self, String> {
        let non_empty = |key: &str| {
            fields
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let merchant_trade_no =
            non_empty("MerTradeNo").ok_or_else(|| "MerTradeNo missing".to_string())?;
        let raw_status = non_empty("TradeStatus").ok_or_else(|| "TradeStatus missing".to_string())?;
        let trade_status = TradeStatus::from_code(&raw_status)
            .ok_or_else(|| format!("unknown TradeStatus {}", raw_status))?;
        let payment_type = non_empty("PaymentType").and_then(|v| PaymentType::from_code(&v));
        let close_status = if payment_type == Some(PaymentType::Credit) {
            non_empty("CloseStatus").and_then(|v| CloseStatus::from_code(&v))
        } else {
            None
        };

        Ok(TransactionRecord {
            merchant_trade_no,
            gateway_trade_no: non_empty("TradeNo"),
            trade_status,
            trade_amount: non_empty("TradeAmt"),
            payment_type,
            close_status,
            payment_day: non_empty("PaymentDay"),
            create_day: non_empty("CreateDay"),
            fields,
        })
    }
}
