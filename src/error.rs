//! Application-level errors for the HTTP surface
//!
//! Wraps the payment core's [`PaymentError`] and configuration failures with a
//! stable error code, HTTP status mapping and user-facing message.

use crate::config::ConfigError;
use crate::payments::error::{PaymentError, QueryFailure};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error codes returned to admin clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "ORDER_NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "NOT_REFUNDABLE")]
    NotRefundable,
    #[serde(rename = "INVALID_PAYLOAD")]
    InvalidPayload,

    // Infrastructure errors (5xx)
    #[serde(rename = "ORDER_STORE_ERROR")]
    OrderStoreError,
    #[serde(rename = "SCHEDULER_ERROR")]
    SchedulerError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 503)
    #[serde(rename = "PAYMENT_GATEWAY_ERROR")]
    PaymentGatewayError,
    #[serde(rename = "PAYMENT_GATEWAY_UNAVAILABLE")]
    PaymentGatewayUnavailable,

    // Generic
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Payment(PaymentError),
    Configuration(String),
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Payment(err) => err.http_status_code(),
            AppErrorKind::Configuration(_) => 500,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Payment(err) => match err {
                PaymentError::ValidationError { .. } => ErrorCode::ValidationError,
                PaymentError::CryptoError { .. } => ErrorCode::InvalidPayload,
                PaymentError::UnknownOrder { .. } => ErrorCode::OrderNotFound,
                PaymentError::GatewayError { .. } => ErrorCode::PaymentGatewayError,
                PaymentError::DomainError { .. } => ErrorCode::NotRefundable,
                PaymentError::NetworkError { .. } => ErrorCode::PaymentGatewayUnavailable,
                PaymentError::StoreError { .. } => ErrorCode::OrderStoreError,
                PaymentError::SchedulerError { .. } => ErrorCode::SchedulerError,
            },
            AppErrorKind::Configuration(_) => ErrorCode::ConfigurationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Payment(err) => err.user_message(),
            AppErrorKind::Configuration(_) => {
                "Service is misconfigured. Please contact support".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Payment(err) => err.is_retryable(),
            AppErrorKind::Configuration(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{}: {}", context, self.user_message()),
            None => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        AppError::new(AppErrorKind::Payment(err))
    }
}

impl From<QueryFailure> for AppError {
    fn from(failure: QueryFailure) -> Self {
        AppError::new(AppErrorKind::Payment(failure.into()))
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::new(AppErrorKind::Configuration(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_error_mapping() {
        let err = AppError::from(PaymentError::UnknownOrder {
            reference: "42".to_string(),
        });
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.error_code(), ErrorCode::OrderNotFound);
        assert!(!err.is_retryable());

        let err = AppError::from(PaymentError::domain("Unable to Refund this Order"));
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.user_message(), "Unable to Refund this Order");
    }

    #[test]
    fn test_query_failure_is_a_gateway_error() {
        let err = AppError::from(QueryFailure::Transport("timed out".to_string()));
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.error_code(), ErrorCode::PaymentGatewayError);
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::NotRefundable).unwrap();
        assert_eq!(json, "\"NOT_REFUNDABLE\"");
    }
}
