use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Crypto error: {message}")]
    CryptoError { message: String },

    #[error("Unknown order: {reference}")]
    UnknownOrder { reference: String },

    #[error("Gateway error: {message}")]
    GatewayError {
        message: String,
        provider_status: Option<String>,
    },

    #[error("Domain error: {message}")]
    DomainError { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Order store error: {message}")]
    StoreError { message: String },

    #[error("Scheduler error: {message}")]
    SchedulerError { message: String },
}

impl PaymentError {
    pub fn crypto(message: impl Into<String>) -> Self {
        PaymentError::CryptoError {
            message: message.into(),
        }
    }

    pub fn domain(message: impl Into<String>) -> Self {
        PaymentError::DomainError {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        PaymentError::ValidationError {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::CryptoError { .. } => false,
            PaymentError::UnknownOrder { .. } => false,
            PaymentError::GatewayError { .. } => false,
            PaymentError::DomainError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::StoreError { .. } => true,
            PaymentError::SchedulerError { .. } => true,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::CryptoError { .. } => 400,
            PaymentError::UnknownOrder { .. } => 404,
            PaymentError::GatewayError { .. } => 502,
            PaymentError::DomainError { .. } => 409,
            PaymentError::NetworkError { .. } => 503,
            PaymentError::StoreError { .. } => 500,
            PaymentError::SchedulerError { .. } => 500,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::CryptoError { .. } => "Unable to read gateway payload".to_string(),
            PaymentError::UnknownOrder { .. } => "Order not found".to_string(),
            PaymentError::GatewayError { message, .. } => message.clone(),
            PaymentError::DomainError { message } => message.clone(),
            PaymentError::NetworkError { .. } => {
                "Payment gateway is temporarily unavailable".to_string()
            }
            PaymentError::StoreError { .. } => "Order storage failure".to_string(),
            PaymentError::SchedulerError { .. } => "Task scheduling failure".to_string(),
        }
    }
}

/// Why a transaction query produced no usable record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryFailure {
    #[error("order {0} not found")]
    UnknownOrder(u64),

    #[error("order has no merchant trade number yet")]
    NotSubmitted,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("gateway returned status {status}: {message}")]
    ProviderStatus { status: String, message: String },

    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),

    #[error("unable to decrypt gateway response: {0}")]
    Crypto(String),

    #[error("gateway response carried no transaction record")]
    NoResult,

    #[error("order store failure: {0}")]
    Store(String),
}

impl From<QueryFailure> for PaymentError {
    fn from(failure: QueryFailure) -> Self {
        match failure {
            QueryFailure::UnknownOrder(order_id) => PaymentError::UnknownOrder {
                reference: order_id.to_string(),
            },
            QueryFailure::NotSubmitted => PaymentError::domain(failure.to_string()),
            QueryFailure::Transport(message) => PaymentError::GatewayError {
                message,
                provider_status: None,
            },
            QueryFailure::Store(message) => PaymentError::StoreError { message },
            QueryFailure::ProviderStatus { status, message } => PaymentError::GatewayError {
                message,
                provider_status: Some(status),
            },
            QueryFailure::Crypto(message) => PaymentError::CryptoError { message },
            QueryFailure::MalformedResponse(_) | QueryFailure::NoResult => {
                PaymentError::GatewayError {
                    message: failure.to_string(),
                    provider_status: None,
                }
            }
        }
    }
}
