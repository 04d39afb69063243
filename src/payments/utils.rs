use crate::payments::error::{PaymentError, PaymentResult};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Connection(String),
}

/// Form POST with a hard timeout. Implementations must not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let body = serde_urlencoded::to_string(fields)
            .map_err(|e| TransportError::Connection(format!("invalid form body: {}", e)))?;

        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(timeout)
                } else {
                    TransportError::Connection(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Connection(format!("failed to read body: {}", e)))?;
        debug!(url = url, status = status, "gateway responded");

        Ok(TransportResponse { status, body })
    }
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn transport_response_success_range() {
        let ok = TransportResponse {
            status: 204,
            body: String::new(),
        };
        let bad = TransportResponse {
            status: 502,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }
}
