//! Request logging and request-id generation

use axum::{extract::Request, middleware::Next, response::Response};
use http::HeaderValue;
use std::time::Instant;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// UUID v4 request ids for `SetRequestIdLayer`.
#[derive(Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Logs one line per request with method, path, status and latency.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %path
    );

    async move {
        let start = Instant::now();
        let response = next.run(request).await;
        let latency_ms = start.elapsed().as_millis();
        let status = response.status();

        if status.is_server_error() {
            warn!(status = status.as_u16(), latency_ms = latency_ms, "request failed");
        } else {
            info!(status = status.as_u16(), latency_ms = latency_ms, "request completed");
        }
        response
    }
    .instrument(span)
    .await
}
