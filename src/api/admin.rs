//! Operator actions on a single order

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use super::AppState;
use crate::error::AppError;
use crate::middleware::error::{
    get_request_id_from_headers, success_response, success_response_with_data, ActionResponse,
};
use crate::payments::error::PaymentError;
use crate::payments::types::{OrderId, OrderStatus};

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentDetailRow {
    pub label: String,
    pub value: String,
}

fn with_request_id(headers: &HeaderMap) -> impl Fn(AppError) -> AppError + '_ {
    move |err| match get_request_id_from_headers(headers) {
        Some(request_id) => err.with_request_id(request_id),
        None => err,
    }
}

/// POST /admin/orders/{id}/query
pub async fn query_order(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    headers: HeaderMap,
) -> Result<Json<ActionResponse>, AppError> {
    let record = state
        .trade_client
        .query(order_id, true)
        .await
        .map_err(AppError::from)
        .map_err(with_request_id(&headers))?;

    let message = format!(
        "PAYUNi query succeed. TradeStatus: {}",
        record.trade_status.label()
    );
    Ok(success_response_with_data(message, record))
}

/// POST /admin/orders/{id}/refund
pub async fn refund_order(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    headers: HeaderMap,
    Json(request): Json<RefundRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    info!(order_id = order_id, amount = %request.amount, "Refund requested by operator");
    let receipt = state
        .trade_client
        .refund(order_id, request.amount, request.reason.as_deref())
        .await
        .map_err(AppError::from)
        .map_err(with_request_id(&headers))?;

    let message = format!("Refunded {} ({})", receipt.amount, receipt.message);
    Ok(success_response_with_data(message, receipt))
}

/// POST /admin/orders/{id}/schedule-cancel
pub async fn schedule_cancel(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    headers: HeaderMap,
) -> Result<Json<ActionResponse>, AppError> {
    let fire_at = state
        .expiry
        .schedule_manually(order_id)
        .await
        .map_err(AppError::from)
        .map_err(with_request_id(&headers))?;

    Ok(success_response(format!(
        "Auto-cancellation scheduled for {}",
        fire_at.format("%Y-%m-%d %H:%M:%S %:z")
    )))
}

/// POST /admin/orders/{id}/status
pub async fn change_status(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    headers: HeaderMap,
    Json(request): Json<StatusChangeRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let status = OrderStatus::from_str(&request.status)
        .map_err(AppError::from)
        .map_err(with_request_id(&headers))?;

    let order = state
        .expiry
        .apply_manual_status(order_id, status)
        .await
        .map_err(AppError::from)
        .map_err(with_request_id(&headers))?;

    Ok(success_response(format!(
        "Order #{} is now {}",
        order.id, order.status
    )))
}

/// GET /admin/orders/{id}/payment-details
pub async fn payment_details(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    headers: HeaderMap,
) -> Result<Json<ActionResponse>, AppError> {
    let order = state
        .store
        .load(order_id)
        .await
        .map_err(AppError::from)
        .map_err(with_request_id(&headers))?
        .ok_or_else(|| {
            AppError::from(PaymentError::UnknownOrder {
                reference: order_id.to_string(),
            })
        })
        .map_err(with_request_id(&headers))?;

    let rows: Vec<PaymentDetailRow> = state
        .registry
        .payment_details(&order)
        .into_iter()
        .map(|(label, value)| PaymentDetailRow {
            label: label.to_string(),
            value,
        })
        .collect();

    Ok(success_response_with_data(
        format!("Payment details for order #{}", order_id),
        rows,
    ))
}
