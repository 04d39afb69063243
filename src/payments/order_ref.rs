//! Merchant trade numbers: `{order_id}-{serial}` or `{order_id}{serial:03}`.
//!
//! Each new payment attempt bumps the order's serial (1..=999, then back to 1) so the
//! gateway sees a fresh reference. The format used is stamped on the order, and
//! inbound references are resolved against that stamp. Shape-based detection only
//! applies to orders that predate the stamp.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::meta;
use crate::payments::order::{Order, OrderStore};
use crate::payments::types::OrderId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

pub const MAX_SERIAL: u32 = 999;
pub const DELIMITER: char = '-';
pub const FIXED_WIDTH_DIGITS: usize = 3;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TradeNoFormat {
    #[default]
    Delimited,
    FixedWidth,
}

impl TradeNoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeNoFormat::Delimited => "delimited",
            TradeNoFormat::FixedWidth => "fixed_width",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            TradeNoFormat::Delimited => TradeNoFormat::FixedWidth,
            TradeNoFormat::FixedWidth => TradeNoFormat::Delimited,
        }
    }

    /// Legacy guess from the string alone.
    pub fn detect(merchant_trade_no: &str) -> Self {
        if merchant_trade_no.contains(DELIMITER) {
            TradeNoFormat::Delimited
        } else {
            TradeNoFormat::FixedWidth
        }
    }
}

impl std::fmt::Display for TradeNoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TradeNoFormat {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "delimited" => Ok(TradeNoFormat::Delimited),
            "fixed_width" | "fixed-width" => Ok(TradeNoFormat::FixedWidth),
            _ => Err(PaymentError::validation(
                format!("unsupported trade number format: {}", value),
                Some("trade_no_format"),
            )),
        }
    }
}

pub fn next_serial(previous: Option<u32>) -> u32 {
    match previous {
        Some(serial) if serial >= 1 && serial < MAX_SERIAL => serial + 1,
        _ => 1,
    }
}

pub fn format_trade_no(order_id: OrderId, serial: u32, format: TradeNoFormat) -> String {
    match format {
        TradeNoFormat::Delimited => format!("{}{}{}", order_id, DELIMITER, serial),
        TradeNoFormat::FixedWidth => {
            format!("{}{:0width$}", order_id, serial, width = FIXED_WIDTH_DIGITS)
        }
    }
}

/// Decodes assuming `format`; `None` if the string does not have that shape.
pub fn decode_as(merchant_trade_no: &str, format: TradeNoFormat) -> Option<OrderId> {
    let value = merchant_trade_no.trim();
    match format {
        TradeNoFormat::Delimited => {
            let (head, _) = value.split_once(DELIMITER)?;
            head.parse().ok()
        }
        TradeNoFormat::FixedWidth => {
            if value.contains(DELIMITER)
                || value.len() <= FIXED_WIDTH_DIGITS
                || !value.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            value[..value.len() - FIXED_WIDTH_DIGITS].parse().ok()
        }
    }
}

/// Shape-based decode for orders without a format stamp.
pub fn decode(merchant_trade_no: &str) -> PaymentResult<OrderId> {
    decode_as(merchant_trade_no, TradeNoFormat::detect(merchant_trade_no)).ok_or_else(|| {
        PaymentError::UnknownOrder {
            reference: merchant_trade_no.to_string(),
        }
    })
}

/// Assigns the next attempt's trade number and records serial, format and reference
/// on the order. The caller persists the order.
pub fn encode(order: &mut Order, format: TradeNoFormat) -> String {
    let previous = order
        .meta(meta::ORDER_SERIAL_NO)
        .and_then(|v| v.trim().parse::<u32>().ok());
    let serial = next_serial(previous);
    let trade_no = format_trade_no(order.id, serial, format);

    order.set_meta(meta::ORDER_SERIAL_NO, serial.to_string());
    order.set_meta(meta::TRADE_NO_FORMAT, format.as_str());
    order.set_meta(meta::ORDER_NO, trade_no.clone());
    order.set_meta(meta::PLUGIN_VERSION, meta::META_SCHEMA_VERSION);
    trade_no
}

fn stamped_format(order: &Order) -> Option<TradeNoFormat> {
    order
        .meta(meta::TRADE_NO_FORMAT)
        .and_then(|v| v.parse().ok())
}

/// Finds the order a gateway reference belongs to.
///
/// Tries `preferred` first, then the other format. A candidate is accepted when its
/// format stamp agrees with the format used to decode; unstamped orders are accepted
/// only when the string's shape implies that format.
pub async fn resolve_order(
    store: &dyn OrderStore,
    merchant_trade_no: &str,
    preferred: TradeNoFormat,
) -> PaymentResult<Order> {
    for format in [preferred, preferred.other()] {
        let Some(order_id) = decode_as(merchant_trade_no, format) else {
            continue;
        };
        let Some(order) = store.load(order_id).await? else {
            continue;
        };

        let accepted = match stamped_format(&order) {
            Some(stamped) => stamped == format,
            None => TradeNoFormat::detect(merchant_trade_no) == format,
        };
        if accepted {
            return Ok(order);
        }
        debug!(
            order_id = order_id,
            mer_trade_no = merchant_trade_no,
            format = %format,
            "trade number decoded to an order stamped with another format"
        );
    }

    Err(PaymentError::UnknownOrder {
        reference: merchant_trade_no.to_string(),
    })
}
