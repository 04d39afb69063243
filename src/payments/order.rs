use crate::payments::error::PaymentResult;
use crate::payments::types::{OrderId, OrderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
}

/// The storefront's view of an order, as handed to the gateway core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub payment_method: String,
    pub total: Decimal,
    pub status: OrderStatus,
    pub transaction_id: Option<String>,
    pub billing_email: String,
    pub items: Vec<OrderItem>,
    pub date_paid: Option<DateTime<Utc>>,
    pub meta: BTreeMap<String, String>,
    pub notes: Vec<String>,
}

impl Order {
    pub fn new(id: OrderId, payment_method: impl Into<String>, total: Decimal) -> Self {
        Self {
            id,
            payment_method: payment_method.into(),
            total,
            status: OrderStatus::Pending,
            transaction_id: None,
            billing_email: String::new(),
            items: Vec::new(),
            date_paid: None,
            meta: BTreeMap::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.billing_email = email.into();
        self
    }

    pub fn with_item(mut self, name: impl Into<String>, quantity: u32) -> Self {
        self.items.push(OrderItem {
            name: name.into(),
            quantity,
        });
        self
    }

    /// Metadata lookup; empty values read as absent.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(key.into(), value.into());
    }

    pub fn remove_meta(&mut self, key: &str) -> Option<String> {
        self.meta.remove(key)
    }

    /// Business-level "paid" flag: a settlement date or a post-payment status.
    pub fn is_paid(&self) -> bool {
        self.date_paid.is_some()
            || matches!(self.status, OrderStatus::Processing | OrderStatus::Completed)
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Durable order persistence owned by the host storefront.
///
/// Implementations must make `mark_paid` a no-op for orders that are already paid.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn load(&self, order_id: OrderId) -> PaymentResult<Option<Order>>;

    /// Persists metadata, notes and status exactly as held by `order`.
    async fn save(&self, order: &Order) -> PaymentResult<()>;

    async fn mark_paid(&self, order: &mut Order, gateway_trade_no: &str) -> PaymentResult<()>;

    async fn mark_status(
        &self,
        order: &mut Order,
        status: OrderStatus,
        note: Option<&str>,
    ) -> PaymentResult<()>;

    async fn append_note(&self, order: &mut Order, note: &str) -> PaymentResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_meta_reads_as_absent() {
        let mut order = Order::new(1, "payuni-upp-credit", Decimal::new(100, 0));
        order.set_meta("k", "");
        assert_eq!(order.meta("k"), None);
        order.set_meta("k", "v");
        assert_eq!(order.meta("k"), Some("v"));
    }

    #[test]
    fn test_is_paid() {
        let mut order = Order::new(1, "payuni-upp-atm", Decimal::new(100, 0));
        assert!(!order.is_paid());
        order.status = OrderStatus::OnHold;
        assert!(!order.is_paid());
        order.status = OrderStatus::Processing;
        assert!(order.is_paid());
    }
}
