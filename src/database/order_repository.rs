use crate::payments::error::PaymentResult;
use crate::payments::order::{Order, OrderStore};
use crate::payments::types::{OrderId, OrderStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Process-local order store; stands in for the storefront's persistence.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
    mark_paid_calls: RwLock<HashMap<OrderId, usize>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, order: Order) {
        self.orders.write().await.insert(order.id, order);
    }

    pub async fn get(&self, order_id: OrderId) -> Option<Order> {
        self.orders.read().await.get(&order_id).cloned()
    }

    /// How many times `mark_paid` ran for the order, no-ops included.
    pub async fn mark_paid_calls(&self, order_id: OrderId) -> usize {
        self.mark_paid_calls
            .read()
            .await
            .get(&order_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn load(&self, order_id: OrderId) -> PaymentResult<Option<Order>> {
        Ok(self.get(order_id).await)
    }

    async fn save(&self, order: &Order) -> PaymentResult<()> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn mark_paid(&self, order: &mut Order, gateway_trade_no: &str) -> PaymentResult<()> {
        *self
            .mark_paid_calls
            .write()
            .await
            .entry(order.id)
            .or_insert(0) += 1;

        if order.is_paid() {
            return self.save(order).await;
        }

        order.transaction_id = Some(gateway_trade_no.to_string());
        order.date_paid = Some(Utc::now());
        order.status = OrderStatus::Processing;
        info!(
            order_id = order.id,
            transaction_id = gateway_trade_no,
            "order payment completed"
        );
        self.save(order).await
    }

    async fn mark_status(
        &self,
        order: &mut Order,
        status: OrderStatus,
        note: Option<&str>,
    ) -> PaymentResult<()> {
        let previous = order.status;
        order.status = status;
        if let Some(note) = note {
            order.notes.push(note.to_string());
        }
        info!(
            order_id = order.id,
            from = %previous,
            to = %status,
            "order status changed"
        );
        self.save(order).await
    }

    async fn append_note(&self, order: &mut Order, note: &str) -> PaymentResult<()> {
        order.notes.push(note.to_string());
        self.save(order).await
    }
}
