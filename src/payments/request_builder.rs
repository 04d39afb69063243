use crate::config::SettingsHandle;
use crate::payments::crypto;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::method::MethodContext;
use crate::payments::order::{Order, OrderItem, OrderStore};
use crate::payments::order_ref;
use crate::payments::registry::MethodRegistry;
use crate::payments::types::{Endpoint, FieldMap, OrderId, SignedEnvelope};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

pub const PROD_DESC_MAX_CHARS: usize = 200;

/// Everything the browser needs to POST to the hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentForm {
    pub action_url: String,
    pub merchant_trade_no: String,
    pub envelope: SignedEnvelope,
}

/// Whole currency units; fractions are truncated.
pub fn trade_amount(total: Decimal) -> PaymentResult<i64> {
    total
        .trunc()
        .to_i64()
        .filter(|amount| *amount > 0)
        .ok_or_else(|| {
            PaymentError::validation(
                format!("order total {} is not a payable amount", total),
                Some("total"),
            )
        })
}

/// `"{name} * {qty}"` per line item, `;`-joined, cut to 200 characters.
pub fn product_description(items: &[OrderItem]) -> String {
    items
        .iter()
        .map(|item| format!("{} * {}", item.name.trim(), item.quantity))
        .collect::<Vec<_>>()
        .join(";")
        .chars()
        .take(PROD_DESC_MAX_CHARS)
        .collect()
}

pub struct RequestBuilder {
    settings: SettingsHandle,
    registry: Arc<MethodRegistry>,
    store: Arc<dyn OrderStore>,
}

impl RequestBuilder {
    pub fn new(
        settings: SettingsHandle,
        registry: Arc<MethodRegistry>,
        store: Arc<dyn OrderStore>,
    ) -> Self {
        Self {
            settings,
            registry,
            store,
        }
    }

    pub async fn build(&self, order_id: OrderId) -> PaymentResult<PaymentForm> {
        let mut order = self
            .store
            .load(order_id)
            .await?
            .ok_or_else(|| PaymentError::UnknownOrder {
                reference: order_id.to_string(),
            })?;
        self.build_for(&mut order, Utc::now()).await
    }

    /// Seals a new payment attempt for `order` and persists the bumped serial.
    pub async fn build_for(
        &self,
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> PaymentResult<PaymentForm> {
        let settings = self.settings.snapshot();
        let method = self.registry.for_order(order).ok_or_else(|| {
            PaymentError::validation(
                format!("payment method {} is not handled by this gateway", order.payment_method),
                Some("payment_method"),
            )
        })?;
        if !method.is_available_for(order.total) {
            return Err(PaymentError::validation(
                format!(
                    "{} requires an order total of at least {}",
                    method.title(),
                    method.min_amount().unwrap_or_default()
                ),
                Some("total"),
            ));
        }
        let amount = trade_amount(order.total)?;
        let credentials = settings.active_credentials();

        let mut attempt = order.clone();
        let merchant_trade_no = order_ref::encode(&mut attempt, settings.trade_no_format);

        let mut fields = FieldMap::new();
        fields.insert("MerID".to_string(), credentials.merchant_id().to_string());
        fields.insert("MerTradeNo".to_string(), merchant_trade_no.clone());
        fields.insert("TradeAmt".to_string(), amount.to_string());
        fields.insert("ProdDesc".to_string(), product_description(&order.items));
        fields.insert("ReturnURL".to_string(), settings.return_url.clone());
        fields.insert("NotifyURL".to_string(), settings.notify_url.clone());
        fields.insert("UsrMail".to_string(), order.billing_email.clone());
        fields.insert("UsrMailFix".to_string(), "1".to_string());
        fields.insert("Timestamp".to_string(), now.timestamp().to_string());
        fields.insert("Lang".to_string(), settings.language.clone());
        if settings.einvoice_enabled {
            fields.insert("TradeInvoice".to_string(), "1".to_string());
        }

        let ctx = MethodContext {
            order: &attempt,
            settings: &settings,
            now,
        };
        fields.extend(method.extra_fields(&ctx));
        debug!(order_id = order.id, fields = ?fields, "payment request fields");

        let envelope = crypto::seal(credentials, Endpoint::Upp.version(), &fields)?;

        self.store.save(&attempt).await?;
        *order = attempt;

        info!(
            order_id = order.id,
            mer_trade_no = %merchant_trade_no,
            method = method.id(),
            "payment request built"
        );

        Ok(PaymentForm {
            action_url: settings.endpoint_url(Endpoint::Upp),
            merchant_trade_no,
            envelope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_amount_truncates() {
        assert_eq!(trade_amount(Decimal::new(12999, 1)).unwrap(), 1299);
        assert_eq!(trade_amount(Decimal::new(1200, 0)).unwrap(), 1200);
        assert!(trade_amount(Decimal::new(5, 1)).is_err());
        assert!(trade_amount(Decimal::ZERO).is_err());
    }

    #[test]
    fn test_product_description() {
        let items = vec![
            OrderItem {
                name: "Oolong Tea".to_string(),
                quantity: 2,
            },
            OrderItem {
                name: "鳳梨酥".to_string(),
                quantity: 1,
            },
        ];
        assert_eq!(product_description(&items), "Oolong Tea * 2;鳳梨酥 * 1");
    }

    #[test]
    fn test_product_description_is_char_aware() {
        let items = vec![OrderItem {
            name: "茶".repeat(250),
            quantity: 1,
        }];
        let desc = product_description(&items);
        assert_eq!(desc.chars().count(), PROD_DESC_MAX_CHARS);
        assert!(desc.chars().all(|c| c == '茶'));
    }
}
