use crate::config::GatewaySettings;
use crate::payments::meta;
use crate::payments::order::Order;
use crate::payments::types::FieldMap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Inputs a method may need when contributing request fields.
pub struct MethodContext<'a> {
    pub order: &'a Order,
    pub settings: &'a GatewaySettings,
    pub now: DateTime<Utc>,
}

impl MethodContext<'_> {
    /// `now + days` as a `Y-m-d` date in the business timezone.
    pub fn expire_date(&self, days: u32) -> String {
        let local = self.now.with_timezone(&self.settings.business_offset);
        (local.date_naive() + chrono::Duration::days(i64::from(days)))
            .format("%Y-%m-%d")
            .to_string()
    }
}

/// Metadata shown for every gateway order, ahead of the method's own keys.
pub const COMMON_META_SCHEMA: &[(&str, &str)] = &[
    (meta::TRADE_NO, "UNi Serial No"),
    (meta::TRADE_STATUS, "Trade Status"),
    (meta::TRADE_AMOUNT, "Trade Amount"),
    (meta::STATUS, "Status Code"),
    (meta::MESSAGE, "Status Message"),
];

/// One checkout option offered through the hosted payment page.
pub trait PaymentMethod: Send + Sync {
    fn id(&self) -> &str;

    fn title(&self) -> &str;

    /// Method-specific fields merged into the outbound request.
    fn extra_fields(&self, ctx: &MethodContext<'_>) -> FieldMap;

    /// Metadata keys (with display labels) this method's callbacks populate.
    fn meta_schema(&self) -> &'static [(&'static str, &'static str)];

    fn supports_refund(&self) -> bool {
        false
    }

    fn is_installment(&self) -> bool {
        false
    }

    /// Metadata key holding the payment deadline for offline payment methods.
    fn expiry_meta_key(&self) -> Option<&'static str> {
        None
    }

    fn has_expiry_window(&self) -> bool {
        self.expiry_meta_key().is_some()
    }

    fn min_amount(&self) -> Option<Decimal> {
        None
    }

    fn is_available_for(&self, total: Decimal) -> bool {
        match self.min_amount() {
            Some(min) if min > Decimal::ZERO => total >= min,
            _ => true,
        }
    }
}

pub(crate) fn flag_fields(flags: &[(&str, &str)]) -> FieldMap {
    flags
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
