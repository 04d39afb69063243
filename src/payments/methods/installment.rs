use crate::payments::meta;
use crate::payments::method::{flag_fields, MethodContext, PaymentMethod};
use crate::payments::types::FieldMap;
use rust_decimal::Decimal;

const INSTALLMENT_META_SCHEMA: &[(&str, &str)] = &[
    (meta::CREDIT_AUTH_TYPE, "Auth Type"),
    (meta::CREDIT_CARD_4NO, "Card Last 4 No"),
    (meta::CREDIT_INSTALL, "Installments"),
    (meta::CREDIT_FIRST_AMT, "First Amount"),
    (meta::CREDIT_EACH_AMT, "Each Amount"),
    (meta::CREDIT_AUTH_DAY, "Auth Date"),
    (meta::CREDIT_AUTH_TIME, "Auth Time"),
];

/// Card payment split into `installs` monthly charges. Refunds must cover the full total.
#[derive(Debug, Clone)]
pub struct CreditInstallmentMethod {
    id: String,
    title: String,
    installs: u32,
    min_amount: Decimal,
}

impl CreditInstallmentMethod {
    pub fn new(installs: u32, min_amount: Decimal) -> Self {
        Self {
            id: format!("payuni-upp-installment-{}", installs),
            title: format!("PAYUNi Credit Card Installment ({} payments)", installs),
            installs,
            min_amount,
        }
    }
}

impl PaymentMethod for CreditInstallmentMethod {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn extra_fields(&self, _ctx: &MethodContext<'_>) -> FieldMap {
        flag_fields(&[("CreditInst", &self.installs.to_string())])
    }

    fn meta_schema(&self) -> &'static [(&'static str, &'static str)] {
        INSTALLMENT_META_SCHEMA
    }

    fn supports_refund(&self) -> bool {
        true
    }

    fn is_installment(&self) -> bool {
        true
    }

    fn min_amount(&self) -> Option<Decimal> {
        Some(self.min_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installment_identity() {
        let method = CreditInstallmentMethod::new(12, Decimal::new(3000, 0));
        assert_eq!(method.id(), "payuni-upp-installment-12");
        assert!(method.is_installment());
        assert!(!method.is_available_for(Decimal::new(2999, 0)));
        assert!(method.is_available_for(Decimal::new(3000, 0)));
    }
}
