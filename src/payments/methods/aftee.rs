use crate::payments::meta;
use crate::payments::method::{flag_fields, MethodContext, PaymentMethod};
use crate::payments::methods::AFTEE_ID;
use crate::payments::types::FieldMap;
use rust_decimal::Decimal;

const AFTEE_META_SCHEMA: &[(&str, &str)] = &[
    (meta::AFTEE_PAY_NO, "Pay No"),
    (meta::AFTEE_PAY_TIME, "Pay Time"),
];

#[derive(Debug, Clone)]
pub struct AfteeMethod {
    title: String,
    min_amount: Decimal,
}

impl AfteeMethod {
    pub fn new(min_amount: Decimal) -> Self {
        Self {
            title: "PAYUNi AFTEE".to_string(),
            min_amount,
        }
    }
}

impl PaymentMethod for AfteeMethod {
    fn id(&self) -> &str {
        AFTEE_ID
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn extra_fields(&self, _ctx: &MethodContext<'_>) -> FieldMap {
        flag_fields(&[("Aftee", "1")])
    }

    fn meta_schema(&self) -> &'static [(&'static str, &'static str)] {
        AFTEE_META_SCHEMA
    }

    fn min_amount(&self) -> Option<Decimal> {
        Some(self.min_amount)
    }
}
