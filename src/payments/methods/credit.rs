use crate::payments::meta;
use crate::payments::method::{flag_fields, MethodContext, PaymentMethod};
use crate::payments::methods::CREDIT_ID;
use crate::payments::types::FieldMap;

pub(crate) const CREDIT_META_SCHEMA: &[(&str, &str)] = &[
    (meta::CREDIT_RES_CODE, "Response Code"),
    (meta::CREDIT_RES_CODE_MSG, "Response Message"),
    (meta::CREDIT_AUTH_TYPE, "Auth Type"),
    (meta::CREDIT_CARD_4NO, "Card Last 4 No"),
    (meta::CREDIT_AUTH_DAY, "Auth Date"),
    (meta::CREDIT_AUTH_TIME, "Auth Time"),
];

#[derive(Debug, Clone)]
pub struct CreditCardMethod {
    title: String,
}

impl CreditCardMethod {
    pub fn new() -> Self {
        Self {
            title: "PAYUNi Credit Card".to_string(),
        }
    }
}

impl Default for CreditCardMethod {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentMethod for CreditCardMethod {
    fn id(&self) -> &str {
        CREDIT_ID
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn extra_fields(&self, _ctx: &MethodContext<'_>) -> FieldMap {
        flag_fields(&[("Credit", "1")])
    }

    fn meta_schema(&self) -> &'static [(&'static str, &'static str)] {
        CREDIT_META_SCHEMA
    }

    fn supports_refund(&self) -> bool {
        true
    }
}
