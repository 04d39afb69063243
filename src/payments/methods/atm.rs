use crate::payments::meta;
use crate::payments::method::{MethodContext, PaymentMethod};
use crate::payments::methods::ATM_ID;
use crate::payments::types::FieldMap;

const ATM_META_SCHEMA: &[(&str, &str)] = &[
    (meta::ATM_PAY_NO, "Pay No"),
    (meta::ATM_BANK_TYPE, "Bank Code"),
    (meta::ATM_EXPIRE_DATE, "Expire Date"),
    (meta::ATM_PAY_TIME, "Pay Time"),
    (meta::ATM_ACCOUNT_5NO, "Account 5 No"),
];

/// Virtual bank account valid for `expire_days`.
#[derive(Debug, Clone)]
pub struct AtmMethod {
    title: String,
    expire_days: u32,
}

impl AtmMethod {
    pub fn new(expire_days: u32) -> Self {
        Self {
            title: "PAYUNi ATM Transfer".to_string(),
            expire_days,
        }
    }
}

impl PaymentMethod for AtmMethod {
    fn id(&self) -> &str {
        ATM_ID
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn extra_fields(&self, ctx: &MethodContext<'_>) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("ATM".to_string(), "1".to_string());
        fields.insert("ExpireDate".to_string(), ctx.expire_date(self.expire_days));
        fields
    }

    fn meta_schema(&self) -> &'static [(&'static str, &'static str)] {
        ATM_META_SCHEMA
    }

    fn expiry_meta_key(&self) -> Option<&'static str> {
        Some(meta::ATM_EXPIRE_DATE)
    }
}
