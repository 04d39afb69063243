use crate::payments::meta;
use crate::payments::method::{MethodContext, PaymentMethod};
use crate::payments::methods::CVS_ID;
use crate::payments::types::FieldMap;

const CVS_META_SCHEMA: &[(&str, &str)] = &[
    (meta::CVS_PAY_NO, "Pay No"),
    (meta::CVS_STORE, "CVS Store"),
    (meta::CVS_EXPIRE_DATE, "Expire Date"),
];

/// Convenience-store payment code valid for `expire_days`.
#[derive(Debug, Clone)]
pub struct CvsMethod {
    title: String,
    expire_days: u32,
}

impl CvsMethod {
    pub fn new(expire_days: u32) -> Self {
        Self {
            title: "PAYUNi Convenience Store Code".to_string(),
            expire_days,
        }
    }
}

impl PaymentMethod for CvsMethod {
    fn id(&self) -> &str {
        CVS_ID
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn extra_fields(&self, ctx: &MethodContext<'_>) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("CVS".to_string(), "1".to_string());
        fields.insert("ExpireDate".to_string(), ctx.expire_date(self.expire_days));
        fields
    }

    fn meta_schema(&self) -> &'static [(&'static str, &'static str)] {
        CVS_META_SCHEMA
    }

    fn expiry_meta_key(&self) -> Option<&'static str> {
        Some(meta::CVS_EXPIRE_DATE)
    }
}
