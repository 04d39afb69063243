use crate::config::GatewaySettings;
use crate::payments::meta;
use crate::payments::method::{PaymentMethod, COMMON_META_SCHEMA};
use crate::payments::methods::{
    AfteeMethod, AtmMethod, CreditCardMethod, CreditInstallmentMethod, CvsMethod, WalletKind,
    WalletMethod,
};
use crate::payments::order::Order;
use std::collections::BTreeMap;
use std::sync::Arc;

const CURRENT_ID_PREFIX: &str = "payuni-upp-";
const LEGACY_ID_PREFIX: &str = "payuni-";

/// Immutable method-id lookup built once at startup.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, Arc<dyn PaymentMethod>>,
}

impl MethodRegistry {
    pub fn new(methods: Vec<Arc<dyn PaymentMethod>>) -> Self {
        let methods = methods
            .into_iter()
            .map(|method| (method.id().to_string(), method))
            .collect();
        Self { methods }
    }

    pub fn from_settings(settings: &GatewaySettings) -> Self {
        let mut methods: Vec<Arc<dyn PaymentMethod>> = vec![
            Arc::new(CreditCardMethod::new()),
            Arc::new(AtmMethod::new(settings.atm_expire_days)),
            Arc::new(CvsMethod::new(settings.cvs_expire_days)),
            Arc::new(AfteeMethod::new(settings.aftee_min_amount)),
        ];
        for installs in &settings.installments {
            methods.push(Arc::new(CreditInstallmentMethod::new(
                *installs,
                settings.installment_min_amount,
            )));
        }
        for kind in WalletKind::ALL {
            methods.push(Arc::new(WalletMethod::new(kind)));
        }
        Self::new(methods)
    }

    pub fn get(&self, method_id: &str) -> Option<Arc<dyn PaymentMethod>> {
        self.methods.get(method_id).cloned()
    }

    /// Resolves the order's method, accepting pre-1.5 ids (`payuni-atm`) on legacy orders.
    pub fn for_order(&self, order: &Order) -> Option<Arc<dyn PaymentMethod>> {
        if let Some(method) = self.get(&order.payment_method) {
            return Some(method);
        }
        if !meta::is_legacy_order(order) {
            return None;
        }
        let legacy = order
            .payment_method
            .strip_prefix(LEGACY_ID_PREFIX)
            .filter(|rest| !rest.starts_with("upp-"))?;
        self.get(&format!("{}{}", CURRENT_ID_PREFIX, legacy))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    /// Labelled metadata rows for an order's payment detail panel.
    pub fn payment_details(&self, order: &Order) -> Vec<(&'static str, String)> {
        let method_schema = self
            .for_order(order)
            .map(|method| method.meta_schema())
            .unwrap_or(&[]);

        let mut rows = vec![(
            "Merchant Trade No",
            meta::read(order, meta::ORDER_NO).unwrap_or_default().to_string(),
        )];
        for (key, label) in COMMON_META_SCHEMA.iter().chain(method_schema.iter()) {
            rows.push((*label, meta::read(order, key).unwrap_or_default().to_string()));
        }
        rows
    }
}
