//! Order metadata keys for persisted transaction records.
//!
//! Orders written before schema version 1.5.0 stored the same values under a shorter
//! `_payuni_` prefix. Reads go through [`meta_key`] so both generations resolve; writes
//! always use the current keys and bump the order's version marker.

use crate::payments::order::Order;
use std::borrow::Cow;
use std::cmp::Ordering;

pub const META_PREFIX: &str = "_wpbr_payuni_upp_";
pub const LEGACY_META_PREFIX: &str = "_payuni_";

/// Version stamped onto every order this crate writes.
pub const META_SCHEMA_VERSION: &str = "1.6.0";
/// Orders tagged below this version (or untagged) use the legacy key prefix.
pub const LEGACY_CUTOFF_VERSION: &str = "1.5.0";

pub const ORDER_NO: &str = "_wpbr_payuni_upp_order_no";
pub const TRADE_NO: &str = "_wpbr_payuni_upp_trade_no";
pub const TRADE_STATUS: &str = "_wpbr_payuni_upp_trade_status";
pub const TRADE_AMOUNT: &str = "_wpbr_payuni_upp_trade_amount";
pub const STATUS: &str = "_wpbr_payuni_upp_status";
pub const MESSAGE: &str = "_wpbr_payuni_upp_message";
pub const PAYMENT_TYPE: &str = "_wpbr_payuni_upp_payment_type";

pub const CREDIT_RES_CODE: &str = "_wpbr_payuni_upp_credit_rescode";
pub const CREDIT_RES_CODE_MSG: &str = "_wpbr_payuni_upp_credit_rescode_msg";
pub const CREDIT_AUTH_TYPE: &str = "_wpbr_payuni_upp_credit_authtype";
pub const CREDIT_CARD_4NO: &str = "_wpbr_payuni_upp_credit_card4no";
pub const CREDIT_AUTH_DAY: &str = "_wpbr_payuni_upp_credit_authday";
pub const CREDIT_AUTH_TIME: &str = "_wpbr_payuni_upp_credit_authtime";
pub const CREDIT_INSTALL: &str = "_wpbr_payuni_upp_credit_cardinst";
pub const CREDIT_FIRST_AMT: &str = "_wpbr_payuni_upp_credit_firstamt";
pub const CREDIT_EACH_AMT: &str = "_wpbr_payuni_upp_credit_eachamt";

pub const ATM_PAY_NO: &str = "_wpbr_payuni_upp_atm_payno";
pub const ATM_BANK_TYPE: &str = "_wpbr_payuni_upp_atm_banktype";
pub const ATM_PAY_TIME: &str = "_wpbr_payuni_upp_atm_paytime";
pub const ATM_ACCOUNT_5NO: &str = "_wpbr_payuni_upp_atm_account5no";
pub const ATM_PAY_SET: &str = "_wpbr_payuni_upp_atm_payset";
pub const ATM_EXPIRE_DATE: &str = "_wpbr_payuni_upp_atm_expiredate";

pub const CVS_PAY_NO: &str = "_wpbr_payuni_upp_cvs_payno";
pub const CVS_STORE: &str = "_wpbr_payuni_upp_cvs_store";
pub const CVS_EXPIRE_DATE: &str = "_wpbr_payuni_upp_cvs_expiredate";

pub const AFTEE_PAY_NO: &str = "_wpbr_payuni_upp_aftee_payno";
pub const AFTEE_PAY_TIME: &str = "_wpbr_payuni_upp_aftee_paytime";
pub const LINE_PAY_NO: &str = "_wpbr_payuni_upp_linepay_payno";

pub const EINVOICE_NO: &str = "_wpbr_payuni_einvoice_no";
pub const EINVOICE_AMT: &str = "_wpbr_payuni_einvoice_amt";
pub const EINVOICE_TIME: &str = "_wpbr_payuni_einvoice_time";
pub const EINVOICE_TYPE: &str = "_wpbr_payuni_einvoice_type";
pub const EINVOICE_INFO: &str = "_wpbr_payuni_einvoice_info";
pub const EINVOICE_STATUS: &str = "_wpbr_payuni_einvoice_status";

pub const PLUGIN_VERSION: &str = "_wpbr_payuni_upp_plugin_version";

// Attempt serial and reference format; never renamed across versions.
pub const ORDER_SERIAL_NO: &str = "_payuni_order_serial_no";
pub const TRADE_NO_FORMAT: &str = "_payuni_trade_no_format";

/// Compares dotted numeric versions, padding the shorter one with zeros.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.trim()
            .split('.')
            .map(|part| {
                part.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    let (l, r) = (parse(left), parse(right));
    let len = l.len().max(r.len());
    for i in 0..len {
        let a = l.get(i).copied().unwrap_or(0);
        let b = r.get(i).copied().unwrap_or(0);
        match a.cmp(&b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

pub fn is_legacy_order(order: &Order) -> bool {
    match order.meta(PLUGIN_VERSION) {
        Some(version) => compare_versions(version, LEGACY_CUTOFF_VERSION) == Ordering::Less,
        None => true,
    }
}

/// Key under which `key` is stored for this particular order.
pub fn meta_key<'a>(order: &Order, key: &'a str) -> Cow<'a, str> {
    if is_legacy_order(order) && key.starts_with(META_PREFIX) {
        Cow::Owned(key.replacen(META_PREFIX, LEGACY_META_PREFIX, 1))
    } else {
        Cow::Borrowed(key)
    }
}

/// Reads a transaction field, honouring the order's key generation.
pub fn read<'o>(order: &'o Order, key: &str) -> Option<&'o str> {
    order.meta(&meta_key(order, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.4.9", "1.5.0"), Ordering::Less);
        assert_eq!(compare_versions("1.5", "1.5.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.10.0", "1.5.0"), Ordering::Greater);
    }

    #[test]
    fn test_legacy_orders_use_short_prefix() {
        let mut order = Order::new(42, "payuni-credit", Decimal::new(100, 0));
        order.set_meta(PLUGIN_VERSION, "1.4.2");
        assert_eq!(meta_key(&order, TRADE_STATUS), "_payuni_trade_status");

        order.set_meta("_payuni_trade_status", "1");
        assert_eq!(read(&order, TRADE_STATUS), Some("1"));
    }

    #[test]
    fn test_current_orders_keep_full_prefix() {
        let mut order = Order::new(42, "payuni-upp-credit", Decimal::new(100, 0));
        order.set_meta(PLUGIN_VERSION, META_SCHEMA_VERSION);
        assert_eq!(meta_key(&order, TRADE_STATUS), TRADE_STATUS);
        assert_eq!(meta_key(&order, EINVOICE_NO), EINVOICE_NO);
    }
}
