use crate::payments::meta;
use crate::payments::method::{flag_fields, MethodContext, PaymentMethod};
use crate::payments::types::FieldMap;

const CARD_WALLET_META_SCHEMA: &[(&str, &str)] = &[
    (meta::CREDIT_AUTH_TYPE, "Auth Type"),
    (meta::CREDIT_AUTH_DAY, "Auth Date"),
    (meta::CREDIT_AUTH_TIME, "Auth Time"),
];

const LINE_PAY_META_SCHEMA: &[(&str, &str)] = &[(meta::LINE_PAY_NO, "Pay No")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletKind {
    ApplePay,
    GooglePay,
    SamsungPay,
    LinePay,
    UnionPay,
}

impl WalletKind {
    pub const ALL: [WalletKind; 5] = [
        WalletKind::ApplePay,
        WalletKind::GooglePay,
        WalletKind::SamsungPay,
        WalletKind::LinePay,
        WalletKind::UnionPay,
    ];

    fn id(&self) -> &'static str {
        match self {
            WalletKind::ApplePay => "payuni-upp-applepay",
            WalletKind::GooglePay => "payuni-upp-googlepay",
            WalletKind::SamsungPay => "payuni-upp-samsungpay",
            WalletKind::LinePay => "payuni-upp-linepay",
            WalletKind::UnionPay => "payuni-upp-unionpay",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            WalletKind::ApplePay => "PAYUNi Apple Pay",
            WalletKind::GooglePay => "PAYUNi Google Pay",
            WalletKind::SamsungPay => "PAYUNi Samsung Pay",
            WalletKind::LinePay => "PAYUNi LINE Pay",
            WalletKind::UnionPay => "PAYUNi UnionPay",
        }
    }

    fn flags(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            WalletKind::ApplePay => &[("ApplePay", "1")],
            WalletKind::GooglePay => &[("GooglePay", "1")],
            WalletKind::SamsungPay => &[("SamsungPay", "1")],
            WalletKind::LinePay => &[("LinePay", "1")],
            WalletKind::UnionPay => &[("CreditUnionPay", "1"), ("Union3D", "1")],
        }
    }
}

/// Wallet and card-network methods that settle through the card rails (LINE Pay aside).
#[derive(Debug, Clone)]
pub struct WalletMethod {
    kind: WalletKind,
}

impl WalletMethod {
    pub fn new(kind: WalletKind) -> Self {
        Self { kind }
    }
}

impl PaymentMethod for WalletMethod {
    fn id(&self) -> &str {
        self.kind.id()
    }

    fn title(&self) -> &str {
        self.kind.title()
    }

    fn extra_fields(&self, _ctx: &MethodContext<'_>) -> FieldMap {
        flag_fields(self.kind.flags())
    }

    fn meta_schema(&self) -> &'static [(&'static str, &'static str)] {
        match self.kind {
            WalletKind::LinePay => LINE_PAY_META_SCHEMA,
            _ => CARD_WALLET_META_SCHEMA,
        }
    }

    fn supports_refund(&self) -> bool {
        self.kind != WalletKind::LinePay
    }
}
