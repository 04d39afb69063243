mod aftee;
mod atm;
mod credit;
mod cvs;
mod installment;
mod wallet;

pub use aftee::AfteeMethod;
pub use atm::AtmMethod;
pub use credit::CreditCardMethod;
pub use cvs::CvsMethod;
pub use installment::CreditInstallmentMethod;
pub use wallet::{WalletKind, WalletMethod};

pub const CREDIT_ID: &str = "payuni-upp-credit";
pub const ATM_ID: &str = "payuni-upp-atm";
pub const CVS_ID: &str = "payuni-upp-cvs";
pub const AFTEE_ID: &str = "payuni-upp-aftee";

/// Methods whose callbacks drive auto-cancellation scheduling.
pub const EXPIRY_METHOD_IDS: [&str; 2] = [ATM_ID, CVS_ID];
