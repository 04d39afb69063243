//! PAYUNi transaction protocol core

pub mod callback;
pub mod client;
pub mod crypto;
pub mod error;
pub mod expiry;
pub mod locks;
pub mod meta;
pub mod method;
pub mod methods;
pub mod order;
pub mod order_ref;
pub mod reconciler;
pub mod registry;
pub mod request_builder;
pub mod scheduler;
pub mod types;
pub mod utils;

// Re-export the services the HTTP layer and worker wire together
pub use callback::{CallbackChannel, CallbackOutcome, CallbackReceiver, ReturnRedirect};
pub use client::{RefundOperation, RefundReceipt, TradeClient};
pub use crypto::{CryptoCodec, Credentials};
pub use error::{PaymentError, PaymentResult, QueryFailure};
pub use expiry::{ExpiryOutcome, ExpiryScheduler, ScheduleOutcome};
pub use locks::{OrderLockGuard, OrderLocks};
pub use order::{Order, OrderItem, OrderStore};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use registry::MethodRegistry;
pub use request_builder::{PaymentForm, RequestBuilder};
