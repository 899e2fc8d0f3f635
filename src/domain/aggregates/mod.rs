//! Aggregates module
pub mod material;
pub mod cart;
pub mod order;
pub mod order_group;
pub mod payment;
pub mod wallet;

pub use material::{Material, MaterialError, MaterialStatus};
pub use cart::{Cart, CartError, CartItem, CartStatus};
pub use order::{Address, FulfillmentStatus, LineItem, Order, OrderError, PaymentStatus, Settlement};
pub use order_group::{GroupError, GroupStatus, OrderGroup};
pub use payment::{GatewayReceipt, Payment, PaymentError, PaymentMethod, PaymentPurpose, PaymentState};
pub use wallet::{BalanceChange, TransactionKind, TransactionStatus, Wallet, WalletError, WalletTransaction};
