pub mod allocation;
pub mod carry_forward;
pub mod fee_service;
pub mod metrics;
pub mod receipts;
pub mod registry;
pub mod store;

pub use allocation::{apply_payment, Allocation};
pub use carry_forward::{seed_from_previous, CarryForwardReport};
pub use fee_service::FeeService;
pub use metrics::{get_metrics, init_metrics};
pub use receipts::{format_receipt_number, record_receipt};
pub use registry::SessionRegistry;
pub use store::{BalanceUpdate, SessionStore, StoreOptions};
