//! Domain models for fee-service.

mod fee_structure;
mod ledger;
mod receipt;
mod session;
mod student;

pub use fee_structure::{FeeStructure, FeeUpdate, DEFAULT_CLASSES, STANDARD_MONTHLY_FEES};
pub use ledger::{coerce_amount, FeeMonth, MonthEntry, MonthLedger, PaymentStatus};
pub use receipt::{NewReceipt, Receipt, ReceiptDraft, ReceiptMonth, ReceiptMonths, ReceiptOutcome};
pub use session::{
    next_session, previous_session, sanitize_session_id, session_from_file_name, store_file_name,
    AcademicYear, SessionIdError,
};
pub use student::{NewStudent, Student, StudentDraft, StudentInsert, StudentUpdate};

pub(crate) use receipt::ReceiptRow;
pub(crate) use student::StudentRow;
