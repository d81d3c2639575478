//! Data models for Librario

pub mod borrow;
pub mod payment;
pub mod plan;
pub mod session;

// Re-export commonly used types
pub use borrow::{BookCondition, BorrowRecord, BorrowStatus, BorrowView, DamageKind, DisplayStatus};
pub use payment::{Payment, PaymentCategory, PaymentMode, PaymentStatus};
pub use plan::PlanTerms;
pub use session::{Role, Session};
