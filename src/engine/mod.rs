//! Borrow lifecycle, fine computation and payment reconciliation
//!
//! Pure domain logic with no I/O: services load records from the stores,
//! run them through these functions and persist whatever comes back.

pub mod classifier;
pub mod fines;
pub mod ledger;
pub mod lifecycle;
pub mod renewal;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;
