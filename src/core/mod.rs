//! Core payroll logic, independent of any request-handling surface.
//!
//! Functions here take a database handle and return typed results; the
//! scheduler is the only long-lived task.

/// Largest-remainder split of a deficit across weighted sources
pub mod allocator;
/// Reading and replacing auto-balance source configuration
pub mod auto_balance;
/// Month boundaries in a given time zone
pub mod calendar;
/// Transactional ledger and budget queries
pub mod ledger;
/// Monthly payroll execution
pub mod payroll;
/// Health-checked retries with failure classification
pub mod retry;
/// Background monthly scheduler
pub mod scheduler;

pub use payroll::{run_budget_payroll, run_monthly_payroll};
pub use scheduler::start_scheduler;
