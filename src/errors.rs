//! Unified error type for the payroll engine.
//!
//! Validation errors are caller-visible and never retried. Storage errors are
//! split into transient (the connection is no longer usable) and permanent by
//! [`Error::failure_kind`], which the retry runner uses to decide whether a
//! failed attempt is worth repeating.

use crate::money::Money;
use sea_orm::{DbErr, RuntimeErr, sqlx};
use std::time::Duration;
use thiserror::Error;

/// Substrings that mark a driver error as a dropped or unusable connection.
/// Only consulted when the typed variant does not already say so.
const BAD_CONNECTION_MARKERS: [&str; 2] = ["bad connection", "connection closed"];

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Ledger entries must carry a strictly positive amount.
    #[error("Invalid amount: {amount} (must be greater than zero)")]
    InvalidAmount {
        /// The rejected amount
        amount: Money,
    },

    /// Auto-balance weights live in `[0, 100]`.
    #[error("Invalid weight {weight} for source budget {source_budget_id} (must be between 0 and 100)")]
    InvalidWeight {
        /// Source budget carrying the weight
        source_budget_id: i64,
        /// The rejected weight
        weight: i32,
    },

    /// A budget cannot auto-balance from itself.
    #[error("Budget {budget_id} cannot be its own auto-balance source")]
    SelfReferencingSource {
        /// The budget referenced on both ends
        budget_id: i64,
    },

    /// Each source may appear once per target.
    #[error("Source budget {source_budget_id} listed more than once")]
    DuplicateSource {
        /// The repeated source
        source_budget_id: i64,
    },

    /// Unknown budget, or a budget the actor is not a member of.
    #[error("Budget not found: {budget_id}")]
    BudgetNotFound {
        /// The requested budget
        budget_id: i64,
    },

    /// Error reported by the database layer.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// The store failed its health check.
    #[error("Database unavailable: {message}")]
    Unavailable {
        /// What went wrong while checking
        message: String,
    },

    /// A bounded operation ran past its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Name of the operation
        operation: &'static str,
        /// The deadline that was exceeded
        after: Duration,
    },

    /// The shared cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// Calendar arithmetic produced no valid local instant.
    #[error("Schedule error: {message}")]
    Schedule {
        /// Description of the failed computation
        message: String,
    },

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// I/O failure outside the database.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a failed attempt should be treated by the retry runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connectivity problem; another attempt may succeed.
    Transient,
    /// Retrying will not help.
    Permanent,
    /// The shared context was cancelled; stop without retrying.
    Cancelled,
}

impl Error {
    /// Classifies this error for retry purposes.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Cancelled => FailureKind::Cancelled,
            Self::Unavailable { .. }
            | Self::Database(DbErr::ConnectionAcquire(_) | DbErr::Conn(_)) => {
                FailureKind::Transient
            }
            Self::Database(
                DbErr::Query(RuntimeErr::SqlxError(e)) | DbErr::Exec(RuntimeErr::SqlxError(e)),
            ) if connection_lost(e) => FailureKind::Transient,
            other if mentions_bad_connection(&other.to_string()) => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }

    /// Shorthand for `failure_kind() == FailureKind::Transient`.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.failure_kind() == FailureKind::Transient
    }

    /// True for errors caused by bad caller input rather than the store.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount { .. }
                | Self::InvalidWeight { .. }
                | Self::SelfReferencingSource { .. }
                | Self::DuplicateSource { .. }
                | Self::BudgetNotFound { .. }
        )
    }
}

/// Driver errors raised by a statement whose connection dropped underneath it.
const fn connection_lost(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed
    )
}

fn mentions_bad_connection(message: &str) -> bool {
    let lowered = message.to_lowercase();
    BAD_CONNECTION_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ConnAcquireErr;
    use std::io;

    #[test]
    fn test_connection_acquire_is_transient() {
        let err = Error::from(DbErr::ConnectionAcquire(ConnAcquireErr::ConnectionClosed));
        assert_eq!(err.failure_kind(), FailureKind::Transient);

        let err = Error::from(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout));
        assert!(err.is_transient());
    }

    #[test]
    fn test_conn_error_is_transient() {
        let err = Error::from(DbErr::Conn(RuntimeErr::Internal(
            "socket reset".to_string(),
        )));
        assert!(err.is_transient());
    }

    #[test]
    fn test_dropped_connection_mid_statement_is_transient() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        let err = Error::from(DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Io(reset))));
        assert_eq!(err.failure_kind(), FailureKind::Transient);

        let err = Error::from(DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::PoolClosed)));
        assert!(err.is_transient());

        let err = Error::from(DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::RowNotFound)));
        assert_eq!(err.failure_kind(), FailureKind::Permanent);
    }

    #[test]
    fn test_bad_connection_substring_is_transient() {
        let err = Error::from(DbErr::Custom("driver: Bad Connection".to_string()));
        assert!(err.is_transient());
    }

    #[test]
    fn test_unrelated_errors_are_permanent() {
        let err = Error::from(DbErr::Custom("unique constraint violated".to_string()));
        assert_eq!(err.failure_kind(), FailureKind::Permanent);

        let err = Error::Timeout {
            operation: "payroll run",
            after: Duration::from_secs(10),
        };
        assert_eq!(err.failure_kind(), FailureKind::Permanent);
    }

    #[test]
    fn test_unavailable_and_cancelled() {
        let err = Error::Unavailable {
            message: "ping failed".to_string(),
        };
        assert!(err.is_transient());
        assert_eq!(Error::Cancelled.failure_kind(), FailureKind::Cancelled);
    }

    #[test]
    fn test_validation_errors() {
        assert!(
            Error::InvalidAmount {
                amount: Money::zero()
            }
            .is_validation()
        );
        assert!(Error::DuplicateSource { source_budget_id: 3 }.is_validation());
        assert!(!Error::Cancelled.is_validation());
    }
}
