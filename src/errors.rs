//! Unified error types and result handling for the workflow engine.
//!
//! Every operation returns a specific error kind rather than a raw exception:
//! `NotFound` and `InvalidState` are surfaced to the caller and never retried
//! automatically; `Busy` is transient lock contention and safe to retry (the
//! operation had no partial effect); `Database` is a fatal storage failure.
//! Insufficient stock is advisory only and is reported as a value
//! ([`crate::core::inventory::StockCheck`]), never as an error.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced entity id does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity type name (e.g. "Printer")
        entity: &'static str,
        /// Primary key that was looked up
        id: i64,
    },

    /// Assignment attempted against a printer that is not idle and free.
    #[error("printer {printer_id} already has a job or is not idle")]
    PrinterBusy {
        /// The contended printer
        printer_id: i64,
    },

    /// A transition was attempted from an illegal source state.
    #[error("invalid state for {entity} {id}: {message}")]
    InvalidState {
        /// Entity type name
        entity: &'static str,
        /// Primary key of the entity
        id: i64,
        /// The violated precondition
        message: String,
    },

    /// Row lock could not be acquired within the bounded wait. Retryable.
    #[error("{entity} {id} is locked by another operation")]
    Busy {
        /// Entity type name
        entity: &'static str,
        /// Primary key of the locked row
        id: i64,
    },

    /// A gram amount was negative or not a finite number.
    #[error("invalid gram amount: {grams}")]
    InvalidAmount {
        /// The rejected value
        grams: f64,
    },

    /// Configuration error (env, seed file, validation).
    #[error("configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Underlying storage failure. Fatal, not retried by the engine.
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Audit snapshot could not be serialized.
    #[error("snapshot serialization error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// I/O error (seed file reads).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error.
    #[error("environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl Error {
    /// Whether the caller may safely retry the failed operation.
    ///
    /// Only lock contention qualifies: the operation observed no state and
    /// mutated nothing.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
