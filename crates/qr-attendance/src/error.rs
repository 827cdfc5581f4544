//! Error types for qr-attendance.
//!
//! Only hard failures live here. Soft outcomes of a check-in (no code in the
//! image, unknown registration number, duplicate scan) are ordinary values,
//! see [`crate::scanner::ScanResult`] and [`crate::marker::MarkStatus`].

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for qr-attendance operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Roster Errors ===
    /// Failed to read or parse the roster file.
    #[error("failed to read roster at {path}: {source}")]
    RosterRead {
        /// Path to the roster file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: csv::Error,
    },

    /// A required column is missing from the roster header.
    #[error("roster has no '{column}' column")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// A data row does not have one cell per header column.
    #[error("roster row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        /// One-based data row.
        row: usize,
        /// Cells in the row.
        found: usize,
        /// Columns in the header as read from the file.
        expected: usize,
    },

    /// The same registration number appears on more than one row.
    #[error("registration number '{registration}' appears more than once (row {row})")]
    DuplicateRegistration {
        /// The repeated registration number.
        registration: String,
        /// One-based data row of the second occurrence.
        row: usize,
    },

    /// Writing the roster back to disk failed.
    ///
    /// The in-memory change that triggered the write has been rolled back.
    #[error("failed to save roster to {path}: {source}")]
    Persistence {
        /// Path to the roster file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Another process holds the roster lock.
    #[error("roster {path} is locked by another process: {source}")]
    RosterLocked {
        /// Path to the lock file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for qr-attendance operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a missing column error.
    #[must_use]
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    /// Create a persistence error for the given roster path.
    #[must_use]
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Check if this error means the roster could not be written back.
    #[must_use]
    pub fn is_persistence_error(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// Check if this error means another process owns the roster.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::RosterLocked { .. })
    }
}
