//! Error types for the SQL Server connection.

use prax_automigrate_core::AutoMigrateError;
use thiserror::Error;

/// Result type for SQL Server operations.
pub type MssqlResult<T> = Result<T, MssqlError>;

/// Errors raised by the SQL Server connection.
#[derive(Error, Debug)]
pub enum MssqlError {
    /// Tiberius/SQL Server error.
    #[error("sql server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    /// Socket error while connecting.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Timeout error.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),
}

impl MssqlError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Connection(_) | Self::Timeout(_))
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<MssqlError> for AutoMigrateError {
    fn from(err: MssqlError) -> Self {
        match err {
            MssqlError::Config(msg) => AutoMigrateError::configuration(msg),
            other => AutoMigrateError::database(other.to_string()),
        }
    }
}
