//! # prax-automigrate-mssql
//!
//! Microsoft SQL Server connection for the auto-migrator, built on `tiberius`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use prax_automigrate_core::{AutoMigrator, SafetyGate, StaticScript, StorageMode};
//! use prax_automigrate_mssql::MssqlConnection;
//!
//! let conn = MssqlConnection::from_connection_string(
//!     "Server=localhost;Database=dev;User Id=sa;Password=YourPassword123!;TrustServerCertificate=true",
//! )?;
//!
//! let mut migrator = AutoMigrator::builder()
//!     .connection(conn)
//!     .script_provider(StaticScript::new(include_str!("schema.sql")))
//!     .safety(SafetyGate::default())
//!     .build()?;
//!
//! migrator.migrate(false, StorageMode::Database).await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;

pub use config::{DEFAULT_PORT, EncryptionMode, MssqlConfig, MssqlConfigBuilder};
pub use connection::MssqlConnection;
pub use error::{MssqlError, MssqlResult};
