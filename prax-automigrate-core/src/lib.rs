//! # prax-automigrate-core
//!
//! Recreate-from-scratch schema synchronization for SQL Server databases.
//!
//! This crate keeps a development or test database in step with a
//! code-defined model without migration files:
//! - Fingerprinting the model's creation script with SHA-256
//! - Persisting the last applied fingerprint in a file or a metadata table
//! - Dropping every user table and re-running the script when the
//!   fingerprint changes
//! - A safety gate that refuses to touch listed (or unlisted) endpoints
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ ScriptProvider │────▶│ Fingerprint  │────▶│ FingerprintStore │
//! └────────────────┘     └──────────────┘     └──────────────────┘
//!                               │ changed?
//!                               ▼
//!                        ┌──────────────┐     ┌──────────────────┐
//!                        │ Drop tables  │────▶│ Run script       │
//!                        └──────────────┘     └──────────────────┘
//!                                                     │
//!                                                     ▼
//!                                             ┌──────────────────┐
//!                                             │ Store + callback │
//!                                             └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use prax_automigrate_core::{AutoMigrator, SafetyGate, StaticScript, StorageMode};
//!
//! async fn sync(conn: impl SchemaConnection) -> Result<(), AutoMigrateError> {
//!     let mut migrator = AutoMigrator::builder()
//!         .connection(conn)
//!         .script_provider(StaticScript::new(include_str!("schema.sql")))
//!         .safety(SafetyGate::deny([Endpoint::new("prod-sql", "sales")?]))
//!         .build()?;
//!
//!     let report = migrator
//!         .migrate_with(false, StorageMode::Database, || seed_test_data())
//!         .await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! Every run that detects a change destroys all data in the target database.

pub mod config;
pub mod connection;
pub mod engine;
pub mod eradicate;
pub mod error;
pub mod fingerprint;
pub mod gate;
pub mod logging;
pub mod notify;
pub mod script;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use config::{
    AutoMigrateConfig, AutoMigrateOptions, DEFAULT_METADATA_SCHEMA, DEFAULT_METADATA_TABLE,
};
pub use connection::{SchemaConnection, commit_pending, ensure_open, quote_ident};
pub use engine::{
    AutoMigrator, AutoMigratorBuilder, MigrationOutcome, MigrationPlan, MigrationReport,
};
pub use eradicate::{DROP_ALL_TABLES_SQL, drop_all_tables};
pub use error::{AutoMigrateError, AutoMigrateResult, BoxError, Phase};
pub use fingerprint::Fingerprint;
pub use gate::{Endpoint, GateMode, SafetyGate};
pub use notify::{MESSAGE_PREFIX, Notifier, NotifySink};
pub use script::{
    ScriptProvider, StaticScript, is_batch_separator, prepare_execution_script,
    strip_batch_separators,
};
pub use store::{DatabaseStore, FileStore, FingerprintStore, StorageMode};
