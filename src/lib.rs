//! # prax-automigrate
//!
//! Keep a SQL Server development database in step with a code-defined model
//! by dropping and recreating every table whenever the model's creation
//! script changes.
//!
//! - The creation script is fingerprinted with SHA-256 and compared with the
//!   fingerprint stored at the last run (in a file or a metadata table)
//! - On a change, all user tables are dropped and the script is executed
//! - An endpoint safety gate refuses to run against listed (or unlisted)
//!   servers and databases
//!
//! **Every detected change destroys all data in the target database.** This
//! is a development and test tool, not a production migration system.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prax_automigrate::prelude::*;
//! use prax_automigrate::mssql::MssqlConnection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AutoMigrateConfig::from_file("prax.toml")?;
//!     let conn = MssqlConnection::from_connection_string(std::env::var("DATABASE_URL")?)?;
//!
//!     let mut migrator = AutoMigrator::builder()
//!         .connection(conn)
//!         .script_provider(StaticScript::new(include_str!("../schema.sql")))
//!         .config(&config)
//!         .build()?;
//!
//!     let report = migrator
//!         .migrate_with(config.force, config.storage, || seed())
//!         .await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use prax_automigrate_core::*;

/// SQL Server connection.
#[cfg(feature = "mssql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mssql")))]
pub mod mssql {
    pub use prax_automigrate_mssql::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use prax_automigrate_core::{
        AutoMigrateConfig, AutoMigrateError, AutoMigrateOptions, AutoMigrateResult, AutoMigrator,
        Endpoint, GateMode, MigrationOutcome, MigrationReport, NotifySink, SafetyGate,
        SchemaConnection, ScriptProvider, StaticScript, StorageMode,
    };
}
