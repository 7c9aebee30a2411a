//! Fingerprint persistence.
//!
//! Two interchangeable backends hold the fingerprint of the last applied
//! schema:
//!
//! - [`FileStore`] keeps the raw hex digest as the entire content of a file.
//! - [`DatabaseStore`] keeps it in the `Hash` column of a dedicated metadata
//!   table inside the target database.
//!
//! A missing file or table means "no prior fingerprint", never an error.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AutoMigrateOptions;
use crate::connection::{SchemaConnection, commit_pending, ensure_open, quote_ident};
use crate::error::{AutoMigrateError, AutoMigrateResult, Phase};
use crate::fingerprint::Fingerprint;

/// Where the fingerprint is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Plain text file on the local filesystem.
    #[default]
    File,
    /// Metadata table inside the target database.
    Database,
}

impl StorageMode {
    /// Build the store for this mode from the options.
    pub fn store(&self, options: &AutoMigrateOptions) -> Box<dyn FingerprintStore> {
        match self {
            Self::File => Box::new(FileStore::new(&options.fingerprint_file)),
            Self::Database => Box::new(DatabaseStore::new(
                &options.metadata_schema,
                &options.metadata_table,
            )),
        }
    }
}

/// Reads and writes the current schema fingerprint.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Read the stored fingerprint, `None` when nothing was stored yet.
    async fn read(&self, conn: &mut dyn SchemaConnection)
    -> AutoMigrateResult<Option<Fingerprint>>;

    /// Replace the stored fingerprint.
    async fn write(
        &self,
        conn: &mut dyn SchemaConnection,
        fingerprint: &Fingerprint,
    ) -> AutoMigrateResult<()>;

    /// DDL that must run before the creation script so the store survives
    /// a drop-and-recreate cycle.
    fn bootstrap_sql(&self) -> Option<String> {
        None
    }

    /// Human-readable location, for log output.
    fn describe(&self) -> String;
}

/// File-backed fingerprint store.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store for the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The fingerprint file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FingerprintStore for FileStore {
    async fn read(
        &self,
        _conn: &mut dyn SchemaConnection,
    ) -> AutoMigrateResult<Option<Fingerprint>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.is_empty() => Ok(None),
            Ok(content) => Ok(Some(Fingerprint::from_stored(content))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No fingerprint file");
                Ok(None)
            }
            Err(e) => Err(AutoMigrateError::persistence_io(
                Phase::Read,
                format!("cannot read {}", self.path.display()),
                e,
            )),
        }
    }

    async fn write(
        &self,
        _conn: &mut dyn SchemaConnection,
        fingerprint: &Fingerprint,
    ) -> AutoMigrateResult<()> {
        tokio::fs::write(&self.path, fingerprint.as_str())
            .await
            .map_err(|e| {
                AutoMigrateError::persistence_io(
                    Phase::Write,
                    format!("cannot write {}", self.path.display()),
                    e,
                )
            })
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Database-backed fingerprint store.
///
/// The metadata table has a single `Hash` column. Writes clear the table
/// before inserting, so it holds exactly one row and `TOP 1` is always the
/// latest fingerprint. The existence check is schema-qualified, so a
/// same-named table in another schema does not count.
#[derive(Debug, Clone)]
pub struct DatabaseStore {
    schema: String,
    table: String,
}

impl DatabaseStore {
    /// Create a store for `[schema].[table]`.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// The metadata table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fully quoted `[schema].[table]`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Statement creating the metadata table.
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE {}(Hash nvarchar(max) NOT NULL)",
            self.qualified_name()
        )
    }

    /// Statement replacing the stored fingerprint with `@P1`.
    ///
    /// Clear and insert share one transaction; `XACT_ABORT` rolls both back
    /// if the insert fails.
    pub fn replace_sql(&self) -> String {
        let table = self.qualified_name();
        format!(
            "SET XACT_ABORT ON; BEGIN TRANSACTION; \
             DELETE FROM {table}; \
             INSERT INTO {table} (Hash) VALUES (@P1); \
             COMMIT TRANSACTION;"
        )
    }

    async fn table_exists(&self, conn: &mut dyn SchemaConnection) -> AutoMigrateResult<bool> {
        let found = conn
            .query_text(
                "SELECT t.name FROM sys.tables t \
                 JOIN sys.schemas s ON s.schema_id = t.schema_id \
                 WHERE s.name = @P1 AND t.name = @P2",
                &[self.schema.as_str(), self.table.as_str()],
            )
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl FingerprintStore for DatabaseStore {
    async fn read(
        &self,
        conn: &mut dyn SchemaConnection,
    ) -> AutoMigrateResult<Option<Fingerprint>> {
        let result: AutoMigrateResult<Option<Fingerprint>> = async {
            ensure_open(conn).await?;
            commit_pending(conn).await?;

            if !self.table_exists(conn).await? {
                debug!(table = %self.qualified_name(), "No metadata table");
                return Ok(None);
            }

            let sql = format!("SELECT TOP 1 [Hash] FROM {}", self.qualified_name());
            let hash = conn.query_text(&sql, &[]).await?;
            Ok(hash.map(Fingerprint::from_stored))
        }
        .await;

        result.map_err(|e| e.in_phase(Phase::Read))
    }

    async fn write(
        &self,
        conn: &mut dyn SchemaConnection,
        fingerprint: &Fingerprint,
    ) -> AutoMigrateResult<()> {
        let result: AutoMigrateResult<()> = async {
            ensure_open(conn).await?;
            commit_pending(conn).await?;

            conn.execute(&self.replace_sql(), &[fingerprint.as_str()]).await?;
            Ok(())
        }
        .await;

        result.map_err(|e| e.in_phase(Phase::Write))
    }

    fn bootstrap_sql(&self) -> Option<String> {
        Some(self.create_table_sql())
    }

    fn describe(&self) -> String {
        format!("table {}", self.qualified_name())
    }
}
