//! Auto-migrator options and configuration file loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AutoMigrateError, AutoMigrateResult};
use crate::gate::SafetyGate;
use crate::store::StorageMode;

/// Default name of the metadata table (and of the fingerprint file).
pub const DEFAULT_METADATA_TABLE: &str = "__dbMetadata";

/// Default schema of the metadata table.
pub const DEFAULT_METADATA_SCHEMA: &str = "dbo";

/// Options fixed for the lifetime of a migrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoMigrateOptions {
    /// Metadata table used by [`StorageMode::Database`].
    pub metadata_table: String,
    /// Schema the metadata table lives in.
    pub metadata_schema: String,
    /// Fingerprint file used by [`StorageMode::File`].
    pub fingerprint_file: PathBuf,
    /// Whether progress messages are emitted.
    pub logging_enabled: bool,
}

impl Default for AutoMigrateOptions {
    fn default() -> Self {
        Self {
            metadata_table: DEFAULT_METADATA_TABLE.to_string(),
            metadata_schema: DEFAULT_METADATA_SCHEMA.to_string(),
            fingerprint_file: default_fingerprint_file(DEFAULT_METADATA_TABLE),
            logging_enabled: true,
        }
    }
}

impl AutoMigrateOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the metadata table name.
    pub fn metadata_table(mut self, name: impl Into<String>) -> Self {
        self.metadata_table = name.into();
        self
    }

    /// Set the metadata table schema.
    pub fn metadata_schema(mut self, schema: impl Into<String>) -> Self {
        self.metadata_schema = schema.into();
        self
    }

    /// Set the fingerprint file path.
    pub fn fingerprint_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.fingerprint_file = path.into();
        self
    }

    /// Enable or disable progress messages.
    pub fn logging_enabled(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    /// Check that names are usable.
    pub fn validate(&self) -> AutoMigrateResult<()> {
        if self.metadata_table.trim().is_empty() {
            return Err(AutoMigrateError::configuration(
                "metadata table name must not be empty",
            ));
        }
        if self.metadata_schema.trim().is_empty() {
            return Err(AutoMigrateError::configuration(
                "metadata schema must not be empty",
            ));
        }
        if self.fingerprint_file.as_os_str().is_empty() {
            return Err(AutoMigrateError::configuration(
                "fingerprint file path must not be empty",
            ));
        }
        Ok(())
    }
}

/// `<cwd>/<name>`, or just `<name>` when the working directory is unavailable.
fn default_fingerprint_file(name: &str) -> PathBuf {
    std::env::current_dir().unwrap_or_default().join(name)
}

/// The `[automigrate]` table of a project configuration file.
///
/// ```toml
/// [automigrate]
/// storage = "database"
///
/// [automigrate.options]
/// metadata_table = "__dbMetadata"
/// logging_enabled = true
///
/// [automigrate.safety]
/// mode = "allow"
/// endpoints = [{ server = "localhost", database = "${DEV_DB}" }]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoMigrateConfig {
    /// Fingerprint storage backend.
    pub storage: StorageMode,
    /// Migrate even when the schema did not change.
    pub force: bool,
    /// Engine options.
    pub options: AutoMigrateOptions,
    /// Endpoint safety list.
    pub safety: SafetyGate,
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    automigrate: AutoMigrateConfig,
}

impl AutoMigrateConfig {
    /// Load the `[automigrate]` table from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AutoMigrateResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AutoMigrateError::ConfigFile(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse the `[automigrate]` table from TOML text.
    ///
    /// `${VAR}` references are replaced with environment values before parsing.
    pub fn from_toml(content: &str) -> AutoMigrateResult<Self> {
        let expanded = expand_env_vars(content);
        let file: ConfigFile =
            toml::from_str(&expanded).map_err(|e| AutoMigrateError::ConfigFile(e.to_string()))?;
        file.automigrate.options.validate()?;
        Ok(file.automigrate)
    }
}

/// Expand environment variables in the format `${VAR_NAME}`.
///
/// Unset variables are left as written.
fn expand_env_vars(content: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern");

    re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
