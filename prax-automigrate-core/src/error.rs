//! Error types for the auto-migration engine.

use std::fmt;

use thiserror::Error;

/// Result type alias for auto-migration operations.
pub type AutoMigrateResult<T> = Result<T, AutoMigrateError>;

/// Boxed error returned by post-migration callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The step of a migration run an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Safety gate validation at construction.
    Gate,
    /// Reading the stored fingerprint.
    Read,
    /// Generating the creation script.
    Script,
    /// Dropping existing tables.
    Drop,
    /// Executing the creation script.
    Execute,
    /// Persisting the new fingerprint.
    Write,
    /// Running the post-migration callback.
    Callback,
}

impl Phase {
    /// Lowercase name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gate => "gate",
            Self::Read => "read",
            Self::Script => "script",
            Self::Drop => "drop",
            Self::Execute => "execute",
            Self::Write => "write",
            Self::Callback => "callback",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while constructing or running the auto-migrator.
#[derive(Debug, Error)]
pub enum AutoMigrateError {
    /// A required collaborator or setting is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An endpoint identity was declared with an empty server or database.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The target endpoint is on the deny-list.
    #[error("cannot execute auto migration on a denied endpoint ({server}/{database})")]
    ForbiddenEndpoint {
        /// Normalized server address.
        server: String,
        /// Normalized database name.
        database: String,
    },

    /// The target endpoint is missing from the allow-list.
    #[error("endpoint ({server}/{database}) is not in the allow-list")]
    UnlistedEndpoint {
        /// Normalized server address.
        server: String,
        /// Normalized database name.
        database: String,
    },

    /// Fingerprint could not be read or written.
    #[error("fingerprint {phase} failed: {message}")]
    Persistence {
        /// Either [`Phase::Read`] or [`Phase::Write`].
        phase: Phase,
        /// Description of the failure.
        message: String,
        /// Underlying I/O error, when the file backend failed.
        #[source]
        source: Option<std::io::Error>,
    },

    /// The script provider failed to produce a creation script.
    #[error("script generation failed: {0}")]
    Script(String),

    /// Dropping tables or executing the creation script failed.
    #[error("schema {phase} failed: {message}")]
    SchemaApply {
        /// Either [`Phase::Drop`] or [`Phase::Execute`].
        phase: Phase,
        /// Description of the failure.
        message: String,
    },

    /// The post-migration callback failed. The fingerprint was already updated.
    #[error("post-migration callback failed: {0}")]
    Callback(#[source] BoxError),

    /// Raw database driver error surfaced through a [`SchemaConnection`](crate::SchemaConnection).
    #[error("database error: {0}")]
    Database(String),

    /// Configuration file could not be parsed.
    #[error("invalid configuration file: {0}")]
    ConfigFile(String),
}

impl AutoMigrateError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a script generation error.
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }

    /// Create a persistence error without an I/O source.
    pub fn persistence(phase: Phase, msg: impl Into<String>) -> Self {
        Self::Persistence {
            phase,
            message: msg.into(),
            source: None,
        }
    }

    /// Create a persistence error wrapping an I/O failure.
    pub fn persistence_io(phase: Phase, msg: impl Into<String>, source: std::io::Error) -> Self {
        Self::Persistence {
            phase,
            message: msg.into(),
            source: Some(source),
        }
    }

    /// Create a schema apply error.
    pub fn schema_apply(phase: Phase, msg: impl Into<String>) -> Self {
        Self::SchemaApply {
            phase,
            message: msg.into(),
        }
    }

    /// Re-tag an error raised inside a phase so callers can tell where it happened.
    ///
    /// Driver errors become `Persistence` during read/write and `SchemaApply`
    /// during drop/execute. Errors that already carry a phase are kept as is.
    pub fn in_phase(self, phase: Phase) -> Self {
        match (self, phase) {
            (Self::Database(msg), Phase::Read | Phase::Write) => Self::persistence(phase, msg),
            (Self::Database(msg), Phase::Drop | Phase::Execute) => Self::schema_apply(phase, msg),
            (Self::Database(msg), Phase::Script) => Self::Script(msg),
            (err, _) => err,
        }
    }

    /// The phase this error belongs to, if it is tied to one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::ForbiddenEndpoint { .. } | Self::UnlistedEndpoint { .. } => Some(Phase::Gate),
            Self::Persistence { phase, .. } | Self::SchemaApply { phase, .. } => Some(*phase),
            Self::Script(_) => Some(Phase::Script),
            Self::Callback(_) => Some(Phase::Callback),
            _ => None,
        }
    }

    /// Whether the safety gate rejected the endpoint.
    pub fn is_gate_rejection(&self) -> bool {
        matches!(
            self,
            Self::ForbiddenEndpoint { .. } | Self::UnlistedEndpoint { .. }
        )
    }
}
