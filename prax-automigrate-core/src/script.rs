//! Creation script sourcing and preparation.

use async_trait::async_trait;

use crate::error::AutoMigrateResult;

/// Produces the full creation script for the declared schema.
///
/// Implementations must be deterministic for a fixed schema, otherwise every
/// run looks like a schema change.
#[async_trait]
pub trait ScriptProvider: Send + Sync {
    /// Generate the creation script.
    async fn generate_create_script(&self) -> AutoMigrateResult<String>;
}

/// A fixed, pre-rendered creation script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticScript(String);

impl StaticScript {
    /// Wrap a script.
    pub fn new(script: impl Into<String>) -> Self {
        Self(script.into())
    }

    /// The wrapped script.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl ScriptProvider for StaticScript {
    async fn generate_create_script(&self) -> AutoMigrateResult<String> {
        Ok(self.0.clone())
    }
}

/// Remove batch separator lines (`GO`, `go`, `GO 5`, `GO -- note`) from a
/// script.
///
/// The script is executed as one batch, where `GO` is not valid T-SQL.
/// Only lines that consist of the separator alone are removed; identifiers
/// or literals that merely contain `GO` are left untouched.
pub fn strip_batch_separators(script: &str) -> String {
    let mut out = String::with_capacity(script.len());

    for line in script.split_inclusive('\n') {
        if is_batch_separator(line) {
            // keep the line break so statements stay on separate lines
            if line.ends_with('\n') {
                out.push('\n');
            }
            continue;
        }
        out.push_str(line);
    }

    out
}

/// Whether a line is a `GO` batch separator, optionally followed by a repeat
/// count and a trailing `--` comment.
pub fn is_batch_separator(line: &str) -> bool {
    let trimmed = line.trim();
    let Some(prefix) = trimmed.get(..2) else {
        return false;
    };
    if !prefix.eq_ignore_ascii_case("go") {
        return false;
    }

    let rest = &trimmed[2..];
    let rest = rest.split_once("--").map_or(rest, |(head, _)| head).trim();
    let rest = rest.strip_suffix(';').unwrap_or(rest).trim_end();
    rest.is_empty() || rest.chars().all(|c| c.is_ascii_digit())
}

/// Build the script actually sent to the server.
///
/// `bootstrap` (the metadata table DDL in database mode) is placed in front
/// of the generated script, then batch separators are stripped.
pub fn prepare_execution_script(bootstrap: Option<&str>, script: &str) -> String {
    match bootstrap {
        Some(bootstrap) => strip_batch_separators(&format!("{bootstrap}\n{script}")),
        None => strip_batch_separators(script),
    }
}
