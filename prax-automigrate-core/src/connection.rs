//! Database connection seam.

use async_trait::async_trait;

use crate::error::AutoMigrateResult;
use crate::gate::Endpoint;

/// The database connection the migrator drives.
///
/// The connection belongs to the caller. The migrator opens it when it finds
/// it closed and never closes it. SQL text is in the T-SQL dialect;
/// parameterized statements use positional `@P1..@Pn` placeholders.
#[async_trait]
pub trait SchemaConnection: Send {
    /// Identity of the server and database this connection targets.
    fn endpoint(&self) -> AutoMigrateResult<Endpoint>;

    /// Whether the connection is currently open.
    fn is_open(&self) -> bool;

    /// Open the connection.
    async fn open(&mut self) -> AutoMigrateResult<()>;

    /// Whether a transaction is pending on the connection.
    async fn has_open_transaction(&mut self) -> AutoMigrateResult<bool>;

    /// Commit the pending transaction.
    async fn commit(&mut self) -> AutoMigrateResult<()>;

    /// Execute raw SQL text as a single batch.
    async fn execute_batch(&mut self, sql: &str) -> AutoMigrateResult<()>;

    /// Execute a parameterized statement, returning the affected row count.
    async fn execute(&mut self, sql: &str, params: &[&str]) -> AutoMigrateResult<u64>;

    /// Run a parameterized query and return the first column of the first row.
    async fn query_text(&mut self, sql: &str, params: &[&str])
    -> AutoMigrateResult<Option<String>>;
}

/// Open the connection if it is closed.
pub async fn ensure_open(conn: &mut dyn SchemaConnection) -> AutoMigrateResult<()> {
    if !conn.is_open() {
        tracing::debug!("Opening database connection");
        conn.open().await?;
    }
    Ok(())
}

/// Commit a pending transaction, if there is one.
///
/// Some providers hold an implicit transaction open, which blocks catalog
/// queries and leaves DDL uncommitted. Committing when no transaction is
/// pending is itself an error, so the check comes first.
pub async fn commit_pending(conn: &mut dyn SchemaConnection) -> AutoMigrateResult<bool> {
    if conn.has_open_transaction().await? {
        tracing::debug!("Committing pending transaction");
        conn.commit().await?;
        return Ok(true);
    }
    Ok(false)
}

/// Quote an identifier with brackets, doubling any closing bracket.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("__dbMetadata"), "[__dbMetadata]");
        assert_eq!(quote_ident("odd]name"), "[odd]]name]");
    }
}
