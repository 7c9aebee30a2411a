//! In-memory [`SchemaConnection`] for tests.
//!
//! `RecordingConnection` imitates the small slice of SQL Server behavior the
//! migrator depends on and records every statement it receives:
//!
//! - `CREATE TABLE` statements in a batch register tables per schema
//!   (unqualified names land in `dbo`), and creating a table that already
//!   exists fails like the real server does.
//! - The embedded drop-all script removes every table.
//! - A `GO` line inside a batch is a syntax error.
//! - Metadata tables (`Hash` column) keep their rows for `SELECT TOP 1`,
//!   `DELETE` and `INSERT`. A failing statement leaves the rows untouched.
//! - `commit` without a pending transaction fails.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::connection::SchemaConnection;
use crate::eradicate::DROP_ALL_TABLES_SQL;
use crate::error::{AutoMigrateError, AutoMigrateResult};
use crate::gate::Endpoint;
use crate::script::is_batch_separator;

const DEFAULT_SCHEMA: &str = "dbo";

type TableKey = (String, String);

/// How a statement reached the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `execute_batch`.
    Batch,
    /// `execute`.
    Execute,
    /// `query_text`.
    Query,
}

/// A statement received by [`RecordingConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Entry point used.
    pub kind: StatementKind,
    /// SQL text.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<String>,
}

/// Recording in-memory connection.
#[derive(Debug)]
pub struct RecordingConnection {
    server: String,
    database: String,
    open: bool,
    open_count: usize,
    in_transaction: bool,
    drop_leaves_transaction: bool,
    commit_count: usize,
    drop_count: usize,
    tables: BTreeMap<TableKey, Vec<String>>,
    statements: Vec<Statement>,
    fail_patterns: Vec<String>,
}

impl Default for RecordingConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingConnection {
    /// A closed connection to `localhost/dev` with an empty database.
    pub fn new() -> Self {
        Self {
            server: "localhost".to_string(),
            database: "dev".to_string(),
            open: false,
            open_count: 0,
            in_transaction: false,
            drop_leaves_transaction: false,
            commit_count: 0,
            drop_count: 0,
            tables: BTreeMap::new(),
            statements: Vec::new(),
            fail_patterns: Vec::new(),
        }
    }

    /// Target a different endpoint.
    pub fn with_endpoint(mut self, server: impl Into<String>, database: impl Into<String>) -> Self {
        self.server = server.into();
        self.database = database.into();
        self
    }

    /// Leave a transaction open after the drop-all script, like Azure SQL.
    pub fn drop_leaves_transaction(mut self, leaves: bool) -> Self {
        self.drop_leaves_transaction = leaves;
        self
    }

    /// Fail every statement whose SQL contains `pattern`.
    pub fn fail_on(&mut self, pattern: impl Into<String>) {
        self.fail_patterns.push(pattern.into());
    }

    /// Stop failing statements.
    pub fn clear_failures(&mut self) {
        self.fail_patterns.clear();
    }

    /// Simulate a provider that holds an implicit transaction.
    pub fn begin_implicit_transaction(&mut self) {
        self.in_transaction = true;
    }

    /// Every statement received, in order.
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// SQL of every `execute_batch` call, in order.
    pub fn batches(&self) -> Vec<&str> {
        self.statements_of(StatementKind::Batch)
    }

    /// SQL of every `execute` call, in order.
    pub fn executions(&self) -> Vec<&str> {
        self.statements_of(StatementKind::Execute)
    }

    fn statements_of(&self, kind: StatementKind) -> Vec<&str> {
        self.statements
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.sql.as_str())
            .collect()
    }

    /// Forget recorded statements and counters, keeping the tables.
    pub fn reset_log(&mut self) {
        self.statements.clear();
        self.commit_count = 0;
        self.drop_count = 0;
        self.open_count = 0;
    }

    /// Names of existing tables, sorted by schema then name.
    pub fn tables(&self) -> Vec<String> {
        self.tables.keys().map(|(_, name)| name.clone()).collect()
    }

    /// Rows of the first table named `table` in any schema, `None` if there
    /// is none.
    pub fn metadata_rows(&self, table: &str) -> Option<Vec<String>> {
        self.tables
            .iter()
            .find(|((_, name), _)| name == table)
            .map(|(_, rows)| rows.clone())
    }

    /// Rows of `[schema].[table]`, `None` if it does not exist.
    pub fn metadata_rows_in(&self, schema: &str, table: &str) -> Option<Vec<String>> {
        self.tables
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.commit_count
    }

    /// Number of times the drop-all script ran.
    pub fn drop_count(&self) -> usize {
        self.drop_count
    }

    /// Number of times the connection was opened.
    pub fn open_count(&self) -> usize {
        self.open_count
    }

    fn record(&mut self, kind: StatementKind, sql: &str, params: &[&str]) -> AutoMigrateResult<()> {
        self.statements.push(Statement {
            kind,
            sql: sql.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        });

        if !self.open {
            return Err(AutoMigrateError::database("connection is closed"));
        }
        if let Some(pattern) = self.fail_patterns.iter().find(|p| sql.contains(p.as_str())) {
            return Err(AutoMigrateError::database(format!(
                "simulated failure on '{pattern}'"
            )));
        }
        Ok(())
    }

    fn create_tables(&mut self, sql: &str) -> AutoMigrateResult<()> {
        let re = regex_lite::Regex::new(
            r"(?i)CREATE\s+TABLE\s+((?:\[[^\]]+\]|\w+)(?:\.(?:\[[^\]]+\]|\w+))?)",
        )
        .expect("valid create table pattern");

        for caps in re.captures_iter(sql) {
            let key = split_qualified(&caps[1]);
            if self.tables.contains_key(&key) {
                return Err(AutoMigrateError::database(format!(
                    "There is already an object named '{}' in the database.",
                    key.1
                )));
            }
            self.tables.insert(key, Vec::new());
        }
        Ok(())
    }

    fn table_rows(&mut self, sql: &str) -> AutoMigrateResult<&mut Vec<String>> {
        let key = bracketed_table(sql)
            .ok_or_else(|| AutoMigrateError::database(format!("no table in '{sql}'")))?;
        self.tables.get_mut(&key).ok_or_else(|| {
            AutoMigrateError::database(format!("Invalid object name '{}.{}'.", key.0, key.1))
        })
    }
}

fn unbracket(part: &str) -> String {
    part.trim_start_matches('[')
        .trim_end_matches(']')
        .to_string()
}

/// `(schema, table)` of a possibly qualified, possibly bracketed name.
fn split_qualified(name: &str) -> TableKey {
    match name.rsplit_once('.') {
        Some((schema, table)) => (unbracket(schema), unbracket(table)),
        None => (DEFAULT_SCHEMA.to_string(), unbracket(name)),
    }
}

/// `(schema, table)` from the first `[schema].[table]` reference in `sql`.
fn bracketed_table(sql: &str) -> Option<TableKey> {
    let mid = sql.find("].[")?;
    let schema_start = sql[..mid].rfind('[')? + 1;
    let table_start = mid + 3;
    let table_end = sql[table_start..].find(']')? + table_start;
    Some((
        sql[schema_start..mid].to_string(),
        sql[table_start..table_end].to_string(),
    ))
}

#[async_trait]
impl SchemaConnection for RecordingConnection {
    fn endpoint(&self) -> AutoMigrateResult<Endpoint> {
        Endpoint::new(&self.server, &self.database)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> AutoMigrateResult<()> {
        self.open = true;
        self.open_count += 1;
        Ok(())
    }

    async fn has_open_transaction(&mut self) -> AutoMigrateResult<bool> {
        Ok(self.in_transaction)
    }

    async fn commit(&mut self) -> AutoMigrateResult<()> {
        if !self.in_transaction {
            return Err(AutoMigrateError::database(
                "The COMMIT TRANSACTION request has no corresponding BEGIN TRANSACTION.",
            ));
        }
        self.in_transaction = false;
        self.commit_count += 1;
        Ok(())
    }

    async fn execute_batch(&mut self, sql: &str) -> AutoMigrateResult<()> {
        self.record(StatementKind::Batch, sql, &[])?;

        if sql == DROP_ALL_TABLES_SQL {
            self.tables.clear();
            self.drop_count += 1;
            if self.drop_leaves_transaction {
                self.in_transaction = true;
            }
            return Ok(());
        }

        if sql.lines().any(is_batch_separator) {
            return Err(AutoMigrateError::database("Incorrect syntax near 'GO'."));
        }

        self.create_tables(sql)
    }

    async fn execute(&mut self, sql: &str, params: &[&str]) -> AutoMigrateResult<u64> {
        self.record(StatementKind::Execute, sql, params)?;

        let clears = sql.contains("DELETE FROM");
        let inserted = if sql.contains("INSERT INTO") {
            let value = params
                .first()
                .ok_or_else(|| AutoMigrateError::database("missing @P1"))?;
            Some(value.to_string())
        } else {
            None
        };
        let rows = self.table_rows(sql)?;
        let mut affected = 0;

        if clears {
            affected += rows.len() as u64;
            rows.clear();
        }
        if let Some(value) = inserted {
            rows.push(value);
            affected += 1;
        }
        Ok(affected)
    }

    async fn query_text(
        &mut self,
        sql: &str,
        params: &[&str],
    ) -> AutoMigrateResult<Option<String>> {
        self.record(StatementKind::Query, sql, params)?;

        if sql.contains("sys.tables") {
            let [schema, name] = params else {
                return Err(AutoMigrateError::database("expected @P1 and @P2"));
            };
            let key = (schema.to_string(), name.to_string());
            return Ok(self.tables.contains_key(&key).then(|| name.to_string()));
        }

        let rows = self.table_rows(sql)?;
        Ok(rows.first().cloned())
    }
}
