//! End-to-end tests for the auto-migrator.
//!
//! These tests drive the engine against the in-memory recording connection
//! and check what reaches the database, the fingerprint stores and the
//! progress channel.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use prax_automigrate::prelude::*;
use prax_automigrate::testing::RecordingConnection;
use prax_automigrate::{BoxError, DROP_ALL_TABLES_SQL, Fingerprint, MESSAGE_PREFIX, Phase};

const SCRIPT_A: &str = "CREATE TABLE A(x int)";

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().clone())
            .unwrap()
            .lines()
            .map(|l| l.trim_start_matches(MESSAGE_PREFIX).to_string())
            .collect()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn quiet_options(dir: &Path) -> AutoMigrateOptions {
    AutoMigrateOptions::new()
        .fingerprint_file(dir.join("__dbMetadata"))
        .logging_enabled(false)
}

fn migrator(
    conn: RecordingConnection,
    script: &str,
    dir: &Path,
) -> AutoMigrator<RecordingConnection, StaticScript> {
    AutoMigrator::builder()
        .connection(conn)
        .script_provider(StaticScript::new(script))
        .safety(SafetyGate::default())
        .options(quiet_options(dir))
        .build()
        .expect("migrator should build")
}

/// Fresh file store: one drop, one script execution, one fingerprint write.
/// A second run with the same script touches nothing.
#[tokio::test]
async fn test_file_mode_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let mut migrator = migrator(RecordingConnection::new(), SCRIPT_A, dir.path());

    let report = migrator.migrate(false, StorageMode::File).await.unwrap();

    let h1 = Fingerprint::of(SCRIPT_A);
    assert_eq!(report.outcome, MigrationOutcome::Applied { forced: false });
    assert_eq!(report.fingerprint, h1);
    assert!(report.previous.is_none());
    assert!(!report.callback_invoked);

    let conn = migrator.connection();
    assert_eq!(conn.batches(), vec![DROP_ALL_TABLES_SQL, SCRIPT_A]);
    assert!(conn.executions().is_empty());
    assert_eq!(conn.tables(), vec!["A".to_string()]);

    let stored = std::fs::read_to_string(dir.path().join("__dbMetadata")).unwrap();
    assert_eq!(stored, h1.as_str());

    migrator.connection_mut().reset_log();
    let again = migrator.migrate(false, StorageMode::File).await.unwrap();

    assert_eq!(again.outcome, MigrationOutcome::Unchanged);
    assert_eq!(again.previous, Some(h1));
    assert!(migrator.connection().statements().is_empty());
}

/// No metadata table: the read reports nothing stored, and one run leaves a
/// table holding exactly the new fingerprint.
#[tokio::test]
async fn test_database_mode_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let mut migrator = migrator(RecordingConnection::new(), SCRIPT_A, dir.path());

    let plan = migrator.plan(StorageMode::Database).await.unwrap();
    assert!(plan.current.is_none());
    assert!(plan.changed);

    let report = migrator.migrate(false, StorageMode::Database).await.unwrap();

    let conn = migrator.connection();
    assert_eq!(
        conn.metadata_rows("__dbMetadata"),
        Some(vec![report.fingerprint.to_string()])
    );
    assert_eq!(conn.drop_count(), 1);
    assert_eq!(conn.executions().len(), 1);
    assert!(conn.batches()[1].starts_with(
        "CREATE TABLE [dbo].[__dbMetadata](Hash nvarchar(max) NOT NULL)\nCREATE TABLE A"
    ));
    assert!(!dir.path().join("__dbMetadata").exists());

    migrator.connection_mut().reset_log();
    let again = migrator.migrate(false, StorageMode::Database).await.unwrap();

    assert_eq!(again.outcome, MigrationOutcome::Unchanged);
    let conn = migrator.connection();
    assert!(conn.batches().is_empty());
    assert!(conn.executions().is_empty());
    assert_eq!(conn.drop_count(), 0);
}

/// A changed script is detected, replaces the schema, and leaves a single
/// fingerprint row behind.
#[tokio::test]
async fn test_changed_script_reapplies() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = migrator(RecordingConnection::new(), SCRIPT_A, dir.path());
    first.migrate(false, StorageMode::Database).await.unwrap();

    let (conn, _) = first.into_parts();
    let script_b = "CREATE TABLE A(x int, y int)\nCREATE TABLE B(z int)";
    let mut second = migrator(conn, script_b, dir.path());

    let report = second.migrate(false, StorageMode::Database).await.unwrap();

    assert_eq!(report.previous, Some(Fingerprint::of(SCRIPT_A)));
    assert_eq!(report.fingerprint, Fingerprint::of(script_b));
    let conn = second.connection();
    assert_eq!(conn.drop_count(), 2);
    assert_eq!(
        conn.tables(),
        vec!["A".to_string(), "B".to_string(), "__dbMetadata".to_string()]
    );
    assert_eq!(
        conn.metadata_rows("__dbMetadata"),
        Some(vec![Fingerprint::of(script_b).into_string()])
    );
}

/// `GO` separator lines never reach the connection; identifiers containing
/// `GO` survive.
#[tokio::test]
async fn test_batch_separators_are_stripped() {
    let dir = tempfile::tempdir().unwrap();
    let script = "CREATE TABLE A(x int)\nGO\nCREATE TABLE GOODS(y int)\ngo 2\n";
    let mut migrator = migrator(RecordingConnection::new(), script, dir.path());

    let report = migrator.migrate(false, StorageMode::File).await.unwrap();

    let executed = migrator.connection().batches()[1];
    assert_eq!(executed, "CREATE TABLE A(x int)\n\nCREATE TABLE GOODS(y int)\n\n");
    assert_eq!(
        migrator.connection().tables(),
        vec!["A".to_string(), "GOODS".to_string()]
    );
    // the fingerprint covers the script as generated, separators included
    assert_eq!(report.fingerprint, Fingerprint::of(script));
}

/// Forcing a run with an unchanged schema still recreates it and runs the
/// callback.
#[tokio::test]
async fn test_force_invokes_callback() {
    let dir = tempfile::tempdir().unwrap();
    let mut migrator = migrator(RecordingConnection::new(), SCRIPT_A, dir.path());
    migrator.migrate(false, StorageMode::Database).await.unwrap();

    let mut calls = 0;
    let report = migrator
        .migrate_with(true, StorageMode::Database, || {
            calls += 1;
            Ok::<_, BoxError>(())
        })
        .await
        .unwrap();

    assert_eq!(calls, 1);
    assert!(report.callback_invoked);
    assert_eq!(report.outcome, MigrationOutcome::Applied { forced: true });
    let conn = migrator.connection();
    assert_eq!(conn.drop_count(), 2);
    assert_eq!(conn.metadata_rows("__dbMetadata").map(|r| r.len()), Some(1));
}

/// Without `force`, an unchanged schema skips the callback.
#[tokio::test]
async fn test_unchanged_skips_callback() {
    let dir = tempfile::tempdir().unwrap();
    let mut migrator = migrator(RecordingConnection::new(), SCRIPT_A, dir.path());
    migrator.migrate(false, StorageMode::File).await.unwrap();

    let mut called = false;
    let report = migrator
        .migrate_with(false, StorageMode::File, || {
            called = true;
            Ok::<_, BoxError>(())
        })
        .await
        .unwrap();

    assert!(!called);
    assert!(!report.callback_invoked);
}

/// A failing callback is reported after the fingerprint is durably stored.
#[tokio::test]
async fn test_callback_error_after_write() {
    let dir = tempfile::tempdir().unwrap();
    let mut migrator = migrator(RecordingConnection::new(), SCRIPT_A, dir.path());

    let err = migrator
        .migrate_with(false, StorageMode::File, || Err::<(), _>("seeding failed"))
        .await
        .unwrap_err();

    assert!(matches!(err, AutoMigrateError::Callback(_)));
    assert_eq!(err.phase(), Some(Phase::Callback));
    assert!(err.to_string().contains("seeding failed"));

    let stored = std::fs::read_to_string(dir.path().join("__dbMetadata")).unwrap();
    assert_eq!(stored, Fingerprint::of(SCRIPT_A).as_str());

    let again = migrator.migrate(false, StorageMode::File).await.unwrap();
    assert_eq!(again.outcome, MigrationOutcome::Unchanged);
}

/// A failing script leaves the database dropped and the old fingerprint in
/// place, so the next run starts over.
#[tokio::test]
async fn test_execute_failure_is_retried_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = RecordingConnection::new();
    conn.fail_on("CREATE TABLE A");
    let mut migrator = migrator(conn, SCRIPT_A, dir.path());

    let err = migrator.migrate(false, StorageMode::File).await.unwrap_err();

    assert!(matches!(err, AutoMigrateError::SchemaApply { .. }));
    assert_eq!(err.phase(), Some(Phase::Execute));
    assert!(!dir.path().join("__dbMetadata").exists());
    assert!(migrator.connection().tables().is_empty());

    migrator.connection_mut().clear_failures();
    let report = migrator.migrate(false, StorageMode::File).await.unwrap();
    assert!(report.is_applied());
    assert_eq!(migrator.connection().drop_count(), 2);
}

/// A drop failure stops the run before the script executes.
#[tokio::test]
async fn test_drop_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = RecordingConnection::new();
    conn.fail_on("sys.foreign_keys");
    let mut migrator = migrator(conn, SCRIPT_A, dir.path());

    let err = migrator.migrate(false, StorageMode::File).await.unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Drop));
    assert_eq!(migrator.connection().batches().len(), 1);
}

/// An unwritable fingerprint file fails the write phase after the schema was
/// applied.
#[tokio::test]
async fn test_file_write_failure() {
    let dir = tempfile::tempdir().unwrap();
    let options = quiet_options(dir.path())
        .fingerprint_file(dir.path().join("missing").join("__dbMetadata"));
    let mut migrator = AutoMigrator::builder()
        .connection(RecordingConnection::new())
        .script_provider(StaticScript::new(SCRIPT_A))
        .safety(SafetyGate::default())
        .options(options)
        .build()
        .unwrap();

    let err = migrator.migrate(false, StorageMode::File).await.unwrap_err();

    assert!(matches!(err, AutoMigrateError::Persistence { .. }));
    assert_eq!(err.phase(), Some(Phase::Write));
    assert_eq!(migrator.connection().tables(), vec!["A".to_string()]);
}

/// Providers that leave the drop inside a transaction get exactly one commit.
#[tokio::test]
async fn test_transaction_left_by_drop_is_committed() {
    let dir = tempfile::tempdir().unwrap();
    let conn = RecordingConnection::new().drop_leaves_transaction(true);
    let mut migrator = migrator(conn, SCRIPT_A, dir.path());

    migrator.migrate(false, StorageMode::Database).await.unwrap();

    assert_eq!(migrator.connection().commit_count(), 1);
}

/// Metadata table and schema names come from the options.
#[tokio::test]
async fn test_custom_metadata_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut migrator = AutoMigrator::builder()
        .connection(RecordingConnection::new())
        .script_provider(StaticScript::new(SCRIPT_A))
        .safety(SafetyGate::default())
        .options(
            quiet_options(dir.path())
                .metadata_table("__schema_hash")
                .metadata_schema("meta"),
        )
        .build()
        .unwrap();

    migrator.migrate(false, StorageMode::Database).await.unwrap();

    let conn = migrator.connection();
    assert!(conn.batches()[1].starts_with("CREATE TABLE [meta].[__schema_hash]"));
    assert_eq!(conn.metadata_rows("__schema_hash").map(|r| r.len()), Some(1));
    assert_eq!(conn.metadata_rows("__dbMetadata"), None);
}

#[tokio::test]
async fn test_metadata_schema_ignores_default_schema_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = RecordingConnection::new();
    conn.open().await.unwrap();
    conn.execute_batch("CREATE TABLE [dbo].[__dbMetadata](Hash nvarchar(max) NOT NULL)")
        .await
        .unwrap();
    conn.execute(
        "INSERT INTO [dbo].[__dbMetadata] (Hash) VALUES (@P1)",
        &[Fingerprint::of(SCRIPT_A).as_str()],
    )
    .await
    .unwrap();

    let mut migrator = AutoMigrator::builder()
        .connection(conn)
        .script_provider(StaticScript::new(SCRIPT_A))
        .safety(SafetyGate::default())
        .options(quiet_options(dir.path()).metadata_schema("meta"))
        .build()
        .unwrap();

    let first = migrator.migrate(false, StorageMode::Database).await.unwrap();
    assert_eq!(first.outcome, MigrationOutcome::Applied { forced: false });
    assert!(first.previous.is_none());
    assert_eq!(
        migrator.connection().metadata_rows_in("meta", "__dbMetadata"),
        Some(vec![first.fingerprint.to_string()])
    );

    let second = migrator.migrate(false, StorageMode::Database).await.unwrap();
    assert_eq!(second.outcome, MigrationOutcome::Unchanged);
}

#[test]
fn test_gate_deny_list() {
    let conn = RecordingConnection::new().with_endpoint("sql01\\DEV", "Orders");
    let result = AutoMigrator::builder()
        .connection(conn)
        .script_provider(StaticScript::new(SCRIPT_A))
        .safety(SafetyGate::deny([Endpoint::new("SQL01\\dev", "orders").unwrap()]))
        .build();

    match result {
        Err(AutoMigrateError::ForbiddenEndpoint { server, database }) => {
            assert_eq!(server, "SQL01\\DEV");
            assert_eq!(database, "ORDERS");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("deny-listed endpoint was accepted"),
    }
}

#[test]
fn test_gate_allow_list() {
    let allowed = SafetyGate::allow([Endpoint::new("localhost", "dev").unwrap()]);

    let rejected = AutoMigrator::builder()
        .connection(RecordingConnection::new().with_endpoint("localhost", "staging"))
        .script_provider(StaticScript::new(SCRIPT_A))
        .safety(allowed.clone())
        .build();
    assert!(matches!(
        rejected,
        Err(AutoMigrateError::UnlistedEndpoint { .. })
    ));

    let accepted = AutoMigrator::builder()
        .connection(RecordingConnection::new())
        .script_provider(StaticScript::new(SCRIPT_A))
        .safety(allowed)
        .build();
    assert!(accepted.is_ok());
}

#[test]
fn test_gate_rejects_empty_endpoint() {
    let result = AutoMigrator::builder()
        .connection(RecordingConnection::new().with_endpoint("", "dev"))
        .script_provider(StaticScript::new(SCRIPT_A))
        .safety(SafetyGate::default())
        .build();
    assert!(matches!(result, Err(AutoMigrateError::InvalidEndpoint(_))));
}

/// Progress messages arrive in phase order, and a disabled notifier is silent.
#[tokio::test]
async fn test_progress_messages() {
    let dir = tempfile::tempdir().unwrap();
    let captured = Captured::default();
    let mut migrator = AutoMigrator::builder()
        .connection(RecordingConnection::new())
        .script_provider(StaticScript::new(SCRIPT_A))
        .safety(SafetyGate::default())
        .options(quiet_options(dir.path()).logging_enabled(true))
        .notifier(NotifySink::writer(captured.clone()))
        .build()
        .unwrap();

    migrator
        .migrate_with(false, StorageMode::File, || Ok::<_, BoxError>(()))
        .await
        .unwrap();

    assert_eq!(
        captured.lines(),
        vec![
            "DB model change detected. Executing migration..",
            "Dropping all tables...",
            "Creating new tables...",
            "Updating model hash...",
            "Database has been migrated successfully..",
            "Executing database post process function...",
            "Migration sequence has been completed.",
        ]
    );

    let silent = Captured::default();
    let mut quiet = AutoMigrator::builder()
        .connection(RecordingConnection::new())
        .script_provider(StaticScript::new(SCRIPT_A))
        .safety(SafetyGate::default())
        .options(quiet_options(dir.path()))
        .notifier(NotifySink::writer(silent.clone()))
        .build()
        .unwrap();
    quiet.migrate(true, StorageMode::File).await.unwrap();
    assert!(silent.lines().is_empty());
}

/// Options and gate can come from the project configuration file.
#[tokio::test]
async fn test_config_driven_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = AutoMigrateConfig::from_toml(
        r#"
        [automigrate]
        storage = "database"
        force = true

        [automigrate.options]
        metadata_table = "__fp"
        logging_enabled = false

        [automigrate.safety]
        mode = "allow"
        endpoints = [{ server = "localhost", database = "dev" }]
        "#,
    )
    .unwrap();

    let mut migrator = AutoMigrator::builder()
        .connection(RecordingConnection::new())
        .script_provider(StaticScript::new(SCRIPT_A))
        .config(&config)
        .build()
        .unwrap();
    assert_eq!(migrator.options().metadata_table, "__fp");

    let report = migrator.migrate(config.force, config.storage).await.unwrap();
    assert_eq!(report.storage, StorageMode::Database);
    assert!(migrator.connection().metadata_rows("__fp").is_some());
    assert!(!dir.path().join("__fp").exists());
}
