//! Auto-migration engine.
//!
//! A run reads the stored fingerprint, fingerprints the current creation
//! script and compares the two. When they differ (or the run is forced) the
//! database is wiped, the script is executed, the new fingerprint is stored
//! and the optional post-migration callback runs, in that order.
//!
//! The drop is a point of no return: a failure afterwards leaves the database
//! empty or partially created, and the next run (the fingerprint having not
//! been updated) starts over.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{AutoMigrateConfig, AutoMigrateOptions};
use crate::connection::{SchemaConnection, commit_pending, ensure_open};
use crate::eradicate::drop_all_tables;
use crate::error::{AutoMigrateError, AutoMigrateResult, BoxError, Phase};
use crate::fingerprint::Fingerprint;
use crate::gate::{Endpoint, SafetyGate};
use crate::notify::{Notifier, NotifySink};
use crate::script::{ScriptProvider, prepare_execution_script};
use crate::store::{FingerprintStore, StorageMode};

/// Result of comparing the stored fingerprint with the current script.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Fingerprint found in the store.
    pub current: Option<Fingerprint>,
    /// Fingerprint of the current creation script.
    pub target: Fingerprint,
    /// Whether the two differ.
    pub changed: bool,
    /// The creation script as generated.
    pub script: String,
}

impl MigrationPlan {
    /// Get a summary of the plan.
    pub fn summary(&self) -> String {
        match (&self.current, self.changed) {
            (_, false) => format!("Schema unchanged ({})", self.target.short()),
            (None, true) => format!(
                "No stored fingerprint, will create schema {}",
                self.target.short()
            ),
            (Some(current), true) => format!(
                "Schema changed {} -> {}",
                current.short(),
                self.target.short()
            ),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Fingerprints matched; nothing was touched.
    Unchanged,
    /// Tables were dropped and recreated.
    Applied {
        /// Whether the run was forced while the fingerprints matched.
        forced: bool,
    },
}

/// Result of a migration run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// What happened.
    pub outcome: MigrationOutcome,
    /// Fingerprint of the current creation script.
    pub fingerprint: Fingerprint,
    /// Fingerprint that was stored before the run.
    pub previous: Option<Fingerprint>,
    /// Backend the fingerprint was read from and written to.
    pub storage: StorageMode,
    /// Whether the post-migration callback ran.
    pub callback_invoked: bool,
    /// Total duration in milliseconds.
    pub duration_ms: i64,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl MigrationReport {
    /// Whether tables were recreated.
    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, MigrationOutcome::Applied { .. })
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        match self.outcome {
            MigrationOutcome::Unchanged => "No schema changes detected".to_string(),
            MigrationOutcome::Applied { forced } => format!(
                "{} schema {} in {}ms",
                if forced { "Force-recreated" } else { "Recreated" },
                self.fingerprint.short(),
                self.duration_ms
            ),
        }
    }
}

/// Builder for [`AutoMigrator`].
pub struct AutoMigratorBuilder<C, P> {
    connection: Option<C>,
    provider: Option<P>,
    safety: Option<SafetyGate>,
    options: AutoMigrateOptions,
    sink: NotifySink,
}

impl<C, P> Default for AutoMigratorBuilder<C, P> {
    fn default() -> Self {
        Self {
            connection: None,
            provider: None,
            safety: None,
            options: AutoMigrateOptions::default(),
            sink: NotifySink::default(),
        }
    }
}

impl<C: SchemaConnection, P: ScriptProvider> AutoMigratorBuilder<C, P> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database connection.
    pub fn connection(mut self, connection: C) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Set the creation script provider.
    pub fn script_provider(mut self, provider: P) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the endpoint safety gate.
    pub fn safety(mut self, gate: SafetyGate) -> Self {
        self.safety = Some(gate);
        self
    }

    /// Set the options.
    pub fn options(mut self, options: AutoMigrateOptions) -> Self {
        self.options = options;
        self
    }

    /// Take the options and safety gate from a loaded configuration file.
    ///
    /// Storage mode and `force` stay with the caller, who passes them to
    /// [`AutoMigrator::migrate`].
    pub fn config(self, config: &AutoMigrateConfig) -> Self {
        self.options(config.options.clone())
            .safety(config.safety.clone())
    }

    /// Set where progress messages go.
    pub fn notifier(mut self, sink: NotifySink) -> Self {
        self.sink = sink;
        self
    }

    /// Build the migrator, validating the target endpoint against the gate.
    pub fn build(self) -> AutoMigrateResult<AutoMigrator<C, P>> {
        let connection = self
            .connection
            .ok_or_else(|| AutoMigrateError::configuration("a database connection is required"))?;
        let provider = self
            .provider
            .ok_or_else(|| AutoMigrateError::configuration("a script provider is required"))?;
        let safety = self
            .safety
            .ok_or_else(|| AutoMigrateError::configuration("a safety gate is required"))?;
        self.options.validate()?;

        let endpoint = connection.endpoint()?;
        if let Err(e) = safety.check(&endpoint) {
            warn!(endpoint = %endpoint, mode = ?safety.mode, "Safety gate rejected endpoint");
            return Err(e);
        }
        debug!(endpoint = %endpoint, mode = ?safety.mode, "Safety gate passed");

        let notifier = Notifier::new(self.options.logging_enabled, self.sink);

        Ok(AutoMigrator {
            connection,
            provider,
            options: self.options,
            notifier,
            endpoint,
        })
    }
}

/// Drops and recreates the schema whenever its creation script changes.
pub struct AutoMigrator<C, P> {
    connection: C,
    provider: P,
    options: AutoMigrateOptions,
    notifier: Notifier,
    endpoint: Endpoint,
}

impl<C: SchemaConnection, P: ScriptProvider> AutoMigrator<C, P> {
    /// Create a builder.
    pub fn builder() -> AutoMigratorBuilder<C, P> {
        AutoMigratorBuilder::new()
    }

    /// Target endpoint, as validated by the safety gate.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The options.
    pub fn options(&self) -> &AutoMigrateOptions {
        &self.options
    }

    /// The database connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Mutable access to the database connection.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Give back the connection and script provider.
    pub fn into_parts(self) -> (C, P) {
        (self.connection, self.provider)
    }

    /// Compare the stored fingerprint with the current script without
    /// changing anything.
    pub async fn plan(&mut self, mode: StorageMode) -> AutoMigrateResult<MigrationPlan> {
        let store = mode.store(&self.options);
        self.plan_with(store.as_ref()).await
    }

    async fn plan_with(&mut self, store: &dyn FingerprintStore) -> AutoMigrateResult<MigrationPlan> {
        let current = store.read(&mut self.connection).await?;

        let script = self
            .provider
            .generate_create_script()
            .await
            .map_err(|e| e.in_phase(Phase::Script))?;
        let target = Fingerprint::of(&script);
        let changed = current.as_ref() != Some(&target);

        debug!(
            store = %store.describe(),
            current = current.as_ref().map(Fingerprint::short),
            target = target.short(),
            changed,
            "Compared schema fingerprints"
        );

        Ok(MigrationPlan {
            current,
            target,
            changed,
            script,
        })
    }

    /// Recreate the schema if it changed, or unconditionally when `force` is set.
    pub async fn migrate(
        &mut self,
        force: bool,
        mode: StorageMode,
    ) -> AutoMigrateResult<MigrationReport> {
        self.run(force, mode, None::<fn() -> Result<(), BoxError>>)
            .await
    }

    /// Like [`migrate`](Self::migrate), then run `post_migration` after the new
    /// fingerprint is stored.
    ///
    /// A failing callback is reported as [`AutoMigrateError::Callback`]; the
    /// schema and fingerprint are already up to date at that point.
    pub async fn migrate_with<F, E>(
        &mut self,
        force: bool,
        mode: StorageMode,
        post_migration: F,
    ) -> AutoMigrateResult<MigrationReport>
    where
        F: FnOnce() -> Result<(), E>,
        E: Into<BoxError>,
    {
        self.run(force, mode, Some(post_migration)).await
    }

    async fn run<F, E>(
        &mut self,
        force: bool,
        mode: StorageMode,
        post_migration: Option<F>,
    ) -> AutoMigrateResult<MigrationReport>
    where
        F: FnOnce() -> Result<(), E>,
        E: Into<BoxError>,
    {
        let start = Instant::now();
        let store = mode.store(&self.options);
        let plan = self.plan_with(store.as_ref()).await?;

        if !plan.changed && !force {
            debug!(fingerprint = plan.target.short(), "Schema unchanged, skipping migration");
            return Ok(MigrationReport {
                outcome: MigrationOutcome::Unchanged,
                fingerprint: plan.target,
                previous: plan.current,
                storage: mode,
                callback_invoked: false,
                duration_ms: start.elapsed().as_millis() as i64,
                finished_at: Utc::now(),
            });
        }

        let forced = !plan.changed;
        info!(
            endpoint = %self.endpoint,
            forced,
            summary = %plan.summary(),
            "Recreating database schema"
        );
        self.notifier.emit(if forced {
            "Forced migration requested. Executing migration.."
        } else {
            "DB model change detected. Executing migration.."
        });

        self.notifier.emit("Dropping all tables...");
        drop_all_tables(&mut self.connection).await?;

        self.notifier.emit("Creating new tables...");
        let bootstrap = store.bootstrap_sql();
        let script = prepare_execution_script(bootstrap.as_deref(), &plan.script);
        self.execute_script(&script).await?;

        self.notifier.emit("Updating model hash...");
        store.write(&mut self.connection, &plan.target).await?;
        self.notifier.emit("Database has been migrated successfully..");

        let mut callback_invoked = false;
        if let Some(post_migration) = post_migration {
            self.notifier.emit("Executing database post process function...");
            post_migration().map_err(|e| {
                let e = e.into();
                warn!(error = %e, "Post-migration callback failed");
                AutoMigrateError::Callback(e)
            })?;
            callback_invoked = true;
            self.notifier.emit("Migration sequence has been completed.");
        }

        let report = MigrationReport {
            outcome: MigrationOutcome::Applied { forced },
            fingerprint: plan.target,
            previous: plan.current,
            storage: mode,
            callback_invoked,
            duration_ms: start.elapsed().as_millis() as i64,
            finished_at: Utc::now(),
        };
        info!(summary = %report.summary(), "Migration finished");

        Ok(report)
    }

    async fn execute_script(&mut self, script: &str) -> AutoMigrateResult<()> {
        let conn: &mut dyn SchemaConnection = &mut self.connection;
        let result: AutoMigrateResult<()> = async {
            ensure_open(conn).await?;
            conn.execute_batch(script).await?;
            commit_pending(conn).await?;
            Ok(())
        }
        .await;

        result.map_err(|e| e.in_phase(Phase::Execute))
    }
}
