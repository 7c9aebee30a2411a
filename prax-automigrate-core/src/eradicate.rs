//! Drop-everything routine run before the schema is recreated.

use tracing::{debug, info};

use crate::connection::{SchemaConnection, commit_pending, ensure_open};
use crate::error::{AutoMigrateResult, Phase};

/// T-SQL that drops every foreign key, then every user table.
pub const DROP_ALL_TABLES_SQL: &str = include_str!("../sql/drop_all_tables.sql");

/// Remove all user tables and their foreign keys from the connected database.
///
/// Tables are dropped rather than the database itself, since hosted servers
/// often refuse `DROP DATABASE`. Some providers (Azure SQL) leave the drop
/// inside an open transaction; it is committed here when present, and left
/// alone otherwise.
pub async fn drop_all_tables(conn: &mut dyn SchemaConnection) -> AutoMigrateResult<()> {
    let result: AutoMigrateResult<()> = async {
        ensure_open(conn).await?;
        conn.execute_batch(DROP_ALL_TABLES_SQL).await?;

        if commit_pending(conn).await? {
            debug!("Committed transaction left open by table drop");
        }
        Ok(())
    }
    .await;

    result.map_err(|e| e.in_phase(Phase::Drop))?;
    info!("Dropped all user tables");
    Ok(())
}
