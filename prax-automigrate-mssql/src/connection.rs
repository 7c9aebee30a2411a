//! SQL Server implementation of [`SchemaConnection`].

use async_trait::async_trait;
use prax_automigrate_core::{AutoMigrateResult, Endpoint, SchemaConnection};
use tiberius::{Client, Config, SqlBrowser, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::MssqlConfig;
use crate::error::{MssqlError, MssqlResult};

type MssqlClient = Client<Compat<TcpStream>>;

/// A single SQL Server connection, opened on first use.
///
/// The migrator never closes it; call [`close`](Self::close) or drop it when
/// done.
pub struct MssqlConnection {
    config: MssqlConfig,
    client: Option<MssqlClient>,
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("server", &self.config.data_source())
            .field("database", &self.config.database)
            .field("open", &self.client.is_some())
            .finish()
    }
}

impl MssqlConnection {
    /// Create a closed connection.
    pub fn new(config: MssqlConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Create a closed connection from a connection string.
    pub fn from_connection_string(conn_str: impl AsRef<str>) -> MssqlResult<Self> {
        Ok(Self::new(MssqlConfig::from_connection_string(conn_str)?))
    }

    /// The connection settings.
    pub fn config(&self) -> &MssqlConfig {
        &self.config
    }

    /// Close the connection. It reopens on next use.
    pub async fn close(&mut self) -> MssqlResult<()> {
        if let Some(client) = self.client.take() {
            debug!("Closing SQL Server connection");
            client.close().await?;
        }
        Ok(())
    }

    async fn connect(&self) -> MssqlResult<MssqlClient> {
        let config = self.config.to_tiberius_config()?;
        let timeout = self.config.connect_timeout;
        let named = self.config.instance_name.is_some();

        tokio::time::timeout(timeout, Self::connect_with(config, named))
            .await
            .map_err(|_| MssqlError::Timeout(timeout.as_millis() as u64))?
    }

    async fn connect_with(config: Config, named: bool) -> MssqlResult<MssqlClient> {
        let tcp = Self::open_socket(&config, named).await?;

        match Client::connect(config.clone(), tcp.compat_write()).await {
            Ok(client) => Ok(client),
            // Azure SQL gateways redirect to the node hosting the database.
            Err(tiberius::error::Error::Routing { host, port }) => {
                debug!(host = %host, port, "Following server redirect");
                let mut config = config;
                config.host(&host);
                config.port(port);
                let tcp = TcpStream::connect(config.get_addr()).await?;
                tcp.set_nodelay(true)?;
                Ok(Client::connect(config, tcp.compat_write()).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open_socket(config: &Config, named: bool) -> MssqlResult<TcpStream> {
        let tcp = if named {
            TcpStream::connect_named(config).await?
        } else {
            TcpStream::connect(config.get_addr()).await?
        };
        tcp.set_nodelay(true)?;
        Ok(tcp)
    }

    fn client(&mut self) -> MssqlResult<&mut MssqlClient> {
        self.client
            .as_mut()
            .ok_or_else(|| MssqlError::connection("connection is not open"))
    }

    async fn run_batch(&mut self, sql: &str) -> MssqlResult<()> {
        debug!(sql = %sql, "Executing batch");
        self.client()?
            .simple_query(sql)
            .await?
            .into_results()
            .await?;
        Ok(())
    }

    async fn run_execute(&mut self, sql: &str, params: &[&str]) -> MssqlResult<u64> {
        debug!(sql = %sql, params = params.len(), "Executing statement");
        let params: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let result = self.client()?.execute(sql, &params).await?;
        Ok(result.total())
    }

    async fn run_query_text(&mut self, sql: &str, params: &[&str]) -> MssqlResult<Option<String>> {
        debug!(sql = %sql, params = params.len(), "Executing query");
        let params: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let row = self.client()?.query(sql, &params).await?.into_row().await?;

        match row {
            Some(row) => Ok(row.try_get::<&str, _>(0)?.map(String::from)),
            None => Ok(None),
        }
    }

    async fn transaction_count(&mut self) -> MssqlResult<i32> {
        let row = self
            .client()?
            .simple_query("SELECT @@TRANCOUNT")
            .await?
            .into_row()
            .await?;

        match row {
            Some(row) => Ok(row.try_get::<i32, _>(0)?.unwrap_or(0)),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl SchemaConnection for MssqlConnection {
    fn endpoint(&self) -> AutoMigrateResult<Endpoint> {
        Ok(self.config.endpoint()?)
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    async fn open(&mut self) -> AutoMigrateResult<()> {
        let client = self.connect().await?;
        info!(
            server = %self.config.data_source(),
            database = %self.config.database,
            "Connected to SQL Server"
        );
        self.client = Some(client);
        Ok(())
    }

    async fn has_open_transaction(&mut self) -> AutoMigrateResult<bool> {
        Ok(self.transaction_count().await? > 0)
    }

    async fn commit(&mut self) -> AutoMigrateResult<()> {
        debug!("Committing transaction");
        Ok(self.run_batch("COMMIT TRANSACTION").await?)
    }

    async fn execute_batch(&mut self, sql: &str) -> AutoMigrateResult<()> {
        Ok(self.run_batch(sql).await?)
    }

    async fn execute(&mut self, sql: &str, params: &[&str]) -> AutoMigrateResult<u64> {
        Ok(self.run_execute(sql, params).await?)
    }

    async fn query_text(
        &mut self,
        sql: &str,
        params: &[&str],
    ) -> AutoMigrateResult<Option<String>> {
        Ok(self.run_query_text(sql, params).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> MssqlConnection {
        MssqlConnection::from_connection_string(
            "Server=dev-sql\\SQLEXPRESS;Database=Orders;User Id=sa;Password=pass;",
        )
        .unwrap()
    }

    #[test]
    fn test_starts_closed() {
        assert!(!connection().is_open());
    }

    #[test]
    fn test_endpoint_from_config() {
        let endpoint = connection().endpoint().unwrap();
        assert_eq!(endpoint.server(), "DEV-SQL\\SQLEXPRESS");
        assert_eq!(endpoint.database(), "ORDERS");
    }

    #[tokio::test]
    async fn test_statement_on_closed_connection_fails() {
        let mut conn = connection();
        let err = conn.execute_batch("SELECT 1").await.unwrap_err();
        assert!(err.to_string().contains("connection is not open"));
    }

    #[tokio::test]
    async fn test_close_when_closed_is_noop() {
        let mut conn = connection();
        conn.close().await.unwrap();
        assert!(!conn.is_open());
    }

    #[test]
    fn test_debug_hides_credentials() {
        let debug = format!("{:?}", connection());
        assert!(debug.contains("Orders"));
        assert!(!debug.contains("pass"));
    }
}
