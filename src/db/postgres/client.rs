use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use deadpool::managed;
use log::{info, warn};
use postgres_native_tls::MakeTlsConnector;
use tokio::sync::OnceCell;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

use super::manager::{build_pool, lease, Endpoint, LakebaseManager};
use super::record::{FromRow, Record};
use crate::config::{LakebaseSettings, PoolSettings, SslMode};
use crate::error::{Error, Result};
use crate::identity::{IdentityService, TokenCache};

pub type Pool = managed::Pool<LakebaseManager>;

/// Placeholder replaced by the configured schema name in every statement.
pub const SCHEMA_PLACEHOLDER: &str = "{schema}";

/// Maximum attempts when warming the pool at startup
const MAX_WARM_UP_RETRIES: u32 = 3;

/// Exclusive lease on one pooled connection.
///
/// Dropping the lease (or calling [`release`](Self::release)) hands the
/// connection back to the pool; it is not closed.
pub struct LeasedConnection {
    inner: managed::Object<LakebaseManager>,
}

impl LeasedConnection {
    pub fn release(self) {
        drop(self);
    }
}

impl std::fmt::Debug for LeasedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeasedConnection").finish_non_exhaustive()
    }
}

impl Deref for LeasedConnection {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.inner
    }
}

impl DerefMut for LeasedConnection {
    fn deref_mut(&mut self) -> &mut Client {
        &mut self.inner
    }
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStatus {
    pub max_size: usize,
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
}

/// PostgreSQL client for a Lakebase instance.
///
/// The pool is built on first use: the endpoint is resolved through the
/// identity service (unless configured explicitly) and each physical
/// connection authenticates with the token cache's current token.
pub struct PostgresClient {
    settings: LakebaseSettings,
    pool_settings: PoolSettings,
    identity: Arc<dyn IdentityService>,
    tokens: Arc<TokenCache>,
    pool: OnceCell<Pool>,
}

impl PostgresClient {
    pub fn new(
        settings: LakebaseSettings,
        pool_settings: PoolSettings,
        identity: Arc<dyn IdentityService>,
        tokens: Arc<TokenCache>,
    ) -> Self {
        Self {
            settings,
            pool_settings,
            identity,
            tokens,
            pool: OnceCell::new(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.settings.schema
    }

    async fn pool(&self) -> Result<&Pool> {
        self.pool.get_or_try_init(|| self.build()).await
    }

    async fn build(&self) -> Result<Pool> {
        let host = match &self.settings.host {
            Some(host) => host.clone(),
            None => {
                let instance = self
                    .identity
                    .database_instance(&self.settings.instance_name)
                    .await?;
                if let Some(state) = &instance.state {
                    info!("Lakebase instance {} is {}", instance.name, state);
                }
                instance.read_write_dns
            },
        };

        let user = match &self.settings.user {
            Some(user) => user.clone(),
            None => self.identity.current_user().await?,
        };

        let endpoint = Endpoint {
            host,
            port: self.settings.port,
            database: self.settings.database.clone(),
            user,
        };

        let tls = match self.settings.ssl_mode {
            SslMode::Require => {
                let connector = native_tls::TlsConnector::builder()
                    .build()
                    .map_err(|e| Error::Config(format!("failed to initialise TLS: {}", e)))?;
                Some(MakeTlsConnector::new(connector))
            },
            SslMode::Disable => None,
        };

        info!(
            "Creating connection pool for {} (max {} connections)",
            endpoint, self.pool_settings.max_connections
        );

        let manager = LakebaseManager::new(
            endpoint,
            self.tokens.clone(),
            tls,
            Duration::from_secs(self.pool_settings.connect_timeout_secs),
        );
        build_pool(manager, &self.pool_settings)
    }

    /// Lease a connection, blocking while the pool is at capacity.
    pub async fn get_connection(&self) -> Result<LeasedConnection> {
        let pool = self.pool().await?;
        let inner = lease(pool, &self.pool_settings).await?;
        Ok(LeasedConnection { inner })
    }

    /// Open `min_connections` connections up front so the first dashboard
    /// request does not pay for the handshake.
    pub async fn warm_up(&self) -> Result<()> {
        let target = self.pool_settings.min_connections;
        if target == 0 {
            return Ok(());
        }

        let mut retries = 0;
        loop {
            match self.open_many(target).await {
                Ok(()) => {
                    info!("Connection pool warmed with {} connections", target);
                    return Ok(());
                },
                // A refused credential will not fix itself with a retry
                Err(e @ Error::Credential(_)) | Err(e @ Error::Config(_)) => return Err(e),
                Err(e) => {
                    retries += 1;
                    if retries >= MAX_WARM_UP_RETRIES {
                        return Err(e);
                    }
                    let delay = Duration::from_millis(100 * 2_u64.pow(retries));
                    warn!(
                        "Failed to connect to Lakebase (attempt {}/{}): {}; retrying in {:?}...",
                        retries, MAX_WARM_UP_RETRIES, e, delay
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    async fn open_many(&self, n: usize) -> Result<()> {
        let mut held = Vec::with_capacity(n);
        for _ in 0..n {
            held.push(self.get_connection().await?);
        }
        Ok(())
    }

    fn with_schema(&self, sql: &str) -> String {
        sql.replace(SCHEMA_PLACEHOLDER, &self.settings.schema)
    }

    /// Run one parameterized statement and return its rows as named records.
    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Record>> {
        self.query_as::<Record>(sql, params).await
    }

    /// Run one parameterized statement and map each row through `T`.
    ///
    /// The connection is returned to the pool whether the statement or the
    /// mapping fails.
    pub async fn query_as<T: FromRow>(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<T>> {
        let sql = self.with_schema(sql);
        let conn = self.get_connection().await?;
        let rows = conn.query(sql.as_str(), params).await.map_err(Error::from_query);
        conn.release();
        rows?.iter().map(T::from_row).collect()
    }

    /// First row mapped through `T`, if any.
    pub async fn query_opt<T: FromRow>(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<T>> {
        Ok(self.query_as::<T>(sql, params).await?.into_iter().next())
    }

    /// Health check - verify a connection can be leased and answers
    pub async fn health_check(&self) -> Result<()> {
        let conn = self.get_connection().await?;
        conn.query_one("SELECT 1", &[])
            .await
            .map_err(Error::from_query)?;
        Ok(())
    }

    /// `None` until the pool has been built.
    pub fn status(&self) -> Option<PoolStatus> {
        self.pool.get().map(|pool| {
            let status = pool.status();
            PoolStatus {
                max_size: status.max_size,
                size: status.size,
                available: status.available as usize,
                waiting: status.waiting as usize,
            }
        })
    }

    /// Close the pool. Idle connections are dropped now, leased ones when
    /// they come back; later leases fail with a connection error.
    pub fn shutdown(&self) {
        if let Some(pool) = self.pool.get() {
            info!("Closing Lakebase connection pool");
            pool.close();
        }
    }
}
