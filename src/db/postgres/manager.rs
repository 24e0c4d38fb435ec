use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use deadpool::managed::{self, Metrics, PoolError, RecycleError, RecycleResult, TimeoutType};
use log::{debug, warn};
use postgres_native_tls::MakeTlsConnector;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::{Client, Connection, NoTls};

use crate::config::PoolSettings;
use crate::error::{Error, Operation, Result};
use crate::identity::TokenCache;

/// Fixed host:port/database triple plus the user that logs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

/// Opens one authenticated client with a given password.
pub trait Connect: Send + Sync {
    type Client: Send;

    fn connect(&self, password: &str) -> impl Future<Output = Result<Self::Client>> + Send;

    fn is_closed(&self, client: &Self::Client) -> bool;
}

/// Postgres wire connector for one endpoint, TLS or plain.
pub struct PgConnector {
    endpoint: Endpoint,
    tls: Option<MakeTlsConnector>,
    connect_timeout: Duration,
}

impl PgConnector {
    pub fn new(endpoint: Endpoint, tls: Option<MakeTlsConnector>, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            tls,
            connect_timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn pg_config(&self, password: &str) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.endpoint.host)
            .port(self.endpoint.port)
            .user(&self.endpoint.user)
            .password(password)
            .dbname(&self.endpoint.database)
            .application_name("lakebase-analytics")
            .connect_timeout(self.connect_timeout)
            .ssl_mode(if self.tls.is_some() {
                PgSslMode::Require
            } else {
                PgSslMode::Disable
            });
        config
    }
}

impl Connect for PgConnector {
    type Client = Client;

    async fn connect(&self, password: &str) -> Result<Client> {
        debug!("Opening connection to {}", self.endpoint);
        let config = self.pg_config(password);

        let connect = async {
            match &self.tls {
                Some(tls) => {
                    let (client, connection) = config
                        .connect(tls.clone())
                        .await
                        .map_err(Error::from_connect)?;
                    spawn_connection(connection);
                    Ok(client)
                },
                None => {
                    let (client, connection) =
                        config.connect(NoTls).await.map_err(Error::from_connect)?;
                    spawn_connection(connection);
                    Ok(client)
                },
            }
        };

        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: Operation::OpenConnection,
                after: self.connect_timeout,
            }),
        }
    }

    fn is_closed(&self, client: &Client) -> bool {
        client.is_closed()
    }
}

/// Drive the connection half of a client until it closes.
fn spawn_connection<S, T>(connection: Connection<S, T>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("Postgres connection closed with error: {}", e);
        }
    });
}

/// Pool manager that opens each physical connection with whatever token
/// the cache holds at that moment.
///
/// Open connections keep the password they authenticated with; Postgres
/// only checks it at login. New connections always use the current token,
/// so the pool never goes stale as the cache rotates.
///
/// The mint and the connect step carry their own timeouts, so a slow or
/// refused mint surfaces as a credential error rather than a connect
/// timeout.
pub struct LakebaseManager<C = PgConnector> {
    connector: C,
    tokens: Arc<TokenCache>,
}

impl LakebaseManager {
    pub fn new(
        endpoint: Endpoint,
        tokens: Arc<TokenCache>,
        tls: Option<MakeTlsConnector>,
        connect_timeout: Duration,
    ) -> Self {
        Self::with_connector(PgConnector::new(endpoint, tls, connect_timeout), tokens)
    }
}

impl<C> LakebaseManager<C> {
    pub fn with_connector(connector: C, tokens: Arc<TokenCache>) -> Self {
        Self { connector, tokens }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

impl<C: Connect> managed::Manager for LakebaseManager<C> {
    type Type = C::Client;
    type Error = Error;

    async fn create(&self) -> Result<C::Client> {
        let token = self.tokens.get_token().await?;

        match self.connector.connect(&token).await {
            // One retry with a freshly minted token; a second rejection is
            // surfaced as a credential error.
            Err(Error::Credential(reason)) => {
                warn!("{}; retrying with a fresh credential", reason);
                self.tokens.invalidate_token(&token);
                let token = self.tokens.get_token().await?;
                self.connector.connect(&token).await
            },
            other => other,
        }
    }

    async fn recycle(&self, client: &mut C::Client, _metrics: &Metrics) -> RecycleResult<Error> {
        if self.connector.is_closed(client) {
            return Err(RecycleError::Backend(Error::Connection(
                "connection closed by server".to_string(),
            )));
        }
        Ok(())
    }
}

/// Build a bounded pool. No connection is opened until the first lease.
pub fn build_pool<M>(manager: M, settings: &PoolSettings) -> Result<managed::Pool<M>>
where
    M: managed::Manager<Error = Error>,
{
    managed::Pool::builder(manager)
        .max_size(settings.max_connections)
        .wait_timeout(Some(Duration::from_secs(settings.wait_timeout_secs)))
        .runtime(deadpool::Runtime::Tokio1)
        .build()
        .map_err(|e| Error::Config(format!("failed to build connection pool: {}", e)))
}

/// Lease one object, blocking while the pool is at capacity.
///
/// Waiters are served in arrival order (deadpool queues them on a fair
/// semaphore).
pub async fn lease<M>(pool: &managed::Pool<M>, settings: &PoolSettings) -> Result<managed::Object<M>>
where
    M: managed::Manager<Error = Error>,
{
    pool.get().await.map_err(|e| map_pool_error(e, settings))
}

fn map_pool_error(err: PoolError<Error>, settings: &PoolSettings) -> Error {
    match err {
        PoolError::Backend(e) => e,
        PoolError::Timeout(TimeoutType::Wait) => {
            Error::PoolExhausted(Duration::from_secs(settings.wait_timeout_secs))
        },
        PoolError::Closed => Error::Connection("connection pool is closed".to_string()),
        other => Error::Connection(other.to_string()),
    }
}
