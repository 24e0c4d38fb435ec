use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::config::Settings;
use crate::error::Result;
use crate::identity::{Clock, IdentityService, StaticIdentity, SystemClock, TokenCache, WorkspaceClient};

pub mod models;
pub mod postgres;

pub use postgres::PostgresClient;

/// Lakebase access: the credential cache and the pooled client built on it.
///
/// With `lakebase.password` set the pool authenticates with that fixed
/// password (plain Postgres). Otherwise credentials are minted through the
/// Databricks workspace and rotated by the token cache.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
    pub tokens: Arc<TokenCache>,
}

impl Database {
    pub fn new(settings: &Settings) -> Result<Self> {
        let identity: Arc<dyn IdentityService> = match &settings.lakebase.password {
            Some(password) => {
                info!("Using static credentials for {}", settings.lakebase.instance_name);
                Arc::new(StaticIdentity::new(
                    settings.lakebase.user.as_deref().unwrap_or("postgres"),
                    settings.lakebase.host.as_deref().unwrap_or("localhost"),
                    password.clone(),
                ))
            },
            None => {
                info!("Using workspace credentials from {}", settings.workspace.host);
                Arc::new(WorkspaceClient::new(&settings.workspace)?)
            },
        };

        Self::with_identity(settings, identity, Arc::new(SystemClock))
    }

    pub fn with_identity(
        settings: &Settings,
        identity: Arc<dyn IdentityService>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let tokens = Arc::new(TokenCache::new(
            identity.clone(),
            clock,
            settings.lakebase.instance_name.clone(),
            Duration::from_secs(settings.credentials.refresh_interval_secs),
            Duration::from_secs(settings.credentials.mint_timeout_secs),
        )?);

        let postgres = Arc::new(PostgresClient::new(
            settings.lakebase.clone(),
            settings.pool.clone(),
            identity,
            tokens.clone(),
        ));

        Ok(Self { postgres, tokens })
    }

    pub fn shutdown(&self) {
        self.postgres.shutdown();
        self.tokens.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_password_needs_no_workspace() {
        let mut settings = Settings::default();
        settings.lakebase.password = Some("secret".to_string());

        let db = Database::new(&settings).unwrap();
        assert_eq!(db.tokens.get_token().await.unwrap(), "secret");
        assert!(db.postgres.status().is_none());
        db.shutdown();
    }

    #[test]
    fn test_workspace_requires_auth() {
        let mut settings = Settings::default();
        settings.workspace.host = "https://example.cloud.databricks.com".to_string();
        assert!(Database::new(&settings).is_err());
    }
}
