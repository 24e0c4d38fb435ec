//! Identity collaborators that issue database credentials.
//!
//! - [`workspace`] - Databricks workspace REST client (OAuth database credentials)
//! - [`token_cache`] - Refresh-interval token cache with single-flight minting
//! - [`clock`] - Injectable time source

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;

use crate::error::Result;

pub mod clock;
pub mod token_cache;
pub mod workspace;

pub use clock::{Clock, ManualClock, SystemClock};
pub use token_cache::TokenCache;
pub use workspace::WorkspaceClient;

/// Short-lived bearer secret used as the database password.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    #[serde(rename = "expiration_time")]
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &format_args!("<redacted {} bytes>", self.token.len()))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Managed database instance as reported by the workspace.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DatabaseInstance {
    pub name: String,
    pub read_write_dns: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// Service that knows who we are, where the database lives, and how to
/// mint a password for it.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Database user name of the authenticated principal.
    async fn current_user(&self) -> Result<String>;

    async fn database_instance(&self, name: &str) -> Result<DatabaseInstance>;

    /// Mint a fresh credential scoped to `instance_name`.
    async fn mint(&self, instance_name: &str) -> Result<Credential>;
}

/// Fixed user/host/password identity for plain Postgres (local development
/// and integration tests).
///
/// Credentials expire a year after the clock's current time.
#[derive(Clone)]
pub struct StaticIdentity {
    user: String,
    host: String,
    password: String,
    clock: Arc<dyn Clock>,
}

impl StaticIdentity {
    pub fn new(
        user: impl Into<String>,
        host: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            password: password.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl IdentityService for StaticIdentity {
    async fn current_user(&self) -> Result<String> {
        Ok(self.user.clone())
    }

    async fn database_instance(&self, name: &str) -> Result<DatabaseInstance> {
        Ok(DatabaseInstance {
            name: name.to_string(),
            read_write_dns: self.host.clone(),
            state: Some("AVAILABLE".to_string()),
        })
    }

    async fn mint(&self, _instance_name: &str) -> Result<Credential> {
        Ok(Credential::new(
            self.password.clone(),
            self.clock.now() + ChronoDuration::days(365),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacts_token() {
        let cred = Credential::new("super-secret-token", Utc::now());
        let printed = format!("{:?}", cred);
        assert!(!printed.contains("super-secret-token"));
        assert!(printed.contains("redacted 18 bytes"));
    }

    #[test]
    fn test_credential_deserializes_workspace_payload() {
        let cred: Credential = serde_json::from_str(
            r#"{"token":"abc","expiration_time":"2026-01-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(cred.token, "abc");
        assert_eq!(cred.expires_at.to_rfc3339(), "2026-01-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn test_static_identity() {
        let identity = StaticIdentity::new("postgres", "localhost", "pw");
        assert_eq!(identity.current_user().await.unwrap(), "postgres");
        let instance = identity.database_instance("db").await.unwrap();
        assert_eq!(instance.read_write_dns, "localhost");
        let cred = identity.mint("db").await.unwrap();
        assert_eq!(cred.token, "pw");
        assert!(cred.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_static_identity_follows_injected_clock() {
        let far_future = Utc::now() + ChronoDuration::days(365 * 20);
        let clock = Arc::new(ManualClock::new(far_future));
        let identity = StaticIdentity::new("postgres", "localhost", "pw").with_clock(clock.clone());

        let cred = identity.mint("db").await.unwrap();
        assert_eq!(cred.expires_at, far_future + ChronoDuration::days(365));
        assert!(cred.expires_at > clock.now());
    }
}
