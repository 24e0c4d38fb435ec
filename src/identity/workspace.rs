use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Credential, DatabaseInstance, IdentityService};
use crate::config::WorkspaceSettings;
use crate::error::{Error, Result};

/// Timeout for individual workspace API calls
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
enum WorkspaceAuth {
    /// Personal access token
    Pat(String),
    /// OAuth machine-to-machine; access tokens are cached until shortly
    /// before they expire
    ClientCredentials {
        client_id: String,
        client_secret: String,
        tokens: Cache<(), Arc<str>>,
    },
}

#[derive(Deserialize)]
struct CurrentUser {
    #[serde(rename = "userName")]
    user_name: String,
}

#[derive(Serialize)]
struct GenerateCredentialRequest<'a> {
    request_id: String,
    instance_names: [&'a str; 1],
}

#[derive(Deserialize)]
struct OAuthToken {
    access_token: String,
}

/// Databricks workspace REST client.
///
/// Covers the three calls the database pool needs: who am I, where does the
/// instance live, and a fresh database credential.
#[derive(Clone)]
pub struct WorkspaceClient {
    http: reqwest::Client,
    host: Url,
    auth: WorkspaceAuth,
}

impl WorkspaceClient {
    pub fn new(settings: &WorkspaceSettings) -> Result<Self> {
        let host = Url::parse(&settings.host)
            .map_err(|e| Error::Config(format!("invalid workspace.host {:?}: {}", settings.host, e)))?;

        let auth = match (&settings.token, &settings.client_id, &settings.client_secret) {
            (Some(token), _, _) => WorkspaceAuth::Pat(token.clone()),
            (None, Some(client_id), Some(client_secret)) => {
                let tokens = Cache::builder()
                    .max_capacity(1)
                    .time_to_live(Duration::from_secs(settings.oauth_token_ttl_secs))
                    .build();
                WorkspaceAuth::ClientCredentials {
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    tokens,
                }
            },
            _ => {
                return Err(Error::Config(
                    "workspace.token or workspace.client_id/client_secret is required".to_string(),
                ))
            },
        };

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        info!("Workspace client configured for {}", host);

        Ok(Self { http, host, auth })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.host
            .join(path)
            .map_err(|e| Error::Config(format!("invalid workspace path {}: {}", path, e)))
    }

    async fn bearer(&self) -> Result<Arc<str>> {
        match &self.auth {
            WorkspaceAuth::Pat(token) => Ok(Arc::from(token.as_str())),
            WorkspaceAuth::ClientCredentials {
                client_id,
                client_secret,
                tokens,
            } => tokens
                .try_get_with((), self.fetch_oauth_token(client_id, client_secret))
                .await
                .map_err(Arc::unwrap_or_clone),
        }
    }

    async fn fetch_oauth_token(&self, client_id: &str, client_secret: &str) -> Result<Arc<str>> {
        debug!("Requesting workspace OAuth token for client {}", client_id);
        let url = self.endpoint("/oidc/v1/token")?;
        let response = self
            .http
            .post(url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", "all-apis")])
            .send()
            .await
            .map_err(|e| Error::Credential(format!("workspace OAuth request failed: {}", e)))?;

        let token: OAuthToken = read_json(response, "workspace OAuth token").await?;
        Ok(Arc::from(token.access_token))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, what: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let bearer = self.bearer().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&*bearer)
            .send()
            .await
            .map_err(|e| Error::Credential(format!("{} request failed: {}", what, e)))?;
        read_json(response, what).await
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Credential(format!(
            "{} returned {}: {}",
            what,
            status,
            body.trim()
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| Error::Credential(format!("{} response was malformed: {}", what, e)))
}

#[async_trait]
impl IdentityService for WorkspaceClient {
    async fn current_user(&self) -> Result<String> {
        let me: CurrentUser = self
            .get_json("/api/2.0/preview/scim/v2/Me", "current user lookup")
            .await?;
        Ok(me.user_name)
    }

    async fn database_instance(&self, name: &str) -> Result<DatabaseInstance> {
        self.get_json(
            &format!("/api/2.0/database/instances/{}", name),
            "database instance lookup",
        )
        .await
    }

    async fn mint(&self, instance_name: &str) -> Result<Credential> {
        let url = self.endpoint("/api/2.0/database/credentials")?;
        let bearer = self.bearer().await?;
        let request = GenerateCredentialRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            instance_names: [instance_name],
        };

        debug!(
            "Minting database credential for {} (request {})",
            instance_name, request.request_id
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(&*bearer)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Credential(format!("credential request failed: {}", e)))?;

        read_json(response, "credential request").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> WorkspaceSettings {
        WorkspaceSettings {
            host: "https://example.cloud.databricks.com".to_string(),
            token: Some("dapi-test".to_string()),
            ..WorkspaceSettings::default()
        }
    }

    #[test]
    fn test_endpoint_joins_host() {
        let client = WorkspaceClient::new(&settings()).unwrap();
        assert_eq!(
            client
                .endpoint("/api/2.0/database/instances/marketplace-intel-db")
                .unwrap()
                .as_str(),
            "https://example.cloud.databricks.com/api/2.0/database/instances/marketplace-intel-db"
        );
    }

    #[test]
    fn test_rejects_invalid_host() {
        let mut settings = settings();
        settings.host = "not a url".to_string();
        assert!(matches!(
            WorkspaceClient::new(&settings),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_requires_some_auth() {
        let mut settings = settings();
        settings.token = None;
        settings.client_id = Some("id".to_string());
        assert!(matches!(
            WorkspaceClient::new(&settings),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_oauth_failure_is_wrapped_once() {
        let settings = WorkspaceSettings {
            host: "http://127.0.0.1:1".to_string(),
            token: None,
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            ..WorkspaceSettings::default()
        };
        let client = WorkspaceClient::new(&settings).unwrap();

        let err = client.current_user().await.unwrap_err();
        assert!(err.is_credential());
        let message = err.to_string();
        assert!(message.starts_with("credential error: workspace OAuth request failed"));
        assert_eq!(message.matches("credential error").count(), 1);
    }

    #[test]
    fn test_credential_request_shape() {
        let request = GenerateCredentialRequest {
            request_id: "r-1".to_string(),
            instance_names: ["marketplace-intel-db"],
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"request_id":"r-1","instance_names":["marketplace-intel-db"]}"#
        );
    }

    #[test]
    fn test_instance_payload() {
        let instance: DatabaseInstance = serde_json::from_str(
            r#"{"name":"marketplace-intel-db","read_write_dns":"instance-1.database.cloud.databricks.com","state":"AVAILABLE","capacity":"CU_1"}"#,
        )
        .unwrap();
        assert_eq!(
            instance.read_write_dns,
            "instance-1.database.cloud.databricks.com"
        );
        assert_eq!(instance.state.as_deref(), Some("AVAILABLE"));
    }
}
