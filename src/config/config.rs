use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Nominal lifetime of a database credential minted by the workspace.
/// The refresh interval must stay strictly below it.
pub const TOKEN_LIFETIME_SECS: u64 = 3600;

/// Transport encryption for database connections.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    #[default]
    Require,
    Disable,
}

/// Lakebase instance and schema configuration.
///
/// `host` and `user` are normally resolved through the workspace API
/// (instance `read_write_dns`, current user name). Setting them here skips
/// the lookup. Setting `password` switches to a static credential, which is
/// only useful against a plain local Postgres.
#[derive(Debug, Deserialize, Clone)]
pub struct LakebaseSettings {
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl Default for LakebaseSettings {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            schema: default_schema(),
            database: default_database(),
            port: default_port(),
            host: None,
            user: None,
            password: None,
            ssl_mode: SslMode::default(),
        }
    }
}

fn default_instance_name() -> String {
    "marketplace-intel-db".to_string()
}

fn default_schema() -> String {
    "gold".to_string()
}

fn default_database() -> String {
    "databricks_postgres".to_string()
}

fn default_port() -> u16 {
    5432
}

/// Connection pool sizing and wait bounds.
#[derive(Debug, Deserialize, Clone)]
pub struct PoolSettings {
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// How long a caller waits for a free connection before giving up
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    /// Upper bound for opening one physical connection
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            wait_timeout_secs: default_wait_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_min_connections() -> usize {
    2
}

fn default_max_connections() -> usize {
    10
}

fn default_wait_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Database credential caching.
///
/// Tokens live about an hour; refreshing every 15 minutes leaves a wide
/// margin for clock skew and long-running queries.
#[derive(Debug, Deserialize, Clone)]
pub struct CredentialSettings {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_mint_timeout_secs")]
    pub mint_timeout_secs: u64,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            mint_timeout_secs: default_mint_timeout_secs(),
        }
    }
}

fn default_refresh_interval_secs() -> u64 {
    900
}

fn default_mint_timeout_secs() -> u64 {
    30
}

/// Databricks workspace access used to mint database credentials.
///
/// Either a personal access `token` or an OAuth `client_id`/`client_secret`
/// pair (machine-to-machine) must be present unless a static password is
/// configured under `lakebase`.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceSettings {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_oauth_token_ttl_secs")]
    pub oauth_token_ttl_secs: u64,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            token: None,
            client_id: None,
            client_secret: None,
            oauth_token_ttl_secs: default_oauth_token_ttl_secs(),
        }
    }
}

fn default_oauth_token_ttl_secs() -> u64 {
    3000
}

/// Intervals for background jobs.
#[derive(Debug, Deserialize, Clone)]
pub struct CronSettings {
    /// How often to check whether the credential needs pre-warming
    #[serde(default = "default_credential_prewarm_interval_secs")]
    pub credential_prewarm_interval_secs: u64,
    /// Refresh ahead of expiry when the token expires within this window
    #[serde(default = "default_credential_prewarm_lead_secs")]
    pub credential_prewarm_lead_secs: u64,
    #[serde(default = "default_pool_health_interval_secs")]
    pub pool_health_interval_secs: u64,
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            credential_prewarm_interval_secs: default_credential_prewarm_interval_secs(),
            credential_prewarm_lead_secs: default_credential_prewarm_lead_secs(),
            pool_health_interval_secs: default_pool_health_interval_secs(),
        }
    }
}

fn default_credential_prewarm_interval_secs() -> u64 {
    60
}

fn default_credential_prewarm_lead_secs() -> u64 {
    120
}

fn default_pool_health_interval_secs() -> u64 {
    300
}

/// Hexbin scatter layout used by the summary output.
#[derive(Debug, Deserialize, Clone)]
pub struct HexbinSettings {
    #[serde(default = "default_hex_radius")]
    pub radius: f64,
    #[serde(default = "default_hex_width")]
    pub width: f64,
    #[serde(default = "default_hex_height")]
    pub height: f64,
    /// Fraction of the data extent added on each side of both axes
    #[serde(default = "default_hex_padding")]
    pub padding: f64,
}

impl Default for HexbinSettings {
    fn default() -> Self {
        Self {
            radius: default_hex_radius(),
            width: default_hex_width(),
            height: default_hex_height(),
            padding: default_hex_padding(),
        }
    }
}

fn default_hex_radius() -> f64 {
    12.0
}

fn default_hex_width() -> f64 {
    800.0
}

fn default_hex_height() -> f64 {
    480.0
}

fn default_hex_padding() -> f64 {
    0.1
}

/// Root application configuration.
///
/// Loaded from an optional `config.yaml` at startup, overridden by
/// `LAKEBASE__<SECTION>__<KEY>` environment variables.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub lakebase: LakebaseSettings,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub credentials: CredentialSettings,
    #[serde(default)]
    pub workspace: WorkspaceSettings,
    #[serde(default)]
    pub cron: CronSettings,
    #[serde(default)]
    pub hexbin: HexbinSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("LAKEBASE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Self::from_config(s)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_sql_identifier(&self.lakebase.schema) {
            return Err(ConfigError::Message(format!(
                "lakebase.schema {:?} is not a plain SQL identifier",
                self.lakebase.schema
            )));
        }

        if self.pool.max_connections == 0 {
            return Err(ConfigError::Message(
                "pool.max_connections must be at least 1".to_string(),
            ));
        }

        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigError::Message(format!(
                "pool.min_connections ({}) exceeds pool.max_connections ({})",
                self.pool.min_connections, self.pool.max_connections
            )));
        }

        for (name, secs) in [
            ("pool.wait_timeout_secs", self.pool.wait_timeout_secs),
            ("pool.connect_timeout_secs", self.pool.connect_timeout_secs),
            ("credentials.mint_timeout_secs", self.credentials.mint_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Message(format!("{} must be at least 1", name)));
            }
        }

        let refresh = self.credentials.refresh_interval_secs;
        if refresh == 0 || refresh >= TOKEN_LIFETIME_SECS {
            return Err(ConfigError::Message(format!(
                "credentials.refresh_interval_secs must be in 1..{}, got {}",
                TOKEN_LIFETIME_SECS, refresh
            )));
        }

        if self.hexbin.radius <= 0.0 || !self.hexbin.radius.is_finite() {
            return Err(ConfigError::Message(
                "hexbin.radius must be a positive number".to_string(),
            ));
        }

        if self.lakebase.password.is_none() {
            if self.workspace.host.is_empty() {
                return Err(ConfigError::Message(
                    "workspace.host is required unless lakebase.password is set".to_string(),
                ));
            }
            let has_m2m =
                self.workspace.client_id.is_some() && self.workspace.client_secret.is_some();
            if self.workspace.token.is_none() && !has_m2m {
                return Err(ConfigError::Message(
                    "workspace.token or workspace.client_id/client_secret is required".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Schema names are spliced into SQL text, so only bare identifiers pass.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn load(yaml: &str) -> Result<Settings, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        Settings::from_config(config)
    }

    #[test]
    fn test_defaults_with_workspace_token() {
        let settings = load(
            r#"
workspace:
  host: "https://example.cloud.databricks.com"
  token: "dapi-test"
"#,
        )
        .unwrap();

        assert_eq!(settings.lakebase.instance_name, "marketplace-intel-db");
        assert_eq!(settings.lakebase.schema, "gold");
        assert_eq!(settings.lakebase.database, "databricks_postgres");
        assert_eq!(settings.lakebase.port, 5432);
        assert_eq!(settings.lakebase.ssl_mode, SslMode::Require);
        assert_eq!(settings.pool.min_connections, 2);
        assert_eq!(settings.pool.max_connections, 10);
        assert_eq!(settings.credentials.refresh_interval_secs, 900);
    }

    #[test]
    fn test_static_password_needs_no_workspace() {
        let settings = load(
            r#"
lakebase:
  host: "localhost"
  user: "postgres"
  password: "postgres"
  ssl_mode: "disable"
"#,
        )
        .unwrap();

        assert_eq!(settings.lakebase.ssl_mode, SslMode::Disable);
        assert_eq!(settings.lakebase.password.as_deref(), Some("postgres"));
    }

    #[test]
    fn test_rejects_refresh_interval_beyond_token_lifetime() {
        let err = load(
            r#"
lakebase:
  password: "x"
credentials:
  refresh_interval_secs: 3600
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("refresh_interval_secs"));
    }

    #[test]
    fn test_rejects_schema_injection() {
        let err = load(
            r#"
lakebase:
  password: "x"
  schema: "gold; DROP TABLE x"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("lakebase.schema"));
    }

    #[test]
    fn test_rejects_min_above_max() {
        let err = load(
            r#"
lakebase:
  password: "x"
pool:
  min_connections: 5
  max_connections: 2
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("min_connections"));
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        for (section, key) in [
            ("pool", "wait_timeout_secs"),
            ("pool", "connect_timeout_secs"),
            ("credentials", "mint_timeout_secs"),
        ] {
            let err = load(&format!(
                "lakebase:\n  password: \"x\"\n{}:\n  {}: 0\n",
                section, key
            ))
            .unwrap_err();
            assert!(
                err.to_string().contains(&format!("{}.{}", section, key)),
                "unexpected error: {}",
                err
            );
        }
    }

    #[test]
    fn test_requires_workspace_auth() {
        let err = load(
            r#"
workspace:
  host: "https://example.cloud.databricks.com"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("workspace.token"));
    }

    #[test]
    fn test_identifier_check() {
        assert!(is_sql_identifier("gold"));
        assert!(is_sql_identifier("_gold_v2"));
        assert!(!is_sql_identifier("2gold"));
        assert!(!is_sql_identifier("gold.table"));
        assert!(!is_sql_identifier(""));
    }
}
