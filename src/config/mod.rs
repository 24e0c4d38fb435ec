#[allow(clippy::module_inception)]
mod config;

pub use config::{
    is_sql_identifier, CredentialSettings, CronSettings, HexbinSettings, LakebaseSettings,
    PoolSettings, Settings, SslMode, WorkspaceSettings, TOKEN_LIFETIME_SECS,
};
