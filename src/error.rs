//! Error taxonomy for the credential pool and analytics queries.
//!
//! Every variant reaches the caller unchanged. Nothing here is retried or
//! turned into an empty result, so the UI layer can tell "failed" apart
//! from "no data".

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Bounded operations that can time out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    MintCredential,
    OpenConnection,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::MintCredential => write!(f, "credential mint"),
            Operation::OpenConnection => write!(f, "connection open"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The identity service refused or failed to mint a token, or the
    /// database rejected the token it was given.
    #[error("credential error: {0}")]
    Credential(String),

    /// The endpoint refused the connection or the network failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// No connection was released within the bounded wait.
    #[error("connection pool exhausted after waiting {0:?}")]
    PoolExhausted(Duration),

    /// The statement failed, or a row did not match the declared schema.
    #[error("query error: {0}")]
    Query(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: Operation, after: Duration },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Credential(_) => "AUTH_ERROR",
            Error::Connection(_) => "DB_CONNECTION_ERROR",
            Error::PoolExhausted(_) => "DB_POOL_EXHAUSTED",
            Error::Query(_) => "DB_QUERY_ERROR",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Config(_) => "CONFIG_ERROR",
        }
    }

    /// The message without the kind prefix.
    pub fn detail(&self) -> String {
        match self {
            Error::Credential(msg) | Error::Connection(msg) | Error::Query(msg) | Error::Config(msg) => {
                msg.clone()
            },
            other => other.to_string(),
        }
    }

    pub fn is_credential(&self) -> bool {
        matches!(self, Error::Credential(_))
    }

    /// Classify a driver error raised while opening a connection.
    ///
    /// SQLSTATE class 28 (invalid authorization) means the token was
    /// rejected; everything else is a connection failure.
    pub fn from_connect(err: tokio_postgres::Error) -> Self {
        if is_auth_failure(&err) {
            Error::Credential(format!("database rejected credential: {}", err))
        } else {
            Error::Connection(err.to_string())
        }
    }

    /// Classify a driver error raised while running a statement.
    pub fn from_query(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            return Error::Connection(err.to_string());
        }
        match err.as_db_error() {
            Some(db) => Error::Query(format!("{} ({})", db.message(), db.code().code())),
            None => Error::Query(err.to_string()),
        }
    }
}

pub fn is_auth_failure(err: &tokio_postgres::Error) -> bool {
    err.code().is_some_and(is_auth_sqlstate)
}

/// SQLSTATE class 28: invalid authorization specification.
pub fn is_auth_sqlstate(code: &SqlState) -> bool {
    code.code().starts_with("28")
}

impl From<config::ConfigError> for Error {
    fn from(value: config::ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            Error::Credential("x".into()),
            Error::Connection("x".into()),
            Error::PoolExhausted(Duration::from_secs(1)),
            Error::Query("x".into()),
            Error::Timeout {
                operation: Operation::MintCredential,
                after: Duration::from_secs(1),
            },
            Error::Config("x".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_timeout_message_names_operation() {
        let err = Error::Timeout {
            operation: Operation::OpenConnection,
            after: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "connection open timed out after 10s");
    }

    #[test]
    fn test_auth_sqlstates() {
        assert!(is_auth_sqlstate(&SqlState::INVALID_PASSWORD));
        assert!(is_auth_sqlstate(&SqlState::INVALID_AUTHORIZATION_SPECIFICATION));
        assert!(is_auth_sqlstate(&SqlState::from_code("28P01")));
        assert!(!is_auth_sqlstate(&SqlState::CONNECTION_FAILURE));
        assert!(!is_auth_sqlstate(&SqlState::INSUFFICIENT_PRIVILEGE));
    }

    #[test]
    fn test_detail_drops_kind_prefix() {
        let err = Error::Config("bad host".into());
        assert_eq!(err.to_string(), "configuration error: bad host");
        assert_eq!(err.detail(), "bad host");

        let err = Error::Timeout {
            operation: Operation::MintCredential,
            after: Duration::from_secs(1),
        };
        assert_eq!(err.detail(), "credential mint timed out after 1s");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: Error = config::ConfigError::Message("bad".into()).into();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
