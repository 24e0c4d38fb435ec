use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use tokio::sync::Mutex;

use super::{Clock, IdentityService};
use crate::error::{Error, Operation, Result};

#[derive(Debug)]
struct CachedToken {
    token: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Cached database credential, refreshed on a fixed interval.
///
/// A token is handed out until `issued_at + refresh_interval` (or the
/// credential's own expiry, whichever comes first). At most one mint is in
/// flight: callers that find the cache stale queue on `refresh_lock` and
/// reuse whatever the first caller stored. The cached value is swapped as a
/// whole, so readers never see a half-written token.
pub struct TokenCache {
    identity: Arc<dyn IdentityService>,
    clock: Arc<dyn Clock>,
    instance_name: String,
    refresh_interval: TimeDelta,
    mint_timeout: Duration,
    cached: RwLock<Option<Arc<CachedToken>>>,
    refresh_lock: Mutex<()>,
}

impl TokenCache {
    pub fn new(
        identity: Arc<dyn IdentityService>,
        clock: Arc<dyn Clock>,
        instance_name: impl Into<String>,
        refresh_interval: Duration,
        mint_timeout: Duration,
    ) -> Result<Self> {
        let refresh_interval = TimeDelta::from_std(refresh_interval)
            .map_err(|e| Error::Config(format!("invalid refresh interval: {}", e)))?;
        if refresh_interval <= TimeDelta::zero() {
            return Err(Error::Config("refresh interval must be positive".to_string()));
        }

        Ok(Self {
            identity,
            clock,
            instance_name: instance_name.into(),
            refresh_interval,
            mint_timeout,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Current token, minting a new one if the cached one is stale.
    pub async fn get_token(&self) -> Result<String> {
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Whoever held the lock before us may already have refreshed
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        self.mint_locked().await
    }

    /// Mint unconditionally and replace the cached token.
    pub async fn refresh(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        self.mint_locked().await
    }

    /// Drop the cached token if it is still `rejected`.
    ///
    /// Used after the database refuses a token; a newer token stored by a
    /// concurrent caller is left alone.
    pub fn invalidate_token(&self, rejected: &str) {
        let mut slot = self.cached.write().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|c| c.token == rejected) {
            debug!("Invalidating rejected credential for {}", self.instance_name);
            *slot = None;
        }
    }

    pub fn invalidate(&self) {
        *self.cached.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// True when there is no token or it goes stale within `lead`.
    pub fn expires_within(&self, lead: Duration) -> bool {
        let lead = TimeDelta::from_std(lead).unwrap_or(TimeDelta::MAX);
        let now = self.clock.now();
        match self.cached.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(cached) => cached.expires_at.signed_duration_since(now) <= lead,
            None => true,
        }
    }

    /// When the cached token stops being handed out, if there is one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.cached
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| c.expires_at)
    }

    fn fresh_token(&self) -> Option<String> {
        let now = self.clock.now();
        self.cached
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .filter(|c| now < c.expires_at)
            .map(|c| c.token.clone())
    }

    /// Caller must hold `refresh_lock`.
    async fn mint_locked(&self) -> Result<String> {
        let issued_at = self.clock.now();

        let credential =
            match tokio::time::timeout(self.mint_timeout, self.identity.mint(&self.instance_name))
                .await
            {
                Ok(Ok(credential)) => credential,
                Ok(Err(e @ (Error::Credential(_) | Error::Timeout { .. }))) => return Err(e),
                Ok(Err(e)) => return Err(Error::Credential(e.detail())),
                Err(_) => {
                    return Err(Error::Timeout {
                        operation: Operation::MintCredential,
                        after: self.mint_timeout,
                    })
                },
            };

        let expires_at = (issued_at + self.refresh_interval).min(credential.expires_at);
        if expires_at <= issued_at {
            warn!(
                "Credential for {} was already expired when issued ({})",
                self.instance_name, credential.expires_at
            );
        }

        let token = credential.token.clone();
        let stored = self.store(CachedToken {
            token: credential.token,
            issued_at,
            expires_at,
        });

        if stored {
            info!(
                "Refreshed database credential for {} (valid until {})",
                self.instance_name, expires_at
            );
        }

        Ok(token)
    }

    /// Latest issuance wins: a token issued before the cached one is never
    /// stored over it.
    fn store(&self, entry: CachedToken) -> bool {
        let mut slot = self.cached.write().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(current) if current.issued_at > entry.issued_at => {
                debug!(
                    "Discarding credential issued at {} (cached one issued at {})",
                    entry.issued_at, current.issued_at
                );
                false
            },
            _ => {
                *slot = Some(Arc::new(entry));
                true
            },
        }
    }
}
