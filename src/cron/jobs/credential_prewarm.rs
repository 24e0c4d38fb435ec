//! Job to refresh the database credential ahead of expiry.
//!
//! Request paths only mint when the cached token has gone stale; refreshing
//! here first keeps that wait off the request path.

use std::time::Duration;

use anyhow::Result;
use log::{debug, info};

use crate::db::Database;

/// Refreshes the token if it expires within `lead`. Returns whether a new
/// credential was minted.
pub async fn run(db: &Database, lead: Duration) -> Result<bool> {
    if !db.tokens.expires_within(lead) {
        debug!("Credential still fresh, skipping prewarm");
        return Ok(false);
    }

    let start = std::time::Instant::now();
    db.tokens.refresh().await?;

    info!(
        "Refreshed credential for {} in {:?} (valid until {:?})",
        db.tokens.instance_name(),
        start.elapsed(),
        db.tokens.expires_at()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::config::Settings;
    use crate::identity::{ManualClock, StaticIdentity};

    #[tokio::test]
    async fn test_prewarm_only_near_expiry() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
        let db = Database::with_identity(
            &Settings::default(),
            Arc::new(StaticIdentity::new("postgres", "localhost", "pw").with_clock(clock.clone())),
            clock.clone(),
        )
        .unwrap();
        let lead = Duration::from_secs(120);

        // Nothing cached yet
        assert!(run(&db, lead).await.unwrap());
        assert!(!run(&db, lead).await.unwrap());

        clock.advance(chrono::Duration::seconds(900 - 60));
        assert!(run(&db, lead).await.unwrap());
        assert!(!run(&db, lead).await.unwrap());
    }
}
