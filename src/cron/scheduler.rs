//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Refreshing the database credential before it goes stale
//! - Checking the connection pool and logging its occupancy

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::CronSettings;
use crate::db::Database;

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    db: Arc<Database>,
    settings: Arc<CronSettings>,
}

impl CronScheduler {
    pub fn new(db: Arc<Database>, settings: CronSettings) -> Self {
        Self {
            db,
            settings: Arc::new(settings),
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        // Register all jobs
        self.register_credential_prewarm_job(&scheduler).await?;
        self.register_pool_health_job(&scheduler).await?;

        // Start the scheduler
        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 2);

        // Wait for cancellation
        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_credential_prewarm_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let db = self.db.clone();
        let interval = self.settings.credential_prewarm_interval_secs;
        let lead = Duration::from_secs(self.settings.credential_prewarm_lead_secs);

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let db = db.clone();
            Box::pin(async move {
                if let Err(e) = jobs::credential_prewarm::run(&db, lead).await {
                    error!("Failed to prewarm credential: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!(
            "Registered credential_prewarm job (every {}s, lead {:?})",
            interval, lead
        );
        Ok(())
    }

    async fn register_pool_health_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let db = self.db.clone();
        let interval = self.settings.pool_health_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let db = db.clone();
            Box::pin(async move {
                if let Err(e) = jobs::pool_health::run(&db).await {
                    error!("Pool health check failed: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered pool_health job (every {}s)", interval);
        Ok(())
    }
}
