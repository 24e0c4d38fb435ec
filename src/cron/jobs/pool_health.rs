//! Job to check the connection pool and log its occupancy.

use anyhow::Result;
use log::info;

use crate::db::Database;

pub async fn run(db: &Database) -> Result<()> {
    let start = std::time::Instant::now();

    db.postgres.health_check().await?;

    match db.postgres.status() {
        Some(status) => info!(
            "Pool healthy in {:?}: {}/{} connections, {} idle, {} waiting",
            start.elapsed(),
            status.size,
            status.max_size,
            status.available,
            status.waiting
        ),
        None => info!("Pool healthy in {:?}", start.elapsed()),
    }
    Ok(())
}
