use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use serde_json::json;
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use lakebase_analytics::config::HexbinSettings;
use lakebase_analytics::db::models::Property;
use lakebase_analytics::hexbin::{compute_scales, max_bin_size, Extent, HexBinner};
use lakebase_analytics::{CronScheduler, Database, Settings};

/// Bins listed in the startup overview
const OVERVIEW_TOP_BINS: usize = 10;

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialise logger")?;

    // Load configuration
    let settings = Arc::new(
        Settings::new().context("Failed to load config.yaml. Please ensure it is valid")?,
    );

    let db = Arc::new(
        Database::new(&settings).context("Failed to initialize database connection")?,
    );

    db.postgres
        .warm_up()
        .await
        .context("Failed to connect to Lakebase")?;

    let result = run_service(settings, db.clone()).await;

    db.shutdown();
    result
}

async fn run_service(settings: Arc<Settings>, db: Arc<Database>) -> anyhow::Result<()> {
    let diagnostics = db.postgres.diagnostics().await?;
    info!("Connected to {}", diagnostics.server_version);
    println!("{}", serde_json::to_string_pretty(&diagnostics)?);

    let summary = dashboard_summary(&db, &settings.hexbin).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let cancellation_token = CancellationToken::new();

    let cron_scheduler = CronScheduler::new(db.clone(), settings.cron.clone());

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - credential and pool jobs will run periodically");

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    // Set up graceful shutdown signal handler
    info!("Service running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Finishing all tasks...");

    cancellation_token.cancel();

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    Ok(())
}

/// Cities, bucket totals and the densest hexbin cells of the property
/// scatter (views against initiation rate).
async fn dashboard_summary(
    db: &Database,
    hexbin: &HexbinSettings,
) -> anyhow::Result<serde_json::Value> {
    let (cities, performance) = futures::try_join!(
        db.postgres.get_cities(),
        db.postgres.get_properties(None),
    )?;

    let properties: &[Property] = &performance.properties;
    let viewport = Extent::viewport(hexbin.width, hexbin.height);

    let Some((x_scale, y_scale)) = compute_scales(properties, viewport, hexbin.padding) else {
        return Ok(json!({
            "cities": cities,
            "properties": 0,
            "hexbin": null,
        }));
    };

    let binner = HexBinner::new(hexbin.radius, viewport)?;
    let mut bins = binner.bin(properties, &x_scale, &y_scale);
    let max = max_bin_size(&bins);

    info!(
        "Binned {} properties into {} hexagons (largest {})",
        properties.len(),
        bins.len(),
        max
    );

    bins.sort_by(|a, b| b.len().cmp(&a.len()));
    let top: Vec<serde_json::Value> = bins
        .iter()
        .take(OVERVIEW_TOP_BINS)
        .map(|bin| {
            json!({
                "center": [bin.x, bin.y],
                "weight": bin.visual_weight(max),
                "summary": bin.summarize(),
            })
        })
        .collect();

    Ok(json!({
        "cities": cities,
        "properties": properties.len(),
        "hexbin": {
            "radius": binner.radius(),
            "bins": bins.len(),
            "maxBinSize": max,
            "xDomain": x_scale.domain(),
            "yDomain": y_scale.domain(),
            "top": top,
        },
    }))
}
