use std::sync::Arc;

use anyhow::Context;
use daemon::{
    get_config_info, load_locations, run_once, save_records, setup_logger, AirVisualClient,
    Cli, Command, Database, Location, Scheduler,
};
use slog::{error, info, Logger};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = get_config_info();
    let logger = setup_logger(&cli);

    info!(logger, "Airwatch daemon starting...");
    info!(logger, "  API endpoint: {}", cli.base_url());
    info!(logger, "  Data dir: {}", cli.data_dir());
    info!(logger, "  Locations file: {}", cli.locations_file());

    let db = Arc::new(
        Database::new(&cli.data_dir(), logger.clone())
            .await
            .context("error opening measurement store")?,
    );

    match cli.command() {
        Command::Run => run_scheduler(&cli, &logger, db).await,
        Command::Once => {
            let locations = load_or_empty(&cli, &logger);
            if locations.is_empty() {
                return Ok(());
            }
            let api = build_client(&cli)?;
            run_once(api.as_ref(), &db, cli.retry_policy(), &locations, &logger).await;
            db.checkpoint().await;
            Ok(())
        }
        Command::Export { output } => {
            let records = db.read_all().await.context("error reading measurements")?;
            let path = save_records(&records, &output, &logger)?;
            info!(logger, "exported {} records to {}", records.len(), path);
            Ok(())
        }
    }
}

async fn run_scheduler(
    cli: &Cli,
    logger: &Logger,
    db: Arc<Database>,
) -> Result<(), anyhow::Error> {
    let locations = load_or_empty(cli, logger);
    if locations.is_empty() {
        return Ok(());
    }

    let api = build_client(cli)?;
    let scheduler = Scheduler::new(api, Arc::clone(&db), cli.retry_policy(), logger.clone());
    scheduler.start(locations);

    shutdown_signal().await;
    info!(logger, "shutdown signal received, waiting for in-flight ticks");
    scheduler.shutdown().await;
    db.checkpoint().await;
    Ok(())
}

/// A bad or missing locations file leaves the scheduler with no work; the
/// process logs the cause and exits cleanly rather than polling nothing.
fn load_or_empty(cli: &Cli, logger: &Logger) -> Vec<Location> {
    let locations = match load_locations(&cli.locations_file()) {
        Ok(locations) => locations,
        Err(err) => {
            error!(logger, "failed to load locations: {}", err);
            Vec::new()
        }
    };
    if locations.is_empty() {
        error!(logger, "no monitoring locations configured, nothing to do");
    }
    locations
}

fn build_client(cli: &Cli) -> Result<Arc<AirVisualClient>, anyhow::Error> {
    let api_key = cli
        .api_key()
        .context("API key is required (set AIRWATCH_API_KEY or api_key in airwatch.toml)")?;
    let client = AirVisualClient::new(cli.base_url(), api_key, cli.request_timeout())?;
    Ok(Arc::new(client))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
