use daemon::{
    get_config_info, open_store, setup_logger, CatalogClient, IngestPipeline, Loader,
    RateLimiter, ResourceFetcher,
};
use slog::{error, info};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = get_config_info();
    let logger = setup_logger(&cli);

    info!(logger, "AMRDC Daemon starting...");
    info!(logger, "  Catalog: {}", cli.catalog_url());
    info!(logger, "  Store: {}", cli.db_path());
    info!(logger, "  Ingest interval: {} seconds", cli.sleep_interval());

    let pool = open_store(&cli.db_path()).await?;

    let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
        cli.token_capacity(),
        cli.refill_rate(),
    )));
    let fetcher = Arc::new(ResourceFetcher::new(
        logger.clone(),
        cli.user_agent(),
        rate_limiter,
    )?);
    let catalog = CatalogClient::new(logger.clone(), cli.catalog_url(), cli.user_agent())?;
    let loader = Arc::new(Loader::new(logger.clone(), pool));

    let pipeline = IngestPipeline::new(
        logger.clone(),
        catalog,
        fetcher,
        loader,
        cli.concurrency(),
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    run_ingest_loop(&cli, logger, pipeline, cancel).await;
    Ok(())
}

async fn run_ingest_loop(
    cli: &daemon::Cli,
    logger: slog::Logger,
    pipeline: IngestPipeline,
    cancel: CancellationToken,
) {
    let sleep_between_runs = cli.sleep_interval();
    info!(
        logger,
        "Wait time between ingest runs: {} seconds", sleep_between_runs
    );

    let mut run_interval = interval(Duration::from_secs(sleep_between_runs));
    loop {
        tokio::select! {
            _ = run_interval.tick() => {
                match pipeline.run(&cancel).await {
                    Ok(report) => info!(
                        logger,
                        "Finished ingest run ({} ok, {} failed), waiting {} seconds for next run",
                        report.stations_ok, report.stations_failed, sleep_between_runs
                    ),
                    Err(err) => error!(logger, "Error running ingest: {}", err),
                }
                if cancel.is_cancelled() {
                    info!(logger, "Shutdown requested, stopping ingest loop");
                    break;
                }
            }
            _ = cancel.cancelled() => {
                info!(logger, "Shutdown requested, stopping ingest loop");
                break;
            }
        }
    }
}
