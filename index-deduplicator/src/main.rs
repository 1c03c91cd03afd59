use anyhow::Error;
use envconfig::Envconfig;
use index_deduplicator::config::Config;
use index_deduplicator::deduplicator::Deduplicator;
use index_deduplicator::error::ConfigError;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    setup_tracing();

    let config = Config::init_from_env().map_err(ConfigError::from)?;
    let job_config = config.job_config()?;
    let deduplicator = Deduplicator::new(job_config)?;

    let report = deduplicator.run_once().await?;

    if report.dry_run {
        info!(
            "dry run complete, '{}' duplicates would be removed",
            report.duplicates
        );
    } else if report.duplicates == 0 {
        info!("run complete, no duplicates found");
    } else {
        info!(
            "run complete, removed '{}' of '{}' scanned documents",
            report.removed, report.scanned
        );
    }

    Ok(())
}
