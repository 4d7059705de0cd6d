//! tawatch - headless technical-analysis watcher.
//!
//! Loads the TOML configuration, validates the configured assets
//! against the chosen exchange, and runs the monitoring matrix either
//! once (`--once`) or continuously until interrupted.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tawatch::application::strategies::{Strategy, StrategyFactory};
use tawatch::application::validator::{AssetValidator, ValidationResult};
use tawatch::application::watcher::Watcher;
use tawatch::config::Config;
use tawatch::infrastructure::datasource::{BinanceSource, CoinbaseSource, DataSource};
use tawatch::infrastructure::marketcap::CoinGeckoProvider;
use tawatch::infrastructure::notifier::{LogNotifier, Notifier, NotifierManager};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "tawatch", about = "Technical-analysis watcher for crypto spot markets")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tawatch.toml")]
    config: PathBuf,

    /// Run one full matrix pass, flush signals, and exit.
    #[arg(long)]
    once: bool,

    /// Overrides the configured log level (trace|debug|info|warn|error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&config.watcher.log_level));

    info!("tawatch {} starting", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    let (source, validation) = validated_source(&config, &cancel).await?;
    info!(
        source = source.name(),
        pairs = validation.all_monitoring_pairs().len(),
        missing = validation.missing_symbols.len(),
        "validation complete"
    );

    let strategies = build_strategies(&config)?;
    let notifier = Arc::new(NotifierManager::new(notifiers(&config)));

    let watcher = Arc::new(Watcher::new(
        source,
        strategies,
        notifier.clone(),
        &validation,
        config.watcher_config(),
        cancel.clone(),
    ));

    let outcome = if cli.once {
        watcher.clone().run_once().await
    } else {
        watcher.clone().run().await
    };
    notifier.close().await;
    outcome.context("watcher terminated abnormally")?;

    let stats = watcher.stats();
    info!(
        tasks = stats.tasks_total,
        completed = stats.tasks_completed,
        failed = stats.tasks_failed,
        notifications = stats.notifications_sent,
        "done"
    );
    Ok(())
}

fn init_tracing(level: &str) {
    let level: Level = level.parse().unwrap_or(Level::INFO);
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with(stdout_layer)
        .init();
}

fn build_source(
    name: &str,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Arc<dyn DataSource>> {
    let limits = config.rate_limit_for(name);
    let timeout = std::time::Duration::from_secs(config.data_source.timeout_secs);
    match name {
        "binance" => Ok(Arc::new(
            BinanceSource::builder()
                .timeout(timeout)
                .requests_per_minute(limits.requests_per_minute)
                .retry(limits.retry_policy())
                .cancellation(cancel.clone())
                .build(),
        )),
        "coinbase" => Ok(Arc::new(
            CoinbaseSource::builder()
                .timeout(timeout)
                .requests_per_minute(limits.requests_per_minute)
                .retry(limits.retry_policy())
                .cancellation(cancel.clone())
                .build(),
        )),
        other => bail!("unsupported data source '{}'", other),
    }
}

/// Validates assets against the primary source, falling back to the
/// configured secondary when the primary yields nothing usable.
async fn validated_source(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<(Arc<dyn DataSource>, ValidationResult)> {
    let caps = Arc::new(CoinGeckoProvider::new());
    let refresh = config.market_cap_refresh_interval();

    let primary = build_source(&config.data_source.primary, config, cancel)?;
    let validator = AssetValidator::new(
        primary.clone(),
        caps.clone(),
        config.assets.base_currency.as_str(),
        refresh,
    );
    match validator
        .validate(&config.assets.symbols, &config.assets.timeframes)
        .await
    {
        Ok(validation) => Ok((primary, validation)),
        Err(err) => {
            let Some(fallback_name) = &config.data_source.fallback else {
                bail!("validation failed on {}: {}", primary.name(), err);
            };
            warn!(
                primary = primary.name(),
                fallback = fallback_name.as_str(),
                error = %err,
                "primary source failed validation, trying fallback"
            );
            let fallback = build_source(fallback_name, config, cancel)?;
            let validator = AssetValidator::new(
                fallback.clone(),
                caps,
                config.assets.base_currency.as_str(),
                refresh,
            );
            let validation = validator
                .validate(&config.assets.symbols, &config.assets.timeframes)
                .await
                .with_context(|| format!("validation failed on fallback {}", fallback_name))?;
            Ok((fallback, validation))
        }
    }
}

fn build_strategies(config: &Config) -> Result<Vec<Arc<dyn Strategy>>> {
    config
        .watcher
        .strategies
        .iter()
        .map(|name| {
            StrategyFactory::create(name)
                .map(Arc::from)
                .with_context(|| format!("building strategy '{}'", name))
        })
        .collect()
}

fn notifiers(config: &Config) -> Vec<Arc<dyn Notifier>> {
    let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
    if config.notifiers.log.enabled {
        channels.push(Arc::new(LogNotifier::new(true)));
    }
    channels
}
