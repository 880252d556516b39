use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use workclock::cli;
use workclock::config::Config;
use workclock::engine::BusinessTimeEngine;
use workclock::holidays::{HolidayCache, RemoteHolidaySource};
use workclock::policy::CalendarPolicy;
use workclock::server::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args();

    if args.help {
        cli::print_help();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("workclock=info".parse().unwrap()),
        )
        .init();

    info!("workclock business-time service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Holiday feed: {}", config.holidays_url);
    info!("  Fetch timeout: {}s", config.holiday_fetch_timeout_secs);
    info!("  Cache max age: {}s", config.holiday_cache_max_age_secs);
    info!("  HTTP port: {}", config.http_port);

    // Handle --validate mode
    if args.validate {
        info!("Validating configuration...");
        match config.validate() {
            Ok(()) => {
                info!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }

    let cache = Arc::new(HolidayCache::with_limits(
        Box::new(RemoteHolidaySource::new(&config.holidays_url)),
        Duration::from_secs(config.holiday_fetch_timeout_secs),
        Duration::from_secs(config.holiday_cache_max_age_secs),
    ));

    // Warm the cache before serving; a failed fetch degrades internally.
    cache.preload().await;

    let engine = Arc::new(BusinessTimeEngine::new(
        CalendarPolicy::bogota(),
        cache.clone(),
    ));

    // Handle --resolve one-shot mode
    if args.resolve {
        let base = match &args.date {
            Some(raw) => BusinessTimeEngine::parse_base(raw)?,
            None => Utc::now(),
        };
        let result = engine.resolve(base, args.days, args.hours).await?;
        println!("{}", result.to_rfc3339_opts(SecondsFormat::Secs, true));
        return Ok(());
    }

    // Run the query server until ctrl-c
    let cancel = CancellationToken::new();
    let server = tokio::spawn(run_server(
        config.http_port,
        engine,
        cache,
        cancel.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    cancel.cancel();
    let _ = server.await;

    Ok(())
}
