use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use micwatch::statusline::StatusLine;
use micwatch::watcher::{ProbeFn, Watcher};
use micwatch::{
    APP_NAME, APP_NAME_PRETTY, ActivityWatchClient, ClientConfig, ConfigManager,
    DEFAULT_LOG_LEVEL, EVENT_TYPE, MicProbe, Platform, VERSION,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: micwatch [--testing]";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("MICWATCH_LOG")
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
        )
        .init();

    let mut testing = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--testing" => testing = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("{}", USAGE);
                std::process::exit(2);
            }
        }
    }

    // Load config
    let config_manager = ConfigManager::new()?;
    let mut config = config_manager.load()?;
    // save back the config to create the file if it doesn't exist
    config_manager.save(&config)?;
    // the flag only applies to this run
    config.testing |= testing;

    // Pick the detection strategy once, it cannot change while running
    let platform = Platform::current().with_context(|| {
        format!(
            "Microphone detection is not supported on {}",
            env::consts::OS
        )
    })?;
    let strategy: Arc<dyn MicProbe + Send + Sync> = platform
        .strategy_with_timeout(config.probe_timeout())?
        .into();
    let probe: ProbeFn = Arc::new(move || Ok(strategy.probe()));

    // Connect to ActivityWatch
    let client =
        ActivityWatchClient::new(ClientConfig::new(config.host.clone(), config.port(), APP_NAME))?;
    let bucket_id = client
        .ensure_bucket(EVENT_TYPE)
        .await
        .with_context(|| format!("Failed to set up bucket on {}:{}", config.host, config.port()))?;

    info!(
        version = VERSION,
        platform = ?platform,
        bucket_id = %bucket_id,
        poll_time = ?config.poll_time(),
        config_path = ?config_manager.config_path(),
        "{} ready",
        APP_NAME_PRETTY
    );

    let watcher = Watcher::new(client, bucket_id, probe, &config);
    let mut status_line = StatusLine::stdout();
    watcher
        .run_until(&mut status_line, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("{} stopped", APP_NAME_PRETTY);
    Ok(())
}
