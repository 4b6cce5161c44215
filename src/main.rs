use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedwatch::app::WatchContext;
use feedwatch::config::Config;
use feedwatch::watcher::Watcher;

#[derive(Parser)]
#[command(name = "feedwatch")]
#[command(about = "RSS/Atom feed watcher with Telegram notifications", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_directives = if cli.verbose {
        "feedwatch=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directives)),
        )
        .init();

    // Any configuration problem aborts here, before a single poller runs.
    let config = Config::load(&cli.config)?;
    let ctx = Arc::new(WatchContext::from_config(&config)?);

    if !ctx.notifier.test_connection().await {
        anyhow::bail!("failed to connect to Telegram, exiting");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        tracing::info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    Watcher::new(config, ctx).run(shutdown_rx).await?;

    tracing::info!("feedwatch stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to set up SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to set up SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(windows)]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
