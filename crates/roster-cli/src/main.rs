use anyhow::{bail, Result};
use clap::Parser;
use roster_cli::{init_tracing, Cli};
use roster_runtime::run_roster_runtime;
use roster_telegram::TelegramEventSource;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let mut source = TelegramEventSource::new(cli.event_source_config())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(error) => tracing::warn!(%error, "failed to listen for ctrl-c"),
        }
    });

    let reason = run_roster_runtime(&mut source, &cli.runtime_config(), shutdown_rx).await?;
    if reason.is_failure() {
        bail!("roster stopped: {}", reason.as_str());
    }
    tracing::info!(reason = reason.as_str(), "roster stopped");
    Ok(())
}
