use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber: compact stderr output plus an optional
/// append-only log file without ANSI colours. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::init_tracing;

    #[test]
    fn functional_init_tracing_creates_log_file_and_rejects_reinstall() {
        let temp = tempdir().expect("tempdir");
        let log_path = temp.path().join("logs").join("bot.log");

        init_tracing(Some(&log_path)).expect("first install");
        tracing::warn!("log file smoke line");
        assert!(log_path.exists());

        let error = init_tracing(None).expect_err("second install should fail");
        assert!(error.to_string().contains("tracing subscriber"));
    }
}
