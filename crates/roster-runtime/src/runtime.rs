use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use roster_core::JsonFileStore;
use roster_ledger::{ActivityLedger, ReportOptions};
use roster_telegram::EventSource;
use tokio::sync::watch;

use crate::backoff::BackoffPolicy;
use crate::handlers::RosterEventHandler;
use crate::ingestion::{run_ingestion_loop, TerminationReason};

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_REPORT_PAGE_DELAY_MS: u64 = 600;

#[derive(Debug, Clone)]
/// Runtime configuration for the roster ingestion service.
pub struct RosterRuntimeConfig {
    pub state_dir: PathBuf,
    pub backoff: BackoffPolicy,
    pub connect_timeout: Duration,
    pub report: ReportOptions,
    pub report_page_delay: Duration,
}

impl RosterRuntimeConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            backoff: BackoffPolicy::default(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            report: ReportOptions::default(),
            report_page_delay: Duration::from_millis(DEFAULT_REPORT_PAGE_DELAY_MS),
        }
    }
}

/// Loads the ledger from `config.state_dir` and runs the ingestion loop over `source`.
pub async fn run_roster_runtime<S>(
    source: &mut S,
    config: &RosterRuntimeConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<TerminationReason>
where
    S: EventSource,
{
    let store = JsonFileStore::open(config.state_dir.clone()).with_context(|| {
        format!(
            "failed to open state directory {}",
            config.state_dir.display()
        )
    })?;
    let ledger = Arc::new(ActivityLedger::load(Arc::new(store)));
    let handler = RosterEventHandler::new(ledger, config.report, config.report_page_delay);

    tracing::info!(
        state_dir = %config.state_dir.display(),
        max_attempts = config.backoff.max_attempts,
        base_delay_ms = config.backoff.base_delay.as_millis() as u64,
        max_delay_ms = config.backoff.max_delay.as_millis() as u64,
        "roster runtime starting"
    );
    Ok(run_ingestion_loop(
        source,
        &handler,
        &config.backoff,
        config.connect_timeout,
        shutdown,
    )
    .await)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use roster_core::StoreKey;
    use tempfile::tempdir;
    use tokio::sync::watch;

    use super::{run_roster_runtime, RosterRuntimeConfig};
    use crate::ingestion::TerminationReason;
    use crate::test_support::{group_chat, sender, text_message, PollStep, ScriptedSource};

    #[tokio::test]
    async fn integration_runtime_persists_activity_to_state_dir() {
        let temp = tempdir().expect("tempdir");
        let state_dir = temp.path().join("state");
        let mut config = RosterRuntimeConfig::new(state_dir.clone());
        config.connect_timeout = Duration::from_millis(50);

        let mut source = ScriptedSource::new();
        source.push_poll(PollStep::Deliver(text_message(
            group_chat(),
            sender(77, "Dana", "he"),
        )));
        source.push_poll(PollStep::Close);
        let (_tx, rx) = watch::channel(false);

        let reason = run_roster_runtime(&mut source, &config, rx)
            .await
            .expect("runtime");
        assert_eq!(reason, TerminationReason::SourceClosed);

        let active = std::fs::read_to_string(state_dir.join(StoreKey::ActiveUsers.file_name()))
            .expect("active users file");
        let ids: Vec<u64> = serde_json::from_str(&active).expect("active users json");
        assert_eq!(ids, vec![77]);
        let details = std::fs::read_to_string(state_dir.join(StoreKey::UserDetails.file_name()))
            .expect("details file");
        assert!(details.contains("\"77\""));
        assert!(details.contains("\"first_name\": \"Dana\""));
    }
}
