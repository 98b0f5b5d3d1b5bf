//! Resilient ingestion loop: connect, consume, back off, terminate.

use std::time::Duration;

use roster_telegram::{EventSource, TransportError};
use tokio::sync::watch;

use crate::backoff::{BackoffDecision, BackoffPolicy};
use crate::handlers::EventHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionState {
    Connecting,
    Consuming,
    Backoff,
    Terminated,
}

impl IngestionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Consuming => "consuming",
            Self::Backoff => "backoff",
            Self::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Shutdown,
    Unauthorized,
    RetriesExhausted,
    SourceClosed,
}

impl TerminationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::Unauthorized => "unauthorized",
            Self::RetriesExhausted => "retries_exhausted",
            Self::SourceClosed => "source_closed",
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Unauthorized | Self::RetriesExhausted)
    }
}

enum SessionEnd {
    Shutdown,
    Closed,
    Failed {
        error: TransportError,
        delivered_events: usize,
    },
}

/// Drives `source` until shutdown, a fatal transport error, or retry exhaustion.
///
/// Events are handled one at a time in arrival order. Handler errors are logged
/// and never stop the loop. Setting the `shutdown` flag interrupts a connect
/// attempt, a pending poll, or a backoff sleep.
pub async fn run_ingestion_loop<S, H>(
    source: &mut S,
    handler: &H,
    policy: &BackoffPolicy,
    connect_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> TerminationReason
where
    S: EventSource,
    H: EventHandler + ?Sized,
{
    let mut attempt = 0usize;
    loop {
        if *shutdown.borrow() {
            return terminate(TerminationReason::Shutdown);
        }

        enter(IngestionState::Connecting, attempt);
        let connect_result = tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => {
                return terminate(TerminationReason::Shutdown);
            }
            result = tokio::time::timeout(connect_timeout, source.connect()) => result,
        };

        let failure = match connect_result {
            Ok(Ok(())) => {
                enter(IngestionState::Consuming, attempt);
                match consume_events(source, handler, &mut shutdown).await {
                    SessionEnd::Shutdown => return terminate(TerminationReason::Shutdown),
                    SessionEnd::Closed => return terminate(TerminationReason::SourceClosed),
                    SessionEnd::Failed {
                        error,
                        delivered_events,
                    } => {
                        if delivered_events > 0 {
                            attempt = 0;
                        }
                        error
                    }
                }
            }
            Ok(Err(error)) => error,
            Err(_) => TransportError::transient(format!(
                "connect attempt timed out after {} ms",
                connect_timeout.as_millis()
            )),
        };

        if failure.kind.is_fatal() {
            tracing::error!(
                severity = "critical",
                error = %failure,
                "event source rejected the credentials; check the bot token"
            );
            return terminate(TerminationReason::Unauthorized);
        }

        attempt = attempt.saturating_add(1);
        match policy.decide(attempt) {
            BackoffDecision::Exhausted { attempt } => {
                tracing::error!(
                    severity = "critical",
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %failure,
                    "maximum retry attempts reached; stopping"
                );
                return terminate(TerminationReason::RetriesExhausted);
            }
            BackoffDecision::Retry { attempt, wait } => {
                tracing::error!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    kind = failure.kind.as_str(),
                    error = %failure,
                    "event source failed"
                );
                enter(IngestionState::Backoff, attempt);
                tracing::info!(
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "waiting before reconnecting"
                );
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => {
                        return terminate(TerminationReason::Shutdown);
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    }
}

async fn consume_events<S, H>(
    source: &mut S,
    handler: &H,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd
where
    S: EventSource,
    H: EventHandler + ?Sized,
{
    let mut delivered_events = 0usize;
    loop {
        let next = tokio::select! {
            _ = wait_for_shutdown(shutdown) => return SessionEnd::Shutdown,
            next = source.next_event() => next,
        };
        let event = match next {
            Ok(Some(event)) => event,
            Ok(None) => return SessionEnd::Closed,
            Err(error) => {
                return SessionEnd::Failed {
                    error,
                    delivered_events,
                }
            }
        };

        delivered_events = delivered_events.saturating_add(1);
        if let Err(error) = handler.handle(&event, &*source).await {
            tracing::error!(
                event = event.kind_label(),
                chat_id = event.chat().id,
                error = %format!("{error:#}"),
                "event handler failed"
            );
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender dropped without requesting shutdown.
            std::future::pending::<()>().await;
        }
    }
}

fn enter(state: IngestionState, attempt: usize) {
    tracing::debug!(state = state.as_str(), attempt, "ingestion state");
}

fn terminate(reason: TerminationReason) -> TerminationReason {
    enter(IngestionState::Terminated, 0);
    tracing::info!(reason = reason.as_str(), "ingestion loop terminated");
    reason
}
