use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use roster_ledger::ReportOptions;
use roster_runtime::{BackoffPolicy, RosterRuntimeConfig};
use roster_telegram::{TelegramApiClientConfig, TelegramEventSourceConfig};

/// Attempts for a single outbound send/edit before the handler gives up.
const OUTBOUND_RETRY_MAX_ATTEMPTS: usize = 3;
const OUTBOUND_RETRY_BASE_DELAY_MS: u64 = 500;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_non_empty(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("value must not be empty".to_string());
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "roster",
    about = "Telegram group activity tracker that reports members who never wrote",
    version
)]
pub struct Cli {
    #[arg(
        long = "telegram-bot-token",
        env = "TELEGRAM_BOT_TOKEN",
        hide_env_values = true,
        value_parser = parse_non_empty,
        help = "Telegram bot token used for polling and replies"
    )]
    pub telegram_bot_token: String,

    #[arg(
        long = "telegram-api-base",
        env = "ROSTER_TELEGRAM_API_BASE",
        default_value = "https://api.telegram.org",
        help = "Telegram Bot API base URL"
    )]
    pub telegram_api_base: String,

    #[arg(
        long = "state-dir",
        env = "ROSTER_STATE_DIR",
        default_value = ".",
        help = "Directory holding the seen/active/details/admin JSON files"
    )]
    pub state_dir: PathBuf,

    #[arg(
        long = "request-timeout-ms",
        env = "ROSTER_REQUEST_TIMEOUT_MS",
        default_value_t = 40_000,
        value_parser = parse_positive_u64,
        help = "HTTP timeout in milliseconds for Telegram API calls, added to the long-poll timeout"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "poll-timeout-seconds",
        env = "ROSTER_POLL_TIMEOUT_SECONDS",
        default_value_t = 30,
        value_parser = parse_positive_u64,
        help = "Long-poll timeout in seconds passed to getUpdates"
    )]
    pub poll_timeout_seconds: u64,

    #[arg(
        long = "connect-timeout-ms",
        env = "ROSTER_CONNECT_TIMEOUT_MS",
        default_value_t = 15_000,
        value_parser = parse_positive_u64,
        help = "Upper bound in milliseconds for a single connect attempt"
    )]
    pub connect_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "ROSTER_RETRY_MAX_ATTEMPTS",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Consecutive transport failures tolerated before the bot stops"
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "ROSTER_RETRY_BASE_DELAY_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Base reconnect delay in milliseconds; doubles on every consecutive failure"
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long = "retry-max-delay-ms",
        env = "ROSTER_RETRY_MAX_DELAY_MS",
        default_value_t = 300_000,
        value_parser = parse_positive_u64,
        help = "Maximum reconnect delay in milliseconds"
    )]
    pub retry_max_delay_ms: u64,

    #[arg(
        long = "report-page-max-chars",
        env = "ROSTER_REPORT_PAGE_MAX_CHARS",
        default_value_t = 4_080,
        value_parser = parse_positive_usize,
        help = "Maximum characters per inactive-report message"
    )]
    pub report_page_max_chars: usize,

    #[arg(
        long = "report-page-delay-ms",
        env = "ROSTER_REPORT_PAGE_DELAY_MS",
        default_value_t = 600,
        help = "Delay in milliseconds between inactive-report pages"
    )]
    pub report_page_delay_ms: u64,

    #[arg(
        long = "log-file",
        env = "ROSTER_LOG_FILE",
        help = "Optional file that receives a copy of the log output"
    )]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn event_source_config(&self) -> TelegramEventSourceConfig {
        TelegramEventSourceConfig {
            client: TelegramApiClientConfig {
                api_base: self.telegram_api_base.clone(),
                bot_token: self.telegram_bot_token.clone(),
                request_timeout_ms: self.request_timeout_ms,
                retry_max_attempts: OUTBOUND_RETRY_MAX_ATTEMPTS,
                retry_base_delay_ms: OUTBOUND_RETRY_BASE_DELAY_MS,
            },
            poll_timeout_secs: self.poll_timeout_seconds,
        }
    }

    pub fn runtime_config(&self) -> RosterRuntimeConfig {
        RosterRuntimeConfig {
            state_dir: self.state_dir.clone(),
            backoff: BackoffPolicy {
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
                max_attempts: self.retry_max_attempts,
            },
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            report: ReportOptions {
                page_max_chars: self.report_page_max_chars,
            },
            report_page_delay: Duration::from_millis(self.report_page_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use clap::Parser;

    use super::Cli;

    #[test]
    fn unit_defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["roster", "--telegram-bot-token", "123:abc"])
            .expect("parse");
        assert_eq!(cli.telegram_api_base, "https://api.telegram.org");
        assert_eq!(cli.state_dir, PathBuf::from("."));
        assert_eq!(cli.retry_max_attempts, 5);
        assert_eq!(cli.report_page_max_chars, 4_080);
        assert!(cli.log_file.is_none());

        let runtime = cli.runtime_config();
        assert_eq!(runtime.backoff.base_delay, Duration::from_secs(5));
        assert_eq!(runtime.backoff.max_delay, Duration::from_secs(300));
        assert_eq!(runtime.connect_timeout, Duration::from_secs(15));
        assert_eq!(runtime.report_page_delay, Duration::from_millis(600));

        let source = cli.event_source_config();
        assert_eq!(source.poll_timeout_secs, 30);
        assert_eq!(source.client.request_timeout_ms, 40_000);
    }

    #[test]
    fn functional_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "roster",
            "--telegram-bot-token",
            " 123:abc ",
            "--state-dir",
            "/var/lib/roster",
            "--retry-max-attempts",
            "8",
            "--report-page-max-chars",
            "1000",
            "--log-file",
            "bot.log",
        ])
        .expect("parse");
        assert_eq!(cli.telegram_bot_token, "123:abc");
        assert_eq!(cli.log_file, Some(PathBuf::from("bot.log")));
        let runtime = cli.runtime_config();
        assert_eq!(runtime.state_dir, PathBuf::from("/var/lib/roster"));
        assert_eq!(runtime.backoff.max_attempts, 8);
        assert_eq!(runtime.report.page_max_chars, 1_000);
    }

    #[test]
    fn regression_zero_and_empty_values_are_rejected() {
        assert!(Cli::try_parse_from([
            "roster",
            "--telegram-bot-token",
            "123:abc",
            "--retry-max-attempts",
            "0",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "roster",
            "--telegram-bot-token",
            "123:abc",
            "--report-page-max-chars",
            "0",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["roster", "--telegram-bot-token", "  "]).is_err());
    }
}
