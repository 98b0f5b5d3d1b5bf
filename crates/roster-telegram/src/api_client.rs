//! Telegram Bot API client used by the event source for polling and replies.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::transport_contract::{ChatId, MessageId, TransportError, TransportErrorKind};
use crate::updates::TelegramUpdate;

const ERROR_BODY_PREVIEW_CHARS: usize = 320;

#[derive(Debug, Clone)]
pub struct TelegramApiClientConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
    /// Attempts for outbound send/edit calls; polling is retried by the ingestion loop.
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
struct TelegramEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<TelegramResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelegramBotProfile {
    pub id: u64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramSentMessage {
    message_id: MessageId,
}

#[derive(Clone)]
pub struct TelegramApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    request_timeout: Duration,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl TelegramApiClient {
    pub fn new(config: TelegramApiClientConfig) -> Result<Self> {
        let bot_token = config.bot_token.trim().to_string();
        if bot_token.is_empty() {
            bail!("telegram bot token cannot be empty");
        }
        let api_base = config.api_base.trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            bail!("telegram api base cannot be empty");
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("roster-telegram"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to create telegram api client")?;

        Ok(Self {
            http,
            api_base,
            bot_token,
            request_timeout: Duration::from_millis(config.request_timeout_ms.max(1)),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms,
        })
    }

    /// Validates the token and returns the bot identity.
    pub async fn get_me(&self) -> Result<TelegramBotProfile, TransportError> {
        self.call_once("getMe", &json!({}), self.request_timeout)
            .await
            .map_err(|error| {
                // An unknown token yields 404 on the bot endpoint rather than 401.
                if error.status == Some(404) {
                    TransportError::unauthorized(error.message).with_status(error.status)
                } else {
                    error
                }
            })
    }

    /// Long-polls for updates starting at `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<u64>,
        poll_timeout_secs: u64,
    ) -> Result<Vec<TelegramUpdate>, TransportError> {
        let mut payload = json!({
            "timeout": poll_timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        let timeout = self
            .request_timeout
            .saturating_add(Duration::from_secs(poll_timeout_secs));
        self.call_once("getUpdates", &payload, timeout).await
    }

    pub async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, TransportError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(reply_to) = reply_to {
            payload["reply_parameters"] = json!({
                "message_id": reply_to,
                "allow_sending_without_reply": true,
            });
        }
        let sent: TelegramSentMessage = self.call_with_retry("sendMessage", &payload).await?;
        Ok(sent.message_id)
    }

    pub async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        let payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        let _: Value = self.call_with_retry("editMessageText", &payload).await?;
        Ok(())
    }

    async fn call_with_retry<T>(&self, method: &str, payload: &Value) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            match self.call_once(method, payload, self.request_timeout).await {
                Ok(value) => return Ok(value),
                Err(error)
                    if error.kind == TransportErrorKind::Transient
                        && attempt < self.retry_max_attempts =>
                {
                    let delay = retry_delay(self.retry_base_delay_ms, attempt, error.retry_after);
                    tracing::debug!(
                        method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying telegram api call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn call_once<T>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{}", self.api_base, self.bot_token, method);
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|error| {
                let kind = classify_request_error(&error);
                TransportError::new(
                    kind,
                    format!("telegram {method} request failed: {}", error.without_url()),
                )
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|error| {
            TransportError::new(
                classify_request_error(&error),
                format!("telegram {method} body read failed: {}", error.without_url()),
            )
        })?;

        let envelope = serde_json::from_str::<TelegramEnvelope<T>>(&body);
        match envelope {
            Ok(envelope) if envelope.ok && (200..300).contains(&status) => {
                envelope.result.ok_or_else(|| {
                    TransportError::unknown(format!("telegram {method} response missing result"))
                })
            }
            Ok(envelope) => {
                let code = envelope.error_code.unwrap_or(status);
                let retry_after = envelope
                    .parameters
                    .and_then(|parameters| parameters.retry_after)
                    .map(Duration::from_secs);
                let description = envelope
                    .description
                    .unwrap_or_else(|| "no description".to_string());
                Err(TransportError::new(
                    classify_status(code),
                    format!("telegram {method} failed with status {code}: {description}"),
                )
                .with_retry_after(retry_after)
                .with_status(Some(code)))
            }
            Err(parse_error) if (200..300).contains(&status) => Err(TransportError::unknown(
                format!("failed to decode telegram {method} response: {parse_error}"),
            )),
            Err(_) => Err(TransportError::new(
                classify_status(status),
                format!(
                    "telegram {method} failed with status {status}: {}",
                    truncate_for_error(&body, ERROR_BODY_PREVIEW_CHARS)
                ),
            )
            .with_status(Some(status))),
        }
    }
}

pub(crate) fn classify_status(status: u16) -> TransportErrorKind {
    match status {
        401 => TransportErrorKind::Unauthorized,
        429 | 500..=599 => TransportErrorKind::Transient,
        _ => TransportErrorKind::Unknown,
    }
}

pub(crate) fn classify_request_error(error: &reqwest::Error) -> TransportErrorKind {
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        TransportErrorKind::Transient
    } else {
        TransportErrorKind::Unknown
    }
}

pub(crate) fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(retry_after) = retry_after {
        return retry_after;
    }
    let exponent = attempt.saturating_sub(1).min(6) as u32;
    Duration::from_millis(base_delay_ms.saturating_mul(2_u64.pow(exponent)))
}

fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
