use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;

use crate::api_client::{TelegramApiClient, TelegramApiClientConfig, TelegramBotProfile};
use crate::transport_contract::{
    ChatId, EventSource, InboundEvent, MessageId, ReplySink, TransportError,
};
use crate::updates::{event_from_update, TelegramUpdate};

#[derive(Debug, Clone)]
pub struct TelegramEventSourceConfig {
    pub client: TelegramApiClientConfig,
    pub poll_timeout_secs: u64,
}

/// Long-polling [`EventSource`] backed by the Telegram Bot API.
///
/// The update offset lives in memory only, so a restart may replay updates
/// Telegram still holds. Replays are harmless because ledger writes are idempotent.
pub struct TelegramEventSource {
    client: TelegramApiClient,
    poll_timeout_secs: u64,
    next_offset: Option<u64>,
    pending: VecDeque<InboundEvent>,
    bot: Option<TelegramBotProfile>,
}

impl TelegramEventSource {
    pub fn new(config: TelegramEventSourceConfig) -> Result<Self> {
        Ok(Self {
            client: TelegramApiClient::new(config.client)?,
            poll_timeout_secs: config.poll_timeout_secs,
            next_offset: None,
            pending: VecDeque::new(),
            bot: None,
        })
    }

    pub fn bot_profile(&self) -> Option<&TelegramBotProfile> {
        self.bot.as_ref()
    }

    fn enqueue_updates(&mut self, updates: Vec<TelegramUpdate>) {
        let bot_username = self
            .bot
            .as_ref()
            .and_then(|profile| profile.username.clone());
        for update in updates {
            let candidate = update.update_id.saturating_add(1);
            self.next_offset = Some(match self.next_offset {
                Some(offset) => offset.max(candidate),
                None => candidate,
            });
            match event_from_update(&update, bot_username.as_deref()) {
                Some(event) => self.pending.push_back(event),
                None => tracing::trace!(update_id = update.update_id, "skipping untracked update"),
            }
        }
    }
}

#[async_trait]
impl ReplySink for TelegramEventSource {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, TransportError> {
        self.client.send_message(chat_id, text, reply_to).await
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        self.client
            .edit_message_text(chat_id, message_id, text)
            .await
    }
}

#[async_trait]
impl EventSource for TelegramEventSource {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let profile = self.client.get_me().await?;
        tracing::info!(
            bot_id = profile.id,
            bot_username = profile.username.as_deref().unwrap_or(""),
            "connected to telegram"
        );
        self.bot = Some(profile);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<InboundEvent>, TransportError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            let updates = self
                .client
                .get_updates(self.next_offset, self.poll_timeout_secs)
                .await?;
            self.enqueue_updates(updates);
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{TelegramEventSource, TelegramEventSourceConfig};
    use crate::api_client::TelegramApiClientConfig;
    use crate::transport_contract::{
        ContentKind, EventSource, InboundEvent, ReplySink, TransportErrorKind,
    };

    fn test_source(base_url: &str) -> TelegramEventSource {
        TelegramEventSource::new(TelegramEventSourceConfig {
            client: TelegramApiClientConfig {
                api_base: base_url.to_string(),
                bot_token: "555:source-token".to_string(),
                request_timeout_ms: 2_000,
                retry_max_attempts: 1,
                retry_base_delay_ms: 0,
            },
            poll_timeout_secs: 0,
        })
        .expect("source")
    }

    fn mock_get_me(server: &MockServer) {
        server.mock(|when, then| {
            when.method(POST).path("/bot555:source-token/getMe");
            then.status(200).json_body(json!({
                "ok": true,
                "result": {"id": 555, "is_bot": true, "username": "roster_bot"}
            }));
        });
    }

    #[tokio::test]
    async fn functional_next_event_drains_batch_and_advances_offset() {
        let server = MockServer::start();
        mock_get_me(&server);
        let first = server.mock(|when, then| {
            when.method(POST)
                .path("/bot555:source-token/getUpdates")
                .body_includes("\"timeout\":0")
                .body_excludes("offset");
            then.status(200).json_body(json!({
                "ok": true,
                "result": [
                    {
                        "update_id": 10,
                        "message": {
                            "message_id": 1,
                            "chat": {"id": -200, "type": "group"},
                            "from": {"id": 7, "is_bot": false, "first_name": "Lior"},
                            "sticker": {"file_id": "abc"}
                        }
                    },
                    {"update_id": 11, "edited_message": {"message_id": 1}},
                    {
                        "update_id": 12,
                        "message": {
                            "message_id": 2,
                            "chat": {"id": -200, "type": "group"},
                            "from": {"id": 8, "is_bot": false, "first_name": "Maya"},
                            "text": "/stats@other_bot"
                        }
                    }
                ]
            }));
        });
        let second = server.mock(|when, then| {
            when.method(POST)
                .path("/bot555:source-token/getUpdates")
                .json_body_includes(r#"{"offset": 13}"#);
            then.status(401).json_body(json!({
                "ok": false,
                "error_code": 401,
                "description": "Unauthorized"
            }));
        });

        let mut source = test_source(&server.base_url());
        source.connect().await.expect("connect");
        assert_eq!(
            source
                .bot_profile()
                .and_then(|profile| profile.username.as_deref()),
            Some("roster_bot")
        );

        let sticker = source.next_event().await.expect("event").expect("some");
        assert!(matches!(
            sticker,
            InboundEvent::NewMessage {
                content: ContentKind::Sticker,
                ..
            }
        ));
        let text = source.next_event().await.expect("event").expect("some");
        assert!(matches!(
            text,
            InboundEvent::NewMessage {
                content: ContentKind::Text,
                ..
            }
        ));
        let error = source.next_event().await.expect_err("revoked token");
        assert_eq!(error.kind, TransportErrorKind::Unauthorized);
        first.assert_calls(1);
        second.assert_calls(1);
    }

    #[tokio::test]
    async fn integration_reply_sink_edits_through_api() {
        let server = MockServer::start();
        let edit = server.mock(|when, then| {
            when.method(POST)
                .path("/bot555:source-token/editMessageText")
                .json_body_includes(r#"{"chat_id": 9, "message_id": 4, "text": "done"}"#);
            then.status(200).json_body(json!({"ok": true, "result": true}));
        });

        let source = test_source(&server.base_url());
        source.edit_message(9, 4, "done").await.expect("edit");
        edit.assert();
    }
}
