//! Telegram Bot API event source for roster.
//!
//! Translates `getUpdates` long-poll results into typed [`InboundEvent`]s and
//! exposes outbound send/edit calls. Every failure is classified into a
//! [`TransportErrorKind`] so the ingestion loop can decide between retrying
//! and stopping without inspecting error text.

pub mod api_client;
pub mod event_source;
pub mod transport_contract;
pub mod updates;

pub use api_client::{TelegramApiClient, TelegramApiClientConfig, TelegramBotProfile};
pub use event_source::{TelegramEventSource, TelegramEventSourceConfig};
pub use transport_contract::{
    ChatId, ChatKind, ChatRef, CommandInvocation, ContentKind, EventSource, InboundEvent,
    MessageId, ReplySink, Sender, TransportError, TransportErrorKind,
};
pub use updates::{
    event_from_update, TelegramChat, TelegramMessage, TelegramUpdate, TelegramUser,
};
