//! Transport-neutral inbound event model and event-source traits.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub type ChatId = i64;
pub type MessageId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
    Other,
}

impl ChatKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "private" => Self::Private,
            "group" => Self::Group,
            "supergroup" => Self::Supergroup,
            "channel" => Self::Channel,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
            Self::Other => "other",
        }
    }

    pub fn is_private(self) -> bool {
        matches!(self, Self::Private)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatRef {
    pub id: ChatId,
    pub kind: ChatKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Account that produced an inbound event.
pub struct Sender {
    pub id: u64,
    pub is_bot: bool,
    pub first_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Content-bearing message kinds; each one counts as participation.
pub enum ContentKind {
    Text,
    Audio,
    Voice,
    Video,
    Document,
    Photo,
    Sticker,
    Contact,
    Location,
    Venue,
    VideoNote,
    Poll,
}

impl ContentKind {
    pub const ALL: [ContentKind; 12] = [
        ContentKind::Text,
        ContentKind::Audio,
        ContentKind::Voice,
        ContentKind::Video,
        ContentKind::Document,
        ContentKind::Photo,
        ContentKind::Sticker,
        ContentKind::Contact,
        ContentKind::Location,
        ContentKind::Venue,
        ContentKind::VideoNote,
        ContentKind::Poll,
    ];

    /// Message field that carries this content kind in the Bot API.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::Document => "document",
            Self::Photo => "photo",
            Self::Sticker => "sticker",
            Self::Contact => "contact",
            Self::Location => "location",
            Self::Venue => "venue",
            Self::VideoNote => "video_note",
            Self::Poll => "poll",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub chat: ChatRef,
    pub message_id: MessageId,
    pub sender: Sender,
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    NewMessage {
        chat: ChatRef,
        message_id: MessageId,
        sender: Sender,
        content: ContentKind,
    },
    NewChatMembers {
        chat: ChatRef,
        members: Vec<Sender>,
    },
    Command(CommandInvocation),
}

impl InboundEvent {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "new_message",
            Self::NewChatMembers { .. } => "new_chat_members",
            Self::Command(_) => "command",
        }
    }

    pub fn chat(&self) -> ChatRef {
        match self {
            Self::NewMessage { chat, .. } | Self::NewChatMembers { chat, .. } => *chat,
            Self::Command(command) => command.chat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Credentials were rejected; retrying cannot help.
    Unauthorized,
    /// Network failure, timeout, rate limit, or provider outage.
    Transient,
    /// Any other failure reported by the provider.
    Unknown,
}

impl TransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Transient => "transient",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    pub fn is_retryable(self) -> bool {
        !self.is_fatal()
    }
}

impl Display for TransportErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} transport error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
    /// HTTP status or Bot API `error_code` when the server answered.
    pub status: Option<u16>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            status: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unauthorized, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Transient, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unknown, message)
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }
}

/// Outbound half of an event source.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, TransportError>;

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError>;
}

/// Pull-style source of inbound events.
///
/// `next_event` blocks until an event is available; `Ok(None)` means the
/// source has closed for good.
#[async_trait]
pub trait EventSource: ReplySink {
    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn next_event(&mut self) -> Result<Option<InboundEvent>, TransportError>;
}
