//! Bot API update payloads and their mapping onto [`InboundEvent`]s.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::transport_contract::{
    ChatKind, ChatRef, CommandInvocation, ContentKind, InboundEvent, MessageId, Sender,
};

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: u64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: MessageId,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub new_chat_members: Option<Vec<TelegramUser>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: u64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

impl From<&TelegramUser> for Sender {
    fn from(user: &TelegramUser) -> Self {
        Self {
            id: user.id,
            is_bot: user.is_bot,
            first_name: user.first_name.clone(),
            username: user.username.clone(),
            language_code: user.language_code.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Maps one update onto an inbound event; updates the bot does not track yield `None`.
///
/// `bot_username` filters commands addressed to other bots (`/stats@other_bot`),
/// which are then treated as ordinary text.
pub fn event_from_update(
    update: &TelegramUpdate,
    bot_username: Option<&str>,
) -> Option<InboundEvent> {
    let message = update.message.as_ref()?;
    let chat = ChatRef {
        id: message.chat.id,
        kind: ChatKind::parse(&message.chat.kind),
    };

    if let Some(members) = message.new_chat_members.as_ref() {
        let members = members
            .iter()
            .filter(|member| !member.is_bot)
            .map(Sender::from)
            .collect::<Vec<_>>();
        if members.is_empty() {
            return None;
        }
        return Some(InboundEvent::NewChatMembers { chat, members });
    }

    let sender = Sender::from(message.from.as_ref()?);
    if let Some(text) = message.text.as_deref() {
        if let Some((name, args)) = parse_command_text(text, bot_username) {
            return Some(InboundEvent::Command(CommandInvocation {
                chat,
                message_id: message.message_id,
                sender,
                name,
                args,
            }));
        }
        return Some(InboundEvent::NewMessage {
            chat,
            message_id: message.message_id,
            sender,
            content: ContentKind::Text,
        });
    }

    let content = detect_content_kind(&message.extra)?;
    Some(InboundEvent::NewMessage {
        chat,
        message_id: message.message_id,
        sender,
        content,
    })
}

fn detect_content_kind(fields: &Map<String, Value>) -> Option<ContentKind> {
    ContentKind::ALL
        .into_iter()
        .filter(|kind| *kind != ContentKind::Text)
        .find(|kind| fields.get(kind.field_name()).is_some_and(|value| !value.is_null()))
}

fn parse_command_text(text: &str, bot_username: Option<&str>) -> Option<(String, Vec<String>)> {
    let trimmed = text.trim();
    let mut pieces = trimmed.split_whitespace();
    let head = pieces.next()?.strip_prefix('/')?;
    let (name, addressee) = match head.split_once('@') {
        Some((name, addressee)) => (name, Some(addressee)),
        None => (head, None),
    };
    if name.is_empty() {
        return None;
    }
    if let (Some(addressee), Some(bot_username)) = (addressee, bot_username) {
        if !addressee.eq_ignore_ascii_case(bot_username.trim_start_matches('@')) {
            return None;
        }
    }
    Some((
        name.to_ascii_lowercase(),
        pieces.map(str::to_string).collect(),
    ))
}
