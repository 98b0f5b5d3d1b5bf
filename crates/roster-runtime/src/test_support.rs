use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use roster_telegram::{
    ChatId, ChatKind, ChatRef, CommandInvocation, ContentKind, EventSource, InboundEvent,
    MessageId, ReplySink, Sender, TransportError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    Sent {
        chat_id: ChatId,
        text: String,
        reply_to: Option<MessageId>,
    },
    Edited {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
    },
}

pub(crate) enum ConnectStep {
    Succeed,
    Fail(TransportError),
    Hang,
}

pub(crate) enum PollStep {
    Deliver(InboundEvent),
    Fail(TransportError),
    Close,
}

#[derive(Default)]
struct ScriptState {
    connect_steps: VecDeque<ConnectStep>,
    poll_steps: VecDeque<PollStep>,
    connect_calls: usize,
    outbound: Vec<Outbound>,
    next_message_id: MessageId,
}

/// In-memory event source replaying scripted connect and poll results.
///
/// An exhausted connect script succeeds; an exhausted poll script blocks forever.
#[derive(Clone, Default)]
pub(crate) struct ScriptedSource {
    state: Arc<Mutex<ScriptState>>,
    fail_edits: bool,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_failing_edits(mut self) -> Self {
        self.fail_edits = true;
        self
    }

    pub(crate) fn push_connect(&self, step: ConnectStep) -> &Self {
        self.state
            .lock()
            .expect("script state")
            .connect_steps
            .push_back(step);
        self
    }

    pub(crate) fn push_poll(&self, step: PollStep) -> &Self {
        self.state
            .lock()
            .expect("script state")
            .poll_steps
            .push_back(step);
        self
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.state.lock().expect("script state").connect_calls
    }

    pub(crate) fn outbound(&self) -> Vec<Outbound> {
        self.state.lock().expect("script state").outbound.clone()
    }

    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.outbound()
            .into_iter()
            .filter_map(|entry| match entry {
                Outbound::Sent { text, .. } => Some(text),
                Outbound::Edited { .. } => None,
            })
            .collect()
    }

    pub(crate) fn edited_texts(&self) -> Vec<String> {
        self.outbound()
            .into_iter()
            .filter_map(|entry| match entry {
                Outbound::Edited { text, .. } => Some(text),
                Outbound::Sent { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl ReplySink for ScriptedSource {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, TransportError> {
        let mut state = self.state.lock().expect("script state");
        state.next_message_id += 1;
        state.outbound.push(Outbound::Sent {
            chat_id,
            text: text.to_string(),
            reply_to,
        });
        Ok(state.next_message_id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        if self.fail_edits {
            return Err(TransportError::unknown("message can't be edited"));
        }
        self.state
            .lock()
            .expect("script state")
            .outbound
            .push(Outbound::Edited {
                chat_id,
                message_id,
                text: text.to_string(),
            });
        Ok(())
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let step = {
            let mut state = self.state.lock().expect("script state");
            state.connect_calls += 1;
            state.connect_steps.pop_front()
        };
        match step {
            None | Some(ConnectStep::Succeed) => Ok(()),
            Some(ConnectStep::Fail(error)) => Err(error),
            Some(ConnectStep::Hang) => std::future::pending().await,
        }
    }

    async fn next_event(&mut self) -> Result<Option<InboundEvent>, TransportError> {
        let step = self.state.lock().expect("script state").poll_steps.pop_front();
        match step {
            Some(PollStep::Deliver(event)) => Ok(Some(event)),
            Some(PollStep::Fail(error)) => Err(error),
            Some(PollStep::Close) => Ok(None),
            None => std::future::pending().await,
        }
    }
}

pub(crate) fn sender(id: u64, first_name: &str, locale: &str) -> Sender {
    Sender {
        id,
        is_bot: false,
        first_name: Some(first_name.to_string()),
        username: Some(first_name.to_ascii_lowercase()),
        language_code: Some(locale.to_string()),
    }
}

pub(crate) fn group_chat() -> ChatRef {
    ChatRef {
        id: -100200,
        kind: ChatKind::Supergroup,
    }
}

pub(crate) fn private_chat(user_id: u64) -> ChatRef {
    ChatRef {
        id: user_id as i64,
        kind: ChatKind::Private,
    }
}

pub(crate) fn text_message(chat: ChatRef, sender: Sender) -> InboundEvent {
    InboundEvent::NewMessage {
        chat,
        message_id: 1,
        sender,
        content: ContentKind::Text,
    }
}

pub(crate) fn command(chat: ChatRef, sender: Sender, name: &str) -> InboundEvent {
    InboundEvent::Command(CommandInvocation {
        chat,
        message_id: 42,
        sender,
        name: name.to_string(),
        args: Vec::new(),
    })
}
