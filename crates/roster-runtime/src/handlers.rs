//! Event handlers that translate inbound events into ledger updates and replies.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use roster_ledger::{
    build_inactive_report, ActivityLedger, InactiveReport, LedgerStats, ObservedUser,
    ReportOptions, UserId,
};
use roster_telegram::{
    ChatRef, CommandInvocation, ContentKind, InboundEvent, MessageId, ReplySink, Sender,
};

use crate::admin_gate::evaluate_admin_gate;
use crate::delivery::{deliver_report, edit_or_send};

pub const WELCOME_TEXT: &str = "Welcome! I keep track of member activity in the group.\n\
To get admin rights ask an existing admin, or if you are the first one, use /set_admin once.";
pub const PROMOTED_TEXT: &str =
    "You are now an admin. You can use the /stats and /check_inactive commands.";
pub const ALREADY_ADMIN_TEXT: &str = "You are already an admin.";
pub const PROCESSING_TEXT: &str = "Processing the user list, please wait...";
pub const STATS_FAILURE_TEXT: &str = "An error occurred while preparing the stats. Check the logs.";
pub const REPORT_FAILURE_TEXT: &str =
    "An error occurred while checking inactive users. Check the logs.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterCommand {
    Start,
    SetAdmin,
    Stats,
    CheckInactive,
}

impl RosterCommand {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "start" => Some(Self::Start),
            "set_admin" => Some(Self::SetAdmin),
            "stats" => Some(Self::Stats),
            "check_inactive" => Some(Self::CheckInactive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "/start",
            Self::SetAdmin => "/set_admin",
            Self::Stats => "/stats",
            Self::CheckInactive => "/check_inactive",
        }
    }
}

/// Consumer of inbound events driven by the ingestion loop.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &InboundEvent, replies: &dyn ReplySink) -> Result<()>;
}

pub struct RosterEventHandler {
    ledger: Arc<ActivityLedger>,
    report_options: ReportOptions,
    page_delay: Duration,
}

impl RosterEventHandler {
    pub fn new(
        ledger: Arc<ActivityLedger>,
        report_options: ReportOptions,
        page_delay: Duration,
    ) -> Self {
        Self {
            ledger,
            report_options,
            page_delay,
        }
    }

    pub fn ledger(&self) -> &Arc<ActivityLedger> {
        &self.ledger
    }

    fn record_content(&self, chat: ChatRef, sender: &Sender, content: ContentKind) -> Result<()> {
        if sender.is_bot {
            tracing::debug!(user_id = sender.id, "ignoring message from bot account");
            return Ok(());
        }
        self.ledger.record_observation(&observed_user(sender))?;
        let outcome = self.ledger.record_activity(UserId(sender.id))?;
        if outcome.newly_active {
            tracing::info!(
                user_id = sender.id,
                chat_id = chat.id,
                content = content.field_name(),
                first_name = sender.first_name.as_deref().unwrap_or(""),
                username = sender.username.as_deref().unwrap_or(""),
                "user wrote for the first time"
            );
        }
        Ok(())
    }

    fn record_members(&self, chat: ChatRef, members: &[Sender]) -> Result<()> {
        for member in members.iter().filter(|member| !member.is_bot) {
            tracing::info!(
                user_id = member.id,
                chat_id = chat.id,
                first_name = member.first_name.as_deref().unwrap_or(""),
                username = member.username.as_deref().unwrap_or(""),
                "new member joined"
            );
            self.ledger.record_observation(&observed_user(member))?;
        }
        Ok(())
    }

    async fn handle_command(
        &self,
        command: &CommandInvocation,
        replies: &dyn ReplySink,
    ) -> Result<()> {
        let Some(parsed) = RosterCommand::parse(&command.name) else {
            return self.record_content(command.chat, &command.sender, ContentKind::Text);
        };
        match parsed {
            RosterCommand::Start => self.handle_start(command, replies).await,
            RosterCommand::SetAdmin => self.handle_set_admin(command, replies).await,
            RosterCommand::Stats | RosterCommand::CheckInactive => {
                let decision = evaluate_admin_gate(
                    &self.ledger,
                    command.chat,
                    UserId(command.sender.id),
                )?;
                if let Some(denial) = decision.denial_text() {
                    tracing::warn!(
                        user_id = command.sender.id,
                        chat_id = command.chat.id,
                        command = parsed.as_str(),
                        decision = decision.as_str(),
                        "privileged command denied"
                    );
                    reply(replies, command, denial).await?;
                    return Ok(());
                }
                if parsed == RosterCommand::Stats {
                    self.handle_stats(command, replies).await
                } else {
                    self.handle_check_inactive(command, replies).await
                }
            }
        }
    }

    async fn handle_start(
        &self,
        command: &CommandInvocation,
        replies: &dyn ReplySink,
    ) -> Result<()> {
        if !command.chat.kind.is_private() {
            return Ok(());
        }
        tracing::info!(
            user_id = command.sender.id,
            first_name = command.sender.first_name.as_deref().unwrap_or(""),
            username = command.sender.username.as_deref().unwrap_or(""),
            "user started a private chat"
        );
        self.ledger.record_observation(&observed_user(&command.sender))?;
        reply(replies, command, WELCOME_TEXT).await?;
        Ok(())
    }

    async fn handle_set_admin(
        &self,
        command: &CommandInvocation,
        replies: &dyn ReplySink,
    ) -> Result<()> {
        if !command.chat.kind.is_private() {
            tracing::warn!(
                user_id = command.sender.id,
                chat_id = command.chat.id,
                "/set_admin attempted outside a private chat"
            );
            return Ok(());
        }
        let promotion = self.ledger.promote_to_admin(UserId(command.sender.id))?;
        let text = if promotion.already_admin {
            tracing::info!(user_id = command.sender.id, "user is already an admin");
            ALREADY_ADMIN_TEXT
        } else {
            tracing::info!(user_id = command.sender.id, "user promoted to admin");
            PROMOTED_TEXT
        };
        reply(replies, command, text).await?;
        Ok(())
    }

    async fn handle_stats(
        &self,
        command: &CommandInvocation,
        replies: &dyn ReplySink,
    ) -> Result<()> {
        tracing::info!(user_id = command.sender.id, "admin requested stats");
        let text = match self.ledger.snapshot() {
            Ok(snapshot) => render_stats(&LedgerStats::from_snapshot(&snapshot)),
            Err(error) => {
                tracing::error!(error = %format!("{error:#}"), "failed to prepare stats");
                STATS_FAILURE_TEXT.to_string()
            }
        };
        reply(replies, command, &text).await?;
        Ok(())
    }

    async fn handle_check_inactive(
        &self,
        command: &CommandInvocation,
        replies: &dyn ReplySink,
    ) -> Result<()> {
        tracing::info!(user_id = command.sender.id, "admin requested inactive users");
        let chat_id = command.chat.id;
        let placeholder_id = reply(replies, command, PROCESSING_TEXT).await?;

        let report = match self.build_report() {
            Ok(report) => report,
            Err(error) => {
                tracing::error!(
                    user_id = command.sender.id,
                    error = %format!("{error:#}"),
                    "failed to build inactive report"
                );
                edit_or_send(replies, chat_id, placeholder_id, REPORT_FAILURE_TEXT).await?;
                return Ok(());
            }
        };

        let inactive_count = report.inactive_count;
        let seen_count = report.seen_count;
        match deliver_report(replies, chat_id, placeholder_id, report, self.page_delay).await {
            Ok(delivery) => {
                tracing::info!(
                    user_id = command.sender.id,
                    inactive = inactive_count,
                    seen = seen_count,
                    pages_sent = delivery.pages_sent,
                    placeholder = ?delivery.placeholder,
                    "inactive report delivered"
                );
                Ok(())
            }
            Err(error) => {
                tracing::error!(
                    user_id = command.sender.id,
                    error = %error,
                    "failed to deliver inactive report"
                );
                if let Err(notice_error) = replies
                    .send_message(chat_id, REPORT_FAILURE_TEXT, None)
                    .await
                {
                    tracing::warn!(error = %notice_error, "failed to send report failure notice");
                }
                Ok(())
            }
        }
    }

    fn build_report(&self) -> Result<InactiveReport> {
        let snapshot = self
            .ledger
            .snapshot()
            .context("failed to snapshot activity ledger")?;
        build_inactive_report(&snapshot, &self.report_options)
    }
}

#[async_trait]
impl EventHandler for RosterEventHandler {
    async fn handle(&self, event: &InboundEvent, replies: &dyn ReplySink) -> Result<()> {
        match event {
            InboundEvent::NewMessage {
                chat,
                sender,
                content,
                ..
            } => self.record_content(*chat, sender, *content),
            InboundEvent::NewChatMembers { chat, members } => self.record_members(*chat, members),
            InboundEvent::Command(command) => self.handle_command(command, replies).await,
        }
    }
}

pub fn render_stats(stats: &LedgerStats) -> String {
    format!(
        "📊 Bot statistics:\n\
         👥 Users seen: {}\n\
         ✍️ Users who wrote at least one message: {}\n\
         🌍 Distinct languages recorded: {}",
        stats.seen_count, stats.active_count, stats.distinct_locales
    )
}

fn observed_user(sender: &Sender) -> ObservedUser {
    ObservedUser::new(
        UserId(sender.id),
        sender.first_name.as_deref(),
        sender.username.as_deref(),
        sender.language_code.as_deref(),
    )
}

async fn reply(
    replies: &dyn ReplySink,
    command: &CommandInvocation,
    text: &str,
) -> Result<MessageId> {
    replies
        .send_message(command.chat.id, text, Some(command.message_id))
        .await
        .with_context(|| format!("failed to reply to /{}", command.name))
}
