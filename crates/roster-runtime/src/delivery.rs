//! Outbound delivery helpers for command replies and paginated reports.

use std::time::Duration;

use roster_ledger::InactiveReport;
use roster_telegram::{ChatId, MessageId, ReplySink, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The placeholder message was edited in place.
    Edited,
    /// Editing failed and a fresh message was sent instead.
    Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportDelivery {
    pub placeholder: DeliveryOutcome,
    pub pages_sent: usize,
}

/// Replaces the text of `message_id`, falling back to a new message when the edit fails.
pub async fn edit_or_send(
    replies: &dyn ReplySink,
    chat_id: ChatId,
    message_id: MessageId,
    text: &str,
) -> Result<DeliveryOutcome, TransportError> {
    match replies.edit_message(chat_id, message_id, text).await {
        Ok(()) => Ok(DeliveryOutcome::Edited),
        Err(error) => {
            tracing::warn!(
                chat_id,
                message_id,
                error = %error,
                "failed to edit placeholder message; sending a new one"
            );
            replies.send_message(chat_id, text, None).await?;
            Ok(DeliveryOutcome::Sent)
        }
    }
}

pub fn multi_page_notice(report: &InactiveReport) -> String {
    format!(
        "The inactive list is long ({} users), sending it in {} parts...",
        report.inactive_count,
        report.page_count()
    )
}

/// Delivers `report` into the chat that holds the `placeholder_id` message.
///
/// A single page replaces the placeholder. Longer reports replace it with a
/// notice and follow with one message per page, `page_delay` apart.
pub async fn deliver_report(
    replies: &dyn ReplySink,
    chat_id: ChatId,
    placeholder_id: MessageId,
    report: InactiveReport,
    page_delay: Duration,
) -> Result<ReportDelivery, TransportError> {
    if report.page_count() <= 1 {
        let text = report.into_pages().next().unwrap_or_default();
        let placeholder = edit_or_send(replies, chat_id, placeholder_id, &text).await?;
        return Ok(ReportDelivery {
            placeholder,
            pages_sent: 0,
        });
    }

    let placeholder =
        edit_or_send(replies, chat_id, placeholder_id, &multi_page_notice(&report)).await?;
    let mut pages_sent = 0usize;
    for page in report.into_pages() {
        if pages_sent > 0 && !page_delay.is_zero() {
            tokio::time::sleep(page_delay).await;
        }
        replies.send_message(chat_id, &page, None).await?;
        pages_sent += 1;
    }
    Ok(ReportDelivery {
        placeholder,
        pages_sent,
    })
}
