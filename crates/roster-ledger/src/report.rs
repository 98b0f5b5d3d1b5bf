//! Inactive-user report: set difference, display formatting, pagination.

use std::collections::BTreeSet;

use anyhow::{bail, Result};

use crate::ledger::LedgerSnapshot;
use crate::user::{UserDetail, UserId, UNKNOWN_LOCALE};

pub const DEFAULT_PAGE_MAX_CHARS: usize = 4080;
pub const NO_INACTIVE_USERS_TEXT: &str = "✅ No users were seen without writing a message.";
const HEADER_RULE_WIDTH: usize = 25;
const TRUNCATION_SUFFIX: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub page_max_chars: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            page_max_chars: DEFAULT_PAGE_MAX_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InactiveReport {
    pub inactive_count: usize,
    pub seen_count: usize,
    pages: Vec<String>,
}

impl InactiveReport {
    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn has_inactive_users(&self) -> bool {
        self.inactive_count > 0
    }

    /// Consumes the report into its ordered page sequence.
    pub fn into_pages(self) -> InactiveReportPages {
        InactiveReportPages {
            inner: self.pages.into_iter(),
        }
    }
}

#[derive(Debug)]
pub struct InactiveReportPages {
    inner: std::vec::IntoIter<String>,
}

impl Iterator for InactiveReportPages {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for InactiveReportPages {}

pub fn inactive_user_ids(snapshot: &LedgerSnapshot) -> BTreeSet<UserId> {
    snapshot
        .seen
        .difference(&snapshot.active)
        .copied()
        .collect()
}

/// Renders the display string for one inactive user (without the list bullet).
pub fn format_inactive_line(user: UserId, detail: Option<&UserDetail>) -> String {
    let Some(detail) = detail else {
        return format!("👤 ID: {user}");
    };

    let mut name_parts = Vec::new();
    let display_name = detail.display_name.trim();
    if !display_name.is_empty() {
        name_parts.push(display_name.to_string());
    }
    let handle = detail.handle.trim();
    if !handle.is_empty() {
        name_parts.push(format!("(@{handle})"));
    }
    if name_parts.is_empty() {
        name_parts.push(format!("ID: {user}"));
    }
    let locale = match detail.locale_tag.trim() {
        "" => UNKNOWN_LOCALE,
        locale => locale,
    };
    format!("{} | 🌐 {}", name_parts.join(" "), locale)
}

pub fn build_inactive_report(
    snapshot: &LedgerSnapshot,
    options: &ReportOptions,
) -> Result<InactiveReport> {
    let inactive = inactive_user_ids(snapshot);
    let seen_count = snapshot.seen.len();
    if inactive.is_empty() {
        return Ok(InactiveReport {
            inactive_count: 0,
            seen_count,
            pages: vec![NO_INACTIVE_USERS_TEXT.to_string()],
        });
    }

    let title = format!(
        "👥 Inactive users ({} of {} seen):",
        inactive.len(),
        seen_count
    );
    let rule = "-".repeat(HEADER_RULE_WIDTH);
    let max_chars = options.page_max_chars;
    if title.chars().count() > max_chars || rule.len() > max_chars {
        bail!(
            "report page ceiling of {} characters cannot hold the report header",
            max_chars
        );
    }

    let mut display_lines = inactive
        .iter()
        .map(|user| format_inactive_line(*user, snapshot.details.get(user)))
        .collect::<Vec<_>>();
    display_lines.sort();

    let mut lines = Vec::with_capacity(display_lines.len() + 2);
    lines.push(title);
    lines.push(rule);
    lines.extend(
        display_lines
            .into_iter()
            .map(|display| fit_line(format!("- {display}"), max_chars)),
    );

    Ok(InactiveReport {
        inactive_count: inactive.len(),
        seen_count,
        pages: paginate_lines(lines, max_chars),
    })
}

fn fit_line(line: String, max_chars: usize) -> String {
    if line.chars().count() <= max_chars {
        return line;
    }
    let keep = max_chars.saturating_sub(TRUNCATION_SUFFIX.len());
    let mut truncated = line.chars().take(keep).collect::<String>();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

// Lines are assumed to already fit within `max_chars`.
fn paginate_lines(lines: Vec<String>, max_chars: usize) -> Vec<String> {
    let mut pages = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for line in lines {
        let line_len = line.chars().count();
        if !current.is_empty() && current_len + 1 + line_len > max_chars {
            pages.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(&line);
        current_len += line_len;
    }
    if !current.is_empty() {
        pages.push(current);
    }
    pages
}
