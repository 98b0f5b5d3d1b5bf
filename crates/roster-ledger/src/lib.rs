//! Activity tracking state for roster.
//!
//! The [`ActivityLedger`] owns the seen/active/detail/admin collections behind
//! one lock and mirrors every change into a [`roster_core::DurableStore`].
//! Reports and statistics are computed from lock-free [`LedgerSnapshot`]s.

pub mod ledger;
pub mod report;
pub mod stats;
pub mod user;

pub use ledger::{
    ActivityLedger, ActivityOutcome, AdminPromotion, LedgerSnapshot, ObservationOutcome,
};
pub use report::{
    build_inactive_report, format_inactive_line, inactive_user_ids, InactiveReport,
    InactiveReportPages, ReportOptions, DEFAULT_PAGE_MAX_CHARS, NO_INACTIVE_USERS_TEXT,
};
pub use stats::LedgerStats;
pub use user::{ObservedUser, UserDetail, UserId, UNKNOWN_LOCALE};
