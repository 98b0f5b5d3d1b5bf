use anyhow::Result;
use roster_ledger::{ActivityLedger, UserId};
use roster_telegram::ChatRef;

pub const NOT_PRIVATE_DENIAL_TEXT: &str =
    "This command is only available in a private chat with the bot.";
pub const NOT_ADMIN_DENIAL_TEXT: &str = "Only registered admins can use this command.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminGateDecision {
    Allowed,
    DeniedNotPrivate,
    DeniedNotAdmin,
}

impl AdminGateDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::DeniedNotPrivate => "denied_not_private",
            Self::DeniedNotAdmin => "denied_not_admin",
        }
    }

    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn denial_text(self) -> Option<&'static str> {
        match self {
            Self::Allowed => None,
            Self::DeniedNotPrivate => Some(NOT_PRIVATE_DENIAL_TEXT),
            Self::DeniedNotAdmin => Some(NOT_ADMIN_DENIAL_TEXT),
        }
    }
}

/// Checks a privileged invocation against the current admin set.
///
/// Admin membership is read from the ledger on every call.
pub fn evaluate_admin_gate(
    ledger: &ActivityLedger,
    chat: ChatRef,
    user: UserId,
) -> Result<AdminGateDecision> {
    if !chat.kind.is_private() {
        return Ok(AdminGateDecision::DeniedNotPrivate);
    }
    if !ledger.is_admin(user)? {
        return Ok(AdminGateDecision::DeniedNotAdmin);
    }
    Ok(AdminGateDecision::Allowed)
}
