use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_LOCALE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Stable platform account identifier.
pub struct UserId(pub u64);

impl UserId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Per-user profile kept alongside the seen/active sets.
///
/// Field names on disk match the historical `user_details.json` layout.
pub struct UserDetail {
    #[serde(rename = "first_name", default)]
    pub display_name: String,
    #[serde(rename = "username", default)]
    pub handle: String,
    #[serde(rename = "language_code", default = "unknown_locale")]
    pub locale_tag: String,
    #[serde(rename = "join_date", with = "first_observed_format")]
    pub first_observed_at: DateTime<Utc>,
}

impl UserDetail {
    pub(crate) fn matches(&self, observed: &ObservedUser) -> bool {
        self.display_name == observed.display_name
            && self.handle == observed.handle
            && self.locale_tag == observed.locale_tag
    }
}

fn unknown_locale() -> String {
    UNKNOWN_LOCALE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Normalized identity reported by one inbound event.
pub struct ObservedUser {
    pub id: UserId,
    pub display_name: String,
    pub handle: String,
    pub locale_tag: String,
}

impl ObservedUser {
    /// Absent names and handles become empty strings; an absent locale becomes `unknown`.
    pub fn new(
        id: UserId,
        display_name: Option<&str>,
        handle: Option<&str>,
        locale_tag: Option<&str>,
    ) -> Self {
        let locale_tag = locale_tag
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_LOCALE);
        Self {
            id,
            display_name: display_name.unwrap_or_default().to_string(),
            handle: handle.unwrap_or_default().to_string(),
            locale_tag: locale_tag.to_string(),
        }
    }
}

mod first_observed_format {
    use super::*;
    use serde::{de::Error as _, Deserializer, Serializer};

    pub(super) fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid join_date timestamp '{raw}'")))
    }

    // Older state files carry naive local ISO timestamps; they are read as UTC.
    pub(super) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        let trimmed = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}
