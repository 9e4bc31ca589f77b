//! Core data types for billing accounts, records, and poll results.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

/// Raw label → value pairs pulled from the bill table, in document order.
pub type BillFields = IndexMap<String, String>;

/// Gas account identifier as printed on the bill.
///
/// The remote query splits it positionally: the first three characters,
/// the next five, and the final character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Validate and wrap an account identifier.
    pub fn new(raw: impl Into<String>) -> GasResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GasError::InvalidAccountId(
                "account id must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into the three query segments.
    ///
    /// Short identifiers yield short or empty segments instead of failing.
    pub fn segments(&self) -> AccountSegments {
        let chars: Vec<char> = self.0.chars().collect();
        AccountSegments {
            uid1: chars.iter().take(3).collect(),
            uid2: chars.iter().skip(3).take(5).collect(),
            uid3: chars.last().map(|c| c.to_string()).unwrap_or_default(),
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccountId {
    type Error = GasError;

    fn try_from(value: String) -> GasResult<Self> {
        Self::new(value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

/// Positional pieces of an [`AccountId`] used to build the bill query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSegments {
    pub uid1: String,
    pub uid2: String,
    pub uid3: String,
}

impl AccountSegments {
    /// Fields sent both as the form body and as query parameters.
    pub fn query_fields(&self) -> [(&'static str, &str); 4] {
        [
            ("type", "1"),
            ("UID1", self.uid1.as_str()),
            ("UID2", self.uid2.as_str()),
            ("UID3", self.uid3.as_str()),
        ]
    }
}

/// Outcome marker carried by every [`BillingRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollResult {
    /// HTTP success and the bill table produced at least one field.
    Success,
    /// HTTP 404, or HTTP success with no usable bill table.
    NotFound,
    /// HTTP 403; the remote side rejected the session credentials.
    Forbidden,
    /// Any other non-success HTTP status.
    Http(u16),
    /// The account is expired and the poller refused to query.
    SessionExpired,
    /// No poll has produced a record yet.
    #[default]
    Unknown,
}

impl PollResult {
    /// Stable label exposed as the `https_result` attribute.
    pub fn label(&self) -> Cow<'static, str> {
        match self {
            Self::Success => Cow::Borrowed("success"),
            Self::NotFound => Cow::Borrowed("not_found"),
            Self::Forbidden => Cow::Borrowed("forbidden"),
            Self::Http(code) => Cow::Owned(format!("http_{code}")),
            Self::SessionExpired => Cow::Borrowed("session_expired"),
            Self::Unknown => Cow::Borrowed("unknown"),
        }
    }

    /// HTTP status code behind this result, where one exists.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Success => Some(200),
            Self::NotFound => Some(404),
            Self::Forbidden => Some(403),
            Self::Http(code) => Some(*code),
            Self::SessionExpired | Self::Unknown => None,
        }
    }
}

impl fmt::Display for PollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for PollResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

/// Snapshot of one poll cycle. Replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BillingRecord {
    pub fields: BillFields,
    pub result: PollResult,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl BillingRecord {
    pub fn new(fields: BillFields, result: PollResult, fetched_at: DateTime<Utc>) -> Self {
        Self {
            fields,
            result,
            fetched_at: Some(fetched_at),
        }
    }

    /// Empty record produced when a poll is refused because of expiry.
    pub fn session_expired(at: DateTime<Utc>) -> Self {
        Self::new(BillFields::new(), PollResult::SessionExpired, at)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Errors that can occur in the billing engine.
///
/// Remote-side rejections are not errors; they are reported through
/// [`PollResult`] on the record.
#[derive(thiserror::Error, Debug)]
pub enum GasError {
    #[error("Invalid account id: {0}")]
    InvalidAccountId(String),

    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler stopped")]
    SchedulerClosed,
}

impl GasError {
    /// Whether this is a transient network failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

/// Convenience result type.
pub type GasResult<T> = Result<T, GasError>;
