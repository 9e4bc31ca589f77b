//! Session expiration tracking.
//!
//! Once the billing site answers with anything but success the account is
//! considered expired and stays that way until an operator resets it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::PollResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Active,
    Expired,
}

/// Expiration flag plus why and when it was raised.
#[derive(Debug, Clone, Default)]
pub struct ExpirationState {
    state: SessionState,
    expired_since: Option<DateTime<Utc>>,
    cause: Option<PollResult>,
}

impl ExpirationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_expired(&self) -> bool {
        self.state == SessionState::Expired
    }

    /// When the account first went expired, if it is.
    pub fn expired_since(&self) -> Option<DateTime<Utc>> {
        self.expired_since
    }

    /// The result that flipped the account to expired.
    pub fn cause(&self) -> Option<PollResult> {
        self.cause
    }

    pub(crate) fn mark_expired(&mut self, at: DateTime<Utc>, cause: PollResult) {
        if !self.is_expired() {
            self.expired_since = Some(at);
            self.cause = Some(cause);
        }
        self.state = SessionState::Expired;
    }

    pub(crate) fn mark_active(&mut self) {
        self.state = SessionState::Active;
        self.expired_since = None;
        self.cause = None;
    }

    /// Out-of-band reset. Returns whether the account was expired.
    pub fn reset(&mut self) -> bool {
        let was_expired = self.is_expired();
        self.mark_active();
        was_expired
    }
}
