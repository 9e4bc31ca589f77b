//! One account's update cycle: throttle, query, classify, extract, record.
//!
//! The [`Poller`] owns the current [`BillingRecord`], the
//! [`ExpirationState`], and the [`ThrottleGate`] for its account. Nothing
//! else mutates them; readers get clones.
//!
//! State machine, applied after every query that reached the remote side:
//!
//! | Response                         | Session  | Result           |
//! |----------------------------------|----------|------------------|
//! | 2xx, table yields fields         | active   | `success`        |
//! | 2xx, no usable table             | active   | `not_found`      |
//! | 404                              | expired  | `not_found`      |
//! | 403                              | expired  | `forbidden`      |
//! | other status                     | expired  | `http_<code>`    |
//! | transport failure                | as-is    | previous record  |
//!
//! While expired the poller refuses to query at all and reports
//! `session_expired` until [`Poller::reset_expiration`] is called.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::client::{BillingSource, RawResponse};
use crate::expiry::{ExpirationState, SessionState};
use crate::extractor::extract_bill_fields;
use crate::throttle::{PollKind, ThrottleGate};
use crate::types::{AccountId, BillFields, BillingRecord, PollResult};

/// How a raw response is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseClass {
    /// 2xx with whatever the extractor found (possibly nothing).
    Content(BillFields),
    /// 404.
    NotFound,
    /// 403, usually an expired token or cookie.
    Forbidden,
    /// Any other status.
    Other(u16),
}

/// Classify a response, running the extractor on success bodies.
pub fn classify(response: &RawResponse) -> ResponseClass {
    match response.status {
        200..=299 => ResponseClass::Content(extract_bill_fields(&response.body)),
        404 => ResponseClass::NotFound,
        403 => ResponseClass::Forbidden,
        other => ResponseClass::Other(other),
    }
}

/// Per-account poller.
pub struct Poller {
    account: AccountId,
    source: Arc<dyn BillingSource>,
    throttle: ThrottleGate,
    expiration: ExpirationState,
    record: BillingRecord,
    queries_issued: u64,
}

impl Poller {
    pub fn new(account: AccountId, source: Arc<dyn BillingSource>) -> Self {
        Self {
            account,
            source,
            throttle: ThrottleGate::default(),
            expiration: ExpirationState::new(),
            record: BillingRecord::default(),
            queries_issued: 0,
        }
    }

    /// Replace the default 24h/12h throttle.
    pub fn with_throttle(mut self, throttle: ThrottleGate) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Current record.
    pub fn record(&self) -> &BillingRecord {
        &self.record
    }

    pub fn session_state(&self) -> SessionState {
        self.expiration.state()
    }

    pub fn expiration(&self) -> &ExpirationState {
        &self.expiration
    }

    pub fn throttle(&self) -> &ThrottleGate {
        &self.throttle
    }

    /// Number of queries that were sent to the billing source, including
    /// ones that failed in transport.
    pub fn queries_issued(&self) -> u64 {
        self.queries_issued
    }

    /// Out-of-band recovery after credentials were refreshed.
    /// Returns whether the account was expired.
    ///
    /// Also reopens the forced cadence, so the forced poll that follows a
    /// reset reaches the network even within 12h of the failing query.
    pub fn reset_expiration(&mut self) -> bool {
        let was_expired = self.expiration.reset();
        if was_expired {
            self.throttle.clear_forced();
            tracing::info!("Session for {} reset, polling resumes", self.account);
        }
        was_expired
    }

    /// Run one update cycle now.
    pub async fn poll(&mut self, force: bool) -> BillingRecord {
        self.poll_at(Utc::now(), force).await
    }

    /// Run one update cycle as of `now`.
    pub async fn poll_at(&mut self, now: DateTime<Utc>, force: bool) -> BillingRecord {
        if self.expiration.is_expired() {
            tracing::warn!("Failed fetching data for {} (session expired)", self.account);
            self.record = BillingRecord::session_expired(now);
            return self.record.clone();
        }

        let kind = PollKind::from_force(force);
        if !self.throttle.may_call(now, kind) {
            tracing::debug!(
                "Poll for {} throttled ({:?}), next allowed at {:?}",
                self.account,
                kind,
                self.throttle.next_allowed(kind)
            );
            return self.record.clone();
        }

        self.queries_issued += 1;
        let response = match self.source.fetch(&self.account).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Failed fetching data for {}: {e}", self.account);
                return self.record.clone();
            }
        };

        self.record = self.apply_response(now, &response);
        self.throttle.record_call(now, kind);
        self.record.clone()
    }

    fn apply_response(&mut self, now: DateTime<Utc>, response: &RawResponse) -> BillingRecord {
        match classify(response) {
            ResponseClass::Content(fields) => {
                self.expiration.mark_active();
                let result = if fields.is_empty() {
                    tracing::warn!("No bill table found for {}", self.account);
                    PollResult::NotFound
                } else {
                    PollResult::Success
                };
                BillingRecord::new(fields, result, now)
            }
            ResponseClass::NotFound => {
                tracing::warn!(
                    "Failed fetching data for {} (HTTP Status_code = 404)",
                    self.account
                );
                self.expire(now, PollResult::NotFound)
            }
            ResponseClass::Forbidden => {
                tracing::error!(
                    "Failed fetching data for {} (HTTP Status_code = 403). Token or Cookie is expired",
                    self.account
                );
                self.expire(now, PollResult::Forbidden)
            }
            ResponseClass::Other(status) => {
                tracing::error!(
                    "Failed fetching data for {} (HTTP Status_code = {status})",
                    self.account
                );
                self.expire(now, PollResult::Http(status))
            }
        }
    }

    fn expire(&mut self, now: DateTime<Utc>, result: PollResult) -> BillingRecord {
        self.expiration.mark_expired(now, result);
        BillingRecord::new(BillFields::new(), result, now)
    }
}
