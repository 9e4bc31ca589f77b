//! Dual-cadence throttle for outbound bill queries.
//!
//! Normal polls need 24 hours since the last completed query of any kind.
//! Forced polls need 12 hours since the last forced query and ignore the
//! normal cadence. Timestamps move only when a query actually reached the
//! remote side.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum time between normal polls.
pub const MIN_TIME_BETWEEN_UPDATES: Duration = Duration::from_secs(24 * 60 * 60);
/// Minimum time between forced polls.
pub const MIN_TIME_BETWEEN_FORCED_UPDATES: Duration = Duration::from_secs(12 * 60 * 60);

/// Which cadence a poll belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollKind {
    Normal,
    Forced,
}

impl PollKind {
    pub fn from_force(force: bool) -> Self {
        if force {
            Self::Forced
        } else {
            Self::Normal
        }
    }

    pub fn is_forced(self) -> bool {
        self == Self::Forced
    }
}

/// Gate deciding whether a poll may touch the network.
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    normal_interval: Duration,
    forced_interval: Duration,
    last_normal: Option<DateTime<Utc>>,
    last_forced: Option<DateTime<Utc>>,
}

impl ThrottleGate {
    pub fn new(normal_interval: Duration, forced_interval: Duration) -> Self {
        Self {
            normal_interval,
            forced_interval,
            last_normal: None,
            last_forced: None,
        }
    }

    /// Whether a poll of `kind` issued at `now` may proceed.
    pub fn may_call(&self, now: DateTime<Utc>, kind: PollKind) -> bool {
        match self.last_call(kind) {
            None => true,
            Some(last) => elapsed(last, now) >= self.interval(kind),
        }
    }

    /// Record a query that reached the remote side.
    ///
    /// Every query resets the normal cadence; forced queries also reset
    /// the forced cadence.
    pub fn record_call(&mut self, now: DateTime<Utc>, kind: PollKind) {
        self.last_normal = Some(now);
        if kind.is_forced() {
            self.last_forced = Some(now);
        }
    }

    /// Forget the last forced query so the next forced poll may go out
    /// immediately. The normal cadence is untouched.
    pub fn clear_forced(&mut self) {
        self.last_forced = None;
    }

    pub fn last_call(&self, kind: PollKind) -> Option<DateTime<Utc>> {
        match kind {
            PollKind::Normal => self.last_normal,
            PollKind::Forced => self.last_forced,
        }
    }

    pub fn interval(&self, kind: PollKind) -> Duration {
        match kind {
            PollKind::Normal => self.normal_interval,
            PollKind::Forced => self.forced_interval,
        }
    }

    /// Earliest instant a poll of `kind` will be allowed, `None` if it
    /// already is.
    pub fn next_allowed(&self, kind: PollKind) -> Option<DateTime<Utc>> {
        let last = self.last_call(kind)?;
        let step = chrono::Duration::from_std(self.interval(kind)).ok()?;
        Some(last + step)
    }
}

impl Default for ThrottleGate {
    fn default() -> Self {
        Self::new(MIN_TIME_BETWEEN_UPDATES, MIN_TIME_BETWEEN_FORCED_UPDATES)
    }
}

/// Time since `last`; a clock that moved backwards counts as no time.
fn elapsed(last: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - last).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn hours(h: i64) -> chrono::Duration {
        chrono::Duration::hours(h)
    }

    #[test]
    fn test_first_call_always_allowed() {
        let gate = ThrottleGate::default();
        assert!(gate.may_call(t0(), PollKind::Normal));
        assert!(gate.may_call(t0(), PollKind::Forced));
        assert_eq!(gate.next_allowed(PollKind::Normal), None);
    }

    #[test]
    fn test_normal_floor_boundaries() {
        let mut gate = ThrottleGate::default();
        gate.record_call(t0(), PollKind::Normal);

        for h in [0, 1, 12, 23] {
            assert!(!gate.may_call(t0() + hours(h), PollKind::Normal), "{h}h");
        }
        let just_before = t0() + hours(24) - chrono::Duration::seconds(1);
        assert!(!gate.may_call(just_before, PollKind::Normal));
        assert!(gate.may_call(t0() + hours(24), PollKind::Normal));
        assert!(gate.may_call(t0() + hours(48), PollKind::Normal));
    }

    #[test]
    fn test_forced_floor_boundaries() {
        let mut gate = ThrottleGate::default();
        gate.record_call(t0(), PollKind::Forced);

        assert!(!gate.may_call(t0() + hours(11), PollKind::Forced));
        assert!(gate.may_call(t0() + hours(12), PollKind::Forced));
        assert_eq!(gate.next_allowed(PollKind::Forced), Some(t0() + hours(12)));
    }

    #[test]
    fn test_forced_ignores_normal_cadence() {
        let mut gate = ThrottleGate::default();
        gate.record_call(t0(), PollKind::Normal);
        assert!(gate.may_call(t0() + hours(1), PollKind::Forced));
    }

    #[test]
    fn test_forced_call_resets_normal_cadence() {
        let mut gate = ThrottleGate::default();
        gate.record_call(t0(), PollKind::Forced);
        assert!(!gate.may_call(t0() + hours(13), PollKind::Normal));
        assert!(gate.may_call(t0() + hours(24), PollKind::Normal));
    }

    #[test]
    fn test_clear_forced_reopens_forced_only() {
        let mut gate = ThrottleGate::default();
        gate.record_call(t0(), PollKind::Forced);
        gate.clear_forced();

        assert!(gate.may_call(t0() + hours(1), PollKind::Forced));
        assert!(!gate.may_call(t0() + hours(1), PollKind::Normal));
        assert_eq!(gate.last_call(PollKind::Forced), None);
    }

    #[test]
    fn test_clock_skew_disallows() {
        let mut gate = ThrottleGate::default();
        gate.record_call(t0(), PollKind::Normal);
        assert!(!gate.may_call(t0() - hours(30), PollKind::Normal));
    }

    #[test]
    fn test_zero_interval_never_blocks() {
        let mut gate = ThrottleGate::new(Duration::ZERO, Duration::ZERO);
        gate.record_call(t0(), PollKind::Forced);
        assert!(gate.may_call(t0(), PollKind::Normal));
        assert!(gate.may_call(t0(), PollKind::Forced));
    }
}
