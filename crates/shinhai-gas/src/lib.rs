//! ShinHai Gas: core polling engine for the bill query page, with throttled fetches, session expiry tracking, and bill table extraction.

pub mod client;
pub mod expiry;
pub mod extractor;
pub mod poller;
pub mod scheduler;
pub mod sensor;
pub mod testing;
pub mod throttle;
pub mod types;

pub use client::{BillingSource, HttpBillingSource, RawResponse, BASE_URL, REQUEST_TIMEOUT};
pub use expiry::{ExpirationState, SessionState};
pub use extractor::extract_bill_fields;
pub use poller::{classify, Poller, ResponseClass};
pub use scheduler::{
    spawn, FastRecovery, PollOutcome, SchedulerCommand, SchedulerConfig, SchedulerHandle,
    SharedPoller,
};
pub use sensor::{BillAttribute, BillingSensor, SensorSnapshot};
pub use throttle::{PollKind, ThrottleGate};
pub use types::*;
