//! ShinHai Gas agent: configuration, scheduling loop, and one-shot commands around the core poller.

pub mod agent;
pub mod config;
pub mod error;

pub use agent::{build_poller, fetch_once, info, parse_file, run_scheduler, serve};
pub use config::{resolve, AgentConfig, FileConfig, Overrides};
pub use error::{AgentError, AgentResult};
