//! Agent error types.

use shinhai_gas::GasError;

#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("No account id configured. Pass --account, set SHINHAI_GAS_ACCOUNT, or add \"account\" to the config file")]
    MissingAccount,

    #[error(transparent)]
    Gas(#[from] GasError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;
