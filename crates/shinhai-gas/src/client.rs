//! Bill query transport.
//!
//! [`BillingSource`] is the seam the poller talks to; [`HttpBillingSource`]
//! is the reqwest implementation that POSTs the account segments to the
//! billing query page. No retries here: a failed query is reported once
//! and the next scheduled cycle tries again.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::{AccountId, GasError, GasResult};

/// Billing query page.
pub const BASE_URL: &str = "http://www.shinhaigas.com.tw/billquery.php";

/// Browser user-agent the billing site expects.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                              AppleWebKit/537.36 (KHTML, like Gecko) \
                              Chrome/90.0.4430.72 Safari/537.36 OPR/38.0.2220.41";

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Status and body of a bill query.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Anything that can answer a bill query for an account.
#[async_trait]
pub trait BillingSource: Send + Sync {
    /// Issue one query. Errors are transport failures only; HTTP error
    /// statuses come back as a [`RawResponse`].
    async fn fetch(&self, account: &AccountId) -> GasResult<RawResponse>;
}

/// HTTP bill query client.
#[derive(Clone)]
pub struct HttpBillingSource {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpBillingSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> GasResult<Self> {
        let endpoint = endpoint.into();
        reqwest::Url::parse(&endpoint)
            .map_err(|e| GasError::Config(format!("invalid endpoint {endpoint:?}: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GasError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    /// Client for the production endpoint with the default timeout.
    pub fn with_defaults() -> GasResult<Self> {
        Self::new(BASE_URL, REQUEST_TIMEOUT)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn transport_error(&self, err: reqwest::Error) -> GasError {
        if err.is_timeout() {
            GasError::Timeout(self.timeout)
        } else {
            GasError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl BillingSource for HttpBillingSource {
    async fn fetch(&self, account: &AccountId) -> GasResult<RawResponse> {
        let segments = account.segments();
        let fields = segments.query_fields();

        // The site reads the segments from the query string and the form body.
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&fields)
            .form(&fields)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;

        tracing::debug!(
            "bill query for {account} returned HTTP {status} ({} bytes)",
            body.len()
        );

        Ok(RawResponse { status, body })
    }
}
