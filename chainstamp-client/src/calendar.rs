//! Calendar server transport
//!
//! A calendar accepts digests for aggregation and later serves the proof
//! fragment that links a digest to a ledger commitment. The wire protocol
//! is plain HTTP: `POST {url}/digest` with the raw digest as the body, and
//! `GET {url}/timestamp/{hex-digest}` for the upgrade fragment. Both return
//! a serialized proof fragment rooted at the submitted digest.

use async_trait::async_trait;
use chainstamp_core::{parse_fragment, ParseError};
use chainstamp_types::ProofTree;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Media type of serialized proof fragments.
pub const ACCEPT_PROOF: &str = "application/vnd.chainstamp.v1";

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Calendar unreachable: {0}")]
    Unreachable(String),

    #[error("Calendar has no attestation for this digest yet")]
    NoAttestationYet,

    #[error("Calendar returned a malformed fragment: {0}")]
    MalformedResponse(#[from] ParseError),

    #[error("Calendar request timed out")]
    Timeout,
}

impl CalendarError {
    /// Transient errors are worth retrying on a later pass; protocol errors
    /// are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CalendarError::Unreachable(_)
                | CalendarError::NoAttestationYet
                | CalendarError::Timeout
        )
    }
}

/// A remote aggregation server.
///
/// Both operations return a proof fragment rooted at `digest`; the caller
/// merges it into its own tree. The trait seam exists so the submission
/// engine can be driven by stub calendars in tests.
#[async_trait]
pub trait Calendar: Send + Sync {
    /// The calendar's base URL, recorded in pending attestations.
    fn url(&self) -> &str;

    /// Submit `digest` for aggregation.
    async fn submit(&self, digest: &[u8]) -> Result<ProofTree, CalendarError>;

    /// Fetch the current proof fragment for a previously submitted digest.
    async fn query(&self, digest: &[u8]) -> Result<ProofTree, CalendarError>;
}

/// [`Calendar`] over HTTP via a shared connection pool.
pub struct HttpCalendar {
    url: String,
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpCalendar {
    /// Build a calendar handle with its own connection pool and `timeout`
    /// applied to every request.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let url = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            timeout,
        }
    }

    fn net_err(err: reqwest::Error) -> CalendarError {
        if err.is_timeout() {
            CalendarError::Timeout
        } else {
            CalendarError::Unreachable(err.to_string())
        }
    }

    async fn fragment_from(
        &self,
        response: reqwest::Response,
        digest: &[u8],
    ) -> Result<ProofTree, CalendarError> {
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CalendarError::NoAttestationYet);
        }
        let response = response
            .error_for_status()
            .map_err(|e| CalendarError::Unreachable(e.to_string()))?;
        let body = response.bytes().await.map_err(Self::net_err)?;
        Ok(parse_fragment(&body, digest)?)
    }
}

#[async_trait]
impl Calendar for HttpCalendar {
    fn url(&self) -> &str {
        &self.url
    }

    async fn submit(&self, digest: &[u8]) -> Result<ProofTree, CalendarError> {
        debug!(url = %self.url, digest = %hex::encode(digest), "submitting digest");
        let response = self
            .http
            .post(format!("{}/digest", self.url))
            .header(reqwest::header::ACCEPT, ACCEPT_PROOF)
            .timeout(self.timeout)
            .body(digest.to_vec())
            .send()
            .await
            .map_err(Self::net_err)?;
        self.fragment_from(response, digest).await
    }

    async fn query(&self, digest: &[u8]) -> Result<ProofTree, CalendarError> {
        debug!(url = %self.url, digest = %hex::encode(digest), "querying for fragment");
        let response = self
            .http
            .get(format!("{}/timestamp/{}", self.url, hex::encode(digest)))
            .header(reqwest::header::ACCEPT, ACCEPT_PROOF)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(Self::net_err)?;
        self.fragment_from(response, digest).await
    }
}
