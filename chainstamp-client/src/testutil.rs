//! Test utilities: an in-process stub calendar.
//!
//! [`StubCalendar`] implements the [`Calendar`] trait without any network,
//! so the submission engine can be exercised against scripted success,
//! failure and latency behavior.
//!
//! Enabled via the `test-util` feature flag.

use crate::calendar::{Calendar, CalendarError};
use async_trait::async_trait;
use chainstamp_types::{Attestation, ProofTree};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How the stub answers submissions.
#[derive(Debug, Clone, Copy)]
pub enum SubmitMode {
    /// Return a fragment carrying a pending attestation for this calendar.
    AcceptPending,
    /// Fail every request as a network error.
    Unreachable,
}

/// Scripted in-process calendar.
pub struct StubCalendar {
    url: String,
    delay: Duration,
    submit_mode: SubmitMode,
    /// Upgrade fragments served by `query`, keyed by digest.
    responses: Mutex<HashMap<Vec<u8>, ProofTree>>,
    submit_count: AtomicUsize,
    query_count: AtomicUsize,
}

impl StubCalendar {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            delay: Duration::ZERO,
            submit_mode: SubmitMode::AcceptPending,
            responses: Mutex::new(HashMap::new()),
            submit_count: AtomicUsize::new(0),
            query_count: AtomicUsize::new(0),
        }
    }

    /// Add latency to every request. Combined with a short client timeout
    /// this simulates a calendar that never answers in time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_submit_mode(mut self, mode: SubmitMode) -> Self {
        self.submit_mode = mode;
        self
    }

    /// Script the fragment `query` returns for `digest`. Digests without a
    /// scripted fragment answer "not found yet".
    pub fn set_response(&self, digest: Vec<u8>, fragment: ProofTree) {
        self.responses
            .lock()
            .expect("stub response lock poisoned")
            .insert(digest, fragment);
    }

    pub fn submit_count(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Calendar for StubCalendar {
    fn url(&self) -> &str {
        &self.url
    }

    async fn submit(&self, digest: &[u8]) -> Result<ProofTree, CalendarError> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.submit_mode {
            SubmitMode::AcceptPending => {
                let mut fragment = ProofTree::new(digest.to_vec());
                let root = fragment.root();
                fragment.add_attestation(
                    root,
                    Attestation::Pending {
                        uri: self.url.clone(),
                    },
                );
                Ok(fragment)
            }
            SubmitMode::Unreachable => {
                Err(CalendarError::Unreachable("connection refused".to_string()))
            }
        }
    }

    async fn query(&self, digest: &[u8]) -> Result<ProofTree, CalendarError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .expect("stub response lock poisoned")
            .get(digest)
            .cloned()
            .ok_or(CalendarError::NoAttestationYet)
    }
}
