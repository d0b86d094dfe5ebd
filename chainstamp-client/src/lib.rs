//! Calendar client library for chainstamp
//!
//! Coordinates proof submission and upgrade across remote calendar servers:
//! the [`Calendar`] transport contract and its HTTP implementation, the
//! concurrent submission engine, and a byte-level API for binding layers.

pub mod api;
pub mod calendar;
pub mod client;
#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use calendar::{Calendar, CalendarError, HttpCalendar, ACCEPT_PROOF};
pub use client::{
    stamp, stamp_batch, submit, submit_at, upgrade, CalendarWarning, ClientConfig, UpgradeReport,
};

use chainstamp_core::{ParseError, SerializeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No calendar accepted the submission ({attempted} attempted)")]
    NoCalendarAvailable {
        attempted: usize,
        warnings: Vec<CalendarWarning>,
    },

    #[error("Invalid proof: {0}")]
    InvalidProof(#[from] ParseError),

    #[error("Could not encode proof: {0}")]
    Encode(#[from] SerializeError),

    #[error("Proof integrity error: {0}")]
    Integrity(#[from] chainstamp_types::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
