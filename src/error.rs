//! Error handling for the filing lifecycle engine.
//!
//! This module provides idiomatic Rust error types using thiserror, split by
//! the layer that produces them. Per-item failures during a scheduled pass
//! are recorded against the item and never abort the batch; only an inability
//! to load the initial candidate set aborts a whole run.

use thiserror::Error;
use uuid::Uuid;

/// Hard failures that abort an entire scheduled pass.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to load advancement candidates: {0}")]
    CandidateLoad(#[source] StoreError),
}

/// Failures reported by the records store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {message}")]
    Database { message: String, transient: bool },

    #[error("malformed record {id}: {message}")]
    Malformed { id: Uuid, message: String },
}

impl StoreError {
    /// Transient errors are retried within a pass; everything else is
    /// surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database { transient: true, .. })
    }

    pub fn malformed(id: Uuid, message: impl Into<String>) -> Self {
        Self::Malformed {
            id,
            message: message.into(),
        }
    }
}

/// Configuration errors raised while computing a recurrence advancement.
///
/// These are recorded against the filing and skipped; the filing row is left
/// untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceError {
    #[error("filing is one-time and is never advanced")]
    OneTime,

    #[error("filing is not in filed status")]
    NotFiled,

    #[error("due_day {due_day} is outside 1..=31")]
    InvalidDueDay { due_day: u32 },

    #[error("advanced date {year}-{month:02} is out of supported range")]
    DateOutOfRange { year: i32, month: u32 },
}

/// Notification transport failures, collected per recipient.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("send to {recipient} failed: {message}")]
    SendFailed { recipient: String, message: String },
}

/// Result type aliases for convenience
pub type EngineResult<T> = Result<T, EngineError>;
pub type StoreResult<T> = Result<T, StoreError>;
