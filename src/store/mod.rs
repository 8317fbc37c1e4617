//! Records-store seam.
//!
//! The engine never talks to the database directly; it goes through
//! [`FilingStore`], which the sqlx layer implements in production and
//! [`MemoryFilingStore`] implements in-process for tests and demos. All
//! mutations are single-row conditional writes; there is no lock spanning a
//! batch.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{EntityFiling, FilingTask, NewFilingTask, Recipient};
use crate::recurrence::CycleReset;

pub mod memory;

pub use memory::MemoryFilingStore;

/// A row that could not be decoded into its domain record, reported per
/// item so a pass can record it without aborting the batch.
#[derive(Debug, Clone)]
pub struct MalformedRecord {
    pub id: Uuid,
    pub message: String,
}

/// A fetched batch: the rows that decoded cleanly plus the ones that did
/// not. One bad row never hides the rest of the set.
#[derive(Debug, Clone)]
pub struct RowBatch<T> {
    pub rows: Vec<T>,
    pub malformed: Vec<MalformedRecord>,
}

impl<T> RowBatch<T> {
    pub fn from_rows(rows: Vec<T>) -> Self {
        Self {
            rows,
            malformed: Vec::new(),
        }
    }
}

impl<T> Default for RowBatch<T> {
    fn default() -> Self {
        Self::from_rows(Vec::new())
    }
}

#[async_trait]
pub trait FilingStore: Send + Sync {
    /// Filings eligible for recurrence advancement: persisted status `filed`
    /// and a recurring frequency. Rows that fail to decode are returned in
    /// the batch's `malformed` list, not as an error.
    async fn list_advance_candidates(&self) -> StoreResult<RowBatch<EntityFiling>>;

    /// Conditionally reset a filing to its next cycle: new due date,
    /// persisted status back to `pending`, `filing_date` and
    /// `confirmation_number` cleared.
    ///
    /// The write applies only while the persisted status is still `filed`
    /// and the due date still equals `reset.previous_due_date`; returns
    /// whether a row was updated. This is the optimistic guard that keeps
    /// overlapping invocations from double-advancing a cycle.
    async fn apply_cycle_reset(&self, reset: &CycleReset) -> StoreResult<bool>;

    async fn insert_task(&self, task: &NewFilingTask) -> StoreResult<Uuid>;

    /// Open tasks (`pending`/`in_progress`) with due dates inside the
    /// inclusive window. Undecodable rows land in `malformed`.
    async fn list_open_tasks_due(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<RowBatch<FilingTask>>;

    /// Per-filing reminder-horizon overrides (filing id -> days).
    async fn reminder_overrides(&self) -> StoreResult<HashMap<Uuid, u16>>;

    /// Valid notification recipients.
    async fn list_recipients(&self) -> StoreResult<Vec<Recipient>>;

    /// Display names for the given entities; unknown ids are simply absent
    /// from the result.
    async fn entity_names(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, String>>;
}
