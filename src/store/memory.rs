//! In-memory [`FilingStore`] used by the integration tests and demos.
//!
//! Mirrors the conditional-write semantics of the Postgres layer, including
//! the optimistic guard on cycle resets, and can inject transient failures
//! to exercise the scheduler's retry path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    EntityFiling, FilingFrequency, FilingStatus, FilingTask, NewFilingTask, Recipient, TaskStatus,
};
use crate::recurrence::CycleReset;
use crate::store::{FilingStore, RowBatch};

#[derive(Debug, Default)]
struct Inner {
    filings: HashMap<Uuid, EntityFiling>,
    tasks: HashMap<Uuid, FilingTask>,
    recipients: Vec<Recipient>,
    entity_names: HashMap<Uuid, String>,
    /// Remaining store calls that fail with a transient error.
    transient_failures: u32,
}

/// Cloneable handle over shared state, so a test can keep inspecting the
/// store after handing a clone to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilingStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryFilingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_filing(&self, filing: EntityFiling) {
        let mut inner = self.inner.lock().unwrap();
        inner.filings.insert(filing.filing_id, filing);
    }

    pub fn insert_existing_task(&self, task: FilingTask) {
        let mut inner = self.inner.lock().unwrap();
        inner.tasks.insert(task.task_id, task);
    }

    pub fn add_recipient(&self, recipient: Recipient) {
        self.inner.lock().unwrap().recipients.push(recipient);
    }

    pub fn set_entity_name(&self, entity_id: Uuid, name: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .entity_names
            .insert(entity_id, name.into());
    }

    pub fn filing(&self, filing_id: Uuid) -> Option<EntityFiling> {
        self.inner.lock().unwrap().filings.get(&filing_id).cloned()
    }

    pub fn tasks_for_filing(&self, filing_id: Uuid) -> Vec<FilingTask> {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .values()
            .filter(|t| t.filing_id == Some(filing_id))
            .cloned()
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.inner.lock().unwrap().tasks.len()
    }

    /// The next `n` store calls fail with a transient database error.
    pub fn inject_transient_failures(&self, n: u32) {
        self.inner.lock().unwrap().transient_failures = n;
    }

    fn maybe_fail(inner: &mut Inner) -> StoreResult<()> {
        if inner.transient_failures > 0 {
            inner.transient_failures -= 1;
            return Err(StoreError::Database {
                message: "injected transient failure".to_string(),
                transient: true,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FilingStore for MemoryFilingStore {
    async fn list_advance_candidates(&self) -> StoreResult<RowBatch<EntityFiling>> {
        let mut inner = self.inner.lock().unwrap();
        Self::maybe_fail(&mut inner)?;
        let mut candidates: Vec<EntityFiling> = inner
            .filings
            .values()
            .filter(|f| {
                f.status == FilingStatus::Filed && f.frequency != FilingFrequency::OneTime
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|f| (f.due_date, f.filing_id));
        Ok(RowBatch::from_rows(candidates))
    }

    async fn apply_cycle_reset(&self, reset: &CycleReset) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Self::maybe_fail(&mut inner)?;
        let Some(filing) = inner.filings.get_mut(&reset.filing_id) else {
            return Ok(false);
        };
        if filing.status != FilingStatus::Filed || filing.due_date != reset.previous_due_date {
            return Ok(false);
        }
        filing.due_date = reset.next_due_date;
        filing.status = FilingStatus::Pending;
        filing.filing_date = None;
        filing.confirmation_number = None;
        Ok(true)
    }

    async fn insert_task(&self, task: &NewFilingTask) -> StoreResult<Uuid> {
        let mut inner = self.inner.lock().unwrap();
        Self::maybe_fail(&mut inner)?;
        let task_id = Uuid::new_v4();
        inner.tasks.insert(
            task_id,
            FilingTask {
                task_id,
                entity_id: task.entity_id,
                filing_id: task.filing_id,
                title: task.title.clone(),
                description: task.description.clone(),
                due_date: task.due_date,
                priority: task.priority,
                status: TaskStatus::Pending,
                assigned_to: task.assigned_to,
                is_auto_generated: task.is_auto_generated,
            },
        );
        Ok(task_id)
    }

    async fn list_open_tasks_due(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<RowBatch<FilingTask>> {
        let mut inner = self.inner.lock().unwrap();
        Self::maybe_fail(&mut inner)?;
        let mut tasks: Vec<FilingTask> = inner
            .tasks
            .values()
            .filter(|t| t.status.is_open() && t.due_date >= from && t.due_date <= to)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.due_date, t.task_id));
        Ok(RowBatch::from_rows(tasks))
    }

    async fn reminder_overrides(&self) -> StoreResult<HashMap<Uuid, u16>> {
        let mut inner = self.inner.lock().unwrap();
        Self::maybe_fail(&mut inner)?;
        Ok(inner
            .filings
            .values()
            .filter_map(|f| f.reminder_days.map(|d| (f.filing_id, d)))
            .collect())
    }

    async fn list_recipients(&self) -> StoreResult<Vec<Recipient>> {
        let mut inner = self.inner.lock().unwrap();
        Self::maybe_fail(&mut inner)?;
        Ok(inner.recipients.clone())
    }

    async fn entity_names(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, String>> {
        let mut inner = self.inner.lock().unwrap();
        Self::maybe_fail(&mut inner)?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.entity_names.get(id).map(|n| (*id, n.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn filed_quarterly(due: NaiveDate) -> EntityFiling {
        EntityFiling {
            filing_id: Uuid::new_v4(),
            entity_id: Uuid::new_v4(),
            filing_type_id: None,
            title: "Quarterly tax".to_string(),
            jurisdiction: None,
            due_date: due,
            due_day: None,
            filing_date: Some(due),
            frequency: FilingFrequency::Quarterly,
            amount: None,
            confirmation_number: Some("C1".to_string()),
            filed_by: Some("ops".to_string()),
            status: FilingStatus::Filed,
            reminder_days: None,
        }
    }

    #[tokio::test]
    async fn cycle_reset_is_conditional_on_previous_due_date() {
        let store = MemoryFilingStore::new();
        let filing = filed_quarterly(date(2025, 3, 31));
        let id = filing.filing_id;
        store.insert_filing(filing);

        let reset = CycleReset {
            filing_id: id,
            previous_due_date: date(2025, 3, 31),
            next_due_date: date(2025, 6, 30),
        };
        assert!(store.apply_cycle_reset(&reset).await.unwrap());

        // Second application no longer matches: status is pending and the
        // due date moved on.
        assert!(!store.apply_cycle_reset(&reset).await.unwrap());

        let stored = store.filing(id).unwrap();
        assert_eq!(stored.due_date, date(2025, 6, 30));
        assert_eq!(stored.status, FilingStatus::Pending);
        assert_eq!(stored.filing_date, None);
        assert_eq!(stored.confirmation_number, None);
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_bounded() {
        let store = MemoryFilingStore::new();
        store.inject_transient_failures(1);

        let err = store.list_recipients().await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.list_recipients().await.is_ok());
    }
}
