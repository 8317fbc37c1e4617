//! Postgres implementation of the engine's [`FilingStore`] seam.
//!
//! Every mutation is a single-row conditional write; the cycle reset in
//! particular only applies while the persisted status is still `filed` and
//! the due date still matches the value the plan was computed from.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    EntityFiling, FilingFrequency, FilingStatus, FilingTask, NewFilingTask, Recipient, TaskPriority,
    TaskStatus,
};
use crate::recurrence::CycleReset;
use crate::store::{FilingStore, MalformedRecord, RowBatch};

/// Raw entity-filing row; status columns are plain text in the store.
#[derive(Debug, FromRow)]
struct EntityFilingRow {
    filing_id: Uuid,
    entity_id: Uuid,
    filing_type_id: Option<Uuid>,
    title: String,
    jurisdiction: Option<String>,
    due_date: NaiveDate,
    due_day: Option<i32>,
    filing_date: Option<NaiveDate>,
    frequency: String,
    amount: Option<Decimal>,
    confirmation_number: Option<String>,
    filed_by: Option<String>,
    status: String,
    reminder_days: Option<i32>,
}

impl EntityFilingRow {
    fn into_model(self) -> StoreResult<EntityFiling> {
        let frequency = FilingFrequency::parse(&self.frequency).ok_or_else(|| {
            StoreError::malformed(self.filing_id, format!("unknown frequency '{}'", self.frequency))
        })?;
        let status = FilingStatus::parse(&self.status).ok_or_else(|| {
            StoreError::malformed(self.filing_id, format!("unknown status '{}'", self.status))
        })?;
        Ok(EntityFiling {
            filing_id: self.filing_id,
            entity_id: self.entity_id,
            filing_type_id: self.filing_type_id,
            title: self.title,
            jurisdiction: self.jurisdiction,
            due_date: self.due_date,
            // Out-of-range anchors are rejected at plan time; a negative
            // column value collapses to 0, which is equally invalid there.
            due_day: self.due_day.map(|d| u32::try_from(d).unwrap_or(0)),
            filing_date: self.filing_date,
            frequency,
            amount: self.amount,
            confirmation_number: self.confirmation_number,
            filed_by: self.filed_by,
            status,
            reminder_days: self.reminder_days.and_then(|d| u16::try_from(d).ok()),
        })
    }
}

#[derive(Debug, FromRow)]
struct FilingTaskRow {
    task_id: Uuid,
    entity_id: Uuid,
    filing_id: Option<Uuid>,
    title: String,
    description: Option<String>,
    due_date: NaiveDate,
    priority: String,
    status: String,
    assigned_to: Option<Uuid>,
    is_auto_generated: bool,
}

impl FilingTaskRow {
    fn into_model(self) -> StoreResult<FilingTask> {
        let priority = TaskPriority::parse(&self.priority).ok_or_else(|| {
            StoreError::malformed(self.task_id, format!("unknown priority '{}'", self.priority))
        })?;
        let status = TaskStatus::parse(&self.status).ok_or_else(|| {
            StoreError::malformed(self.task_id, format!("unknown status '{}'", self.status))
        })?;
        Ok(FilingTask {
            task_id: self.task_id,
            entity_id: self.entity_id,
            filing_id: self.filing_id,
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            priority,
            status,
            assigned_to: self.assigned_to,
            is_auto_generated: self.is_auto_generated,
        })
    }
}

fn store_err(e: sqlx::Error) -> StoreError {
    let transient = matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Protocol(_)
    );
    StoreError::Database {
        message: e.to_string(),
        transient,
    }
}

/// Engine-facing store over the compliance schema.
#[derive(Clone, Debug)]
pub struct PgFilingStore {
    pool: PgPool,
}

impl PgFilingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FilingStore for PgFilingStore {
    async fn list_advance_candidates(&self) -> StoreResult<RowBatch<EntityFiling>> {
        let rows = sqlx::query_as::<_, EntityFilingRow>(
            r#"
            SELECT filing_id, entity_id, filing_type_id, title, jurisdiction, due_date, due_day,
                   filing_date, frequency, amount, confirmation_number, filed_by, status,
                   reminder_days
            FROM compliance.entity_filings
            WHERE status = 'filed' AND frequency <> 'one_time'
            ORDER BY due_date ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut batch = RowBatch::default();
        for row in rows {
            let id = row.filing_id;
            match row.into_model() {
                Ok(filing) => batch.rows.push(filing),
                Err(err) => {
                    warn!(filing = %id, %err, "Skipping undecodable filing row");
                    batch.malformed.push(MalformedRecord {
                        id,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(batch)
    }

    async fn apply_cycle_reset(&self, reset: &CycleReset) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE compliance.entity_filings
            SET due_date = $1,
                status = 'pending',
                filing_date = NULL,
                confirmation_number = NULL,
                updated_at = NOW()
            WHERE filing_id = $2 AND status = 'filed' AND due_date = $3
            "#,
        )
        .bind(reset.next_due_date)
        .bind(reset.filing_id)
        .bind(reset.previous_due_date)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_task(&self, task: &NewFilingTask) -> StoreResult<Uuid> {
        let task_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO compliance.filing_tasks
                (task_id, entity_id, filing_id, title, description, due_date, priority, status,
                 assigned_to, is_auto_generated, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, NOW())
            "#,
        )
        .bind(task_id)
        .bind(task.entity_id)
        .bind(task.filing_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_date)
        .bind(task.priority.as_str())
        .bind(task.assigned_to)
        .bind(task.is_auto_generated)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(task_id)
    }

    async fn list_open_tasks_due(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<RowBatch<FilingTask>> {
        let rows = sqlx::query_as::<_, FilingTaskRow>(
            r#"
            SELECT task_id, entity_id, filing_id, title, description, due_date, priority, status,
                   assigned_to, is_auto_generated
            FROM compliance.filing_tasks
            WHERE status IN ('pending', 'in_progress') AND due_date BETWEEN $1 AND $2
            ORDER BY due_date ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut batch = RowBatch::default();
        for row in rows {
            let id = row.task_id;
            match row.into_model() {
                Ok(task) => batch.rows.push(task),
                Err(err) => {
                    warn!(task = %id, %err, "Skipping undecodable task row");
                    batch.malformed.push(MalformedRecord {
                        id,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(batch)
    }

    async fn reminder_overrides(&self) -> StoreResult<HashMap<Uuid, u16>> {
        let rows = sqlx::query_as::<_, (Uuid, i32)>(
            r#"
            SELECT filing_id, reminder_days
            FROM compliance.entity_filings
            WHERE reminder_days IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, days)| u16::try_from(days).ok().map(|d| (id, d)))
            .collect())
    }

    async fn list_recipients(&self) -> StoreResult<Vec<Recipient>> {
        let rows = sqlx::query_as::<_, (Uuid, String, String)>(
            r#"
            SELECT user_id, display_name, email
            FROM compliance.portal_users
            WHERE role = 'admin' AND active = TRUE AND email IS NOT NULL
            ORDER BY display_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .into_iter()
            .map(|(user_id, display_name, email)| Recipient {
                user_id,
                display_name,
                email,
            })
            .collect())
    }

    async fn entity_names(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, String>> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT entity_id, legal_name
            FROM compliance.entities
            WHERE entity_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.into_iter().collect())
    }
}
