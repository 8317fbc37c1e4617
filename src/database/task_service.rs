//! Filing Task Service - CRUD operations for actionable work items
//!
//! Tasks are created manually or auto-generated by the engine, mutated by
//! completion or cancellation, and never auto-deleted. Unlinking a task from
//! its filing does not delete the task.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

/// Filing task record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FilingTaskRecord {
    pub task_id: Uuid,
    pub entity_id: Uuid,
    pub filing_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub priority: String,
    pub status: String,
    pub assigned_to: Option<Uuid>,
    pub is_auto_generated: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields for creating a task
#[derive(Debug, Clone)]
pub struct NewFilingTaskFields {
    pub entity_id: Uuid,
    pub filing_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub priority: String,
    pub assigned_to: Option<Uuid>,
}

/// Service for task operations
#[derive(Clone, Debug)]
pub struct FilingTaskService {
    pool: PgPool,
}

impl FilingTaskService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a task
    pub async fn create_task(&self, fields: &NewFilingTaskFields) -> Result<Uuid> {
        let task_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO compliance.filing_tasks
                (task_id, entity_id, filing_id, title, description, due_date, priority, status,
                 assigned_to, is_auto_generated, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, FALSE, NOW())
            "#,
        )
        .bind(task_id)
        .bind(fields.entity_id)
        .bind(fields.filing_id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.due_date)
        .bind(&fields.priority)
        .bind(fields.assigned_to)
        .execute(&self.pool)
        .await
        .context("Failed to create task")?;

        info!(
            "Created task '{}' ({}) for entity {} due {}",
            fields.title, task_id, fields.entity_id, fields.due_date
        );

        Ok(task_id)
    }

    /// Get task by ID
    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<FilingTaskRecord>> {
        let result = sqlx::query_as::<_, FilingTaskRecord>(
            r#"
            SELECT task_id, entity_id, filing_id, title, description, due_date, priority, status,
                   assigned_to, is_auto_generated, completed_at, created_at
            FROM compliance.filing_tasks
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get task by ID")?;

        Ok(result)
    }

    /// List tasks for an entity, soonest due first
    pub async fn list_for_entity(&self, entity_id: Uuid) -> Result<Vec<FilingTaskRecord>> {
        let results = sqlx::query_as::<_, FilingTaskRecord>(
            r#"
            SELECT task_id, entity_id, filing_id, title, description, due_date, priority, status,
                   assigned_to, is_auto_generated, completed_at, created_at
            FROM compliance.filing_tasks
            WHERE entity_id = $1
            ORDER BY due_date ASC
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tasks for entity")?;

        Ok(results)
    }

    /// Complete an open task
    pub async fn complete_task(&self, task_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE compliance.filing_tasks
            SET status = 'completed', completed_at = NOW()
            WHERE task_id = $1 AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("Failed to complete task")?;

        if result.rows_affected() > 0 {
            info!("Completed task {}", task_id);
        }

        Ok(result.rows_affected() > 0)
    }

    /// Cancel an open task
    pub async fn cancel_task(&self, task_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE compliance.filing_tasks
            SET status = 'cancelled'
            WHERE task_id = $1 AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("Failed to cancel task")?;

        if result.rows_affected() > 0 {
            info!("Cancelled task {}", task_id);
        }

        Ok(result.rows_affected() > 0)
    }

    /// Reassign a task; `assigned_to = NULL` makes it eligible for fan-out
    pub async fn reassign_task(&self, task_id: Uuid, assigned_to: Option<Uuid>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE compliance.filing_tasks
            SET assigned_to = $1
            WHERE task_id = $2
            "#,
        )
        .bind(assigned_to)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("Failed to reassign task")?;

        if result.rows_affected() > 0 {
            info!("Reassigned task {} to {:?}", task_id, assigned_to);
        }

        Ok(result.rows_affected() > 0)
    }

    /// Detach a task from its filing without deleting it
    pub async fn unlink_from_filing(&self, task_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE compliance.filing_tasks
            SET filing_id = NULL
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("Failed to unlink task from filing")?;

        Ok(result.rows_affected() > 0)
    }
}
