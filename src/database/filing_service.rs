//! Entity Filing Service - CRUD operations for obligation instances
//!
//! Filings are created manually or from a catalog entry's defaults, mutated
//! on completion, and reset by the scheduler's recurrence pass. A filing is
//! never hard-deleted while a task still references it.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::status::classify_priority;

/// Entity filing record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityFilingRecord {
    pub filing_id: Uuid,
    pub entity_id: Uuid,
    pub filing_type_id: Option<Uuid>,
    pub title: String,
    pub jurisdiction: Option<String>,
    pub due_date: NaiveDate,
    pub due_day: Option<i32>,
    pub filing_date: Option<NaiveDate>,
    pub frequency: String,
    pub amount: Option<Decimal>,
    pub confirmation_number: Option<String>,
    pub filed_by: Option<String>,
    pub status: String,
    pub reminder_days: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields for creating a filing
#[derive(Debug, Clone)]
pub struct NewEntityFilingFields {
    pub entity_id: Uuid,
    pub filing_type_id: Option<Uuid>,
    pub title: String,
    pub jurisdiction: Option<String>,
    pub due_date: NaiveDate,
    pub due_day: Option<i32>,
    pub frequency: String,
    pub amount: Option<Decimal>,
    pub reminder_days: Option<i32>,
}

/// Service for entity-filing operations
#[derive(Clone, Debug)]
pub struct EntityFilingService {
    pool: PgPool,
}

impl EntityFilingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a filing
    pub async fn create_filing(&self, fields: &NewEntityFilingFields) -> Result<Uuid> {
        let filing_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO compliance.entity_filings
                (filing_id, entity_id, filing_type_id, title, jurisdiction, due_date, due_day,
                 frequency, amount, reminder_days, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', NOW(), NOW())
            "#,
        )
        .bind(filing_id)
        .bind(fields.entity_id)
        .bind(fields.filing_type_id)
        .bind(&fields.title)
        .bind(&fields.jurisdiction)
        .bind(fields.due_date)
        .bind(fields.due_day)
        .bind(&fields.frequency)
        .bind(fields.amount)
        .bind(fields.reminder_days)
        .execute(&self.pool)
        .await
        .context("Failed to create filing")?;

        info!(
            "Created filing '{}' ({}) for entity {} due {}",
            fields.title, filing_id, fields.entity_id, fields.due_date
        );

        Ok(filing_id)
    }

    /// Create a filing from a catalog entry's defaults
    pub async fn create_from_type(
        &self,
        entity_id: Uuid,
        type_code: &str,
        due_date: NaiveDate,
        jurisdiction: Option<&str>,
    ) -> Result<Uuid> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            r#"
            SELECT filing_type_id, display_name, default_frequency
            FROM compliance.filing_types
            WHERE code = $1
            "#,
        )
        .bind(type_code)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up filing type")?
        .with_context(|| format!("Filing type '{}' not found", type_code))?;

        let (filing_type_id, display_name, default_frequency) = row;
        self.create_filing(&NewEntityFilingFields {
            entity_id,
            filing_type_id: Some(filing_type_id),
            title: display_name,
            jurisdiction: jurisdiction.map(str::to_string),
            due_date,
            due_day: None,
            frequency: default_frequency,
            amount: None,
            reminder_days: None,
        })
        .await
    }

    /// Create a filing and, when the engine config asks for it, seed a
    /// pending auto-generated task due on the filing due date.
    pub async fn create_with_auto_task(
        &self,
        fields: &NewEntityFilingFields,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Result<(Uuid, Option<Uuid>)> {
        let filing_id = self.create_filing(fields).await?;

        if !config.auto_generate_tasks {
            return Ok((filing_id, None));
        }

        let task_id = Uuid::new_v4();
        let priority = classify_priority(fields.due_date, now);

        sqlx::query(
            r#"
            INSERT INTO compliance.filing_tasks
                (task_id, entity_id, filing_id, title, description, due_date, priority, status,
                 assigned_to, is_auto_generated, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, TRUE, NOW())
            "#,
        )
        .bind(task_id)
        .bind(fields.entity_id)
        .bind(filing_id)
        .bind(&fields.title)
        .bind("Auto-generated on filing creation")
        .bind(fields.due_date)
        .bind(priority.as_str())
        .bind(config.default_assignee)
        .execute(&self.pool)
        .await
        .context("Failed to create auto-generated task")?;

        info!(
            "Created filing {} with auto-generated task {} (priority {})",
            filing_id, task_id, priority
        );

        Ok((filing_id, Some(task_id)))
    }

    /// Get filing by ID
    pub async fn get_filing(&self, filing_id: Uuid) -> Result<Option<EntityFilingRecord>> {
        let result = sqlx::query_as::<_, EntityFilingRecord>(
            r#"
            SELECT filing_id, entity_id, filing_type_id, title, jurisdiction, due_date, due_day,
                   filing_date, frequency, amount, confirmation_number, filed_by, status,
                   reminder_days, created_at, updated_at
            FROM compliance.entity_filings
            WHERE filing_id = $1
            "#,
        )
        .bind(filing_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get filing by ID")?;

        Ok(result)
    }

    /// List filings for an entity, soonest due first
    pub async fn list_for_entity(&self, entity_id: Uuid) -> Result<Vec<EntityFilingRecord>> {
        let results = sqlx::query_as::<_, EntityFilingRecord>(
            r#"
            SELECT filing_id, entity_id, filing_type_id, title, jurisdiction, due_date, due_day,
                   filing_date, frequency, amount, confirmation_number, filed_by, status,
                   reminder_days, created_at, updated_at
            FROM compliance.entity_filings
            WHERE entity_id = $1
            ORDER BY due_date ASC
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list filings for entity")?;

        Ok(results)
    }

    /// Mark a filing as filed. Conditional on the filing still being
    /// pending, so a double-submit does not overwrite completion details.
    pub async fn complete_filing(
        &self,
        filing_id: Uuid,
        filed_by: &str,
        filing_date: NaiveDate,
        confirmation_number: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE compliance.entity_filings
            SET status = 'filed',
                filing_date = $1,
                filed_by = $2,
                confirmation_number = $3,
                updated_at = NOW()
            WHERE filing_id = $4 AND status = 'pending'
            "#,
        )
        .bind(filing_date)
        .bind(filed_by)
        .bind(confirmation_number)
        .bind(filing_id)
        .execute(&self.pool)
        .await
        .context("Failed to complete filing")?;

        if result.rows_affected() > 0 {
            info!("Marked filing {} as filed by {}", filing_id, filed_by);
        }

        Ok(result.rows_affected() > 0)
    }

    /// Delete a filing, refusing while a task still references it. Tasks
    /// must be reassigned or removed first.
    pub async fn delete_filing(&self, filing_id: Uuid) -> Result<bool> {
        let referenced = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM compliance.filing_tasks WHERE filing_id = $1
            )
            "#,
        )
        .bind(filing_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check filing task references")?;

        if referenced {
            warn!(
                "Refusing to delete filing {}: tasks still reference it",
                filing_id
            );
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM compliance.entity_filings
            WHERE filing_id = $1
            "#,
        )
        .bind(filing_id)
        .execute(&self.pool)
        .await
        .context("Failed to delete filing")?;

        if result.rows_affected() > 0 {
            info!("Deleted filing {}", filing_id);
        }

        Ok(result.rows_affected() > 0)
    }
}
