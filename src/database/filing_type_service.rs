//! Filing Type Service - CRUD operations for the obligation catalog
//!
//! Filing types are immutable reference data created and edited by
//! administrators. A type is never deleted while a filing references it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

/// Filing type catalog record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FilingTypeRow {
    pub filing_type_id: Uuid,
    pub code: String,
    pub display_name: String,
    pub default_frequency: String,
    pub category: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields for creating a filing type
#[derive(Debug, Clone)]
pub struct NewFilingTypeFields {
    pub code: String,
    pub display_name: String,
    pub default_frequency: String,
    pub category: Option<String>,
}

/// Service for filing-type catalog operations
#[derive(Clone, Debug)]
pub struct FilingTypeService {
    pool: PgPool,
}

impl FilingTypeService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a catalog entry
    pub async fn create_filing_type(&self, fields: &NewFilingTypeFields) -> Result<Uuid> {
        let filing_type_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO compliance.filing_types
                (filing_type_id, code, display_name, default_frequency, category, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(filing_type_id)
        .bind(&fields.code)
        .bind(&fields.display_name)
        .bind(&fields.default_frequency)
        .bind(&fields.category)
        .execute(&self.pool)
        .await
        .context("Failed to create filing type")?;

        info!(
            "Created filing type '{}' ({})",
            fields.code, filing_type_id
        );

        Ok(filing_type_id)
    }

    /// Get a catalog entry by its code
    pub async fn get_by_code(&self, code: &str) -> Result<Option<FilingTypeRow>> {
        let result = sqlx::query_as::<_, FilingTypeRow>(
            r#"
            SELECT filing_type_id, code, display_name, default_frequency, category, created_at
            FROM compliance.filing_types
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get filing type by code")?;

        Ok(result)
    }

    /// List all catalog entries
    pub async fn list_filing_types(&self) -> Result<Vec<FilingTypeRow>> {
        let results = sqlx::query_as::<_, FilingTypeRow>(
            r#"
            SELECT filing_type_id, code, display_name, default_frequency, category, created_at
            FROM compliance.filing_types
            ORDER BY code ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list filing types")?;

        Ok(results)
    }

    /// Update display fields of a catalog entry
    pub async fn update_filing_type(
        &self,
        filing_type_id: Uuid,
        display_name: &str,
        default_frequency: &str,
        category: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE compliance.filing_types
            SET display_name = $1, default_frequency = $2, category = $3
            WHERE filing_type_id = $4
            "#,
        )
        .bind(display_name)
        .bind(default_frequency)
        .bind(category)
        .bind(filing_type_id)
        .execute(&self.pool)
        .await
        .context("Failed to update filing type")?;

        if result.rows_affected() > 0 {
            info!("Updated filing type {}", filing_type_id);
        }

        Ok(result.rows_affected() > 0)
    }

    /// Delete a catalog entry, refusing while any filing still references it
    pub async fn delete_filing_type(&self, filing_type_id: Uuid) -> Result<bool> {
        let referenced = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM compliance.entity_filings WHERE filing_type_id = $1
            )
            "#,
        )
        .bind(filing_type_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check filing type references")?;

        if referenced {
            warn!(
                "Refusing to delete filing type {}: still referenced by filings",
                filing_type_id
            );
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM compliance.filing_types
            WHERE filing_type_id = $1
            "#,
        )
        .bind(filing_type_id)
        .execute(&self.pool)
        .await
        .context("Failed to delete filing type")?;

        if result.rows_affected() > 0 {
            info!("Deleted filing type {}", filing_type_id);
        }

        Ok(result.rows_affected() > 0)
    }
}
