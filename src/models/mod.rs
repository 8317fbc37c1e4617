//! Domain records for the compliance filing engine.
//!
//! The filing-level and task-level status enumerations are deliberately kept
//! separate: a task can be cancelled, a filing cannot, and their life cycles
//! differ. `overdue` is never persisted at all; it exists only as a derived
//! display value (see [`crate::status::derive_status`]).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Recurrence period of an obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingFrequency {
    OneTime,
    Monthly,
    Quarterly,
    Annual,
}

impl FilingFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneTime => "one_time",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "one_time" | "one-time" => Some(Self::OneTime),
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "annual" => Some(Self::Annual),
            _ => None,
        }
    }

    /// Calendar months in one period; `None` for one-time obligations.
    pub fn months(&self) -> Option<u32> {
        match self {
            Self::OneTime => None,
            Self::Monthly => Some(1),
            Self::Quarterly => Some(3),
            Self::Annual => Some(12),
        }
    }
}

impl fmt::Display for FilingFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted filing status. This is the authoritative write-side value; the
/// display status is always recomputed at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    Pending,
    Filed,
}

impl FilingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Filed => "filed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "filed" => Some(Self::Filed),
            _ => None,
        }
    }
}

impl fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display status computed from the stored due date and the caller's "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedStatus {
    Pending,
    Filed,
    Overdue,
}

impl fmt::Display for DerivedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Filed => "filed",
            Self::Overdue => "overdue",
        };
        f.write_str(s)
    }
}

/// Task work-item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Open tasks are the only ones eligible for reminder selection.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority tier. Ordering follows urgency: `Low < Medium < High < Urgent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry describing a class of obligation. Immutable reference data,
/// administered separately; never deleted while referenced by a filing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingType {
    pub filing_type_id: Uuid,
    pub code: String,
    pub display_name: String,
    pub default_frequency: FilingFrequency,
    pub category: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// One obligation instance bound to one legal entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityFiling {
    pub filing_id: Uuid,
    pub entity_id: Uuid,
    pub filing_type_id: Option<Uuid>,
    pub title: String,
    pub jurisdiction: Option<String>,
    /// Due date of the current cycle; never null for an active obligation.
    pub due_date: NaiveDate,
    /// Day-of-month anchor for recurrence, clamped to shorter months.
    pub due_day: Option<u32>,
    pub filing_date: Option<NaiveDate>,
    pub frequency: FilingFrequency,
    pub amount: Option<Decimal>,
    pub confirmation_number: Option<String>,
    pub filed_by: Option<String>,
    pub status: FilingStatus,
    /// Per-obligation override of the global reminder horizon, in days.
    pub reminder_days: Option<u16>,
}

/// An actionable work item, always linked to one entity and optionally to one
/// filing by a non-owning association.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingTask {
    pub task_id: Uuid,
    pub entity_id: Uuid,
    pub filing_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub assigned_to: Option<Uuid>,
    pub is_auto_generated: bool,
}

/// Fields for inserting a new task.
#[derive(Debug, Clone)]
pub struct NewFilingTask {
    pub entity_id: Uuid,
    pub filing_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub priority: TaskPriority,
    pub assigned_to: Option<Uuid>,
    pub is_auto_generated: bool,
}

/// A valid notification recipient: an active administrator with a known
/// contact address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: Uuid,
    pub display_name: String,
    pub email: String,
}
