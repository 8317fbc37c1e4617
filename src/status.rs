//! Read-time status derivation and priority seeding.
//!
//! Both functions are pure and take "now" as an explicit parameter, so the
//! request-serving read path and the batch scheduler share the same logic and
//! tests stay deterministic. Results are never cached: "overdue" always
//! reflects the caller's clock, not a stale write.

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{DerivedStatus, FilingStatus, TaskPriority};

/// Live display status for a filing as of `now`.
///
/// Completion is sticky: a persisted `filed` is returned unconditionally and
/// is never overridden by the date. Otherwise a due date strictly before the
/// start of `now`'s day is overdue.
pub fn derive_status(
    due_date: NaiveDate,
    persisted: FilingStatus,
    now: DateTime<Utc>,
) -> DerivedStatus {
    if persisted == FilingStatus::Filed {
        return DerivedStatus::Filed;
    }
    if due_date < now.date_naive() {
        DerivedStatus::Overdue
    } else {
        DerivedStatus::Pending
    }
}

/// Whole days from `now`'s date to `due_date`; negative when overdue.
pub fn days_until(due_date: NaiveDate, now: DateTime<Utc>) -> i64 {
    (due_date - now.date_naive()).num_days()
}

/// Priority tier seeded onto auto-generated tasks.
///
/// Advisory only: a human-set priority on an existing task is never
/// overwritten by a later recomputation.
pub fn classify_priority(due_date: NaiveDate, now: DateTime<Utc>) -> TaskPriority {
    let days = days_until(due_date, now);
    if days <= 7 {
        TaskPriority::Urgent
    } else if days <= 14 {
        TaskPriority::High
    } else if days <= 30 {
        TaskPriority::Medium
    } else {
        TaskPriority::Low
    }
}
