//! Recurring-cycle advancement for completed filings.
//!
//! Advancement is split into a pure planning step (this module) and a
//! conditional write applied by the store. The plan carries the due date it
//! was computed from, and the store only applies the reset while the row
//! still matches it, which is what makes re-application a no-op when two
//! invocations overlap.

use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

use crate::error::RecurrenceError;
use crate::models::{EntityFiling, FilingFrequency, FilingStatus};

/// The write applied to a filing when its cycle is reset: new due date,
/// persisted status back to `pending`, completion fields cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReset {
    pub filing_id: Uuid,
    /// Guard value for the conditional update.
    pub previous_due_date: NaiveDate,
    pub next_due_date: NaiveDate,
}

/// Compute the next cycle for a completed recurring filing.
///
/// Only filings with persisted status `filed` and a recurring frequency are
/// eligible; anything else is a configuration error and the row is left
/// untouched. The anchor day is `due_day` when set, else the day-of-month of
/// the current due date, clamped to the last valid day of the target month.
pub fn plan_advance(filing: &EntityFiling) -> Result<CycleReset, RecurrenceError> {
    if filing.status != FilingStatus::Filed {
        return Err(RecurrenceError::NotFiled);
    }
    let months = match filing.frequency {
        FilingFrequency::OneTime => return Err(RecurrenceError::OneTime),
        f => f.months().unwrap_or(0),
    };

    let anchor_day = match filing.due_day {
        Some(d) if (1..=31).contains(&d) => d,
        Some(d) => return Err(RecurrenceError::InvalidDueDay { due_day: d }),
        None => filing.due_date.day(),
    };

    let next_due_date = add_months_clamped(filing.due_date, months, anchor_day)?;

    Ok(CycleReset {
        filing_id: filing.filing_id,
        previous_due_date: filing.due_date,
        next_due_date,
    })
}

/// Advance `from` by `months` calendar months, landing on `anchor_day` or the
/// last valid day of the target month, whichever is earlier.
fn add_months_clamped(
    from: NaiveDate,
    months: u32,
    anchor_day: u32,
) -> Result<NaiveDate, RecurrenceError> {
    let zero_based = from.month0() + months;
    let year = from.year() + (zero_based / 12) as i32;
    let month = zero_based % 12 + 1;
    let day = anchor_day.min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(RecurrenceError::DateOutOfRange { year, month })
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}
