//! Reminder selection: horizon scan and per-recipient partitioning.
//!
//! Selection is a pure function over data the scheduler has already fetched.
//! Bucket membership is tracked as a set of task ids per recipient, so the
//! no-duplicate invariant is structural rather than incidental.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{FilingTask, Recipient};

/// Result of one reminder scan, keyed by recipient id.
#[derive(Debug, Default)]
pub struct ReminderSelection {
    buckets: BTreeMap<Uuid, Vec<FilingTask>>,
    /// Open tasks that fell inside their effective horizon.
    pub due_task_count: usize,
    /// Valid recipients the scan partitioned over.
    pub recipient_count: usize,
}

impl ReminderSelection {
    /// Zero recipients is operationally distinct from zero due tasks: the
    /// first is a configuration gap, the second is normal.
    pub fn has_recipients(&self) -> bool {
        self.recipient_count > 0
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|b| b.is_empty())
    }

    pub fn bucket(&self, recipient_id: Uuid) -> Option<&[FilingTask]> {
        self.buckets.get(&recipient_id).map(|b| b.as_slice())
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&Uuid, &Vec<FilingTask>)> {
        self.buckets.iter().filter(|(_, b)| !b.is_empty())
    }
}

/// Partition open tasks due within the horizon into per-recipient buckets.
///
/// A task assigned to a valid recipient lands only in that recipient's
/// bucket. Unassigned tasks, and tasks assigned to someone outside the
/// recipient set, fan out to every recipient. Each bucket holds a given task
/// id at most once and is ordered ascending by due date.
///
/// The effective horizon for a task linked to a filing with a
/// `reminder_days` override comes from `overrides` (filing id -> days);
/// everything else uses `horizon_days`.
pub fn select_reminders(
    today: NaiveDate,
    horizon_days: u16,
    tasks: &[FilingTask],
    overrides: &HashMap<Uuid, u16>,
    recipients: &[Recipient],
) -> ReminderSelection {
    let valid_ids: HashSet<Uuid> = recipients.iter().map(|r| r.user_id).collect();

    let mut buckets: BTreeMap<Uuid, Vec<FilingTask>> = BTreeMap::new();
    let mut seen: BTreeMap<Uuid, HashSet<Uuid>> = BTreeMap::new();
    for r in recipients {
        buckets.entry(r.user_id).or_default();
        seen.entry(r.user_id).or_default();
    }

    let mut due_task_count = 0usize;
    for task in tasks {
        if !task.status.is_open() {
            continue;
        }
        let horizon = task
            .filing_id
            .and_then(|id| overrides.get(&id).copied())
            .unwrap_or(horizon_days);
        let cutoff = today
            .checked_add_days(chrono::Days::new(u64::from(horizon)))
            .unwrap_or(NaiveDate::MAX);
        if task.due_date < today || task.due_date > cutoff {
            continue;
        }
        due_task_count += 1;

        match task.assigned_to.filter(|id| valid_ids.contains(id)) {
            Some(assignee) => place(&mut buckets, &mut seen, assignee, task),
            None => {
                for id in &valid_ids {
                    place(&mut buckets, &mut seen, *id, task);
                }
            }
        }
    }

    for bucket in buckets.values_mut() {
        bucket.sort_by_key(|t| t.due_date);
    }

    ReminderSelection {
        buckets,
        due_task_count,
        recipient_count: recipients.len(),
    }
}

fn place(
    buckets: &mut BTreeMap<Uuid, Vec<FilingTask>>,
    seen: &mut BTreeMap<Uuid, HashSet<Uuid>>,
    recipient_id: Uuid,
    task: &FilingTask,
) {
    let seen_ids = seen.entry(recipient_id).or_default();
    if seen_ids.insert(task.task_id) {
        buckets.entry(recipient_id).or_default().push(task.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskPriority, TaskStatus};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn recipient(name: &str) -> Recipient {
        Recipient {
            user_id: Uuid::new_v4(),
            display_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
        }
    }

    fn task(due: NaiveDate, assigned_to: Option<Uuid>, status: TaskStatus) -> FilingTask {
        FilingTask {
            task_id: Uuid::new_v4(),
            entity_id: Uuid::new_v4(),
            filing_id: None,
            title: "Prepare filing".to_string(),
            description: None,
            due_date: due,
            priority: TaskPriority::Medium,
            status,
            assigned_to,
            is_auto_generated: false,
        }
    }

    #[test]
    fn assigned_task_lands_only_in_assignee_bucket() {
        let today = date(2025, 6, 15);
        let u = recipient("Alice");
        let other = recipient("Bob");
        let t = task(date(2025, 6, 20), Some(u.user_id), TaskStatus::Pending);

        let sel = select_reminders(
            today,
            7,
            &[t.clone()],
            &HashMap::new(),
            &[u.clone(), other.clone()],
        );
        assert_eq!(sel.bucket(u.user_id).unwrap().len(), 1);
        assert_eq!(sel.bucket(u.user_id).unwrap()[0].task_id, t.task_id);
        assert!(sel.bucket(other.user_id).unwrap().is_empty());
    }

    #[test]
    fn unassigned_task_fans_out_to_every_recipient_once() {
        let today = date(2025, 6, 15);
        let u1 = recipient("Alice");
        let u2 = recipient("Bob");
        let t = task(date(2025, 6, 18), None, TaskStatus::Pending);

        let sel = select_reminders(
            today,
            7,
            &[t.clone()],
            &HashMap::new(),
            &[u1.clone(), u2.clone()],
        );
        for r in [&u1, &u2] {
            let bucket = sel.bucket(r.user_id).unwrap();
            assert_eq!(bucket.len(), 1);
            assert_eq!(bucket[0].task_id, t.task_id);
        }
    }

    #[test]
    fn duplicate_input_rows_are_deduplicated_per_bucket() {
        let today = date(2025, 6, 15);
        let u = recipient("Alice");
        let t = task(date(2025, 6, 18), Some(u.user_id), TaskStatus::Pending);

        // Same task id presented twice, once assigned and once as if it also
        // matched the fan-out rule.
        let mut unassigned_copy = t.clone();
        unassigned_copy.assigned_to = None;

        let sel = select_reminders(
            today,
            7,
            &[t.clone(), unassigned_copy],
            &HashMap::new(),
            &[u.clone()],
        );
        assert_eq!(sel.bucket(u.user_id).unwrap().len(), 1);
    }

    #[test]
    fn assignee_outside_recipient_set_fans_out() {
        let today = date(2025, 6, 15);
        let u1 = recipient("Alice");
        let u2 = recipient("Bob");
        let stranger = Uuid::new_v4();
        let t = task(date(2025, 6, 18), Some(stranger), TaskStatus::Pending);

        let sel = select_reminders(
            today,
            7,
            &[t],
            &HashMap::new(),
            &[u1.clone(), u2.clone()],
        );
        assert_eq!(sel.bucket(u1.user_id).unwrap().len(), 1);
        assert_eq!(sel.bucket(u2.user_id).unwrap().len(), 1);
    }

    #[test]
    fn horizon_window_is_inclusive() {
        let today = date(2025, 6, 15);
        let u = recipient("Alice");
        let at_edge = task(date(2025, 6, 22), None, TaskStatus::Pending);
        let beyond = task(date(2025, 6, 23), None, TaskStatus::Pending);
        let yesterday = task(date(2025, 6, 14), None, TaskStatus::Pending);
        let due_today = task(today, None, TaskStatus::Pending);

        let sel = select_reminders(
            today,
            7,
            &[at_edge.clone(), beyond, yesterday, due_today.clone()],
            &HashMap::new(),
            &[u.clone()],
        );
        let ids: Vec<Uuid> = sel
            .bucket(u.user_id)
            .unwrap()
            .iter()
            .map(|t| t.task_id)
            .collect();
        assert_eq!(ids, vec![due_today.task_id, at_edge.task_id]);
    }

    #[test]
    fn completed_and_cancelled_tasks_are_excluded() {
        let today = date(2025, 6, 15);
        let u = recipient("Alice");
        let done = task(date(2025, 6, 16), None, TaskStatus::Completed);
        let cancelled = task(date(2025, 6, 16), None, TaskStatus::Cancelled);

        let sel = select_reminders(today, 7, &[done, cancelled], &HashMap::new(), &[u.clone()]);
        assert!(sel.bucket(u.user_id).unwrap().is_empty());
        assert_eq!(sel.due_task_count, 0);
    }

    #[test]
    fn per_filing_override_widens_the_window() {
        let today = date(2025, 6, 15);
        let u = recipient("Alice");
        let filing_id = Uuid::new_v4();
        let mut t = task(date(2025, 6, 29), None, TaskStatus::Pending);
        t.filing_id = Some(filing_id);

        let none = select_reminders(today, 7, &[t.clone()], &HashMap::new(), &[u.clone()]);
        assert!(none.bucket(u.user_id).unwrap().is_empty());

        let overrides = HashMap::from([(filing_id, 14u16)]);
        let widened = select_reminders(today, 7, &[t], &overrides, &[u.clone()]);
        assert_eq!(widened.bucket(u.user_id).unwrap().len(), 1);
    }

    #[test]
    fn buckets_are_ordered_by_due_date() {
        let today = date(2025, 6, 15);
        let u = recipient("Alice");
        let later = task(date(2025, 6, 21), None, TaskStatus::Pending);
        let sooner = task(date(2025, 6, 16), None, TaskStatus::Pending);

        let sel = select_reminders(
            today,
            7,
            &[later.clone(), sooner.clone()],
            &HashMap::new(),
            &[u.clone()],
        );
        let due_dates: Vec<NaiveDate> = sel
            .bucket(u.user_id)
            .unwrap()
            .iter()
            .map(|t| t.due_date)
            .collect();
        assert_eq!(due_dates, vec![sooner.due_date, later.due_date]);
    }

    #[test]
    fn zero_recipients_is_flagged_distinctly() {
        let today = date(2025, 6, 15);
        let t = task(date(2025, 6, 16), None, TaskStatus::Pending);

        let sel = select_reminders(today, 7, &[t], &HashMap::new(), &[]);
        assert!(!sel.has_recipients());
        assert_eq!(sel.due_task_count, 1);
        assert!(sel.is_empty());
    }
}
