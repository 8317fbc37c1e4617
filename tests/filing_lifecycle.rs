//! Filing Lifecycle Integration Tests
//!
//! Full scheduled-pass tests over the in-memory store:
//! 1. Advance completed recurring filings and verify the cycle reset
//! 2. Select reminders and verify per-recipient partitioning
//! 3. Dispatch digests through a recording transport
//! 4. Exercise retry, deadline, and partial-failure behavior
//!
//! Run with: cargo test --test filing_lifecycle

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use filing_engine::{
    CycleReset, Digest, EngineConfig, EngineError, EntityFiling, FilingFrequency, FilingScheduler,
    FilingStatus, FilingStore, FilingTask, MalformedRecord, MemoryFilingStore, NewFilingTask,
    NotificationTransport, PassErrorKind, Recipient, RowBatch, StoreResult, TaskPriority,
    TaskStatus, TransportError,
};

/// Transport double that records every digest and can fail per address.
#[derive(Clone, Default)]
struct RecordingTransport {
    sent: Arc<Mutex<Vec<Digest>>>,
    fail_for: Arc<Mutex<HashSet<String>>>,
}

impl RecordingTransport {
    fn fail_for(&self, email: &str) {
        self.fail_for.lock().unwrap().insert(email.to_string());
    }

    fn sent(&self) -> Vec<Digest> {
        self.sent.lock().unwrap().clone()
    }

    fn digest_for(&self, email: &str) -> Option<Digest> {
        self.sent()
            .into_iter()
            .find(|d| d.recipient.email == email)
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, digest: &Digest) -> Result<(), TransportError> {
        if self.fail_for.lock().unwrap().contains(&digest.recipient.email) {
            return Err(TransportError::SendFailed {
                recipient: digest.recipient.email.clone(),
                message: "simulated outage".to_string(),
            });
        }
        self.sent.lock().unwrap().push(digest.clone());
        Ok(())
    }
}

/// Store double whose list queries return one undecodable row alongside the
/// clean ones, as a corrupt database row would.
#[derive(Clone)]
struct TaintedStore {
    inner: MemoryFilingStore,
    bad_filing: Uuid,
    bad_task: Uuid,
}

#[async_trait]
impl FilingStore for TaintedStore {
    async fn list_advance_candidates(&self) -> StoreResult<RowBatch<EntityFiling>> {
        let mut batch = self.inner.list_advance_candidates().await?;
        batch.malformed.push(MalformedRecord {
            id: self.bad_filing,
            message: "unknown frequency 'fortnightly'".to_string(),
        });
        Ok(batch)
    }

    async fn apply_cycle_reset(&self, reset: &CycleReset) -> StoreResult<bool> {
        self.inner.apply_cycle_reset(reset).await
    }

    async fn insert_task(&self, task: &NewFilingTask) -> StoreResult<Uuid> {
        self.inner.insert_task(task).await
    }

    async fn list_open_tasks_due(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<RowBatch<FilingTask>> {
        let mut batch = self.inner.list_open_tasks_due(from, to).await?;
        batch.malformed.push(MalformedRecord {
            id: self.bad_task,
            message: "unknown priority 'critical'".to_string(),
        });
        Ok(batch)
    }

    async fn reminder_overrides(&self) -> StoreResult<HashMap<Uuid, u16>> {
        self.inner.reminder_overrides().await
    }

    async fn list_recipients(&self) -> StoreResult<Vec<Recipient>> {
        self.inner.list_recipients().await
    }

    async fn entity_names(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, String>> {
        self.inner.entity_names(ids).await
    }
}

struct Fixture {
    store: MemoryFilingStore,
    transport: RecordingTransport,
    scheduler: FilingScheduler<MemoryFilingStore, RecordingTransport>,
}

impl Fixture {
    fn new(config: EngineConfig) -> Self {
        let store = MemoryFilingStore::new();
        let transport = RecordingTransport::default();
        let scheduler = FilingScheduler::new(store.clone(), transport.clone(), config);
        Self {
            store,
            transport,
            scheduler,
        }
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        reminder_horizon_days: 7,
        store_retry_attempts: 2,
        pass_deadline: None,
        auto_generate_tasks: true,
        default_assignee: None,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 6, 0, 0).unwrap()
}

fn filing(
    due: NaiveDate,
    frequency: FilingFrequency,
    status: FilingStatus,
) -> EntityFiling {
    EntityFiling {
        filing_id: Uuid::new_v4(),
        entity_id: Uuid::new_v4(),
        filing_type_id: None,
        title: "Quarterly tax filing".to_string(),
        jurisdiction: Some("LU".to_string()),
        due_date: due,
        due_day: None,
        filing_date: (status == FilingStatus::Filed).then_some(due),
        frequency,
        amount: None,
        confirmation_number: Some("CN-42".to_string()),
        filed_by: Some("ops".to_string()),
        status,
        reminder_days: None,
    }
}

fn task(due: NaiveDate, assigned_to: Option<Uuid>) -> FilingTask {
    FilingTask {
        task_id: Uuid::new_v4(),
        entity_id: Uuid::new_v4(),
        filing_id: None,
        title: "Prepare annual report".to_string(),
        description: None,
        due_date: due,
        priority: TaskPriority::Medium,
        status: TaskStatus::Pending,
        assigned_to,
        is_auto_generated: false,
    }
}

fn recipient(name: &str) -> Recipient {
    Recipient {
        user_id: Uuid::new_v4(),
        display_name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
    }
}

// Scenario: a quarterly filing due 2025-03-31, marked filed on 2025-03-20,
// is reset to a pending cycle due 2025-06-30 with completion fields cleared.
#[tokio::test]
async fn quarterly_filing_advances_to_next_cycle() {
    let fixture = Fixture::new(test_config());
    let mut f = filing(
        date(2025, 3, 31),
        FilingFrequency::Quarterly,
        FilingStatus::Filed,
    );
    f.filing_date = Some(date(2025, 3, 20));
    let filing_id = f.filing_id;
    fixture.store.insert_filing(f);

    let report = fixture
        .scheduler
        .run_pass(at(2025, 3, 21), None)
        .await
        .unwrap();

    assert_eq!(report.advanced, 1);
    assert_eq!(report.tasks_created, 1);
    assert!(report.errors.is_empty());

    let stored = fixture.store.filing(filing_id).unwrap();
    assert_eq!(stored.due_date, date(2025, 6, 30));
    assert_eq!(stored.status, FilingStatus::Pending);
    assert_eq!(stored.filing_date, None);
    assert_eq!(stored.confirmation_number, None);

    // The follow-up task is seeded for the new cycle, priority classified
    // from the new due date (over 30 days out).
    let tasks = fixture.store.tasks_for_filing(filing_id);
    assert_eq!(tasks.len(), 1);
    assert_eq!(fixture.store.task_count(), 1);
    assert_eq!(tasks[0].due_date, date(2025, 6, 30));
    assert_eq!(tasks[0].priority, TaskPriority::Low);
    assert!(tasks[0].is_auto_generated);
    assert_eq!(tasks[0].status, TaskStatus::Pending);
}

// Scenario: one-time filings are never advanced, even when filed.
#[tokio::test]
async fn one_time_filing_is_left_untouched() {
    let fixture = Fixture::new(test_config());
    let f = filing(
        date(2025, 3, 31),
        FilingFrequency::OneTime,
        FilingStatus::Filed,
    );
    let filing_id = f.filing_id;
    fixture.store.insert_filing(f);

    let report = fixture
        .scheduler
        .run_pass(at(2025, 4, 1), None)
        .await
        .unwrap();

    assert_eq!(report.advanced, 0);
    assert!(report.errors.is_empty());

    let stored = fixture.store.filing(filing_id).unwrap();
    assert_eq!(stored.due_date, date(2025, 3, 31));
    assert_eq!(stored.status, FilingStatus::Filed);
    assert_eq!(fixture.store.task_count(), 0);
}

// Two overlapping passes over the same snapshot advance the cycle exactly
// once; the optimistic guard turns the loser's write into a skip.
#[tokio::test]
async fn overlapping_passes_advance_exactly_once() {
    let config = EngineConfig {
        auto_generate_tasks: false,
        ..test_config()
    };
    let store = MemoryFilingStore::new();
    let f = filing(
        date(2025, 3, 31),
        FilingFrequency::Quarterly,
        FilingStatus::Filed,
    );
    let filing_id = f.filing_id;
    store.insert_filing(f);

    let first = FilingScheduler::new(store.clone(), RecordingTransport::default(), config.clone());
    let second = FilingScheduler::new(store.clone(), RecordingTransport::default(), config);

    let r1 = first.run_pass(at(2025, 4, 1), None).await.unwrap();
    let r2 = second.run_pass(at(2025, 4, 1), None).await.unwrap();

    assert_eq!(r1.advanced + r2.advanced, 1);
    assert_eq!(store.filing(filing_id).unwrap().due_date, date(2025, 6, 30));
}

// Scenario: a task due in 5 days assigned to U lands only in U's digest.
#[tokio::test]
async fn assigned_task_reminds_only_the_assignee() {
    let fixture = Fixture::new(test_config());
    let alice = recipient("Alice");
    let bob = recipient("Bob");
    fixture.store.add_recipient(alice.clone());
    fixture.store.add_recipient(bob.clone());

    let t = task(date(2025, 6, 20), Some(alice.user_id));
    let task_id = t.task_id;
    fixture.store.insert_existing_task(t);

    let report = fixture
        .scheduler
        .run_pass(at(2025, 6, 15), None)
        .await
        .unwrap();

    assert_eq!(report.reminders_sent, 1);
    let digest = fixture.transport.digest_for("alice@example.com").unwrap();
    assert_eq!(digest.items.len(), 1);
    assert_eq!(digest.items[0].task_id, task_id);
    assert!(fixture.transport.digest_for("bob@example.com").is_none());
}

// Scenario: an unassigned task due in 3 days reaches both recipients,
// exactly once each.
#[tokio::test]
async fn unassigned_task_fans_out_once_per_recipient() {
    let fixture = Fixture::new(test_config());
    let alice = recipient("Alice");
    let bob = recipient("Bob");
    fixture.store.add_recipient(alice.clone());
    fixture.store.add_recipient(bob.clone());

    let t = task(date(2025, 6, 18), None);
    let task_id = t.task_id;
    fixture.store.insert_existing_task(t);

    let report = fixture
        .scheduler
        .run_pass(at(2025, 6, 15), None)
        .await
        .unwrap();

    assert_eq!(report.reminders_sent, 2);
    for email in ["alice@example.com", "bob@example.com"] {
        let digest = fixture.transport.digest_for(email).unwrap();
        let matching: Vec<_> = digest
            .items
            .iter()
            .filter(|i| i.task_id == task_id)
            .collect();
        assert_eq!(matching.len(), 1, "duplicate reminder for {email}");
    }
}

// Zero recipients is a configuration gap, reported distinctly from having
// nothing due.
#[tokio::test]
async fn missing_recipients_are_flagged_not_errored() {
    let fixture = Fixture::new(test_config());
    fixture
        .store
        .insert_existing_task(task(date(2025, 6, 16), None));

    let report = fixture
        .scheduler
        .run_pass(at(2025, 6, 15), None)
        .await
        .unwrap();

    assert!(report.no_recipients);
    assert_eq!(report.reminders_sent, 0);
    assert!(report.errors.is_empty());
}

// A send failure for one recipient never blocks the others.
#[tokio::test]
async fn transport_failure_is_isolated_per_recipient() {
    let fixture = Fixture::new(test_config());
    let alice = recipient("Alice");
    let bob = recipient("Bob");
    fixture.store.add_recipient(alice);
    fixture.store.add_recipient(bob);
    fixture.transport.fail_for("bob@example.com");

    fixture
        .store
        .insert_existing_task(task(date(2025, 6, 17), None));

    let report = fixture
        .scheduler
        .run_pass(at(2025, 6, 15), None)
        .await
        .unwrap();

    assert_eq!(report.reminders_sent, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, PassErrorKind::Transport);
    assert!(fixture.transport.digest_for("alice@example.com").is_some());
}

// A malformed due_day is recorded against the filing and skipped; the batch
// continues and the row is untouched.
#[tokio::test]
async fn misconfigured_filing_does_not_abort_the_batch() {
    let fixture = Fixture::new(test_config());
    let mut bad = filing(
        date(2025, 3, 31),
        FilingFrequency::Monthly,
        FilingStatus::Filed,
    );
    bad.due_day = Some(40);
    let bad_id = bad.filing_id;
    let good = filing(
        date(2025, 4, 30),
        FilingFrequency::Monthly,
        FilingStatus::Filed,
    );
    let good_id = good.filing_id;
    fixture.store.insert_filing(bad);
    fixture.store.insert_filing(good);

    let report = fixture
        .scheduler
        .run_pass(at(2025, 5, 1), None)
        .await
        .unwrap();

    assert_eq!(report.advanced, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, PassErrorKind::Configuration);
    assert_eq!(report.errors[0].item, Some(bad_id));

    assert_eq!(fixture.store.filing(bad_id).unwrap().due_date, date(2025, 3, 31));
    assert_eq!(fixture.store.filing(good_id).unwrap().due_date, date(2025, 5, 30));
}

// A row the store cannot decode is reported against its id and skipped;
// every clean row in the same batch is still advanced and reminded.
#[tokio::test]
async fn undecodable_rows_are_skipped_per_item() {
    let inner = MemoryFilingStore::new();
    let bad_filing = Uuid::new_v4();
    let bad_task = Uuid::new_v4();
    let store = TaintedStore {
        inner: inner.clone(),
        bad_filing,
        bad_task,
    };
    let transport = RecordingTransport::default();
    let scheduler = FilingScheduler::new(store, transport.clone(), test_config());

    let good = filing(
        date(2025, 3, 31),
        FilingFrequency::Quarterly,
        FilingStatus::Filed,
    );
    let good_id = good.filing_id;
    inner.insert_filing(good);
    inner.add_recipient(recipient("Alice"));
    inner.insert_existing_task(task(date(2025, 4, 5), None));

    let report = scheduler.run_pass(at(2025, 4, 1), None).await.unwrap();

    assert_eq!(report.advanced, 1);
    assert_eq!(inner.filing(good_id).unwrap().due_date, date(2025, 6, 30));
    assert_eq!(report.reminders_sent, 1);
    assert!(transport.digest_for("alice@example.com").is_some());

    let configuration: Vec<_> = report
        .errors
        .iter()
        .filter(|e| e.kind == PassErrorKind::Configuration)
        .collect();
    assert_eq!(configuration.len(), 2);
    assert!(configuration.iter().any(|e| e.item == Some(bad_filing)));
    assert!(configuration.iter().any(|e| e.item == Some(bad_task)));
}

// Transient store errors are retried within the pass.
#[tokio::test]
async fn transient_store_errors_are_retried() {
    let fixture = Fixture::new(test_config());
    let f = filing(
        date(2025, 3, 31),
        FilingFrequency::Quarterly,
        FilingStatus::Filed,
    );
    fixture.store.insert_filing(f);
    fixture.store.inject_transient_failures(2);

    let report = fixture
        .scheduler
        .run_pass(at(2025, 4, 1), None)
        .await
        .unwrap();

    assert_eq!(report.advanced, 1);
    assert!(report.errors.is_empty());
}

// With the retry budget exhausted, a failing candidate read is the one hard
// failure that aborts the run.
#[tokio::test]
async fn candidate_load_failure_aborts_the_pass() {
    let config = EngineConfig {
        store_retry_attempts: 0,
        ..test_config()
    };
    let fixture = Fixture::new(config);
    fixture.store.inject_transient_failures(1);

    let err = fixture
        .scheduler
        .run_pass(at(2025, 4, 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CandidateLoad(_)));
}

// A zero deadline defers the whole batch; nothing is advanced and every
// candidate is reported unreached.
#[tokio::test]
async fn deadline_defers_unreached_filings() {
    let config = EngineConfig {
        pass_deadline: Some(Duration::ZERO),
        ..test_config()
    };
    let fixture = Fixture::new(config);
    let f = filing(
        date(2025, 3, 31),
        FilingFrequency::Quarterly,
        FilingStatus::Filed,
    );
    let filing_id = f.filing_id;
    fixture.store.insert_filing(f);

    let report = fixture
        .scheduler
        .run_pass(at(2025, 4, 1), None)
        .await
        .unwrap();

    assert_eq!(report.advanced, 0);
    assert_eq!(report.unreached, vec![filing_id]);
    assert_eq!(fixture.store.filing(filing_id).unwrap().due_date, date(2025, 3, 31));
}

// An advancement landing inside the horizon is visible to the same pass's
// reminder selection: the fresh auto-task goes out in the digest.
#[tokio::test]
async fn advanced_cycle_inside_horizon_is_reminded_same_pass() {
    let fixture = Fixture::new(test_config());
    let alice = recipient("Alice");
    fixture.store.add_recipient(alice);

    let mut f = filing(
        date(2025, 6, 1),
        FilingFrequency::Monthly,
        FilingStatus::Filed,
    );
    f.title = "Monthly VAT".to_string();
    let filing_id = f.filing_id;
    let entity_id = f.entity_id;
    fixture.store.set_entity_name(entity_id, "Acme GmbH");
    fixture.store.insert_filing(f);

    // Advancement moves the due date to 2025-07-01, five days out.
    let report = fixture
        .scheduler
        .run_pass(at(2025, 6, 26), None)
        .await
        .unwrap();

    assert_eq!(report.advanced, 1);
    assert_eq!(report.tasks_created, 1);
    assert_eq!(report.reminders_sent, 1);

    let digest = fixture.transport.digest_for("alice@example.com").unwrap();
    assert_eq!(digest.items.len(), 1);
    assert_eq!(digest.items[0].due_date, date(2025, 7, 1));
    assert_eq!(digest.items[0].entity_name.as_deref(), Some("Acme GmbH"));
    assert_eq!(digest.items[0].urgency, "due in 5 days");

    let tasks = fixture.store.tasks_for_filing(filing_id);
    assert_eq!(tasks[0].priority, TaskPriority::Urgent);
}

// The trigger source's horizon override narrows or widens a single pass.
#[tokio::test]
async fn horizon_override_applies_per_invocation() {
    let fixture = Fixture::new(test_config());
    let alice = recipient("Alice");
    fixture.store.add_recipient(alice);
    fixture
        .store
        .insert_existing_task(task(date(2025, 6, 25), None));

    // Ten days out: outside the default 7-day horizon.
    let report = fixture
        .scheduler
        .run_pass(at(2025, 6, 15), None)
        .await
        .unwrap();
    assert_eq!(report.reminders_sent, 0);

    let report = fixture
        .scheduler
        .run_pass(at(2025, 6, 15), Some(14))
        .await
        .unwrap();
    assert_eq!(report.reminders_sent, 1);
}
