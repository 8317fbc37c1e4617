//! Scheduled pass driver.
//!
//! Invoked by an external periodic trigger (daily cron is the expected
//! cadence). One pass sequences: advance recurring filings, select
//! reminders, dispatch digests. The driver performs no business logic of
//! its own beyond sequencing and aggregating a per-item result report;
//! every per-item failure is recorded and isolated, and only an inability
//! to load the candidate set aborts the run.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, StoreError, StoreResult};
use crate::models::{NewFilingTask, Recipient};
use crate::notify::{dispatch_digests, Digest, NotificationTransport};
use crate::recurrence::plan_advance;
use crate::reminders::select_reminders;
use crate::status::classify_priority;
use crate::store::{FilingStore, MalformedRecord};

/// Failure classification in the pass report, mirroring the engine's error
/// taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassErrorKind {
    Configuration,
    Store,
    Transport,
}

/// One recorded per-item failure.
#[derive(Debug, Serialize)]
pub struct PassError {
    /// Filing or recipient the failure was recorded against, when known.
    pub item: Option<Uuid>,
    pub kind: PassErrorKind,
    pub message: String,
}

/// Summary of one scheduled pass. This, not an exception, is what the
/// surrounding application surfaces to operators.
#[derive(Debug, Default, Serialize)]
pub struct PassReport {
    pub advanced: u32,
    pub tasks_created: u32,
    pub reminders_sent: u32,
    /// Conditional writes that found the filing already advanced by a
    /// concurrent invocation.
    pub skipped: u32,
    /// Filings not reached before the pass deadline; the next scheduled
    /// invocation picks them up.
    pub unreached: Vec<Uuid>,
    /// Set when the recipient set was empty (a configuration gap, distinct
    /// from having no due tasks).
    pub no_recipients: bool,
    pub errors: Vec<PassError>,
}

impl PassReport {
    fn record_store_error(&mut self, item: Option<Uuid>, err: StoreError) {
        self.errors.push(PassError {
            item,
            kind: PassErrorKind::Store,
            message: err.to_string(),
        });
    }

    /// Rows the store could not decode are a per-item configuration problem,
    /// recorded here so the rest of the batch still runs.
    fn record_malformed(&mut self, malformed: &[MalformedRecord]) {
        for bad in malformed {
            self.errors.push(PassError {
                item: Some(bad.id),
                kind: PassErrorKind::Configuration,
                message: bad.message.clone(),
            });
        }
    }
}

/// The periodic entry point over a records store and a notification
/// transport.
pub struct FilingScheduler<S, N> {
    store: S,
    transport: N,
    config: EngineConfig,
}

impl<S: FilingStore, N: NotificationTransport> FilingScheduler<S, N> {
    pub fn new(store: S, transport: N, config: EngineConfig) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// Run one pass as of `now`. `horizon_override` is the trigger source's
    /// per-invocation reminder horizon, in days.
    pub async fn run_pass(
        &self,
        now: DateTime<Utc>,
        horizon_override: Option<u16>,
    ) -> EngineResult<PassReport> {
        let deadline = self.config.pass_deadline.map(|d| Instant::now() + d);
        let mut report = PassReport::default();

        self.advance_recurring(now, deadline, &mut report).await?;
        self.select_and_notify(now, horizon_override, &mut report)
            .await;

        info!(
            advanced = report.advanced,
            tasks_created = report.tasks_created,
            reminders_sent = report.reminders_sent,
            skipped = report.skipped,
            unreached = report.unreached.len(),
            errors = report.errors.len(),
            "Scheduled pass complete"
        );
        Ok(report)
    }

    async fn advance_recurring(
        &self,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
        report: &mut PassReport,
    ) -> EngineResult<()> {
        let batch = self
            .retry(|| self.store.list_advance_candidates())
            .await
            .map_err(EngineError::CandidateLoad)?;
        report.record_malformed(&batch.malformed);
        let candidates = batch.rows;
        info!(candidates = candidates.len(), "Advancing recurring filings");

        for (idx, filing) in candidates.iter().enumerate() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                report
                    .unreached
                    .extend(candidates[idx..].iter().map(|f| f.filing_id));
                warn!(
                    unreached = report.unreached.len(),
                    "Pass deadline hit mid-batch; remaining filings deferred"
                );
                break;
            }

            let reset = match plan_advance(filing) {
                Ok(reset) => reset,
                Err(err) => {
                    warn!(filing = %filing.filing_id, %err, "Skipping misconfigured filing");
                    report.errors.push(PassError {
                        item: Some(filing.filing_id),
                        kind: PassErrorKind::Configuration,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            match self.retry(|| self.store.apply_cycle_reset(&reset)).await {
                Ok(true) => {
                    report.advanced += 1;
                    info!(
                        filing = %filing.filing_id,
                        next_due = %reset.next_due_date,
                        "Advanced filing to next cycle"
                    );
                    if self.config.auto_generate_tasks {
                        let task = NewFilingTask {
                            entity_id: filing.entity_id,
                            filing_id: Some(filing.filing_id),
                            title: filing.title.clone(),
                            description: Some(
                                "Auto-generated for the next filing cycle".to_string(),
                            ),
                            due_date: reset.next_due_date,
                            priority: classify_priority(reset.next_due_date, now),
                            assigned_to: self.config.default_assignee,
                            is_auto_generated: true,
                        };
                        match self.retry(|| self.store.insert_task(&task)).await {
                            Ok(task_id) => {
                                report.tasks_created += 1;
                                debug!(%task_id, filing = %filing.filing_id, "Created follow-up task");
                            }
                            Err(err) => report.record_store_error(Some(filing.filing_id), err),
                        }
                    }
                }
                Ok(false) => {
                    // Another invocation got there first; the guard makes
                    // this a no-op rather than a double advancement.
                    report.skipped += 1;
                    debug!(filing = %filing.filing_id, "Filing already advanced, skipping");
                }
                Err(err) => report.record_store_error(Some(filing.filing_id), err),
            }
        }
        Ok(())
    }

    async fn select_and_notify(
        &self,
        now: DateTime<Utc>,
        horizon_override: Option<u16>,
        report: &mut PassReport,
    ) {
        let horizon = horizon_override.unwrap_or(self.config.reminder_horizon_days);

        let overrides = match self.retry(|| self.store.reminder_overrides()).await {
            Ok(overrides) => overrides,
            Err(err) => {
                report.record_store_error(None, err);
                HashMap::new()
            }
        };
        let recipients = match self.retry(|| self.store.list_recipients()).await {
            Ok(recipients) => recipients,
            Err(err) => {
                report.record_store_error(None, err);
                return;
            }
        };

        // Query out to the widest effective horizon; the selector narrows
        // per task.
        let widest = overrides
            .values()
            .copied()
            .max()
            .map_or(horizon, |m| m.max(horizon));
        let today = now.date_naive();
        let window_end = today
            .checked_add_days(chrono::Days::new(u64::from(widest)))
            .unwrap_or(chrono::NaiveDate::MAX);
        let tasks = match self.retry(|| self.store.list_open_tasks_due(today, window_end)).await {
            Ok(batch) => {
                report.record_malformed(&batch.malformed);
                batch.rows
            }
            Err(err) => {
                report.record_store_error(None, err);
                return;
            }
        };

        let selection = select_reminders(today, horizon, &tasks, &overrides, &recipients);
        if !selection.has_recipients() {
            report.no_recipients = true;
            warn!(
                due_tasks = selection.due_task_count,
                "No eligible notification recipients configured; skipping dispatch"
            );
            return;
        }
        if selection.is_empty() {
            info!("No tasks due within the reminder horizon");
            return;
        }

        let entity_ids: Vec<Uuid> = selection
            .buckets()
            .flat_map(|(_, bucket)| bucket.iter().map(|t| t.entity_id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let entity_names = match self.retry(|| self.store.entity_names(&entity_ids)).await {
            Ok(names) => names,
            Err(err) => {
                // Digests still go out, just without entity names.
                report.record_store_error(None, err);
                HashMap::new()
            }
        };

        let recipients_by_id: HashMap<Uuid, &Recipient> =
            recipients.iter().map(|r| (r.user_id, r)).collect();
        let digests: Vec<Digest> = selection
            .buckets()
            .filter_map(|(id, bucket)| {
                recipients_by_id
                    .get(id)
                    .map(|r| Digest::build((*r).clone(), bucket, &entity_names, now))
            })
            .collect();

        let failures = dispatch_digests(&self.transport, &digests).await;
        report.reminders_sent = (digests.len() - failures.len()) as u32;
        for failure in failures {
            report.errors.push(PassError {
                item: Some(failure.recipient_id),
                kind: PassErrorKind::Transport,
                message: failure.error.to_string(),
            });
        }
    }

    /// Retry transient store errors a bounded number of times within the
    /// pass; anything else surfaces immediately. The next scheduled
    /// invocation is the backoff.
    async fn retry<T, F, Fut>(&self, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut remaining = self.config.store_retry_attempts;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && remaining > 0 => {
                    remaining -= 1;
                    debug!(%err, remaining, "Retrying transient store error");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
