//! Digest rendering and dispatch.
//!
//! One digest per recipient, not one message per task. The transport is a
//! thin HTTP bridge to the outbound mail service; delivery is at-least-once
//! with no confirmation beyond the immediate response. A failure for one
//! recipient never blocks dispatch to the others.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::models::{FilingTask, Recipient};
use crate::status::days_until;

/// One line of a recipient's digest.
#[derive(Debug, Clone, Serialize)]
pub struct DigestItem {
    pub task_id: Uuid,
    pub title: String,
    pub entity_name: Option<String>,
    pub due_date: NaiveDate,
    pub urgency: String,
}

/// One message aggregating every due item for a single recipient.
#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub recipient: Recipient,
    pub subject: String,
    pub items: Vec<DigestItem>,
}

impl Digest {
    /// Build a digest from a recipient's bucket. `entity_names` resolves
    /// entity ids for rendering; missing ids render without an entity name.
    pub fn build(
        recipient: Recipient,
        tasks: &[FilingTask],
        entity_names: &HashMap<Uuid, String>,
        now: DateTime<Utc>,
    ) -> Self {
        let items: Vec<DigestItem> = tasks
            .iter()
            .map(|t| DigestItem {
                task_id: t.task_id,
                title: t.title.clone(),
                entity_name: entity_names.get(&t.entity_id).cloned(),
                due_date: t.due_date,
                urgency: humanize_urgency(days_until(t.due_date, now)),
            })
            .collect();
        let subject = format!(
            "Compliance reminders: {} item{} due",
            items.len(),
            if items.len() == 1 { "" } else { "s" }
        );
        Self {
            recipient,
            subject,
            items,
        }
    }

    /// Plain-text body, one line per item, in bucket order.
    pub fn body(&self) -> String {
        let mut out = format!("Hello {},\n\n", self.recipient.display_name);
        for item in &self.items {
            match &item.entity_name {
                Some(entity) => {
                    let _ = writeln!(
                        out,
                        "- {} ({}) due {} ({})",
                        item.title, entity, item.due_date, item.urgency
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "- {} due {} ({})",
                        item.title, item.due_date, item.urgency
                    );
                }
            }
        }
        out
    }
}

/// Humanized urgency indicator from whole days until due.
pub fn humanize_urgency(days: i64) -> String {
    match days {
        d if d < -1 => format!("overdue by {} days", -d),
        -1 => "overdue by 1 day".to_string(),
        0 => "due today".to_string(),
        1 => "due tomorrow".to_string(),
        d => format!("due in {} days", d),
    }
}

/// Outbound side of the engine. Implementations must be safe to call
/// concurrently; the scheduler sends digests sequentially but read paths may
/// share the transport.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, digest: &Digest) -> Result<(), TransportError>;
}

/// Failure record for one recipient's send.
#[derive(Debug)]
pub struct DispatchFailure {
    pub recipient_id: Uuid,
    pub email: String,
    pub error: TransportError,
}

/// Send one digest per recipient, collecting failures instead of
/// propagating them.
pub async fn dispatch_digests(
    transport: &dyn NotificationTransport,
    digests: &[Digest],
) -> Vec<DispatchFailure> {
    let mut failures = Vec::new();
    for digest in digests {
        match transport.send(digest).await {
            Ok(()) => {
                debug!(
                    recipient = %digest.recipient.email,
                    items = digest.items.len(),
                    "Sent reminder digest"
                );
            }
            Err(error) => {
                warn!(
                    recipient = %digest.recipient.email,
                    %error,
                    "Failed to send reminder digest"
                );
                failures.push(DispatchFailure {
                    recipient_id: digest.recipient.user_id,
                    email: digest.recipient.email.clone(),
                    error,
                });
            }
        }
    }
    failures
}

/// HTTP bridge to the outbound mail service. Posts a JSON payload
/// `{to, subject, body}` and treats any non-2xx response as a send failure.
#[derive(Debug, Clone)]
pub struct WebhookTransport {
    client: Client,
    endpoint: String,
}

impl WebhookTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn send(&self, digest: &Digest) -> Result<(), TransportError> {
        let payload = json!({
            "to": digest.recipient.email,
            "subject": digest.subject,
            "body": digest.body(),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed {
                recipient: digest.recipient.email.clone(),
                message: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::SendFailed {
                recipient: digest.recipient.email.clone(),
                message: format!("mail bridge returned {}", response.status()),
            })
        }
    }
}
