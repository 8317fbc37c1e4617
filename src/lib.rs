//! Compliance Filing & Task Lifecycle Engine
//!
//! Tracks recurring regulatory obligations per legal entity, derives their
//! live status from the current date rather than storing it, advances
//! completed recurring obligations to their next cycle, and fans out digest
//! reminders to responsible people without duplication.
//!
//! The engine runs as independent batch passes driven by an external
//! periodic trigger; the pure read-path functions ([`status::derive_status`],
//! [`status::classify_priority`]) are also callable from request-serving
//! code concurrently with a pass.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use filing_engine::{EngineConfig, FilingScheduler, MemoryFilingStore, WebhookTransport};
//!
//! # async fn run() -> filing_engine::EngineResult<()> {
//! let store = MemoryFilingStore::new();
//! let transport = WebhookTransport::new("http://mail-bridge.local/send");
//! let scheduler = FilingScheduler::new(store, transport, EngineConfig::default());
//! let report = scheduler.run_pass(Utc::now(), None).await?;
//! println!("advanced {} filings", report.advanced);
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Domain records and enumerations
pub mod models;

// Engine configuration
pub mod config;

// Pure read-path functions: status derivation and priority seeding
pub mod status;

// Recurring-cycle advancement planning
pub mod recurrence;

// Reminder selection and per-recipient partitioning
pub mod reminders;

// Digest rendering and the notification transport seam
pub mod notify;

// Scheduled pass driver
pub mod scheduler;

// Records-store seam and the in-memory implementation
pub mod store;

// Database integration (when enabled)
#[cfg(feature = "database")]
pub mod database;

// Public re-exports for the common surface
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, RecurrenceError, StoreError, StoreResult, TransportError};
pub use models::{
    DerivedStatus, EntityFiling, FilingFrequency, FilingStatus, FilingTask, FilingType,
    NewFilingTask, Recipient, TaskPriority, TaskStatus,
};
pub use notify::{Digest, DigestItem, NotificationTransport, WebhookTransport};
pub use recurrence::{plan_advance, CycleReset};
pub use reminders::{select_reminders, ReminderSelection};
pub use scheduler::{FilingScheduler, PassError, PassErrorKind, PassReport};
pub use status::{classify_priority, days_until, derive_status};
pub use store::{FilingStore, MalformedRecord, MemoryFilingStore, RowBatch};

#[cfg(feature = "database")]
pub use database::{DatabaseConfig, DatabaseManager};
