//! Engine configuration.
//!
//! Defaults come from the environment, matching how the rest of the portal's
//! services are configured in deployment.

use std::time::Duration;

use uuid::Uuid;

/// Run-time parameters for scheduled passes.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default reminder horizon in days; the trigger source or a per-filing
    /// `reminder_days` value can override it.
    pub reminder_horizon_days: u16,
    /// Retries (beyond the first attempt) for transient store errors, per
    /// item per pass. The next scheduled invocation is the backoff.
    pub store_retry_attempts: u32,
    /// Soft deadline for a whole pass; items not reached are reported and
    /// picked up by the next invocation.
    pub pass_deadline: Option<Duration>,
    /// Create a fresh pending task whenever a filing cycle is reset.
    pub auto_generate_tasks: bool,
    /// Assignee for auto-generated tasks; unassigned when absent.
    pub default_assignee: Option<Uuid>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reminder_horizon_days: env_parse("FILING_REMINDER_HORIZON_DAYS", 7),
            store_retry_attempts: env_parse("FILING_STORE_RETRY_ATTEMPTS", 2),
            pass_deadline: std::env::var("FILING_PASS_DEADLINE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            auto_generate_tasks: std::env::var("FILING_AUTO_GENERATE_TASKS")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(true),
            default_assignee: std::env::var("FILING_DEFAULT_ASSIGNEE")
                .ok()
                .and_then(|s| Uuid::parse_str(&s).ok()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
