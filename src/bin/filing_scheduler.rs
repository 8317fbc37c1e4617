//! One-shot scheduled pass runner.
//!
//! Invoked by an external periodic trigger (cron), daily cadence expected.
//! An optional first argument overrides the reminder horizon in days:
//!
//! ```text
//! filing_scheduler [horizon_days]
//! ```
//!
//! Exits non-zero only when the pass itself cannot run (hard dependency
//! failure); per-item errors are reported in the printed summary.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use filing_engine::database::DatabaseManager;
use filing_engine::{EngineConfig, FilingScheduler, WebhookTransport};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let horizon_override: Option<u16> = std::env::args()
        .nth(1)
        .map(|arg| {
            arg.parse()
                .with_context(|| format!("invalid horizon override '{arg}'"))
        })
        .transpose()?;

    let webhook = std::env::var("FILING_NOTIFY_WEBHOOK")
        .context("FILING_NOTIFY_WEBHOOK must point at the mail bridge")?;

    let db = DatabaseManager::with_default_config()
        .await
        .context("failed to connect to the records store")?;
    db.verify_schema().await?;

    let scheduler = FilingScheduler::new(
        db.filing_store(),
        WebhookTransport::new(webhook),
        EngineConfig::default(),
    );

    info!(?horizon_override, "Starting scheduled filing pass");
    let report = scheduler.run_pass(Utc::now(), horizon_override).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    db.close().await;
    Ok(())
}
