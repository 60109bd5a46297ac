//! Helpers shared by the network-facing commands.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use gridlog::reqwest_transport::ReqwestTransport;
use gridlog::sync::{SyncEngine, SyncProgress};
use gridlog::{connect_and_migrate, HttpTransport};
use sea_orm::DatabaseConnection;

use crate::config::Config;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) async fn open_db(
    database_url: &str,
) -> Result<Arc<DatabaseConnection>, Box<dyn std::error::Error>> {
    Ok(Arc::new(connect_and_migrate(database_url).await?))
}

pub(crate) fn transport() -> Result<Arc<dyn HttpTransport>, Box<dyn std::error::Error>> {
    Ok(Arc::new(ReqwestTransport::with_timeout(REQUEST_TIMEOUT)?))
}

/// Build the engine with a console progress printer attached.
pub(crate) async fn build_engine(
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> Result<SyncEngine, Box<dyn std::error::Error>> {
    let base_url = config
        .base_url()
        .ok_or("platform.base_url is not configured (set GRIDLOG_PLATFORM_BASE_URL)")?;

    let mut builder = SyncEngine::builder()
        .db(Arc::clone(db))
        .transport(transport()?)
        .base_url(base_url)
        .dispatcher_config(config.dispatcher_config())
        .polarity_rule(config.polarity_rule())
        .on_progress(Box::new(print_progress));

    if let Some(probe_url) = config.probe_url() {
        builder = builder.probe_url(probe_url);
    }

    Ok(builder.build().await?)
}

fn print_progress(event: SyncProgress) {
    match event {
        SyncProgress::Started {
            job_id,
            total_targets,
            batch_size,
        } => {
            println!(
                "{} job {} over {} records (batches of {})",
                style("Syncing").green().bold(),
                style(job_id).dim(),
                total_targets,
                batch_size
            );
        }
        SyncProgress::RecordSynced {
            record_id,
            events,
            previously_synced,
        } => {
            let verb = if previously_synced { "updated" } else { "new" };
            println!(
                "  {} {} ({} events, {})",
                style("✓").green(),
                record_id,
                events,
                verb
            );
        }
        SyncProgress::RecordWithoutHistory { record_id } => {
            println!("  {} {} (no history)", style("-").dim(), record_id);
        }
        SyncProgress::RecordFailed { record_id, error } => {
            println!("  {} {}: {}", style("✗").red(), record_id, error);
        }
        SyncProgress::RateLimitBackoff {
            record_id,
            attempt,
            retry_after_ms,
        } => {
            println!(
                "  {} {} throttled, retry {} in {}ms",
                style("…").yellow(),
                record_id,
                attempt,
                retry_after_ms
            );
        }
        SyncProgress::BatchComplete {
            batch_index,
            batch_count,
            snapshot,
        } => {
            println!(
                "{} batch {}/{} ({} of {} records processed)",
                style("Finished").cyan(),
                batch_index + 1,
                batch_count,
                snapshot.processed,
                snapshot.total_targets
            );
        }
        SyncProgress::Finished { .. } => {}
        _ => {}
    }
}
