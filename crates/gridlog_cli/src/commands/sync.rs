//! The batch sync command and the ad-hoc single-record fetch.

use console::style;
use gridlog::revision::RecordRef;
use gridlog::sync::{JobState, SyncError};

use crate::commands::shared::{build_engine, open_db};
use crate::config::Config;

pub(crate) async fn handle_sync(
    config: &Config,
    database_url: &str,
    batch_size: Option<usize>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_db(database_url).await?;
    let engine = build_engine(config, &db).await?;

    let batch_size = batch_size.unwrap_or(config.sync.batch_size);
    let snapshot = match engine.run_to_completion(batch_size, force).await {
        Ok(snapshot) => snapshot,
        Err(SyncError::Conflict { job_id }) => {
            println!(
                "{} job {} is already running; pass {} to restart",
                style("Conflict:").yellow().bold(),
                style(job_id).dim(),
                style("--force").cyan()
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let verdict = match snapshot.state {
        JobState::Completed => style("Completed").green().bold(),
        JobState::Failed => style("Failed").red().bold(),
        JobState::Running => style("Running").yellow().bold(),
    };
    println!(
        "{}: {} processed, {} with history, {} without, {} errors",
        verdict,
        snapshot.processed,
        snapshot.with_history,
        snapshot.without_history,
        snapshot.errors
    );

    if snapshot.state == JobState::Failed {
        return Err("sync job failed".into());
    }
    Ok(())
}

pub(crate) async fn handle_status(
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_db(database_url).await?;
    let engine = build_engine(config, &db).await?;

    let Some(snapshot) = engine.current_job() else {
        println!("No sync job is registered.");
        return Ok(());
    };

    let state = match snapshot.state {
        JobState::Completed => style("Completed").green().bold(),
        JobState::Failed => style("Failed").red().bold(),
        JobState::Running => style("Running").yellow().bold(),
    };
    println!("Job {} - {}", style(snapshot.id).dim(), state);
    println!(
        "  {} of {} targets processed ({} with history, {} without, {} errors)",
        snapshot.processed,
        snapshot.total_targets,
        snapshot.with_history,
        snapshot.without_history,
        snapshot.errors
    );
    println!("  started {}", snapshot.started_at.to_rfc3339());
    match snapshot.ended_at {
        Some(ended) => println!("  ended   {}", ended.to_rfc3339()),
        None => println!("  last activity {}", snapshot.last_activity_at.to_rfc3339()),
    }

    Ok(())
}

pub(crate) async fn handle_fetch_one(
    config: &Config,
    database_url: &str,
    base_id: String,
    table_id: String,
    record_id: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_db(database_url).await?;
    let engine = build_engine(config, &db).await?;

    let record = RecordRef::new(base_id, table_id, record_id);
    let events = engine.fetch_one_record_history(&record).await?;

    if events.is_empty() {
        println!("{} has no assignee/status history", record);
        return Ok(());
    }

    println!(
        "{} {} events for {}",
        style("Fetched").green().bold(),
        events.len(),
        record
    );
    for event in &events {
        println!("  {}", super::history::render_event(event));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;

    #[tokio::test]
    async fn status_with_no_job_reports_cleanly() {
        let config = Config {
            platform: PlatformConfig {
                base_url: Some("https://grid.example.com".to_string()),
                ..PlatformConfig::default()
            },
            ..Config::default()
        };

        handle_status(&config, "sqlite::memory:")
            .await
            .expect("status runs without a registered job");
    }
}
