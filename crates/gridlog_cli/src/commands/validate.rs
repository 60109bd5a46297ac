//! Probe the stored session and report its state.

use std::sync::Arc;

use console::style;
use gridlog::session::{SessionState, SessionStore, SessionValidator};

use crate::commands::shared::{open_db, transport};
use crate::config::Config;

pub(crate) async fn handle_validate(
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_db(database_url).await?;
    let store = SessionStore::open(Arc::clone(&db)).await?;

    match store.state().await {
        SessionState::Absent => {
            println!(
                "{} no session stored; run {} first",
                style("Absent:").yellow().bold(),
                style("gridlog login").cyan()
            );
            return Ok(());
        }
        SessionState::Invalid => {
            println!(
                "{} the stored session was rejected; run {} again",
                style("Invalid:").red().bold(),
                style("gridlog login").cyan()
            );
            return Ok(());
        }
        SessionState::Valid | SessionState::Stale => {}
    }

    let probe_url = config
        .probe_url()
        .ok_or("platform.base_url is not configured (set GRIDLOG_PLATFORM_BASE_URL)")?;
    let validator = SessionValidator::new(transport()?, probe_url);

    match store.current(&validator).await {
        Ok(blob) => {
            println!(
                "{} session is usable ({} cookies, validated {})",
                style("Valid:").green().bold(),
                blob.cookies.len(),
                blob.validated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        Err(e) => {
            println!("{} {}", style("Invalid:").red().bold(), e);
        }
    }

    Ok(())
}
