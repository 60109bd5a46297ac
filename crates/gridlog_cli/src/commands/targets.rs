//! Manage the sync target set.
//!
//! Targets are produced by a separate metadata-ingestion process; this
//! command only imports its JSON export and reports counts.

use console::style;
use gridlog::revision::RecordRef;
use gridlog::targets;
use serde::Deserialize;

use crate::commands::shared::open_db;
use crate::TargetsAction;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetEntry {
    base_id: String,
    table_id: String,
    record_id: String,
}

pub(crate) async fn handle_targets(
    action: TargetsAction,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_db(database_url).await?;

    match action {
        TargetsAction::Import { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let entries: Vec<TargetEntry> = serde_json::from_str(&raw)?;
            let refs: Vec<RecordRef> = entries
                .into_iter()
                .map(|e| RecordRef::new(e.base_id, e.table_id, e.record_id))
                .collect();

            let inserted = targets::seed(db.as_ref(), &refs).await?;
            println!(
                "{} {} of {} targets from {} (the rest already existed)",
                style("Imported").green().bold(),
                inserted,
                refs.len(),
                file.display()
            );
        }
        TargetsAction::Count => {
            let count = targets::count(db.as_ref()).await?;
            println!("{count} sync targets stored");
        }
    }

    Ok(())
}
