//! Display the stored change history of one record.

use console::style;
use gridlog::history;
use gridlog::revision::{ChangeEvent, FieldKind};

use crate::commands::shared::open_db;

pub(crate) async fn handle_history(
    database_url: &str,
    record_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_db(database_url).await?;

    let Some(row) = history::find_by_record_id(db.as_ref(), record_id).await? else {
        println!(
            "{} no stored history for {}; run {} first",
            style("Not found:").yellow().bold(),
            record_id,
            style("gridlog sync").cyan()
        );
        return Ok(());
    };

    let events = history::decode_events(&row)?;
    println!(
        "{} ({} events, synced {})",
        style(record_id).cyan().bold(),
        events.len(),
        row.synced_at.format("%Y-%m-%d %H:%M:%S")
    );
    for event in &events {
        println!("  {}", render_event(event));
    }

    Ok(())
}

pub(crate) fn render_event(event: &ChangeEvent) -> String {
    let field = match event.field {
        FieldKind::Assignee => style("assignee").magenta(),
        FieldKind::Status => style("status").blue(),
    };
    let old = event.old_value.as_deref().unwrap_or("(none)");
    let new = event.new_value.as_deref().unwrap_or("(none)");
    format!(
        "{} {} {} → {} by {} at {}",
        field,
        style("changed").dim(),
        old,
        new,
        event.actor,
        event.occurred_at.format("%Y-%m-%d %H:%M")
    )
}
