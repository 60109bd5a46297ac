//! Schema management for the session, record-history, and sync-target
//! stores.

use console::style;
use gridlog::db;
use gridlog::migration::{Migrator, MigratorTrait};

use crate::MigrateAction;

pub(crate) async fn handle_migrate(
    action: MigrateAction,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = db::connect(database_url).await?;

    match action {
        MigrateAction::Up => {
            let pending = Migrator::get_pending_migrations(&db).await?;
            if pending.is_empty() {
                println!("Schema is up to date.");
                return Ok(());
            }
            for migration in &pending {
                println!("  {} {}", style("applying").cyan(), migration.name());
            }
            Migrator::up(&db, None).await?;
            println!(
                "{} {} migration(s) applied",
                style("Done:").green().bold(),
                pending.len()
            );
        }
        MigrateAction::Down => {
            Migrator::down(&db, Some(1)).await?;
            println!(
                "{} rolled back one migration",
                style("Done:").green().bold()
            );
        }
        MigrateAction::Status => {
            for migration in Migrator::get_applied_migrations(&db).await? {
                println!("  {} {}", style("applied").green(), migration.name());
            }
            let pending = Migrator::get_pending_migrations(&db).await?;
            for migration in &pending {
                println!("  {} {}", style("pending").yellow(), migration.name());
            }
            if pending.is_empty() {
                println!("Session, history, and target tables are current.");
            }
        }
        MigrateAction::Fresh => {
            println!(
                "{} dropping stored sessions, record histories, and sync targets",
                style("Warning:").yellow().bold()
            );
            Migrator::fresh(&db).await?;
            println!("{} schema rebuilt from scratch", style("Done:").green().bold());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn up_then_status_run_against_a_fresh_database() {
        // Each call opens its own in-memory database, so both exercise the
        // full connect-and-inspect path from scratch.
        handle_migrate(MigrateAction::Up, "sqlite::memory:")
            .await
            .expect("up applies the schema");
        handle_migrate(MigrateAction::Status, "sqlite::memory:")
            .await
            .expect("status lists migrations");
    }
}
