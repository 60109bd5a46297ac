//! Gridlog CLI - command-line interface for the revision-history sync engine.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gridlog")]
#[command(version)]
#[command(about = "Revision-history sync engine for grid platform records")]
#[command(
    long_about = "Gridlog extracts assignee and status change history for grid platform \
records through the platform's internal activity endpoint. It maintains a local \
database of per-record change events, refreshed by rate-limited batch sync jobs \
that reuse an authenticated browser session."
)]
#[command(after_long_help = r#"EXAMPLES
    Log in and store a session:
        $ gridlog login --email ops@example.com

    Check whether the stored session is still usable:
        $ gridlog validate

    Import sync targets and run a full sync:
        $ gridlog targets import targets.json
        $ gridlog sync

    Check on the current sync job:
        $ gridlog status

    Fetch one record ad hoc:
        $ gridlog fetch appXXXX tblYYYY recZZZZ

    Show the stored history of a record:
        $ gridlog history recZZZZ

CONFIGURATION
    Gridlog reads configuration from:
      1. ~/.config/gridlog/config.toml (or $XDG_CONFIG_HOME/gridlog/config.toml)
      2. ./gridlog.toml
      3. Environment variables (GRIDLOG_* prefix)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    GRIDLOG_DATABASE_URL            Database connection string (default: ~/.local/state/gridlog/gridlog.db)
    GRIDLOG_PLATFORM_BASE_URL       Root URL of the grid platform
    GRIDLOG_PLATFORM_LOGIN_EMAIL    Email used by the login command
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Log in through a browser and store the session
    #[cfg(feature = "browser")]
    Login {
        /// Login email (default from config or GRIDLOG_PLATFORM_LOGIN_EMAIL)
        #[arg(short, long)]
        email: Option<String>,

        /// One-time code, when the account has 2FA enabled
        #[arg(long)]
        otp: Option<String>,

        /// Keep the browser window open after the flow (debugging)
        #[arg(long)]
        keep_open: bool,
    },
    /// Probe the platform with the stored session and report its state
    Validate,
    /// Sync revision history for every stored target record
    Sync {
        /// Records per batch (default from config or 10)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Evict a job that is already running and start over
        #[arg(short, long)]
        force: bool,
    },
    /// Report the state of the current or most recent sync job
    Status,
    /// Fetch one record's history ad hoc and store it
    Fetch {
        /// Base id (e.g., "appXXXX")
        base_id: String,
        /// Table id (e.g., "tblYYYY")
        table_id: String,
        /// Record id (e.g., "recZZZZ")
        record_id: String,
    },
    /// Show the stored change history of a record
    History {
        /// Record id (e.g., "recZZZZ")
        record_id: String,
    },
    /// Manage the sync target set
    Targets {
        #[command(subcommand)]
        action: TargetsAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[derive(Subcommand)]
enum TargetsAction {
    /// Import target records from a JSON file
    Import {
        /// Path to a JSON array of {"baseId", "tableId", "recordId"} objects
        file: std::path::PathBuf,
    },
    /// Count the stored targets
    Count,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Structured logging goes to non-TTY consumers; interactive runs get
    // console output from the commands themselves.
    if !Term::stdout().is_term() {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gridlog=info,gridlog_cli=info"));

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = config::Config::load();
    let cli = Cli::parse();

    let database_url = config
        .database_url()
        .ok_or("could not determine a database URL")?;

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        #[cfg(feature = "browser")]
        Commands::Login {
            email,
            otp,
            keep_open,
        } => {
            commands::login::handle_login(&config, &database_url, email, otp, keep_open).await?;
        }
        Commands::Validate => {
            commands::validate::handle_validate(&config, &database_url).await?;
        }
        Commands::Sync { batch_size, force } => {
            commands::sync::handle_sync(&config, &database_url, batch_size, force).await?;
        }
        Commands::Status => {
            commands::sync::handle_status(&config, &database_url).await?;
        }
        Commands::Fetch {
            base_id,
            table_id,
            record_id,
        } => {
            commands::sync::handle_fetch_one(&config, &database_url, base_id, table_id, record_id)
                .await?;
        }
        Commands::History { record_id } => {
            commands::history::handle_history(&database_url, &record_id).await?;
        }
        Commands::Targets { action } => {
            commands::targets::handle_targets(action, &database_url).await?;
        }
    }

    Ok(())
}
