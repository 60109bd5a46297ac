//! Configuration file support for gridlog.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `GRIDLOG_`, e.g., `GRIDLOG_DATABASE_URL`)
//! 3. Config file (~/.config/gridlog/config.toml or ./gridlog.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/gridlog/gridlog.db`
//! on Linux (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/gridlog/gridlog.db"  # optional, this is the default
//!
//! [platform]
//! base_url = "https://grid.example.com"
//! login_email = "ops@example.com"  # or use GRIDLOG_PLATFORM_LOGIN_EMAIL
//!
//! [sync]
//! batch_size = 10
//! requests_per_second = 4
//! max_in_flight = 3
//! polarity = "icon"  # or "strikethrough"
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, ConfigError, File, FileFormat};
use directories::ProjectDirs;
use gridlog::dispatch::{
    DispatcherConfig, DEFAULT_MAX_IN_FLIGHT, DEFAULT_REQUESTS_PER_SECOND,
};
use gridlog::revision::PolarityRule;
use gridlog::sync::DEFAULT_BATCH_SIZE;
use serde::Deserialize;

/// Environment variables and the config keys they override. Section names
/// contain underscores themselves (`base_url`), so a generic prefix/separator
/// split would mangle them; each variable is mapped explicitly.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("database.url", "GRIDLOG_DATABASE_URL"),
    ("platform.base_url", "GRIDLOG_PLATFORM_BASE_URL"),
    ("platform.login_url", "GRIDLOG_PLATFORM_LOGIN_URL"),
    ("platform.probe_url", "GRIDLOG_PLATFORM_PROBE_URL"),
    ("platform.login_email", "GRIDLOG_PLATFORM_LOGIN_EMAIL"),
    ("sync.batch_size", "GRIDLOG_SYNC_BATCH_SIZE"),
    ("sync.requests_per_second", "GRIDLOG_SYNC_REQUESTS_PER_SECOND"),
    ("sync.max_in_flight", "GRIDLOG_SYNC_MAX_IN_FLIGHT"),
    ("sync.polarity", "GRIDLOG_SYNC_POLARITY"),
];

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// The grid platform to sync against.
    pub platform: PlatformConfig,
    /// Default sync options.
    pub sync: SyncConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Defaults to `sqlite://~/.local/state/gridlog/gridlog.db` if not specified.
    pub url: Option<String>,
}

/// Platform endpoints and login identity.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Root URL of the platform (e.g., "https://grid.example.com").
    /// Can also be set via GRIDLOG_PLATFORM_BASE_URL.
    pub base_url: Option<String>,
    /// Login page URL. Defaults to `{base_url}/login`.
    pub login_url: Option<String>,
    /// Session probe URL. Defaults to `{base_url}/internal/whoami`.
    pub probe_url: Option<String>,
    /// Email used by the `login` command.
    /// Can also be set via GRIDLOG_PLATFORM_LOGIN_EMAIL.
    pub login_email: Option<String>,
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of records fetched per batch.
    pub batch_size: usize,
    /// Aggregate request starts per second.
    pub requests_per_second: u32,
    /// Concurrency ceiling for in-flight requests.
    pub max_in_flight: usize,
    /// Diff-token polarity rule: "icon" or "strikethrough".
    pub polarity: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            polarity: "icon".to_string(),
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/gridlog/config.toml)
    /// 3. Local config file (./gridlog.toml)
    /// 4. Environment variables with GRIDLOG_ prefix
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}", e);
                Config::default()
            }
        }
    }

    fn try_load() -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "gridlog") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("gridlog.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./gridlog.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        for (key, var) in ENV_OVERRIDES {
            let value = std::env::var(var).ok().filter(|v| !v.is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter enables read-write access and creates the
    /// file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("gridlog.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// Root URL of the platform; required for every network command.
    pub fn base_url(&self) -> Option<String> {
        self.platform
            .base_url
            .as_ref()
            .map(|url| url.trim_end_matches('/').to_string())
    }

    /// Login page URL, derived from the base URL unless overridden.
    pub fn login_url(&self) -> Option<String> {
        self.platform
            .login_url
            .clone()
            .or_else(|| self.base_url().map(|base| format!("{base}/login")))
    }

    /// Session probe URL, derived from the base URL unless overridden.
    pub fn probe_url(&self) -> Option<String> {
        self.platform
            .probe_url
            .clone()
            .or_else(|| self.base_url().map(|base| format!("{base}/internal/whoami")))
    }

    /// Build a dispatcher config from the sync section.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            requests_per_second: self.sync.requests_per_second,
            max_in_flight: self.sync.max_in_flight,
            ..DispatcherConfig::default()
        }
    }

    /// Parse the configured polarity rule.
    pub fn polarity_rule(&self) -> PolarityRule {
        match self.sync.polarity.as_str() {
            "strikethrough" => PolarityRule::StrikethroughStyle,
            "icon" => PolarityRule::IconMarker,
            other => {
                tracing::warn!(polarity = other, "unknown polarity rule, using icon markers");
                PolarityRule::IconMarker
            }
        }
    }

    /// Get the XDG state directory for the database file.
    fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "gridlog").map(|dirs| {
            dirs.state_dir()
                .map(PathBuf::from)
                .unwrap_or_else(|| dirs.data_local_dir().to_path_buf())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_urls_strip_trailing_slashes() {
        let config = Config {
            platform: PlatformConfig {
                base_url: Some("https://grid.example.com/".to_string()),
                ..PlatformConfig::default()
            },
            ..Config::default()
        };

        assert_eq!(
            config.login_url().as_deref(),
            Some("https://grid.example.com/login")
        );
        assert_eq!(
            config.probe_url().as_deref(),
            Some("https://grid.example.com/internal/whoami")
        );
    }

    #[test]
    fn explicit_urls_win_over_derived_ones() {
        let config = Config {
            platform: PlatformConfig {
                base_url: Some("https://grid.example.com".to_string()),
                probe_url: Some("https://grid.example.com/auth/check".to_string()),
                ..PlatformConfig::default()
            },
            ..Config::default()
        };

        assert_eq!(
            config.probe_url().as_deref(),
            Some("https://grid.example.com/auth/check")
        );
    }

    #[test]
    fn documented_env_vars_reach_the_loaded_config() {
        std::env::set_var("GRIDLOG_PLATFORM_BASE_URL", "https://env.example.com/");
        std::env::set_var("GRIDLOG_PLATFORM_LOGIN_EMAIL", "env@example.com");

        let config = Config::load();

        std::env::remove_var("GRIDLOG_PLATFORM_BASE_URL");
        std::env::remove_var("GRIDLOG_PLATFORM_LOGIN_EMAIL");

        assert_eq!(config.base_url().as_deref(), Some("https://env.example.com"));
        assert_eq!(
            config.platform.login_email.as_deref(),
            Some("env@example.com")
        );
    }

    #[test]
    fn unknown_polarity_falls_back_to_icon_markers() {
        let config = Config {
            sync: SyncConfig {
                polarity: "telepathy".to_string(),
                ..SyncConfig::default()
            },
            ..Config::default()
        };

        assert_eq!(config.polarity_rule(), PolarityRule::IconMarker);
    }
}
