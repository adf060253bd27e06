use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::{LifecycleConfig, OrchestratorConfig, SelectionPolicy};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub projects: ProjectSettings,
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
    #[serde(default)]
    pub allocation: AllocationSettings,
    #[serde(default)]
    pub selection: SelectionPolicy,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// PostgreSQL store; without a url the registry stays in memory
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

/// Redis offer delivery; without a url offers are not pushed
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    pub redis_url: Option<String>,
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            channel_prefix: default_channel_prefix(),
        }
    }
}

fn default_channel_prefix() -> String { "fairmatch:offers".to_string() }

/// Project-creation service; without an endpoint handoffs are only logged
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSettings {
    pub endpoint: Option<String>,
    #[serde(default = "default_project_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_project_timeout_secs(),
        }
    }
}

fn default_project_timeout_secs() -> u64 { 10 }

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleSettings {
    #[serde(default = "default_decision_window_secs")]
    pub decision_window_secs: u64,
    #[serde(default = "default_resolved_retention_secs")]
    pub resolved_retention_secs: u64,
    #[serde(default = "default_resolved_capacity")]
    pub resolved_capacity: u64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            decision_window_secs: default_decision_window_secs(),
            resolved_retention_secs: default_resolved_retention_secs(),
            resolved_capacity: default_resolved_capacity(),
        }
    }
}

fn default_decision_window_secs() -> u64 { 60 }
fn default_resolved_retention_secs() -> u64 { 3600 }
fn default_resolved_capacity() -> u64 { 100_000 }

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationSettings {
    #[serde(default = "default_max_offers_per_request")]
    pub max_offers_per_request: u32,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            max_offers_per_request: default_max_offers_per_request(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_max_offers_per_request() -> u32 { 5 }
fn default_event_buffer() -> usize { 1024 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with FAIRMATCH__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., FAIRMATCH__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("FAIRMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings = apply_well_known_env(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("FAIRMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Engine configuration derived from these settings
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            policy: self.selection,
            lifecycle: LifecycleConfig {
                decision_window: Duration::from_secs(self.lifecycle.decision_window_secs),
                resolved_retention: Duration::from_secs(self.lifecycle.resolved_retention_secs),
                resolved_capacity: self.lifecycle.resolved_capacity,
            },
            max_offers_per_request: self.allocation.max_offers_per_request,
            event_buffer: self.allocation.event_buffer,
        }
    }
}

/// Honour the conventional DATABASE_URL and REDIS_URL variables when the
/// prefixed ones are not set
fn apply_well_known_env(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if env::var("FAIRMATCH__DATABASE__URL").is_err() {
        if let Ok(url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", url)?;
        }
    }
    if env::var("FAIRMATCH__NOTIFICATIONS__REDIS_URL").is_err() {
        if let Ok(url) = env::var("REDIS_URL") {
            builder = builder.set_override("notifications.redis_url", url)?;
        }
    }

    builder.build()
}
