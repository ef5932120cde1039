//! # Service Configuration
//!
//! Configuration for services embedding the commission ledger.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     AGENT_DB_PATH=/var/lib/agent/agent.db                              │
//! │     DEFAULT_COMMISSION_RATE=7.5                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/agent-commission/agent.toml (Linux)                      │
//! │     ~/Library/Application Support/com.agent.commission/agent.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/agent/agent.db"
//! max_connections = 5
//! run_migrations = true
//!
//! [commission]
//! default_rate = 10.0
//! currency = "MYR"
//!
//! [logging]
//! level = "info,agent_db=debug,sqlx=warn"
//! pretty = false
//!
//! [service]
//! port = 8006
//! environment = "development"
//! ```

use agent_core::CommissionRate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pool::DbConfig;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No config path available on this platform")]
    NoConfigPath,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Environment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::Invalid(format!(
                "Unknown environment: '{}'. Valid options: development, staging, production",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. `:memory:` for a throwaway database.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "agent", "commission")
        .map(|dirs| dirs.data_dir().join("agent.db"))
        .unwrap_or_else(|| PathBuf::from("agent.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: default_database_path(),
            max_connections: default_max_connections(),
            run_migrations: true,
        }
    }
}

impl From<&DatabaseConfig> for DbConfig {
    fn from(config: &DatabaseConfig) -> Self {
        DbConfig::new(config.path.clone())
            .max_connections(config.max_connections)
            .run_migrations(config.run_migrations)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Percent applied to agents registered without an explicit rate.
    #[serde(default = "default_rate")]
    pub default_rate: f64,

    /// Display label only. Amounts are always stored in minor units.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_rate() -> f64 {
    agent_core::DEFAULT_COMMISSION_RATE
}

fn default_currency() -> String {
    "MYR".to_string()
}

impl Default for CommissionConfig {
    fn default() -> Self {
        CommissionConfig {
            default_rate: default_rate(),
            currency: default_currency(),
        }
    }
}

impl CommissionConfig {
    pub fn default_commission_rate(&self) -> ConfigResult<CommissionRate> {
        CommissionRate::new(self.default_rate)
            .map_err(|e| ConfigError::Invalid(format!("commission.default_rate: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Multi-line output with targets and thread ids, for local debugging.
    #[serde(default)]
    pub pretty: bool,
}

fn default_log_level() -> String {
    "info,agent_db=debug,sqlx=warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            pretty: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub environment: Environment,
}

fn default_port() -> u16 {
    8006
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            port: default_port(),
            environment: Environment::default(),
        }
    }
}

// =============================================================================
// Service Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub commission: CommissionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub service: ServiceSettings,
}

impl ServiceConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (agent.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading service config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load service config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Service config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.commission.default_commission_rate()?;

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.service.port == 0 {
            return Err(ConfigError::Invalid("service.port must be greater than 0".into()));
        }

        if self.commission.currency.trim().is_empty() {
            return Err(ConfigError::Invalid("commission.currency is required".into()));
        }

        Ok(())
    }

    /// Applies overrides from `lookup`, normally the process environment.
    /// Unparseable numeric values are ignored with a warning.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("AGENT_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("AGENT_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid AGENT_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(rate) = lookup("DEFAULT_COMMISSION_RATE") {
            match rate.parse::<f64>() {
                Ok(r) => self.commission.default_rate = r,
                Err(_) => warn!(value = %rate, "Ignoring invalid DEFAULT_COMMISSION_RATE"),
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(port) = lookup("APP_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.service.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid APP_PORT"),
            }
        }

        if let Some(env) = lookup("APP_ENV") {
            match env.parse() {
                Ok(parsed) => self.service.environment = parsed,
                Err(e) => warn!("{}", e),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "agent", "commission").map(|dirs| dirs.config_dir().join("agent.toml"))
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::from(&self.database)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert!(config.database.run_migrations);
        assert_eq!(config.commission.default_rate, 10.0);
        assert_eq!(config.commission.currency, "MYR");
        assert_eq!(config.service.port, 8006);
        assert_eq!(config.service.environment, Environment::Development);
        assert_eq!(config.commission.default_commission_rate().unwrap(), CommissionRate::DEFAULT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let toml = r#"
            [database]
            path = "/tmp/agents.db"

            [commission]
            default_rate = 7.5

            [service]
            environment = "production"
        "#;
        let config: ServiceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/agents.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.commission.default_rate, 7.5);
        assert_eq!(config.commission.currency, "MYR");
        assert!(config.service.environment.is_production());
        assert_eq!(config.logging.level, "info,agent_db=debug,sqlx=warn");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AGENT_DB_PATH", ":memory:"),
            ("AGENT_DB_MAX_CONNECTIONS", "2"),
            ("DEFAULT_COMMISSION_RATE", "12.5"),
            ("APP_PORT", "not-a-port"),
            ("APP_ENV", "staging"),
        ]
        .into_iter()
        .collect();

        let mut config = ServiceConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from(":memory:"));
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.commission.default_rate, 12.5);
        assert_eq!(config.service.port, 8006);
        assert_eq!(config.service.environment, Environment::Staging);
    }

    #[test]
    fn test_validation() {
        let mut config = ServiceConfig::default();
        config.commission.default_rate = 120.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ServiceConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.service.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert!("qa".parse::<Environment>().is_err());
        assert_eq!(Environment::Staging.to_string(), "staging");
    }

    #[test]
    fn test_toml_roundtrip_and_db_config() {
        let mut config = ServiceConfig::default();
        config.database.path = PathBuf::from("/data/agent.db");
        config.database.max_connections = 3;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: ServiceConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.database.path, config.database.path);

        let db = parsed.db_config();
        assert_eq!(db.database_path, PathBuf::from("/data/agent.db"));
        assert_eq!(db.max_connections, 3);
        assert!(db.run_migrations);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("agent-config-does-not-exist.toml");
        let config = ServiceConfig::load_or_default(Some(path));
        assert_eq!(config.commission.currency, "MYR");
    }
}
