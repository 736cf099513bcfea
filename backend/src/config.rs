//! Configuration management for the inventory costing service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with COSTING_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Costing engine behaviour
    pub costing: CostingConfig,

    /// Log output
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,

    /// Apply embedded migrations at startup
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CostingConfig {
    /// Let a receipt satisfy part of a backorder it cannot cover in full
    pub partial_reconciliation: bool,

    /// Per-transaction lock wait before giving up, in milliseconds
    pub lock_timeout_ms: u64,

    /// Used when an allocate request does not say whether to backorder
    pub default_allow_negative: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by RUST_LOG
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("COSTING_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.run_migrations", environment == "development")?
            .set_default("costing.partial_reconciliation", true)?
            .set_default("costing.lock_timeout_ms", 5000)?
            .set_default("costing.default_allow_negative", true)?
            .set_default(
                "logging.filter",
                "costing_server=debug,inventory_costing=debug,tower_http=debug,sqlx=warn",
            )?
            .set_default("logging.json", false)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (COSTING_ prefix)
            .add_source(
                Environment::with_prefix("COSTING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Default for CostingConfig {
    fn default() -> Self {
        Self {
            partial_reconciliation: true,
            lock_timeout_ms: 5000,
            default_allow_negative: true,
        }
    }
}
