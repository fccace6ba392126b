//! Configuration management for the caldera content engine
//!
//! This module handles loading and validating process configuration from
//! environment variables. Scheduler settings that administrators change
//! at runtime (enabled flag, cadence, topics) live in the database
//! instead; see [`crate::scheduler::ConfigStore`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::generator::{BrandConfig, ModelConfig};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Text-generation model configuration
    pub model: ModelConfig,

    /// Brand context embedded into generation prompts
    pub brand: BrandConfig,

    /// Scheduler loop configuration
    pub scheduler: SchedulerSettings,

    /// API server configuration
    pub api: ApiConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Scheduler loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Seconds between due-ness checks (independent of publish cadence)
    pub tick_interval_secs: u64,

    /// Lease duration for the cross-instance run lock
    pub lease_ttl_secs: u64,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address for the admin/content API
    pub bind_address: SocketAddr,

    /// Allow cross-origin requests
    pub enable_cors: bool,

    /// Log each HTTP request
    pub enable_request_logging: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let sqlite_path = std::env::var("CALDERA_SQLITE_PATH")
            .unwrap_or_else(|_| String::from("data/caldera.db"))
            .into();

        let tick_interval_secs = std::env::var("CALDERA_TICK_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(300);

        let lease_ttl_secs = std::env::var("CALDERA_LEASE_TTL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(900);

        let bind_address = std::env::var("CALDERA_BIND_ADDRESS")
            .unwrap_or_else(|_| String::from("127.0.0.1:8700"))
            .parse::<SocketAddr>()
            .context("CALDERA_BIND_ADDRESS is not a valid socket address")?;

        let enable_cors = std::env::var("CALDERA_ENABLE_CORS")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);

        let enable_request_logging = std::env::var("CALDERA_REQUEST_LOGGING")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);

        let level = std::env::var("CALDERA_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));
        let format = std::env::var("CALDERA_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        let config = Self {
            database: DatabaseConfig { sqlite_path },
            model: ModelConfig::from_env(),
            brand: BrandConfig::from_env(),
            scheduler: SchedulerSettings {
                tick_interval_secs,
                lease_ttl_secs,
            },
            api: ApiConfig {
                bind_address,
                enable_cors,
                enable_request_logging,
            },
            logging: LoggingConfig { level, format },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_secs == 0 {
            anyhow::bail!("tick interval must be at least 1 second");
        }
        if self.scheduler.lease_ttl_secs == 0 {
            anyhow::bail!("lease TTL must be at least 1 second");
        }
        if self.model.endpoint.is_empty() {
            anyhow::bail!("model endpoint cannot be empty");
        }
        if self.model.timeout_secs == 0 {
            anyhow::bail!("model timeout must be at least 1 second");
        }
        Ok(())
    }
}
