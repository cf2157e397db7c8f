//! Configuration module for fee-service.

use crate::services::StoreOptions;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FeeConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub sessions: SessionsConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone)]
pub struct SessionsConfig {
    /// Directory holding one database file per session.
    pub dir: PathBuf,
    pub default_session: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_connections: self.max_connections,
            busy_timeout: Duration::from_secs(self.busy_timeout_secs),
        }
    }
}

impl FeeConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let default_session = env::var("DEFAULT_SESSION")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "2024_25".to_string());

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "fee-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            sessions: SessionsConfig {
                dir: env::var("SESSIONS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./sessions")),
                default_session,
            },
            database: DatabaseConfig {
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
                busy_timeout_secs: env::var("DATABASE_BUSY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
        })
    }
}
