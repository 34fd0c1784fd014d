use std::time::Duration;

use anyhow::{Context, Result};

use ewallet_infra::DatabaseConfig;

/// Process configuration for the HTTP service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Deadline applied to every posting request.
    pub request_timeout: Duration,
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Read from the environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("APP_PORT")
            .unwrap_or_else(|| "3006".to_string())
            .parse::<u16>()
            .context("APP_PORT must be a valid u16")?;

        let request_timeout = lookup("REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|| "5000".to_string())
            .parse::<u64>()
            .map(Duration::from_millis)
            .context("REQUEST_TIMEOUT_MS must be a whole number of milliseconds")?;

        let database = DatabaseConfig::from_lookup(&lookup).context("invalid database configuration")?;

        Ok(Self {
            host,
            port,
            request_timeout,
            database,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
