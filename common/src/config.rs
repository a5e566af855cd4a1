//! Service configuration.
//!
//! Values come from the process environment. Loading goes through a lookup
//! function so callers (and tests) can supply their own source.

use std::time::Duration;

use validator::Validate;

use crate::errors::{AppError, AppResult};

/// Default prefix of the environment variables that carry connection strings.
pub const DEFAULT_CONNECTION_PREFIX: &str = "MONGODB_URI";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_APP_NAME: &str = "mongo-console";

/// Runtime configuration shared by every service binary.
#[derive(Debug, Clone, Validate)]
pub struct AppConfig {
    /// Name of the service using this configuration (used in logs and health output).
    pub service_name: String,

    /// Bind address.
    #[validate(length(min = 1, message = "APP_HOST must not be empty"))]
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Prefix an environment variable must carry to be treated as a connection.
    /// The variable named exactly like the prefix is the primary connection.
    #[validate(length(min = 1, message = "CONNECTION_PREFIX must not be empty"))]
    pub connection_prefix: String,

    /// Upper bound for opening and probing a connection.
    #[validate(range(min = 1, max = 600, message = "connect timeout must be 1..=600 seconds"))]
    pub connect_timeout_secs: u64,

    /// Upper bound for a single database operation.
    #[validate(range(min = 1, max = 3600, message = "operation timeout must be 1..=3600 seconds"))]
    pub operation_timeout_secs: u64,

    /// Application name reported to the database server.
    pub app_name: String,
}

impl AppConfig {
    /// Loads configuration for `service` from the process environment.
    ///
    /// `default_port` is used when `SERVER_PORT` is not set.
    pub fn load_with_service(service: &str, default_port: u16) -> AppResult<Self> {
        Self::from_lookup(service, default_port, |key| std::env::var(key).ok())
    }

    /// Loads configuration for `service` using `lookup` to resolve variables.
    pub fn from_lookup<F>(service: &str, default_port: u16, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            service_name: service.to_string(),
            host: lookup("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&lookup, "SERVER_PORT", default_port)?,
            connection_prefix: lookup("CONNECTION_PREFIX")
                .unwrap_or_else(|| DEFAULT_CONNECTION_PREFIX.to_string()),
            connect_timeout_secs: parse_or(
                &lookup,
                "MONGO_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
            operation_timeout_secs: parse_or(
                &lookup,
                "MONGO_OPERATION_TIMEOUT_SECS",
                DEFAULT_OPERATION_TIMEOUT_SECS,
            )?,
            app_name: lookup("MONGO_APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
        };

        config
            .validate()
            .map_err(|e| AppError::Configuration(format!("Invalid configuration: {}", e)))?;
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Socket address string for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Configuration(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
