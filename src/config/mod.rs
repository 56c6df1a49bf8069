//! Service configuration, assembled once at startup.
//!
//! Values come from the process environment (after `.env` is loaded) and, optionally, from
//! secret payload files exported by the secret store. Nothing here is re-read per request.

mod secrets;

pub use secrets::{decode_secret, read_secret_file, ServiceKeySecret, StorageSecret};

use std::str::FromStr;
use std::time::Duration;

use crate::errors::AppError;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_KEY_SERVICE_TIMEOUT_MS: u64 = 2000;
const MAX_KEY_SERVICE_RETRIES: u32 = 1;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl StorageConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }

    /// In-memory SQLite databases live and die with a single connection.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Pool size actually used: in-memory databases are pinned to one connection so every
    /// statement sees the same data.
    pub fn pool_size(&self) -> u32 {
        if self.is_in_memory() {
            1
        } else {
            self.max_connections.max(1)
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyServiceConfig {
    /// Base URL of the key-validation service. May be empty in development mode.
    pub address: String,
    pub timeout: Duration,
    /// Extra attempts after a transport failure. Never more than one.
    pub retries: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureFlags {
    /// Disables service-key checks entirely.
    pub development: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub key_service: KeyServiceConfig,
    pub flags: FeatureFlags,
    /// This service's own key, presented when calling the key-validation service.
    pub service_key: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let flags = FeatureFlags {
            development: parse_or(&get, "DEVELOPMENT", false)?,
        };

        let database_url = match get("STORAGE_SECRET_FILE") {
            Some(path) => {
                let secret: StorageSecret = read_secret_file(&path)?;
                secret.connection_url()
            }
            None => get("DATABASE_URL").ok_or_else(|| AppError::configuration("DATABASE_URL not set"))?,
        };

        let storage = StorageConfig {
            database_url,
            max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            acquire_timeout: Duration::from_secs(parse_or(
                &get,
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                DEFAULT_ACQUIRE_TIMEOUT_SECS,
            )?),
        };

        let key_service = KeyServiceConfig {
            address: get("KEY_SERVICE_ADDRESS").unwrap_or_default(),
            timeout: Duration::from_millis(parse_or(&get, "KEY_SERVICE_TIMEOUT_MS", DEFAULT_KEY_SERVICE_TIMEOUT_MS)?),
            retries: parse_or(&get, "KEY_SERVICE_RETRIES", MAX_KEY_SERVICE_RETRIES)?.min(MAX_KEY_SERVICE_RETRIES),
        };

        let service_key = match get("SERVICE_KEY") {
            Some(key) => key,
            None => match get("SERVICE_KEY_SECRET_FILE") {
                Some(path) => {
                    let secret: ServiceKeySecret = read_secret_file(&path)?;
                    secret.password
                }
                None => String::new(),
            },
        };

        let config = Self {
            storage,
            key_service,
            flags,
            service_key,
            port: parse_or(&get, "APP_PORT", DEFAULT_PORT)?,
        };
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.flags.development {
            return Ok(());
        }
        if self.key_service.address.is_empty() {
            return Err(AppError::configuration("KEY_SERVICE_ADDRESS not set"));
        }
        if self.service_key.is_empty() {
            return Err(AppError::configuration("SERVICE_KEY not set"));
        }
        Ok(())
    }

    /// Development configuration used by tests and local tooling.
    pub fn development(database_url: impl Into<String>) -> Self {
        Self {
            storage: StorageConfig::new(database_url),
            key_service: KeyServiceConfig {
                address: String::new(),
                timeout: Duration::from_millis(DEFAULT_KEY_SERVICE_TIMEOUT_MS),
                retries: MAX_KEY_SERVICE_RETRIES,
            },
            flags: FeatureFlags { development: true },
            service_key: String::new(),
            port: DEFAULT_PORT,
        }
    }
}

fn parse_or<T, G>(get: &G, name: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::configuration(format!("{name} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
