//! Process configuration, read once at startup from the environment.

use std::env;

/// Feature-flag bag equivalent to the source's `OMNIMAN_DEFAULTS` Django setting.
#[derive(Debug, Clone)]
pub struct OmnimanDefaults {
    pub default_permission_classes: Vec<String>,
    pub admin_permission_classes: Vec<String>,
}

impl Default for OmnimanDefaults {
    fn default() -> Self {
        Self {
            default_permission_classes: vec!["authenticated".to_string()],
            admin_permission_classes: vec!["admin".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_pool_max_connections: u32,
    pub bind_addr: String,

    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub rotation: String,
    pub use_json: bool,
    pub enable_tracing: bool,

    pub omniman_defaults: OmnimanDefaults,
    pub notifications_default_backend: String,

    /// Minutes a stock hold stays valid before it must be recreated.
    pub hold_ttl_minutes: i64,
    /// Hours an idempotency lock is held before being considered orphaned.
    pub idempotency_ttl_hours: i64,
}

impl AppConfig {
    /// Loads configuration from the environment, falling back to values that let the
    /// binary run against a local Postgres with no configuration beyond `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/omniman".to_string());

        let db_pool_max_connections = parse_env_or("DB_POOL_SIZE", 10)?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
        let log_file = env::var("LOG_FILE").unwrap_or_else(|_| "omniman.log".to_string());
        let rotation = env::var("LOG_ROTATION").unwrap_or_else(|_| "daily".to_string());
        let use_json = parse_bool_env("LOG_JSON", false)?;
        let enable_tracing = parse_bool_env("ENABLE_TRACING", true)?;

        let notifications_default_backend =
            env::var("NOTIFICATIONS_DEFAULT_BACKEND").unwrap_or_else(|_| "mock".to_string());

        let hold_ttl_minutes = parse_env_or("HOLD_TTL_MINUTES", 15)?;
        let idempotency_ttl_hours = parse_env_or("IDEMPOTENCY_TTL_HOURS", 24)?;

        Ok(Self {
            database_url,
            db_pool_max_connections,
            bind_addr,
            log_level,
            log_dir,
            log_file,
            rotation,
            use_json,
            enable_tracing,
            omniman_defaults: OmnimanDefaults::default(),
            notifications_default_backend,
            hold_ttl_minutes,
            idempotency_ttl_hours,
        })
    }
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(key.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid(key.to_string(), raw)),
        },
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} has invalid value '{1}'")]
    Invalid(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let defaults = OmnimanDefaults::default();
        assert_eq!(defaults.default_permission_classes, vec!["authenticated"]);
    }
}
