use std::env;

use thiserror::Error;

use crate::slots::{validate_duration, DEFAULT_SLOT_MINUTES};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a number, got {value:?}")]
    NotANumber { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Process configuration, read once at startup and handed to whoever needs it.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub max_connections: u32,
    pub default_slot_minutes: u32,
    pub event_buffer: usize,
    pub admin_user: String,
    pub admin_password: String,
    pub admin_display_name: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            database_url: text("DATABASE_URL", "sqlite://./data/vetbook.db"),
            port: number(&lookup, "PORT", 8080)?,
            max_connections: number(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            default_slot_minutes: number(&lookup, "DEFAULT_SLOT_MINUTES", DEFAULT_SLOT_MINUTES)?,
            event_buffer: number(&lookup, "EVENT_BUFFER", 100)?,
            admin_user: text("ADMIN_USER", "admin"),
            admin_password: text("ADMIN_PASSWORD", "admin"),
            admin_display_name: text("ADMIN_DISPLAY_NAME", "Clinic Admin"),
        };

        if config.max_connections == 0 {
            return Err(ConfigError::Invalid("DB_MAX_CONNECTIONS must be at least 1".into()));
        }
        if config.event_buffer == 0 {
            return Err(ConfigError::Invalid("EVENT_BUFFER must be at least 1".into()));
        }
        validate_duration(config.default_slot_minutes)
            .map_err(|err| ConfigError::Invalid(format!("DEFAULT_SLOT_MINUTES: {err}")))?;

        Ok(config)
    }
}

fn number<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::NotANumber { key, value }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.default_slot_minutes, 30);
        assert_eq!(config.database_url, "sqlite://./data/vetbook.db");
        assert_eq!(config.admin_user, "admin");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[("PORT", "9000"), ("DEFAULT_SLOT_MINUTES", "20")]).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.default_slot_minutes, 20);
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::NotANumber { key: "PORT", .. }));
    }

    #[test]
    fn zero_slot_duration_is_rejected() {
        let err = config_from(&[("DEFAULT_SLOT_MINUTES", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
