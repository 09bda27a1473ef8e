//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::Duration;
use tailordesk_core::AccessPolicy;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials for the administrator created on first start.
#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_attempts: u32,
    pub log_level: Level,
    pub cors_origin: String,
    pub openai_api_key: Option<String>,
    pub stt_model: String,
    pub tts_voice: String,
    pub access_token_ttl_secs: i64,
    pub access_token_max_uses: i32,
    pub session_days: i64,
    pub whatsapp_number: Option<String>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", Some(5))?;
        let db_connect_attempts = parse_or(&lookup, "DB_CONNECT_ATTEMPTS", Some(5))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Speech Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty());
        let stt_model = lookup("STT_MODEL").unwrap_or_else(|| "whisper-1".to_string());
        let tts_voice = lookup("TTS_VOICE").unwrap_or_else(|| "alloy".to_string());

        // --- Access Tokens and Sessions ---
        let access_token_ttl_secs =
            parse_in_range(&lookup, "ACCESS_TOKEN_TTL_SECS", 900, 1..=86_400)?;
        let access_token_max_uses =
            parse_in_range(&lookup, "ACCESS_TOKEN_MAX_USES", 5, 1..=i32::MAX)?;
        let session_days = parse_in_range(&lookup, "SESSION_DAYS", 30, 1..=365)?;

        let whatsapp_number = lookup("WHATSAPP_NUMBER").filter(|n| !n.is_empty());

        let bootstrap_admin = match (lookup("ADMIN_USERNAME"), lookup("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(BootstrapAdmin { username, password }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "ADMIN_USERNAME/ADMIN_PASSWORD".to_string(),
                    "both or neither must be set".to_string(),
                ))
            }
        };

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            db_connect_attempts,
            log_level,
            cors_origin,
            openai_api_key,
            stt_model,
            tts_voice,
            access_token_ttl_secs,
            access_token_max_uses,
            session_days,
            whatsapp_number,
            bootstrap_admin,
        })
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            ttl: Duration::seconds(self.access_token_ttl_secs),
            max_uses: self.access_token_max_uses,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}

fn parse_in_range<F, T>(
    lookup: &F,
    key: &str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = parse_or(lookup, key, Some(default))?;
    if !range.contains(&value) {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("{} is outside {}..={}", value, range.start(), range.end()),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/tailordesk")]).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.access_token_ttl_secs, 900);
        assert_eq!(config.access_policy().max_uses, 5);
        assert!(config.openai_api_key.is_none());
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(
            load(&[]).unwrap_err(),
            ConfigError::MissingVar("DATABASE_URL".to_string())
        );
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let err = load(&[
            ("DATABASE_URL", "postgres://x"),
            ("ACCESS_TOKEN_MAX_USES", "many"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "ACCESS_TOKEN_MAX_USES"));
    }

    #[test]
    fn admin_bootstrap_needs_both_halves() {
        let err = load(&[("DATABASE_URL", "postgres://x"), ("ADMIN_USERNAME", "root")]);
        assert!(err.is_err());
        let config = load(&[
            ("DATABASE_URL", "postgres://x"),
            ("ADMIN_USERNAME", "root"),
            ("ADMIN_PASSWORD", "s3cret-pass"),
        ])
        .unwrap();
        assert_eq!(config.bootstrap_admin.unwrap().username, "root");
    }

    #[test]
    fn rejects_unknown_log_level() {
        let err = load(&[("DATABASE_URL", "postgres://x"), ("RUST_LOG", "chatty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "RUST_LOG"));
    }

    #[test]
    fn session_days_must_be_within_a_year() {
        for raw in ["-1", "0", "366", "9223372036854775807"] {
            let err = load(&[("DATABASE_URL", "postgres://x"), ("SESSION_DAYS", raw)]).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue(key, _) if key == "SESSION_DAYS"),
                "{raw}: {err:?}"
            );
        }
        let config = load(&[("DATABASE_URL", "postgres://x"), ("SESSION_DAYS", "365")]).unwrap();
        assert_eq!(config.session_days, 365);
    }

    #[test]
    fn token_ttl_must_be_at_most_a_day() {
        for raw in ["-900", "0", "86401", "9223372036854775807"] {
            let err = load(&[("DATABASE_URL", "postgres://x"), ("ACCESS_TOKEN_TTL_SECS", raw)])
                .unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue(key, _) if key == "ACCESS_TOKEN_TTL_SECS"),
                "{raw}: {err:?}"
            );
        }
        let config =
            load(&[("DATABASE_URL", "postgres://x"), ("ACCESS_TOKEN_TTL_SECS", "86400")]).unwrap();
        assert_eq!(config.access_policy().ttl, Duration::days(1));
    }

    #[test]
    fn token_uses_must_be_positive() {
        let err = load(&[("DATABASE_URL", "postgres://x"), ("ACCESS_TOKEN_MAX_USES", "0")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "ACCESS_TOKEN_MAX_USES"));
    }
}
