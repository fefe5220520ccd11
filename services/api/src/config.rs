//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use axum::http::HeaderValue;
use medi_core::ports::Buckets;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_SESSION_IDLE_SECS: u64 = 60 * 60;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub database_url: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub buckets: Buckets,
    pub cors_origin: HeaderValue,
    pub max_upload_bytes: usize,
    /// Dashboard views unused for this long are dropped.
    pub session_idle: Duration,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn or_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
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

        // --- Server ---
        let bind_address_str = or_default("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin_str = or_default("CORS_ORIGIN", "http://localhost:5173");
        let cors_origin = HeaderValue::from_str(&cors_origin_str).map_err(|e| {
            ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
        })?;

        let max_upload_bytes = match std::env::var("MAX_UPLOAD_BYTES") {
            Ok(raw) => raw.parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue("MAX_UPLOAD_BYTES".to_string(), e.to_string())
            })?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let session_idle_secs = match std::env::var("SESSION_IDLE_SECS") {
            Ok(raw) => raw.parse::<u64>().ok().filter(|secs| *secs > 0).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SESSION_IDLE_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", raw),
                )
            })?,
            Err(_) => DEFAULT_SESSION_IDLE_SECS,
        };

        // --- Hosted backend ---
        let database_url = required("DATABASE_URL")?;
        let supabase_url = required("SUPABASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let supabase_anon_key = required("SUPABASE_ANON_KEY")?;
        let buckets = Buckets {
            documents: or_default("DOCUMENTS_BUCKET", "pdfs"),
            avatars: or_default("AVATARS_BUCKET", "avatars"),
        };

        // --- Text generation ---
        let gemini_api_key = required("GEMINI_API_KEY")?;
        let gemini_model = or_default("GEMINI_MODEL", "gemini-2.0-flash");
        let gemini_base_url = or_default("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL);

        Ok(Self {
            bind_address,
            log_level,
            database_url,
            supabase_url,
            supabase_anon_key,
            gemini_api_key,
            gemini_model,
            gemini_base_url,
            buckets,
            cors_origin,
            max_upload_bytes,
            session_idle: Duration::from_secs(session_idle_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL: [&str; 13] = [
        "BIND_ADDRESS",
        "RUST_LOG",
        "DATABASE_URL",
        "SUPABASE_URL",
        "SUPABASE_ANON_KEY",
        "GEMINI_API_KEY",
        "GEMINI_MODEL",
        "GEMINI_BASE_URL",
        "DOCUMENTS_BUCKET",
        "AVATARS_BUCKET",
        "CORS_ORIGIN",
        "MAX_UPLOAD_BYTES",
        "SESSION_IDLE_SECS",
    ];

    fn reset_env() {
        for name in ALL {
            std::env::remove_var(name);
        }
        std::env::set_var("DATABASE_URL", "postgres://localhost/medi");
        std::env::set_var("SUPABASE_URL", "https://project.supabase.co/");
        std::env::set_var("SUPABASE_ANON_KEY", "anon");
        std::env::set_var("GEMINI_API_KEY", "key");
    }

    #[test]
    #[serial]
    fn defaults_apply() {
        reset_env();
        let config = Config::from_env().unwrap();

        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.supabase_url, "https://project.supabase.co");
        assert_eq!(config.gemini_model, "gemini-2.0-flash");
        assert_eq!(config.buckets, Buckets::default());
        assert_eq!(config.cors_origin, "http://localhost:5173");
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.session_idle, Duration::from_secs(3600));
    }

    #[test]
    #[serial]
    fn missing_required_var_is_reported() {
        reset_env();
        std::env::remove_var("GEMINI_API_KEY");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref name) if name == "GEMINI_API_KEY"));
    }

    #[test]
    #[serial]
    fn invalid_values_are_rejected() {
        reset_env();
        std::env::set_var("MAX_UPLOAD_BYTES", "ten megabytes");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue(ref name, _)) if name == "MAX_UPLOAD_BYTES"
        ));

        reset_env();
        std::env::set_var("RUST_LOG", "chatty");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue(ref name, _)) if name == "RUST_LOG"
        ));

        reset_env();
        std::env::set_var("SESSION_IDLE_SECS", "0");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue(ref name, _)) if name == "SESSION_IDLE_SECS"
        ));
    }

    #[test]
    #[serial]
    fn overrides_are_read() {
        reset_env();
        std::env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
        std::env::set_var("DOCUMENTS_BUCKET", "documents");
        std::env::set_var("GEMINI_MODEL", "gemini-2.5-flash");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.buckets.documents, "documents");
        assert_eq!(config.buckets.avatars, "avatars");
        assert_eq!(config.gemini_model, "gemini-2.5-flash");
    }
}
