//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use std::env;
use std::path::PathBuf;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
    /// DynamoDB tables, as used by the Lambda functions
    Dynamo,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("sqlite") {
            Self::Sqlite
        } else if s.eq_ignore_ascii_case("dynamo") {
            Self::Dynamo
        } else {
            Self::Memory
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
#[error("Configuration error for {field}: {message}")]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path (when using sqlite storage)
    pub db_path: Option<PathBuf>,
    /// Log format
    pub log_format: LogFormat,
    /// Base for generated short URLs, overriding the Host header
    pub shortlink_domain: Option<String>,
    /// Counter key identifiers are allocated from
    pub counter_name: String,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Port
        let port = match env::var("PORT") {
            Ok(s) => s.parse().map_err(|e| ConfigError {
                field: "PORT",
                message: format!("Invalid port '{}': {}", s, e),
            })?,
            Err(_) => 3001,
        };

        // CORS allow origin
        let cors_origin_str = env::var("CORS_ALLOW_ORIGIN").unwrap_or_else(|_| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Storage provider
        let storage_provider = StorageProvider::from_str(
            &env::var("STORAGE_PROVIDER").unwrap_or_else(|_| "sqlite".into()),
        );
        if storage_provider == StorageProvider::Dynamo && !cfg!(feature = "dynamo") {
            return Err(ConfigError {
                field: "STORAGE_PROVIDER",
                message: "dynamo requires building with --features dynamo".into(),
            });
        }
        if storage_provider == StorageProvider::Sqlite && !cfg!(feature = "sqlite") {
            return Err(ConfigError {
                field: "STORAGE_PROVIDER",
                message: "sqlite requires building with --features sqlite".into(),
            });
        }

        // DB path (for sqlite)
        let db_path = env::var("DB_PATH").ok().map(PathBuf::from);

        // Log format
        let log_format =
            LogFormat::from_str(&env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".into()));

        // Shortlink domain
        let shortlink_domain = env::var("SHORTLINK_DOMAIN").ok().filter(|s| !s.is_empty());

        // Counter name
        let counter_name = env::var("COUNTER_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| domain::allocator::DEFAULT_COUNTER.to_string());

        Ok(Self {
            port,
            cors_allow_origin,
            storage_provider,
            db_path,
            log_format,
            shortlink_domain,
            counter_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_provider_parsing() {
        assert_eq!(StorageProvider::from_str("memory"), StorageProvider::Memory);
        assert_eq!(StorageProvider::from_str("sqlite"), StorageProvider::Sqlite);
        assert_eq!(StorageProvider::from_str("SQLITE"), StorageProvider::Sqlite);
        assert_eq!(StorageProvider::from_str("dynamo"), StorageProvider::Dynamo);
        assert_eq!(StorageProvider::from_str("anything"), StorageProvider::Memory);
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("anything"), LogFormat::Pretty);
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError {
            field: "PORT",
            message: "bad".into(),
        };
        assert_eq!(e.to_string(), "Configuration error for PORT: bad");
    }
}
