//! Environment-driven configuration
//!
//! Every worker process loads a [`Settings`] once at startup. Required
//! variables that are missing abort the process with a clear error before any
//! connection is opened - a worker never starts in a partial state. Variables
//! that only some workers need are `Option` here and unwrapped by the worker
//! that requires them via [`Settings::require`].

use std::env;
use thiserror::Error;

/// Database connection string (required)
pub const DATABASE_URL: &str = "DATABASE_URL";
/// Redis connection string (required)
pub const REDIS_URL: &str = "REDIS_URL";
/// Object store endpoint, e.g. `http://minio:9000` (required)
pub const S3_ENDPOINT: &str = "S3_ENDPOINT";
/// Object store access key (required)
pub const S3_ACCESS_KEY: &str = "S3_ACCESS_KEY";
/// Object store secret key (required)
pub const S3_SECRET_KEY: &str = "S3_SECRET_KEY";
/// FTPS drop directory watched by the ingestion worker
pub const FTPS_UPLOAD_DIR: &str = "FTPS_UPLOAD_DIR";
/// Local cache path for the detection model
pub const DETECTION_MODEL_PATH: &str = "DETECTION_MODEL_PATH";
/// Download URL for the detection model
pub const DETECTION_MODEL_URL: &str = "DETECTION_MODEL_URL";
/// Local cache path for the classification model
pub const CLASSIFICATION_MODEL_PATH: &str = "CLASSIFICATION_MODEL_PATH";
/// Download URL for the classification model
pub const CLASSIFICATION_MODEL_URL: &str = "CLASSIFICATION_MODEL_URL";
/// SMTP relay host
pub const SMTP_SERVER: &str = "SMTP_SERVER";
/// SMTP relay port
pub const SMTP_PORT: &str = "SMTP_PORT";
/// SMTP username
pub const SMTP_USERNAME: &str = "SMTP_USERNAME";
/// SMTP password
pub const SMTP_PASSWORD: &str = "SMTP_PASSWORD";
/// From address for outgoing mail
pub const SMTP_FROM: &str = "SMTP_FROM";
/// signal-cli-rest-api base URL
pub const SIGNAL_API_URL: &str = "SIGNAL_API_URL";
/// Public domain used to build deep links in notifications
pub const DOMAIN_NAME: &str = "DOMAIN_NAME";
/// Log level: DEBUG, INFO, WARN or ERROR (default: INFO)
pub const LOG_LEVEL: &str = "LOG_LEVEL";
/// Log format: json or text (default: json)
pub const LOG_FORMAT: &str = "LOG_FORMAT";

/// Configuration errors raised at startup
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required environment variable is missing or empty
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    /// A variable is set but its value is not usable
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line (production default)
    Json,
    /// Human-readable text (development)
    Text,
}

/// Application settings, loaded from the environment once per process.
///
/// Fields shared by all workers are plain values; fields only some workers
/// need are `Option` and fetched through [`Settings::require`] by the worker
/// that depends on them.
#[derive(Debug, Clone)]
pub struct Settings {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Redis connection string
    pub redis_url: String,
    /// Object store endpoint
    pub s3_endpoint: String,
    /// Object store access key
    pub s3_access_key: String,
    /// Object store secret key
    pub s3_secret_key: String,
    /// FTPS drop directory (ingestion only)
    pub ftps_upload_dir: Option<String>,
    /// Detection model cache path (detection worker only)
    pub detection_model_path: Option<String>,
    /// Detection model download URL (detection worker only)
    pub detection_model_url: Option<String>,
    /// Classification model cache path (classification worker only)
    pub classification_model_path: Option<String>,
    /// Classification model download URL (classification worker only)
    pub classification_model_url: Option<String>,
    /// SMTP relay host (email worker only)
    pub smtp_server: Option<String>,
    /// SMTP relay port (email worker only)
    pub smtp_port: Option<u16>,
    /// SMTP username (email worker only)
    pub smtp_username: Option<String>,
    /// SMTP password (email worker only)
    pub smtp_password: Option<String>,
    /// From address for outgoing mail (email worker only)
    pub smtp_from: Option<String>,
    /// signal-cli-rest-api base URL (signal worker only)
    pub signal_api_url: Option<String>,
    /// Public domain for deep links
    pub domain_name: Option<String>,
    /// Log level filter
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Settings {
    /// Load settings from the environment.
    ///
    /// # Errors
    /// Returns `ConfigError::Missing` for any absent required variable and
    /// `ConfigError::Invalid` for unparseable values (e.g. a non-numeric
    /// `SMTP_PORT` or an unknown `LOG_FORMAT`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let log_format = match optional(LOG_FORMAT).as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("text") => LogFormat::Text,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT,
                    reason: format!("expected json or text, got {other:?}"),
                })
            }
        };

        let smtp_port = match optional(SMTP_PORT) {
            None => None,
            Some(raw) => Some(raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: SMTP_PORT,
                reason: e.to_string(),
            })?),
        };

        Ok(Self {
            database_url: required(DATABASE_URL)?,
            redis_url: required(REDIS_URL)?,
            s3_endpoint: required(S3_ENDPOINT)?,
            s3_access_key: required(S3_ACCESS_KEY)?,
            s3_secret_key: required(S3_SECRET_KEY)?,
            ftps_upload_dir: optional(FTPS_UPLOAD_DIR),
            detection_model_path: optional(DETECTION_MODEL_PATH),
            detection_model_url: optional(DETECTION_MODEL_URL),
            classification_model_path: optional(CLASSIFICATION_MODEL_PATH),
            classification_model_url: optional(CLASSIFICATION_MODEL_URL),
            smtp_server: optional(SMTP_SERVER),
            smtp_port,
            smtp_username: optional(SMTP_USERNAME),
            smtp_password: optional(SMTP_PASSWORD),
            smtp_from: optional(SMTP_FROM),
            signal_api_url: optional(SIGNAL_API_URL),
            domain_name: optional(DOMAIN_NAME),
            log_level: optional(LOG_LEVEL).unwrap_or_else(|| "INFO".to_string()),
            log_format,
        })
    }

    /// Unwrap an optional setting that this worker cannot run without.
    ///
    /// # Errors
    /// Returns `ConfigError::Missing` naming the variable.
    pub fn require(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
        value.clone().ok_or(ConfigError::Missing(name))
    }

    /// Domain used in deep links, with a development fallback.
    pub fn domain(&self) -> String {
        self.domain_name
            .clone()
            .unwrap_or_else(|| "localhost:3000".to_string())
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}
