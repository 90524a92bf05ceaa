//! Configuration management for snoolens
//!
//! Configuration is loaded from environment variables ([`Config::from_env`]) or
//! a TOML file ([`Config::from_file`]) and checked with [`Config::validate`]
//! before any service is constructed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reddit API credentials and pacing
    pub reddit: RedditConfig,

    /// Relational store configuration
    pub database: DatabaseConfig,

    /// Fingerprint (dedup) store configuration
    pub fingerprint: FingerprintConfig,

    /// Ollama endpoint configuration
    pub ollama: OllamaConfig,

    /// Analysis pipeline configuration
    pub analysis: AnalysisConfig,

    /// HTTP control surface configuration
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Reddit API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,

    /// OAuth API base, e.g. `https://oauth.reddit.com`
    pub api_base: String,

    /// Token endpoint for the password grant
    pub token_url: String,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Calls that pass the rate gate freely; the next one sleeps first
    pub calls_before_backoff: u32,

    /// Lower bound (inclusive) of the gate sleep in seconds
    pub backoff_min_secs: u64,

    /// Upper bound (exclusive) of the gate sleep in seconds
    pub backoff_max_secs: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
            user_agent: format!("snoolens/{}", env!("CARGO_PKG_VERSION")),
            api_base: String::from("https://oauth.reddit.com"),
            token_url: String::from("https://www.reddit.com/api/v1/access_token"),
            request_timeout_secs: 30,
            calls_before_backoff: 23,
            backoff_min_secs: 75,
            backoff_max_secs: 445,
        }
    }
}

/// Which relational backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Postgres,
    Sqlite,
}

impl std::str::FromStr for DatabaseBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown database backend: {other}")),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,

    /// PostgreSQL connection string
    pub postgres_url: String,

    /// SQLite database path
    pub sqlite_path: PathBuf,

    /// Maximum pool size
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Postgres,
            postgres_url: String::from("postgresql://localhost/snoolens"),
            sqlite_path: PathBuf::from("data/snoolens.db"),
            pool_size: 10,
        }
    }
}

/// Fingerprint store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Redis URL; when empty an in-process store is used
    pub redis_url: String,

    /// Maximum pool size
    pub pool_size: usize,

    /// Lifetime of post/comment reservations in seconds (0 = never expire)
    pub reservation_ttl_secs: u64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            redis_url: String::from("redis://127.0.0.1:6379"),
            pool_size: 8,
            reservation_ttl_secs: 2_592_000,
        }
    }
}

/// Ollama endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL of the Ollama API
    pub endpoint: String,

    /// Models run against every item, in order
    pub models: Vec<String>,

    /// Request timeout in seconds (chat completions are slow)
    pub request_timeout_secs: u64,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("http://localhost:11434"),
            models: vec![String::from("llama3")],
            request_timeout_secs: 600,
            temperature: 0.0,
        }
    }
}

/// What to do when language detection cannot decide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndetectedLanguage {
    /// Analyze anyway
    Proceed,
    /// Skip the item, keeping its reservation
    Skip,
}

impl std::str::FromStr for UndetectedLanguage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proceed" => Ok(Self::Proceed),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown language policy: {other}")),
        }
    }
}

/// Analysis pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// ISO 639-3 code of the only language analyzed (`eng`, `deu`, ...)
    pub target_language: String,

    /// Policy when detection fails
    pub on_undetected_language: UndetectedLanguage,

    /// Concurrent analysis workers for batch runs
    pub workers: usize,

    /// Encrypt analysis text at rest
    pub encrypt: bool,

    /// Fernet key file used when `encrypt` is set
    pub encryption_key_path: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            target_language: String::from("eng"),
            on_undetected_language: UndetectedLanguage::Proceed,
            workers: 4,
            encrypt: false,
            encryption_key_path: None,
        }
    }
}

/// HTTP control surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,

    /// Secret exchanged at `/login` for a token
    pub shared_secret: String,

    /// HMAC key used to sign tokens
    pub jwt_secret: String,

    /// Token subject
    pub identity: String,

    /// Token lifetime in seconds
    pub token_lifetime_secs: u64,

    /// Name recorded in service logs
    pub service_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: String::from("0.0.0.0:5001"),
            shared_secret: String::new(),
            jwt_secret: String::new(),
            identity: String::from("snoolens"),
            token_lifetime_secs: 172_800,
            service_name: String::from("snoolens"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let d = Self::default();

        let models = std::env::var("LLMS")
            .or_else(|_| std::env::var("SNOOLENS_MODELS"))
            .map(|v| parse_list(&v))
            .unwrap_or(d.ollama.models);

        let encryption_key_path = std::env::var("SNOOLENS_ENCRYPTION_KEY")
            .ok()
            .map(PathBuf::from)
            .or(d.analysis.encryption_key_path);

        Ok(Self {
            reddit: RedditConfig {
                client_id: env_string("REDDIT_CLIENT_ID", d.reddit.client_id),
                client_secret: env_string("REDDIT_CLIENT_SECRET", d.reddit.client_secret),
                username: env_string("REDDIT_USERNAME", d.reddit.username),
                password: env_string("REDDIT_PASSWORD", d.reddit.password),
                user_agent: env_string("REDDIT_USER_AGENT", d.reddit.user_agent),
                api_base: env_string("REDDIT_API_BASE", d.reddit.api_base),
                token_url: env_string("REDDIT_TOKEN_URL", d.reddit.token_url),
                request_timeout_secs: env_or(
                    "SNOOLENS_REQUEST_TIMEOUT",
                    d.reddit.request_timeout_secs,
                ),
                calls_before_backoff: env_or(
                    "SNOOLENS_CALLS_BEFORE_BACKOFF",
                    d.reddit.calls_before_backoff,
                ),
                backoff_min_secs: env_or("SNOOLENS_BACKOFF_MIN", d.reddit.backoff_min_secs),
                backoff_max_secs: env_or("SNOOLENS_BACKOFF_MAX", d.reddit.backoff_max_secs),
            },
            database: DatabaseConfig {
                backend: env_or("SNOOLENS_DB_BACKEND", d.database.backend),
                postgres_url: std::env::var("POSTGRES_URL")
                    .or_else(|_| std::env::var("DATABASE_URL"))
                    .unwrap_or(d.database.postgres_url),
                sqlite_path: std::env::var("SNOOLENS_SQLITE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(d.database.sqlite_path),
                pool_size: env_or("SNOOLENS_DB_POOL_SIZE", d.database.pool_size),
            },
            fingerprint: FingerprintConfig {
                redis_url: env_string("REDIS_URL", d.fingerprint.redis_url),
                pool_size: env_or("SNOOLENS_REDIS_POOL_SIZE", d.fingerprint.pool_size),
                reservation_ttl_secs: env_or(
                    "SNOOLENS_RESERVATION_TTL",
                    d.fingerprint.reservation_ttl_secs,
                ),
            },
            ollama: OllamaConfig {
                endpoint: std::env::var("OLLAMA_API_URL")
                    .or_else(|_| std::env::var("OLLAMA_ENDPOINT"))
                    .unwrap_or(d.ollama.endpoint),
                models,
                request_timeout_secs: env_or(
                    "SNOOLENS_LLM_TIMEOUT",
                    d.ollama.request_timeout_secs,
                ),
                temperature: env_or("SNOOLENS_LLM_TEMPERATURE", d.ollama.temperature),
            },
            analysis: AnalysisConfig {
                target_language: env_string("SNOOLENS_LANGUAGE", d.analysis.target_language),
                on_undetected_language: env_or(
                    "SNOOLENS_UNDETECTED_LANGUAGE",
                    d.analysis.on_undetected_language,
                ),
                workers: env_or("PROC_WORKERS", d.analysis.workers),
                encrypt: env_or("SNOOLENS_ENCRYPT", encryption_key_path.is_some()),
                encryption_key_path,
            },
            server: ServerConfig {
                bind_addr: env_string("SNOOLENS_BIND", d.server.bind_addr),
                shared_secret: env_string("SRVC_SHARED_SECRET", d.server.shared_secret),
                jwt_secret: env_string("JWT_SECRET_KEY", d.server.jwt_secret),
                identity: env_string("IDENTITY", d.server.identity),
                token_lifetime_secs: env_or(
                    "SNOOLENS_TOKEN_LIFETIME",
                    d.server.token_lifetime_secs,
                ),
                service_name: env_string("SRVC_NAME", d.server.service_name),
            },
            logging: LoggingConfig {
                level: env_string("SNOOLENS_LOG_LEVEL", d.logging.level),
                format: env_string("SNOOLENS_LOG_FORMAT", d.logging.format),
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.ollama.models.is_empty() {
            anyhow::bail!("at least one model must be configured");
        }

        if self.analysis.workers == 0 {
            anyhow::bail!("analysis workers must be greater than 0");
        }

        if self.database.pool_size == 0 {
            anyhow::bail!("pool_size must be greater than 0");
        }

        if self.reddit.backoff_min_secs >= self.reddit.backoff_max_secs {
            anyhow::bail!("backoff_min_secs must be less than backoff_max_secs");
        }

        if self.analysis.encrypt && self.analysis.encryption_key_path.is_none() {
            anyhow::bail!("encryption enabled but no encryption_key_path set");
        }

        if whatlang::Lang::from_code(&self.analysis.target_language).is_none() {
            anyhow::bail!(
                "target_language {:?} is not a supported ISO 639-3 code",
                self.analysis.target_language
            );
        }

        for (name, value) in [
            ("ollama.endpoint", &self.ollama.endpoint),
            ("reddit.api_base", &self.reddit.api_base),
            ("reddit.token_url", &self.reddit.token_url),
        ] {
            url::Url::parse(value)
                .with_context(|| format!("{name} is not a valid URL: {value:?}"))?;
        }

        Ok(())
    }

    /// Extra checks for the HTTP control surface
    pub fn validate_server(&self) -> Result<()> {
        if self.server.shared_secret.is_empty() {
            anyhow::bail!("server.shared_secret must be set to serve");
        }
        if self.server.jwt_secret.is_empty() {
            anyhow::bail!("server.jwt_secret must be set to serve");
        }
        Ok(())
    }

    /// Get Reddit request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.reddit.request_timeout_secs)
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
