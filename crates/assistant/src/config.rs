//! Assistant configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ASSISTANT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `DEEPSEEK_API_KEY` or `MISTRAL_API_KEY` - key for the active model profile
//!   (falls back to `MODEL_API_KEY`)
//!
//! ## Optional
//! - `ASSISTANT_HOST` - Bind address (default: 127.0.0.1)
//! - `ASSISTANT_PORT` - Listen port (default: 8000)
//! - `ACTIVE_MODEL` - `deepseek` (default) or `mistral`
//! - `MODEL_INVOKE_URL` - OpenAI-compatible chat completions endpoint
//! - `MODEL_ID` - Override the profile's model id
//! - `MODEL_TIMEOUT_SECS` - Gateway request timeout (default: 60)
//! - `MODEL_MAX_RETRIES` - 0 or 1 (default: 0)
//! - `CHAT_MAX_TOOL_ITERATIONS` - Model round-trips allowed per turn (default: 10)
//! - `CHAT_STREAM_CHUNK_CHARS` - Characters per streamed chunk (default: 150)
//! - `CHAT_STREAM_CHUNK_DELAY_MS` - Delay between chunks (default: 75)
//! - `CATALOG_CACHE_TTL_SECS` - Catalog overview cache lifetime (default: 60)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `LOG_FORMAT` - `json` for JSON log lines

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;
const DEFAULT_INVOKE_URL: &str = "https://integrate.api.nvidia.com/v1/chat/completions";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_RETRIES_LIMIT: u8 = 1;

/// Default ceiling on model round-trips within one user turn.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;
/// Default number of characters per streamed answer chunk.
pub const DEFAULT_CHUNK_CHARS: usize = 150;
/// Default pause between streamed answer chunks.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(75);

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Assistant application configuration.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Model gateway configuration
    pub model: ModelConfig,
    /// Orchestrator tuning
    pub chat: ChatSettings,
    /// How long the catalog overview stays cached for prompt rendering
    pub catalog_cache_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// Emit JSON log lines instead of text
    pub json_logs: bool,
}

/// Which hosted model the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProfile {
    Deepseek,
    Mistral,
}

impl ModelProfile {
    /// Profile name as accepted by `ACTIVE_MODEL`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Deepseek => "deepseek",
            Self::Mistral => "mistral",
        }
    }

    const fn api_key_var(self) -> &'static str {
        match self {
            Self::Deepseek => "DEEPSEEK_API_KEY",
            Self::Mistral => "MISTRAL_API_KEY",
        }
    }

    /// Default model id for the profile.
    #[must_use]
    pub const fn model_id(self) -> &'static str {
        match self {
            Self::Deepseek => "deepseek-ai/deepseek-v3.1-terminus",
            Self::Mistral => "mistralai/mistral-large-3-675b-instruct-2512",
        }
    }

    /// Sampling parameters tuned per model.
    #[must_use]
    pub const fn sampling(self) -> Sampling {
        match self {
            Self::Deepseek => Sampling {
                temperature: 0.2,
                max_tokens: 8192,
                top_p: 0.7,
            },
            Self::Mistral => Sampling {
                temperature: 0.2,
                max_tokens: 4096,
                top_p: 1.0,
            },
        }
    }

    /// Provider-specific request fields merged into every request body.
    #[must_use]
    pub fn extra_body(self) -> Option<serde_json::Map<String, serde_json::Value>> {
        match self {
            Self::Deepseek => {
                let mut extra = serde_json::Map::new();
                extra.insert(
                    "chat_template_kwargs".to_string(),
                    serde_json::json!({ "thinking": false }),
                );
                Some(extra)
            }
            Self::Mistral => None,
        }
    }
}

impl std::str::FromStr for ModelProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deepseek" => Ok(Self::Deepseek),
            "mistral" => Ok(Self::Mistral),
            other => Err(format!("unknown model profile '{other}' (expected deepseek or mistral)")),
        }
    }
}

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

/// Model gateway configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct ModelConfig {
    /// Active profile
    pub profile: ModelProfile,
    /// Bearer token for the endpoint
    pub api_key: SecretString,
    /// Chat completions endpoint
    pub invoke_url: Url,
    /// Model id sent in the request
    pub model_id: String,
    /// Sampling parameters
    pub sampling: Sampling,
    /// Extra top-level request fields
    pub extra_body: Option<serde_json::Map<String, serde_json::Value>>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries after a transient failure (0 or 1)
    pub max_retries: u8,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("profile", &self.profile)
            .field("api_key", &"[REDACTED]")
            .field("invoke_url", &self.invoke_url.as_str())
            .field("model_id", &self.model_id)
            .field("sampling", &self.sampling)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ModelConfig {
    /// Build a config for `profile` with its defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `invoke_url` is not a valid URL.
    pub fn for_profile(
        profile: ModelProfile,
        api_key: SecretString,
        invoke_url: &str,
    ) -> Result<Self, ConfigError> {
        let invoke_url = Url::parse(invoke_url)
            .map_err(|e| ConfigError::InvalidEnvVar("MODEL_INVOKE_URL".to_string(), e.to_string()))?;
        Ok(Self {
            profile,
            api_key,
            invoke_url,
            model_id: profile.model_id().to_string(),
            sampling: profile.sampling(),
            extra_body: profile.extra_body(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 0,
        })
    }

    fn from_env() -> Result<Self, ConfigError> {
        let profile = get_env_or_default("ACTIVE_MODEL", ModelProfile::Deepseek.name())
            .parse::<ModelProfile>()
            .map_err(|e| ConfigError::InvalidEnvVar("ACTIVE_MODEL".to_string(), e))?;

        let api_key = get_api_key(profile)?;
        let invoke_url = get_env_or_default("MODEL_INVOKE_URL", DEFAULT_INVOKE_URL);
        let mut config = Self::for_profile(profile, api_key, &invoke_url)?;

        if let Some(model_id) = get_optional_env("MODEL_ID") {
            config.model_id = model_id;
        }
        config.timeout = Duration::from_secs(parse_env("MODEL_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?);
        config.max_retries = parse_env("MODEL_MAX_RETRIES", 0_u8)?;
        if config.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::InvalidEnvVar(
                "MODEL_MAX_RETRIES".to_string(),
                format!("must be 0 or {MAX_RETRIES_LIMIT}"),
            ));
        }

        Ok(config)
    }
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Model round-trips allowed per user turn
    pub max_tool_iterations: usize,
    /// Characters per streamed answer chunk
    pub chunk_chars: usize,
    /// Pause between streamed chunks
    pub chunk_delay: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            chunk_delay: DEFAULT_CHUNK_DELAY,
        }
    }
}

impl ChatSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let max_tool_iterations =
            parse_env("CHAT_MAX_TOOL_ITERATIONS", DEFAULT_MAX_TOOL_ITERATIONS)?;
        if max_tool_iterations == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CHAT_MAX_TOOL_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let chunk_chars = parse_env("CHAT_STREAM_CHUNK_CHARS", DEFAULT_CHUNK_CHARS)?;
        if chunk_chars == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CHAT_STREAM_CHUNK_CHARS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        #[allow(clippy::cast_possible_truncation)] // 75ms default fits comfortably
        let default_delay_ms = DEFAULT_CHUNK_DELAY.as_millis() as u64;
        let chunk_delay =
            Duration::from_millis(parse_env("CHAT_STREAM_CHUNK_DELAY_MS", default_delay_ms)?);

        Ok(Self {
            max_tool_iterations,
            chunk_chars,
            chunk_delay,
        })
    }
}

impl AssistantConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid,
    /// or if the API key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("ASSISTANT_DATABASE_URL")?;
        let host = get_env_or_default("ASSISTANT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("ASSISTANT_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("ASSISTANT_PORT", "8000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("ASSISTANT_PORT".to_string(), e.to_string()))?;

        let model = ModelConfig::from_env()?;
        let chat = ChatSettings::from_env()?;
        let catalog_cache_ttl = Duration::from_secs(parse_env("CATALOG_CACHE_TTL_SECS", 60_u64)?);

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let json_logs = get_optional_env("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json"));

        Ok(Self {
            database_url,
            host,
            port,
            model,
            chat,
            catalog_cache_ttl,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            json_logs,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get the API key for a profile, falling back to `MODEL_API_KEY`.
fn get_api_key(profile: ModelProfile) -> Result<SecretString, ConfigError> {
    let var = profile.api_key_var();
    let (value, source) = match get_optional_env(var) {
        Some(value) => (value, var),
        None => (get_required_env("MODEL_API_KEY")?, "MODEL_API_KEY"),
    };

    reject_placeholder(&value, source)?;
    if let Err(e) = check_entropy(&value, source) {
        tracing::warn!("{source} validation warning: {e}");
    }
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable, using `default` when unset.
fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| parse_value(key, &raw))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Reject obvious placeholder values.
fn reject_placeholder(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();
    if lower.trim().is_empty() {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "is empty".to_string(),
        ));
    }
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }
    Ok(())
}

/// Check that a secret has the entropy of a generated key.
fn check_entropy(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }
    Ok(())
}
