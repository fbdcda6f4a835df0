//! Configuration management for the relay.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in development defaults
//! - A YAML config file (`relay.yaml` or the path in `RELAY_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! Later sources take precedence over earlier ones.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "relay.yaml";

/// Providers the generation factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 2] = ["ollama", "llama-cpp"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config file the settings were merged from, if any
    pub config_file: Option<PathBuf>,

    /// Message broker connection and inbound queue
    pub broker: BrokerConfig,

    /// Generation engine settings
    pub llm: LlmConfig,

    /// Web retrieval settings
    pub retrieval: RetrievalConfig,

    /// Consume loop settings
    pub gateway: GatewayConfig,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub json_logs: bool,
}

/// Broker connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Virtual host, `/` by default
    pub vhost: String,
    /// Inbound request queue
    pub queue: String,
}

impl BrokerConfig {
    /// Build the AMQP connection URI.
    ///
    /// Credentials and vhost are percent-encoded, so reserved characters
    /// in them cannot change the host or port.
    pub fn amqp_uri(&self) -> String {
        let vhost = if self.vhost == "/" {
            "%2f".to_string()
        } else {
            urlencoding::encode(self.vhost.trim_start_matches('/')).into_owned()
        };
        format!(
            "amqp://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            vhost
        )
    }

    /// URI with the password masked, for logging.
    pub fn redacted_uri(&self) -> String {
        format!("amqp://{}:***@{}:{}", self.user, self.host, self.port)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            user: "dev_user".to_string(),
            password: "dev_password".to_string(),
            vhost: "/".to_string(),
            queue: "frontend_to_backend".to_string(),
        }
    }
}

/// Generation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend provider ("ollama" or "llama-cpp")
    pub provider: String,

    /// Model identifier passed to the backend
    pub model: String,

    /// Backend base URL; provider default when unset
    pub endpoint: Option<String>,

    /// Concurrent generate calls the engine can actually serve
    pub max_concurrency: usize,

    /// Upper bound for a single generate call, in seconds
    pub timeout_secs: u64,

    /// Maximum tokens to generate per call
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            endpoint: None,
            max_concurrency: 1,
            timeout_secs: 120,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Web retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// SearXNG instance URL
    pub endpoint: String,

    /// Minimum relevance score a result must reach
    pub min_score: f32,

    /// Maximum number of results embedded as context
    pub max_results: usize,

    /// Upper bound for a single search call, in seconds
    pub timeout_secs: u64,

    /// Prefix the context with today's date
    pub date_preamble: bool,
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/".to_string(),
            min_score: 1.5,
            max_results: 5,
            timeout_secs: 15,
            date_preamble: true,
        }
    }
}

/// When an inbound message is acknowledged to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckMode {
    /// Acknowledge on receipt (at-most-once)
    BeforeProcessing,
    /// Acknowledge once the reply is published (at-least-once)
    AfterReply,
}

impl AckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeProcessing => "before-processing",
            Self::AfterReply => "after-reply",
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AckMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "before-processing" | "at-most-once" => Ok(Self::BeforeProcessing),
            "after-reply" | "at-least-once" => Ok(Self::AfterReply),
            other => Err(AppError::Config(format!(
                "Unknown ack mode: {}. Supported: before-processing, after-reply",
                other
            ))),
        }
    }
}

/// Consume loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Consume loops run by this process
    pub workers: usize,

    /// Acknowledgement policy
    pub ack_mode: AckMode,

    /// Upper bound of the reconnect backoff, in seconds
    pub reconnect_max_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            ack_mode: AckMode::BeforeProcessing,
            reconnect_max_secs: 30,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    broker: Option<BrokerSection>,
    llm: Option<LlmSection>,
    retrieval: Option<RetrievalSection>,
    gateway: Option<GatewaySection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrokerSection {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    vhost: Option<String>,
    queue: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmSection {
    provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    max_concurrency: Option<usize>,
    timeout: Option<u64>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalSection {
    endpoint: Option<String>,
    min_score: Option<f32>,
    max_results: Option<usize>,
    timeout: Option<u64>,
    date_preamble: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewaySection {
    workers: Option<usize>,
    ack_mode: Option<AckMode>,
    reconnect_max_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub verbose: bool,
    pub no_color: bool,
    pub json_logs: bool,
    pub queue: Option<String>,
    pub workers: Option<usize>,
    pub ack_mode: Option<AckMode>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub llm_endpoint: Option<String>,
    pub search_url: Option<String>,
    pub min_score: Option<f32>,
    pub max_results: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            broker: BrokerConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            gateway: GatewayConfig::default(),
            log_level: None,
            verbose: false,
            no_color: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file and environment variables.
    ///
    /// Environment variables:
    /// - `RELAY_CONFIG`: Path to config file
    /// - `RABBITMQ_HOST`, `RABBITMQ_PORT`, `RABBITMQ_USER`, `RABBITMQ_PASSWORD`
    /// - `RELAY_QUEUE`: Inbound queue name
    /// - `RELAY_PROVIDER`, `RELAY_MODEL`, `RELAY_LLM_ENDPOINT`
    /// - `RELAY_SEARCH_URL`, `RELAY_MIN_SCORE`, `RELAY_MAX_RESULTS`
    /// - `RELAY_ACK_MODE`, `RELAY_WORKERS`
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use relay_core::config::AppConfig;
    ///
    /// let config = AppConfig::load(None).expect("Failed to load config");
    /// println!("Queue: {}", config.broker.queue);
    /// ```
    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        Self::load_with(config_file, |key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` to resolve environment variables.
    pub fn load_with<F>(config_file: Option<&Path>, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let explicit = config_file
            .map(Path::to_path_buf)
            .or_else(|| lookup("RELAY_CONFIG").map(PathBuf::from));

        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(AppError::Config(format!(
                        "Config file does not exist: {:?}",
                        path
                    )));
                }
                config.merge_yaml(&path)?;
            }
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    config.merge_yaml(&path)?;
                }
            }
        }

        config.merge_env(&lookup)?;

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&mut self, path: &Path) -> AppResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        self.config_file = Some(path.to_path_buf());

        if let Some(broker) = file.broker {
            set(&mut self.broker.host, broker.host);
            set(&mut self.broker.port, broker.port);
            set(&mut self.broker.user, broker.user);
            set(&mut self.broker.password, broker.password);
            set(&mut self.broker.vhost, broker.vhost);
            set(&mut self.broker.queue, broker.queue);
        }

        if let Some(llm) = file.llm {
            set(&mut self.llm.provider, llm.provider);
            set(&mut self.llm.model, llm.model);
            set(&mut self.llm.max_concurrency, llm.max_concurrency);
            set(&mut self.llm.timeout_secs, llm.timeout);
            if llm.endpoint.is_some() {
                self.llm.endpoint = llm.endpoint;
            }
            if llm.max_tokens.is_some() {
                self.llm.max_tokens = llm.max_tokens;
            }
            if llm.temperature.is_some() {
                self.llm.temperature = llm.temperature;
            }
        }

        if let Some(retrieval) = file.retrieval {
            set(&mut self.retrieval.endpoint, retrieval.endpoint);
            set(&mut self.retrieval.min_score, retrieval.min_score);
            set(&mut self.retrieval.max_results, retrieval.max_results);
            set(&mut self.retrieval.timeout_secs, retrieval.timeout);
            set(&mut self.retrieval.date_preamble, retrieval.date_preamble);
        }

        if let Some(gateway) = file.gateway {
            set(&mut self.gateway.workers, gateway.workers);
            set(&mut self.gateway.ack_mode, gateway.ack_mode);
            set(
                &mut self.gateway.reconnect_max_secs,
                gateway.reconnect_max_secs,
            );
        }

        if let Some(logging) = file.logging {
            if logging.level.is_some() {
                self.log_level = logging.level;
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
            set(&mut self.json_logs, logging.json);
        }

        Ok(())
    }

    /// Environment variables override YAML config.
    fn merge_env<F>(&mut self, lookup: &F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        set(&mut self.broker.host, lookup("RABBITMQ_HOST"));
        set(&mut self.broker.port, parse_env(lookup, "RABBITMQ_PORT")?);
        set(&mut self.broker.user, lookup("RABBITMQ_USER"));
        set(&mut self.broker.password, lookup("RABBITMQ_PASSWORD"));
        set(&mut self.broker.queue, lookup("RELAY_QUEUE"));

        set(&mut self.llm.provider, lookup("RELAY_PROVIDER"));
        set(&mut self.llm.model, lookup("RELAY_MODEL"));
        if let Some(endpoint) = lookup("RELAY_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }

        set(&mut self.retrieval.endpoint, lookup("RELAY_SEARCH_URL"));
        set(
            &mut self.retrieval.min_score,
            parse_env(lookup, "RELAY_MIN_SCORE")?,
        );
        set(
            &mut self.retrieval.max_results,
            parse_env(lookup, "RELAY_MAX_RESULTS")?,
        );

        set(
            &mut self.gateway.ack_mode,
            parse_env(lookup, "RELAY_ACK_MODE")?,
        );
        set(&mut self.gateway.workers, parse_env(lookup, "RELAY_WORKERS")?);

        if let Some(level) = lookup("RUST_LOG") {
            self.log_level = Some(level);
        }

        if lookup("NO_COLOR").is_some() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over the file and the environment.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if overrides.log_level.is_some() {
            self.log_level = overrides.log_level;
        }

        if overrides.verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if overrides.no_color {
            self.no_color = true;
        }

        if overrides.json_logs {
            self.json_logs = true;
        }

        set(&mut self.broker.queue, overrides.queue);
        set(&mut self.gateway.workers, overrides.workers);
        set(&mut self.gateway.ack_mode, overrides.ack_mode);
        set(&mut self.llm.provider, overrides.provider);
        set(&mut self.llm.model, overrides.model);
        if overrides.llm_endpoint.is_some() {
            self.llm.endpoint = overrides.llm_endpoint;
        }
        set(&mut self.retrieval.endpoint, overrides.search_url);
        set(&mut self.retrieval.min_score, overrides.min_score);
        set(&mut self.retrieval.max_results, overrides.max_results);

        self
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.llm.provider.to_lowercase();
        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.broker.queue.trim().is_empty() {
            return Err(AppError::Config("Queue name cannot be empty".to_string()));
        }

        if self.gateway.workers == 0 {
            return Err(AppError::Config("workers must be at least 1".to_string()));
        }

        if self.llm.max_concurrency == 0 {
            return Err(AppError::Config(
                "llm.maxConcurrency must be at least 1".to_string(),
            ));
        }

        if self.llm.timeout_secs == 0 || self.retrieval.timeout_secs == 0 {
            return Err(AppError::Config("Timeouts must be non-zero".to_string()));
        }

        if self.retrieval.max_results == 0 {
            return Err(AppError::Config(
                "retrieval.maxResults must be at least 1".to_string(),
            ));
        }

        let min_score = self.retrieval.min_score;
        if !min_score.is_finite() || min_score < 0.0 {
            return Err(AppError::Config(format!(
                "Invalid relevance threshold: {}",
                min_score
            )));
        }

        Ok(())
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> AppResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("Invalid value for {}: {}", key, e))),
        None => Ok(None),
    }
}
