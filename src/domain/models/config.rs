use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::source::{SourceId, MAX_PLAN_LENGTH};

/// Main configuration structure for BioChat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// LLM completion endpoint
    #[serde(default)]
    pub llm: LlmConfig,

    /// Entity/intent extraction
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Source routing
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Tool execution
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Multi-round conversation loop
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Per-source rate limits
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,

    /// Cross-query result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Credentials and endpoints for source databases
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LLM completion endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key (falls back to OPENAI_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum tokens to generate per completion
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    /// Retry policy for transient completion failures
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

const fn default_llm_timeout_secs() -> u64 {
    60
}

const fn default_llm_max_tokens() -> u32 {
    4096
}

const fn default_llm_temperature() -> f32 {
    0.2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key from config or environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisConfig {
    /// Hard timeout for the extraction completion, in milliseconds
    #[serde(default = "default_analysis_timeout_ms")]
    pub timeout_ms: u64,

    /// Analyses below this confidence are replaced by the heuristic fallback
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

const fn default_analysis_timeout_ms() -> u64 {
    15_000
}

const fn default_confidence_threshold() -> f32 {
    0.5
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_analysis_timeout_ms(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RoutingConfig {
    /// Maximum sources per plan (1-5)
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

const fn default_max_sources() -> usize {
    MAX_PLAN_LENGTH
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_sources: default_max_sources(),
        }
    }
}

/// Tool execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutorConfig {
    /// Maximum in-flight source calls per batch
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Timeout for a single connector invocation, in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Retry policy for transient source failures
    #[serde(default)]
    pub retry: RetryConfig,
}

const fn default_max_concurrency() -> usize {
    4
}

const fn default_call_timeout_ms() -> u64 {
    30_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            call_timeout_ms: default_call_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor between attempts
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    4_000
}

const fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// Conversation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ControllerConfig {
    /// Maximum tool rounds before synthesis is forced
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Tokens available for accumulating evidence across a query
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Model context window, in tokens
    #[serde(default = "default_context_window_tokens")]
    pub context_window_tokens: usize,

    /// Tokens kept free for the model's answer
    #[serde(default = "default_response_reserve_tokens")]
    pub response_reserve_tokens: usize,

    /// Overall deadline per query, in seconds
    #[serde(default = "default_query_deadline_secs")]
    pub query_deadline_secs: u64,
}

const fn default_max_rounds() -> u32 {
    5
}

const fn default_token_budget() -> usize {
    60_000
}

const fn default_context_window_tokens() -> usize {
    128_000
}

const fn default_response_reserve_tokens() -> usize {
    8_000
}

const fn default_query_deadline_secs() -> u64 {
    120
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            token_budget: default_token_budget(),
            context_window_tokens: default_context_window_tokens(),
            response_reserve_tokens: default_response_reserve_tokens(),
            query_deadline_secs: default_query_deadline_secs(),
        }
    }
}

impl ControllerConfig {
    pub fn query_deadline(&self) -> Duration {
        Duration::from_secs(self.query_deadline_secs)
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Burst size for token bucket
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

const fn default_requests_per_second() -> f64 {
    5.0
}

const fn default_burst_size() -> u32 {
    5
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// Default limit plus per-source overrides keyed by source wire name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitsConfig {
    #[serde(default)]
    pub default: RateLimitConfig,

    #[serde(default = "default_rate_limit_overrides")]
    pub overrides: HashMap<String, RateLimitConfig>,
}

fn default_rate_limit_overrides() -> HashMap<String, RateLimitConfig> {
    // NCBI E-utilities allow 3 requests/second without an API key.
    HashMap::from([(
        SourceId::Literature.as_str().to_string(),
        RateLimitConfig {
            requests_per_second: 3.0,
            burst_size: 3,
        },
    )])
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            default: RateLimitConfig::default(),
            overrides: default_rate_limit_overrides(),
        }
    }
}

impl RateLimitsConfig {
    /// Effective limit for a source.
    pub fn for_source(&self, source: SourceId) -> RateLimitConfig {
        self.overrides
            .get(source.as_str())
            .copied()
            .unwrap_or(self.default)
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Cache successful payloads across queries
    #[serde(default)]
    pub enabled: bool,

    /// Entry time-to-live, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum cached payloads
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
}

const fn default_cache_ttl_secs() -> u64 {
    600
}

const fn default_cache_max_entries() -> u64 {
    1_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

/// Credentials for source databases
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourcesConfig {
    /// NCBI E-utilities API key
    #[serde(default)]
    pub ncbi_api_key: Option<String>,

    /// Contact email sent to NCBI
    #[serde(default)]
    pub email: Option<String>,

    /// BioGRID access key
    #[serde(default)]
    pub biogrid_access_key: Option<String>,

    /// Override base URLs keyed by source wire name
    #[serde(default)]
    pub base_urls: HashMap<String, String>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Log file rotation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Directory for log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// File rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}
