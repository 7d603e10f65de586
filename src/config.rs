//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (RULES_ENGINE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [data_service]
//! default_timeout_ms = 30000
//! max_retries = 3
//!
//! [resolution]
//! overall_timeout_ms = 60000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RULES_ENGINE_DATA_SERVICE__MAX_RETRIES=5
//! RULES_ENGINE_FILTER__DEFAULT_BATCH_SIZE=250
//! ```

use figment::{providers::{Env, Format, Toml}, Figment};
use serde::{Deserialize, Serialize};

/// Top-level configuration: one section per component that exposes
/// tunables (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data_service: DataServiceConfigDefaults,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub rule: RuleLimits,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults applied to a `DataServiceConfig` that doesn't set its own
/// timeout/auth, and the shared client's concurrency/retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataServiceConfigDefaults {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_global_concurrency")]
    pub global_concurrency: usize,
    #[serde(default = "default_per_endpoint_concurrency")]
    pub per_endpoint_concurrency: usize,
}

impl Default for DataServiceConfigDefaults {
    fn default() -> Self {
        DataServiceConfigDefaults {
            default_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            global_concurrency: default_global_concurrency(),
            per_endpoint_concurrency: default_per_endpoint_concurrency(),
        }
    }
}

/// Bounds applied while resolving one plan (C7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default = "default_overall_timeout_ms")]
    pub overall_timeout_ms: u64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        ResolutionConfig { overall_timeout_ms: default_overall_timeout_ms() }
    }
}

impl From<ResolutionConfig> for crate::resolver::ResolutionConfig {
    fn from(c: ResolutionConfig) -> Self {
        crate::resolver::ResolutionConfig { overall_timeout_ms: c.overall_timeout_ms }
    }
}

/// Batching/concurrency defaults for one `filter` call (C8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    #[serde(default = "default_per_entity_concurrency")]
    pub per_entity_concurrency: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            default_batch_size: default_batch_size(),
            per_entity_concurrency: default_per_entity_concurrency(),
        }
    }
}

/// Parser bounds for one rule tree (C1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RuleLimits {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_leaves")]
    pub max_leaves: usize,
}

impl Default for RuleLimits {
    fn default() -> Self {
        RuleLimits { max_depth: default_max_depth(), max_leaves: default_max_leaves() }
    }
}

impl From<RuleLimits> for crate::rule::ParseLimits {
    fn from(l: RuleLimits) -> Self {
        crate::rule::ParseLimits { max_depth: l.max_depth, max_leaves: l.max_leaves }
    }
}

/// Tunables for the dependency analyzer's plan construction (C6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_merge_group_threshold")]
    pub merge_group_threshold: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig { merge_group_threshold: default_merge_group_threshold() }
    }
}

impl From<AnalyzerConfig> for crate::dependency::AnalyzerConfig {
    fn from(c: AnalyzerConfig) -> Self {
        crate::dependency::AnalyzerConfig { merge_group_threshold: c.merge_group_threshold }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), format: default_log_format() }
    }
}

// Default value functions, one per §6 row.
fn default_timeout_ms() -> u64 { 30_000 }
fn default_max_retries() -> u32 { 3 }
fn default_backoff_initial_ms() -> u64 { 200 }
fn default_backoff_max_ms() -> u64 { 2_000 }
fn default_global_concurrency() -> usize { 64 }
fn default_per_endpoint_concurrency() -> usize { 16 }
fn default_overall_timeout_ms() -> u64 { 60_000 }
fn default_batch_size() -> usize { 100 }
fn default_per_entity_concurrency() -> usize { 16 }
fn default_max_depth() -> usize { 32 }
fn default_max_leaves() -> usize { 1_000 }
fn default_merge_group_threshold() -> usize { 3 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (RULES_ENGINE_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("RULES_ENGINE_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RULES_ENGINE_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_service: DataServiceConfigDefaults::default(),
            resolution: ResolutionConfig::default(),
            filter: FilterConfig::default(),
            rule: RuleLimits::default(),
            analyzer: AnalyzerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
