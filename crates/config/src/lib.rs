//! Configuration loading, validation, and management for contextloom.
//!
//! Loads configuration from `$CONTEXTLOOM_CONFIG` or
//! `~/.contextloom/config.toml` with environment variable overrides.
//! Validates all settings at startup.

use contextloom_core::query::{Intent, ScopeMode};
use contextloom_core::quality::QualityRequirement;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.contextloom/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Search parameters and fallback behaviour
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Token budget defaults and eviction policy
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Graph-aware filtering
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Access filtering policy
    #[serde(default)]
    pub access: AccessConfig,

    /// Global-scope retrieval cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Quality gate thresholds and per-intent requirements
    #[serde(default)]
    pub quality: QualityConfig,

    /// Entity store gateway
    #[serde(default)]
    pub entity_store: EntityStoreConfig,
}

// ── Retrieval ─────────────────────────────────────────────────────────────

/// `top_k`/`min_score` for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub top_k: usize,
    pub min_score: f32,
}

impl SearchParams {
    pub const fn new(top_k: usize, min_score: f32) -> Self {
        Self { top_k, min_score }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_global_search")]
    pub global: SearchParams,

    #[serde(default = "default_project_search")]
    pub project: SearchParams,

    #[serde(default = "default_entity_search")]
    pub entity: SearchParams,

    #[serde(default = "default_unscoped_search")]
    pub none: SearchParams,

    /// Fallback kicks in when semantic search returns fewer than
    /// `fallback_ratio * top_k` results.
    #[serde(default = "default_fallback_ratio")]
    pub fallback_ratio: f32,

    /// Run keyword search concurrently with semantic search instead of
    /// only after it comes up short.
    #[serde(default)]
    pub eager_fallback: bool,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_global_search() -> SearchParams {
    SearchParams::new(10, 0.5)
}
fn default_project_search() -> SearchParams {
    SearchParams::new(20, 0.3)
}
fn default_entity_search() -> SearchParams {
    SearchParams::new(10, 0.3)
}
fn default_unscoped_search() -> SearchParams {
    SearchParams::new(10, 0.5)
}
fn default_fallback_ratio() -> f32 {
    0.5
}
fn default_call_timeout_ms() -> u64 {
    5_000
}

impl RetrievalConfig {
    /// Search parameters for a scope.
    pub fn params_for(&self, scope: ScopeMode) -> SearchParams {
        match scope {
            ScopeMode::Global => self.global,
            ScopeMode::Project => self.project,
            ScopeMode::Entity => self.entity,
            ScopeMode::None => self.none,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            global: default_global_search(),
            project: default_project_search(),
            entity: default_entity_search(),
            none: default_unscoped_search(),
            fallback_ratio: default_fallback_ratio(),
            eager_fallback: false,
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

// ── Budget ────────────────────────────────────────────────────────────────

/// Tokens reserved for the wrapper text around the assembled context.
pub const DEFAULT_WRAPPER_OVERHEAD: usize = 100;

/// Whether graph-linked chunks may be evicted once every unlinked chunk
/// is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkedEvictionPolicy {
    /// Linked chunks are evicted lowest score first after unlinked ones.
    #[default]
    Allow,
    /// Linked chunks are never evicted; related entities go instead.
    Protect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Used when a query does not carry its own budget.
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: usize,

    #[serde(default = "default_wrapper_overhead")]
    pub wrapper_overhead: usize,

    #[serde(default)]
    pub linked_eviction: LinkedEvictionPolicy,
}

fn default_max_tokens() -> usize {
    4096
}
fn default_wrapper_overhead() -> usize {
    DEFAULT_WRAPPER_OVERHEAD
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
            wrapper_overhead: default_wrapper_overhead(),
            linked_eviction: LinkedEvictionPolicy::default(),
        }
    }
}

// ── Ranking ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Share of unlinked chunks kept in project scope.
    #[serde(default = "default_unlinked_fraction")]
    pub unlinked_fraction: f32,

    /// Floor on unlinked chunks kept when any were retrieved.
    #[serde(default = "default_min_unlinked")]
    pub min_unlinked: usize,
}

fn default_unlinked_fraction() -> f32 {
    0.2
}
fn default_min_unlinked() -> usize {
    1
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            unlinked_fraction: default_unlinked_fraction(),
            min_unlinked: default_min_unlinked(),
        }
    }
}

// ── Access ────────────────────────────────────────────────────────────────

/// What to do with a fragment when the access check itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessFailurePolicy {
    /// Include the fragment and record the failure.
    #[default]
    FailOpen,
    /// Exclude the fragment and record the failure.
    FailClosed,
}

impl std::str::FromStr for AccessFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail_open" | "open" => Ok(Self::FailOpen),
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            other => Err(ConfigError::ValidationError(format!(
                "unknown access failure policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub on_error: AccessFailurePolicy,

    #[serde(default = "default_required_permission")]
    pub required_permission: String,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_required_permission() -> String {
    "read".into()
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            on_error: AccessFailurePolicy::default(),
            required_permission: default_required_permission(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum age before an entry is discarded on read.
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,

    /// Storage-level expiry; must be at least `staleness_secs`.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_cache_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_staleness_secs() -> u64 {
    600
}
fn default_ttl_secs() -> u64 {
    900
}
fn default_key_prefix() -> String {
    "contextloom".into()
}
fn default_cache_timeout_ms() -> u64 {
    500
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            staleness_secs: default_staleness_secs(),
            ttl_secs: default_ttl_secs(),
            key_prefix: default_key_prefix(),
            call_timeout_ms: default_cache_timeout_ms(),
        }
    }
}

// ── Quality ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Overall relevance below this raises `low_relevance`.
    #[serde(default = "default_low_relevance_threshold")]
    pub low_relevance_threshold: f32,

    /// Fallback when an intent has no entry in `requirements`.
    #[serde(default)]
    pub default_requirement: QualityRequirement,

    /// Per-intent requirements keyed by lowercase intent label.
    #[serde(default = "default_requirements")]
    pub requirements: HashMap<String, QualityRequirement>,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_low_relevance_threshold() -> f32 {
    0.3
}

fn default_requirements() -> HashMap<String, QualityRequirement> {
    let mut map = HashMap::new();
    for label in ["search", "exploratory", "lookup", "discovery"] {
        map.insert(label.to_string(), QualityRequirement::exploratory());
    }
    for label in ["analysis", "comparison", "forecast", "risk_assessment"] {
        map.insert(label.to_string(), QualityRequirement::analytical());
    }
    map.insert(
        "summary".to_string(),
        QualityRequirement {
            allow_empty: false,
            min_source_count: 1,
            min_relevance_score: 0.3,
            min_tokens: None,
        },
    );
    map
}

impl QualityConfig {
    /// Resolve the requirement for an intent. Exploratory intents without
    /// an explicit entry still allow an empty context.
    pub fn requirement_for(&self, intent: &Intent) -> QualityRequirement {
        let label = intent.label.to_lowercase();
        if let Some(req) = self.requirements.get(&label) {
            return req.clone();
        }
        if intent.is_exploratory() {
            return QualityRequirement::exploratory();
        }
        self.default_requirement.clone()
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            low_relevance_threshold: default_low_relevance_threshold(),
            default_requirement: QualityRequirement::default(),
            requirements: default_requirements(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

// ── Entity store ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityStoreConfig {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for EntityStoreConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────

impl EngineConfig {
    /// Load configuration from the default location, with env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONTEXTLOOM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&path)?;

        let overrides = EnvOverrides {
            staleness_secs: std::env::var("CONTEXTLOOM_STALENESS_SECS").ok(),
            max_tokens: std::env::var("CONTEXTLOOM_MAX_TOKENS").ok(),
            access_on_error: std::env::var("CONTEXTLOOM_ACCESS_ON_ERROR").ok(),
        };
        config.apply_overrides(&overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".contextloom")
    }

    fn apply_overrides(&mut self, overrides: &EnvOverrides) -> Result<(), ConfigError> {
        if let Some(raw) = &overrides.staleness_secs {
            let secs: u64 = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CONTEXTLOOM_STALENESS_SECS must be an integer, got '{raw}'"
                ))
            })?;
            self.cache.staleness_secs = secs;
            self.cache.ttl_secs = self.cache.ttl_secs.max(secs);
        }
        if let Some(raw) = &overrides.max_tokens {
            self.budget.default_max_tokens = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CONTEXTLOOM_MAX_TOKENS must be an integer, got '{raw}'"
                ))
            })?;
        }
        if let Some(raw) = &overrides.access_on_error {
            self.access.on_error = raw.parse()?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        for (scope, params) in [
            ("global", r.global),
            ("project", r.project),
            ("entity", r.entity),
            ("none", r.none),
        ] {
            if params.top_k == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "retrieval.{scope}.top_k must be > 0"
                )));
            }
            if !(0.0..=1.0).contains(&params.min_score) {
                return Err(ConfigError::ValidationError(format!(
                    "retrieval.{scope}.min_score must be between 0.0 and 1.0"
                )));
            }
        }

        if !(r.fallback_ratio > 0.0 && r.fallback_ratio <= 1.0) {
            return Err(ConfigError::ValidationError(
                "retrieval.fallback_ratio must be in (0.0, 1.0]".into(),
            ));
        }

        if !(self.ranking.unlinked_fraction > 0.0 && self.ranking.unlinked_fraction <= 1.0) {
            return Err(ConfigError::ValidationError(
                "ranking.unlinked_fraction must be in (0.0, 1.0]".into(),
            ));
        }

        if self.budget.default_max_tokens <= self.budget.wrapper_overhead {
            return Err(ConfigError::ValidationError(
                "budget.default_max_tokens must exceed budget.wrapper_overhead".into(),
            ));
        }

        if self.cache.ttl_secs < self.cache.staleness_secs {
            return Err(ConfigError::ValidationError(
                "cache.ttl_secs must be >= cache.staleness_secs".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.quality.low_relevance_threshold) {
            return Err(ConfigError::ValidationError(
                "quality.low_relevance_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        self.quality
            .default_requirement
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("quality.default_requirement: {e}")))?;
        for (intent, req) in &self.quality.requirements {
            req.validate().map_err(|e| {
                ConfigError::ValidationError(format!("quality.requirements.{intent}: {e}"))
            })?;
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Raw environment overrides, read once in [`EngineConfig::load`].
#[derive(Debug, Default)]
struct EnvOverrides {
    staleness_secs: Option<String>,
    max_tokens: Option<String>,
    access_on_error: Option<String>,
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
