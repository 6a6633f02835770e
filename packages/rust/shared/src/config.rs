//! Application configuration for Recast.
//!
//! User config lives at `~/.recast/recast.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RecastError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "recast.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".recast";

// ---------------------------------------------------------------------------
// Config structs (matching recast.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Text-generation oracle settings.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Reconstruction pipeline tuning.
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the job database. `~` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Owner recorded on new jobs.
    #[serde(default = "default_owner")]
    pub owner: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            owner: default_owner(),
        }
    }
}

fn default_db_path() -> String {
    "~/.recast/recast.db".into()
}
fn default_owner() -> String {
    "local".into()
}

/// `[oracle]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for every generation call.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_temperature() -> f32 {
    0.7
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Word budget per segment; also the divisor of the chunk count.
    #[serde(default = "default_segment_words")]
    pub segment_words: u32,

    /// Expansion retries allowed per chunk after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between chunks (oracle rate-limit courtesy).
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,

    /// Pause before each expansion retry.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Words of the source sent to the skeleton extractor.
    #[serde(default = "default_skeleton_word_limit")]
    pub skeleton_word_limit: usize,

    /// How long a worker's claim on a job stays valid.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            segment_words: default_segment_words(),
            max_retries: default_max_retries(),
            chunk_delay_ms: default_chunk_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            skeleton_word_limit: default_skeleton_word_limit(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

fn default_segment_words() -> u32 {
    500
}
fn default_max_retries() -> u32 {
    3
}
fn default_chunk_delay_ms() -> u64 {
    2_000
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_skeleton_word_limit() -> usize {
    50_000
}
fn default_claim_lease_secs() -> u64 {
    900
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub segment_words: u32,
    pub max_retries: u32,
    pub chunk_delay: Duration,
    pub retry_delay: Duration,
    pub skeleton_word_limit: usize,
    pub claim_lease: Duration,
}

impl PipelineConfig {
    /// Settings with every delay zeroed, for tests and offline replays.
    pub fn without_delays() -> Self {
        Self {
            chunk_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            ..Self::from(&AppConfig::default())
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            segment_words: p.segment_words.max(1),
            max_retries: p.max_retries,
            chunk_delay: Duration::from_millis(p.chunk_delay_ms),
            retry_delay: Duration::from_millis(p.retry_delay_ms),
            skeleton_word_limit: p.skeleton_word_limit,
            claim_lease: Duration::from_secs(p.claim_lease_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.recast/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| RecastError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.recast/recast.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RecastError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RecastError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RecastError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RecastError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RecastError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the configured database path, expanding a leading `~/`.
pub fn resolve_db_path(config: &AppConfig) -> Result<PathBuf> {
    expand_home(&config.defaults.db_path)
}

fn expand_home(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| RecastError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

/// Read the oracle API key from the configured env var.
pub fn api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.oracle.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(RecastError::config(format!(
            "oracle API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the oracle API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    api_key(config).map(|_| ())
}
