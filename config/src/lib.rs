//! Shade Configuration
//!
//! Shared configuration crate for all Shade components.
//!
//! Handles loading configuration from:
//! 1. SHADE_CONFIG env var (explicit path)
//! 2. ./shade.toml (current directory)
//! 3. ~/.shade/shade.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use std::{env, fs};

/// Global config instance for convenience access
pub static GLOBAL_CONFIG: OnceLock<ShadeConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "shade.toml";
const CONFIG_DIR_NAME: &str = ".shade";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_MAX_CONSECUTIVE_ABSENT: usize = 16;
const DEFAULT_DISCOVERY_GROWTH_FACTOR: u64 = 2;
const DEFAULT_DISCOVERY_LOOKAHEAD: u64 = 4;

const DEFAULT_SEARCH_WINDOW: u64 = 64;
const DEFAULT_MAX_SEARCH_EXPANSIONS: u32 = 16;
const DEFAULT_MAX_SNAPSHOT_RETRIES: u32 = 3;

const DEFAULT_MAX_SPEND_INPUTS: usize = 4;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_INSERTION_TIMEOUT_MS: u64 = 60_000;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadeConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub commitments: CommitmentConfig,
}

/// Transaction discovery policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Nonces probed concurrently per backward fetch batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Consecutive absent nonces that end a backward scan
    #[serde(default = "default_max_consecutive_absent")]
    pub max_consecutive_absent: usize,
    /// Step multiplier while probing upward for the latest nonce
    #[serde(default = "default_discovery_growth_factor")]
    pub discovery_growth_factor: u64,
    /// Nonces probed past a discovered bound to step over gaps
    #[serde(default = "default_discovery_lookahead")]
    pub discovery_lookahead: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_consecutive_absent: DEFAULT_MAX_CONSECUTIVE_ABSENT,
            discovery_growth_factor: DEFAULT_DISCOVERY_GROWTH_FACTOR,
            discovery_lookahead: DEFAULT_DISCOVERY_LOOKAHEAD,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_max_consecutive_absent() -> usize {
    DEFAULT_MAX_CONSECUTIVE_ABSENT
}
fn default_discovery_growth_factor() -> u64 {
    DEFAULT_DISCOVERY_GROWTH_FACTOR
}
fn default_discovery_lookahead() -> u64 {
    DEFAULT_DISCOVERY_LOOKAHEAD
}

/// Commitment tree search policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Leaves read by the first search window after a hint
    #[serde(default = "default_search_window")]
    pub search_window: u64,
    /// How many times a missed window is doubled and retried
    #[serde(default = "default_max_search_expansions")]
    pub max_search_expansions: u32,
    /// Re-reads allowed when the root moves while an opening is built
    #[serde(default = "default_max_snapshot_retries")]
    pub max_snapshot_retries: u32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            search_window: DEFAULT_SEARCH_WINDOW,
            max_search_expansions: DEFAULT_MAX_SEARCH_EXPANSIONS,
            max_snapshot_retries: DEFAULT_MAX_SNAPSHOT_RETRIES,
        }
    }
}

fn default_search_window() -> u64 {
    DEFAULT_SEARCH_WINDOW
}
fn default_max_search_expansions() -> u32 {
    DEFAULT_MAX_SEARCH_EXPANSIONS
}
fn default_max_snapshot_retries() -> u32 {
    DEFAULT_MAX_SNAPSHOT_RETRIES
}

/// Commitment lifecycle policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentConfig {
    /// Maximum input commitments a single spend may reference
    #[serde(default = "default_max_spend_inputs")]
    pub max_spend_inputs: usize,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_insertion_timeout")]
    pub insertion_timeout_ms: u64,
}

impl CommitmentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn insertion_timeout(&self) -> Duration {
        Duration::from_millis(self.insertion_timeout_ms)
    }
}

impl Default for CommitmentConfig {
    fn default() -> Self {
        Self {
            max_spend_inputs: DEFAULT_MAX_SPEND_INPUTS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            insertion_timeout_ms: DEFAULT_INSERTION_TIMEOUT_MS,
        }
    }
}

fn default_max_spend_inputs() -> usize {
    DEFAULT_MAX_SPEND_INPUTS
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_insertion_timeout() -> u64 {
    DEFAULT_INSERTION_TIMEOUT_MS
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable value for {}: {}", key, v),
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl ShadeConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::read_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.normalize();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        config.normalize();
        Ok(config)
    }

    /// Parse a TOML document without touching the environment
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(contents).context("Failed to parse config")?;
        config.normalize();
        Ok(config)
    }

    fn read_file(path: &std::path::Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check SHADE_CONFIG env var
        if let Ok(path) = env::var("SHADE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check ./shade.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.shade/shade.toml
        dirs::home_dir()
            .map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Sync
        env_parse("SHADE_BATCH_SIZE", &mut self.sync.batch_size);
        env_parse("SHADE_MAX_ABSENT", &mut self.sync.max_consecutive_absent);
        env_parse("SHADE_GROWTH_FACTOR", &mut self.sync.discovery_growth_factor);
        env_parse("SHADE_LOOKAHEAD", &mut self.sync.discovery_lookahead);

        // Tree
        env_parse("SHADE_SEARCH_WINDOW", &mut self.tree.search_window);
        env_parse("SHADE_SEARCH_EXPANSIONS", &mut self.tree.max_search_expansions);

        // Commitments
        env_parse("SHADE_MAX_SPEND_INPUTS", &mut self.commitments.max_spend_inputs);
        env_parse("SHADE_POLL_INTERVAL_MS", &mut self.commitments.poll_interval_ms);
        env_parse(
            "SHADE_INSERTION_TIMEOUT_MS",
            &mut self.commitments.insertion_timeout_ms,
        );
    }

    /// Clamp values that would stall the sync loops
    fn normalize(&mut self) {
        self.sync.batch_size = self.sync.batch_size.max(1);
        self.sync.max_consecutive_absent = self.sync.max_consecutive_absent.max(1);
        self.sync.discovery_growth_factor = self.sync.discovery_growth_factor.max(2);
        self.tree.search_window = self.tree.search_window.max(1);
        self.commitments.max_spend_inputs = self.commitments.max_spend_inputs.max(1);
        self.commitments.poll_interval_ms = self.commitments.poll_interval_ms.max(1);
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    /// Get the global config instance, initializing it if necessary.
    ///
    /// Falls back to defaults if loading fails.
    pub fn global() -> &'static ShadeConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                log::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            })
        })
    }

    /// Initialize the global config with a specific instance.
    ///
    /// Returns `Err(config)` if already initialized.
    pub fn set_global(config: ShadeConfig) -> Result<(), ShadeConfig> {
        GLOBAL_CONFIG.set(config)
    }
}

/// Shorthand for `ShadeConfig::global()`.
#[inline]
pub fn global_config() -> &'static ShadeConfig {
    ShadeConfig::global()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ShadeConfig::default();
        assert_eq!(config.sync.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.tree.search_window, DEFAULT_SEARCH_WINDOW);
        assert_eq!(config.commitments.max_spend_inputs, DEFAULT_MAX_SPEND_INPUTS);
    }

    #[test]
    fn test_generate_sample() {
        let sample = ShadeConfig::generate_sample();
        assert!(sample.contains("[sync]"));
        assert!(sample.contains("[tree]"));
        assert!(sample.contains("[commitments]"));
    }

    #[test]
    fn test_parse_partial_document() {
        let parsed = ShadeConfig::from_toml(
            r#"
            [sync]
            batch_size = 25

            [commitments]
            max_spend_inputs = 2
            "#,
        )
        .unwrap();

        assert_eq!(parsed.sync.batch_size, 25);
        assert_eq!(
            parsed.sync.max_consecutive_absent,
            DEFAULT_MAX_CONSECUTIVE_ABSENT
        );
        assert_eq!(parsed.commitments.max_spend_inputs, 2);
        assert_eq!(parsed.commitments.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_normalize_clamps_degenerate_values() {
        let parsed = ShadeConfig::from_toml(
            r#"
            [sync]
            batch_size = 0
            discovery_growth_factor = 1
            "#,
        )
        .unwrap();

        assert_eq!(parsed.sync.batch_size, 1);
        assert_eq!(parsed.sync.discovery_growth_factor, 2);
    }

    #[test]
    fn test_durations() {
        let config = CommitmentConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(1_000));
        assert_eq!(config.insertion_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_transport_sections_are_ignored() {
        // Ledger endpoints belong to whichever transport implements the queries
        let parsed = ShadeConfig::from_toml(
            r#"
            [ledger]
            rpc_url = "http://127.0.0.1:8899"

            [tree]
            search_window = 8
            "#,
        )
        .unwrap();

        assert_eq!(parsed.tree.search_window, 8);
        assert!(!ShadeConfig::generate_sample().contains("rpc_url"));
    }
}
