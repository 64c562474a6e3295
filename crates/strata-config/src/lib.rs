use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_core::CanonicalJsonError;
use thiserror::Error;

pub const STRATA_DIR_NAME: &str = ".strata";
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_MAX_FILES: u32 = 50_000;
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024;
pub const DEFAULT_MAX_PATH_DEPTH: u32 = 32;
pub const DEFAULT_MAX_NODES: u32 = 50_000;
pub const DEFAULT_MAX_EDGES: u32 = 500_000;
pub const DEFAULT_MAX_CYCLES: u32 = 256;
pub const DEFAULT_CYCLE_STEP_BUDGET: u64 = 2_000_000;
pub const DEFAULT_ANALYZER_STEP_BUDGET: u64 = 1_000_000;
pub const DEFAULT_MIN_CONFIDENT_FILE_COUNT: u32 = 3;
pub const DEFAULT_FAN_IN_THRESHOLD: u32 = 8;
pub const DEFAULT_MAX_UNIT_LINES: u32 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StrataConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub analyzers: AnalyzersConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_files")]
    pub max_files: u32,
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: u32,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,
    #[serde(default = "default_max_edges")]
    pub max_edges: u32,
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
    #[serde(default = "default_cycle_step_budget")]
    pub cycle_step_budget: u64,
    #[serde(default = "default_analyzer_step_budget")]
    pub analyzer_step_budget: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_total_bytes: default_max_total_bytes(),
            max_path_depth: default_max_path_depth(),
            max_nodes: default_max_nodes(),
            max_edges: default_max_edges(),
            max_cycles: default_max_cycles(),
            cycle_step_budget: default_cycle_step_budget(),
            analyzer_step_budget: default_analyzer_step_budget(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzersConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default = "default_min_confident_file_count")]
    pub min_confident_file_count: u32,
    #[serde(default = "default_fan_in_threshold")]
    pub fan_in_threshold: u32,
    #[serde(default = "default_max_unit_lines")]
    pub max_unit_lines: u32,
}

impl Default for AnalyzersConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            min_confident_file_count: default_min_confident_file_count(),
            fan_in_threshold: default_fan_in_threshold(),
            max_unit_lines: default_max_unit_lines(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("failed to hash config: {0}")]
    Hash(#[from] CanonicalJsonError),
}

pub fn strata_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(STRATA_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    strata_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<StrataConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(normalize_config(StrataConfig::default()));
    }

    let raw = fs::read_to_string(path)?;
    let parsed: StrataConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<StrataConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(strata_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = normalize_config(StrataConfig::default());
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn config_hash(config: &StrataConfig) -> Result<String, ConfigError> {
    Ok(strata_core::canonical_hash(config)?)
}

fn normalize_config(mut config: StrataConfig) -> StrataConfig {
    let mut enabled = config
        .analyzers
        .enabled
        .into_iter()
        .map(|namespace| namespace.trim().to_owned())
        .filter(|namespace| !namespace.is_empty())
        .collect::<Vec<_>>();
    enabled.sort();
    enabled.dedup();
    config.analyzers.enabled = enabled;
    config
}

fn default_max_files() -> u32 {
    DEFAULT_MAX_FILES
}

fn default_max_total_bytes() -> u64 {
    DEFAULT_MAX_TOTAL_BYTES
}

fn default_max_path_depth() -> u32 {
    DEFAULT_MAX_PATH_DEPTH
}

fn default_max_nodes() -> u32 {
    DEFAULT_MAX_NODES
}

fn default_max_edges() -> u32 {
    DEFAULT_MAX_EDGES
}

fn default_max_cycles() -> u32 {
    DEFAULT_MAX_CYCLES
}

fn default_cycle_step_budget() -> u64 {
    DEFAULT_CYCLE_STEP_BUDGET
}

fn default_analyzer_step_budget() -> u64 {
    DEFAULT_ANALYZER_STEP_BUDGET
}

fn default_min_confident_file_count() -> u32 {
    DEFAULT_MIN_CONFIDENT_FILE_COUNT
}

fn default_fan_in_threshold() -> u32 {
    DEFAULT_FAN_IN_THRESHOLD
}

fn default_max_unit_lines() -> u32 {
    DEFAULT_MAX_UNIT_LINES
}
