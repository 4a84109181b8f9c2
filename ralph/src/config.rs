//! Configuration loading

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Find a config file by walking up the directory tree, then checking
/// global config.
///
/// Search order:
/// 1. Current directory and parent directories (walking up to root)
/// 2. Global config at ~/.config/ralph/
///
/// Returns the path if found, None otherwise.
fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join("ralph").join(filename);
        if global_path.exists() {
            return Some(global_path);
        }
    }

    None
}

// ============================================================================
// Ralph Configuration (.ralph.toml)
// ============================================================================

/// Top-level configuration (from .ralph.toml)
#[derive(Debug, Default, Deserialize)]
pub struct RalphFileConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Agent backend section: the CLI invoked per agent call
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_command")]
    pub command: String,
    #[serde(default = "default_backend_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Workflow section
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Implementation <-> Review retry cap; 0 means unbounded
    #[serde(default = "default_max_review_iterations")]
    pub max_review_iterations: u32,
    /// Default feature-list source for the planning prompt
    #[serde(default = "default_feature_list")]
    pub feature_list: PathBuf,
}

/// Session section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Sessions root directory; defaults to the platform data dir
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl SessionConfig {
    /// Resolve the sessions root, falling back to
    /// `<data_dir>/ralph/sessions` and then `.ralph/sessions`.
    pub fn resolve_root(&self) -> PathBuf {
        if let Some(ref root) = self.root {
            return root.clone();
        }
        match dirs::data_dir() {
            Some(data) => data.join("ralph").join("sessions"),
            None => Path::new(".ralph").join("sessions"),
        }
    }
}

/// Streaming bridge section
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Delay before dispatching each queued message after a turn ends
    #[serde(default = "default_dispatch_delay_ms")]
    pub dispatch_delay_ms: u64,
}

// Default value functions
fn default_backend_command() -> String {
    "claude".to_string()
}

fn default_backend_args() -> Vec<String> {
    vec!["-p".to_string()]
}

fn default_max_review_iterations() -> u32 {
    3
}

fn default_feature_list() -> PathBuf {
    PathBuf::from("features.md")
}

fn default_dispatch_delay_ms() -> u64 {
    100
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: default_backend_command(),
            args: default_backend_args(),
            model: None,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_review_iterations: default_max_review_iterations(),
            feature_list: default_feature_list(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            dispatch_delay_ms: default_dispatch_delay_ms(),
        }
    }
}

impl RalphFileConfig {
    /// Load `.ralph.toml` from the directory tree or global config;
    /// defaults when absent.
    pub fn load() -> Result<Self> {
        if let Some(path) = find_config_file(".ralph.toml") {
            tracing::debug!("loading config from: {}", path.display());
            return Self::load_from_path(&path);
        }
        tracing::debug!("no .ralph.toml found, using defaults");
        Ok(Self::default())
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RalphFileConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
