use crate::error::{ProviderError, Result};
use crate::matter::device_types::SAMPLE_SHIM_PATH;
use crate::matter::types::{ClusterId, ClusterPath, EndptId};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory for persistent state
const PERSIST_DIR: &str = ".config/im-provider";
const STATE_FILE: &str = "state.json";

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            if (value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\''))
            {
                value = &value[1..value.len() - 1];
            }

            // Environment wins over .env
            if std::env::var(key).is_err() {
                // SAFETY: called from main before any other thread exists
                unsafe { std::env::set_var(key, value) };
            }
        }
    }
}

/// Get the default state file path
fn default_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PERSIST_DIR)
        .join(STATE_FILE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// JSON registry description; the built-in sample node when unset.
    pub registry_path: Option<PathBuf>,
    /// Persistent key/value state (shim data versions).
    pub state_path: PathBuf,
    /// Cluster paths served through the compatibility shim.
    pub shim_paths: Vec<ClusterPath>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_path: None,
            state_path: default_state_path(),
            shim_paths: vec![SAMPLE_SHIM_PATH],
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("IM_REGISTRY_PATH") {
            config.registry_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("IM_STATE_PATH") {
            config.state_path = PathBuf::from(path);
        }
        if let Ok(paths) = std::env::var("IM_SHIM_PATHS") {
            match parse_cluster_paths(&paths) {
                Ok(p) => config.shim_paths = p,
                Err(e) => warn!("Ignoring IM_SHIM_PATHS: {}", e),
            }
        }

        config
    }
}

/// Decimal or `0x` hex.
pub fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Parse one `endpoint:cluster` pair; each side is decimal or `0x` hex.
pub fn parse_cluster_path(text: &str) -> Result<ClusterPath> {
    let invalid = || ProviderError::InvalidPath(text.to_string());

    let (endpoint, cluster) = text.split_once(':').ok_or_else(invalid)?;
    let endpoint = parse_number(endpoint)
        .and_then(|n| EndptId::try_from(n).ok())
        .ok_or_else(invalid)?;
    let cluster = parse_number(cluster)
        .and_then(|n| ClusterId::try_from(n).ok())
        .ok_or_else(invalid)?;

    let path = ClusterPath::new(endpoint, cluster);
    if !path.is_valid() {
        return Err(invalid());
    }
    Ok(path)
}

/// Parse a comma-separated list of `endpoint:cluster` pairs.
pub fn parse_cluster_paths(text: &str) -> Result<Vec<ClusterPath>> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_cluster_path)
        .collect()
}
