//! Engine configuration.
//!
//! Loaded from `.loreline/config.toml` under the store root. Every field has
//! a serde default, so a missing file or a partial file is fine. The config
//! is a plain value threaded into the calls that need it; nothing reads it
//! ambiently.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub list: ListConfig,
    #[serde(default)]
    pub board: BoardConfig,
}

/// Pagination caps for the list operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Bounds for the board layout store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Maximum total entries (positions, bend points, condition nodes) per
    /// saved layout. Saves above this fail validation.
    #[serde(default = "default_board_max_entries")]
    pub max_entries: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_entries: default_board_max_entries(),
        }
    }
}

const fn default_page_size() -> u32 {
    50
}

const fn default_max_page_size() -> u32 {
    200
}

const fn default_board_max_entries() -> usize {
    512
}

/// Load the engine config from `<store_root>/.loreline/config.toml`.
///
/// A missing file yields the defaults; a present but malformed file is an
/// error (silent fallback would hide typos in the caps).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(store_root: &Path) -> Result<EngineConfig> {
    let path = store_root.join(".loreline/config.toml");
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    let config: EngineConfig =
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_file_missing() {
        let dir = TempDir::new().expect("temp dir");
        let config = load_config(dir.path()).expect("load");
        assert_eq!(config.list.default_page_size, 50);
        assert_eq!(config.list.max_page_size, 200);
        assert_eq!(config.board.max_entries, 512);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir_all(dir.path().join(".loreline")).expect("mkdir");
        std::fs::write(
            dir.path().join(".loreline/config.toml"),
            "[list]\nmax_page_size = 25\n",
        )
        .expect("write config");

        let config = load_config(dir.path()).expect("load");
        assert_eq!(config.list.max_page_size, 25);
        assert_eq!(config.list.default_page_size, 50);
        assert_eq!(config.board.max_entries, 512);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir_all(dir.path().join(".loreline")).expect("mkdir");
        std::fs::write(dir.path().join(".loreline/config.toml"), "list = 'nope'")
            .expect("write config");

        assert!(load_config(dir.path()).is_err());
    }
}
