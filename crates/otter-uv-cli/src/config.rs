//! Configuration file parsing for otter-uv.toml.

use otter_uv::UvConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file names searched from the current directory upwards
const CONFIG_NAMES: &[&str] = &["otter-uv.toml", ".otter-uv.toml"];

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Event loop settings
    #[serde(default)]
    pub uv: UvConfig,
}

/// Load configuration from a file or search for a default config file.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = path.map(PathBuf::from).or_else(find_config_file);

    match config_path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded config");
            Ok(config)
        }
        Some(path) => anyhow::bail!("Config file not found: {}", path.display()),
        None => Ok(Config::default()),
    }
}

fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;

    let mut dir = Some(cwd.as_path());
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }
    None
}
