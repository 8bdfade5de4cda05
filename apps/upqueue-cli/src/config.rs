//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/upqueue/upqueue.toml`
//! - Windows: `%APPDATA%/upqueue/upqueue.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use upqueue_uploader::EngineConfig;

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding queued upload records.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Downscale images larger than these bounds before upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize: Option<ResizeConfig>,
}

/// Bounding box for image downscaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeConfig {
    pub max_width: u32,
    pub max_height: u32,
}

fn default_store_dir() -> PathBuf {
    data_base_dir().join("upqueue").join("queue")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            engine: EngineConfig::default(),
            resize: None,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from the platform default
    /// location. A default file is written if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&config_path()),
        }
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("upqueue")
            .join("upqueue.toml")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("upqueue").join("upqueue.toml")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/upqueue/upqueue.toml")
    }
}

/// Returns the platform-specific base directory for application data.
fn data_base_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".local").join("share")
    }

    #[cfg(target_os = "windows")]
    {
        let local = std::env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| "C:\\Users\\Default\\AppData\\Local".into());
        PathBuf::from(local)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upqueue_uploader::UploadMethod;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.store_dir.ends_with("upqueue/queue"));
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.resize.is_none());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            store_dir: PathBuf::from("/var/lib/upqueue"),
            engine: EngineConfig {
                endpoint: "https://files.example.com/dav".into(),
                method: UploadMethod::Post,
                chunk_size: 65_536,
                ..EngineConfig::default()
            },
            resize: Some(ResizeConfig {
                max_width: 1920,
                max_height: 1080,
            }),
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.store_dir, PathBuf::from("/var/lib/upqueue"));
        assert_eq!(parsed.engine, config.engine);
        assert_eq!(parsed.resize, config.resize);
    }

    #[test]
    fn config_partial_toml() {
        let toml_str = r#"
            [engine]
            endpoint = "http://nas.local/uploads"
            method = "POST"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.endpoint, "http://nas.local/uploads");
        assert_eq!(config.engine.method, UploadMethod::Post);
        assert_eq!(config.engine.chunk_size, 20 * 1024);
        assert_eq!(config.engine.error_interval_ms, 3000);
        assert_eq!(config.store_dir, default_store_dir());
    }

    #[test]
    fn config_path_not_empty() {
        let path = config_path();
        assert!(path.to_string_lossy().contains("upqueue"));
    }

    #[test]
    fn load_missing_writes_default() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("upqueue.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.engine, EngineConfig::default());

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.store_dir, config.store_dir);
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("upqueue.toml");
        std::fs::write(&path, "engine = 3").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
