//! Configuration for activity-archive

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ArchiveError;

/// Default cache directory
pub fn default_cache_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("activity-archive")
        .join("cache")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory holding one subdirectory per account
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Partition file extension (without the dot)
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// Records younger than this many days are never archived
    #[serde(default = "default_freshness_days")]
    pub freshness_days: i64,

    /// Remote page size
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Upper bound on pages fetched per window
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Base URL of the remote activity API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_file_extension() -> String {
    "bin".to_string()
}

fn default_freshness_days() -> i64 {
    7
}

fn default_page_size() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    1000
}

fn default_api_base_url() -> String {
    "https://www.strava.com/api/v3".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            file_extension: default_file_extension(),
            freshness_days: default_freshness_days(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            api_base_url: default_api_base_url(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Reject values the archive cannot work with.
    pub fn validate(&self) -> Result<(), ArchiveError> {
        let extension = self.file_extension.trim_start_matches('.');
        if extension.is_empty() || extension.contains('/') || extension.contains('\\') {
            return Err(ArchiveError::Config(format!(
                "invalid file_extension: {:?}",
                self.file_extension
            )));
        }
        if extension == "tmp" {
            return Err(ArchiveError::Config(
                "file_extension must not be \"tmp\"".to_string(),
            ));
        }
        if self.freshness_days < 0 {
            return Err(ArchiveError::Config(format!(
                "freshness_days must be >= 0, got {}",
                self.freshness_days
            )));
        }
        if self.page_size == 0 {
            return Err(ArchiveError::Config("page_size must be > 0".to_string()));
        }
        if self.max_pages == 0 {
            return Err(ArchiveError::Config("max_pages must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.file_extension, "bin");
        assert_eq!(config.freshness_days, 7);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.max_pages, 1000);
        assert!(config.cache_dir.ends_with("activity-archive/cache"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
cache_dir = "/var/lib/activity-archive"
page_size = 50
"#,
        )
        .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/var/lib/activity-archive"));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.freshness_days, 7);
        assert_eq!(config.api_base_url, "https://www.strava.com/api/v3");
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = Config {
            cache_dir: temp_dir.path().join("cache"),
            freshness_days: 3,
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.cache_dir, config.cache_dir);
        assert_eq!(loaded.freshness_days, 3);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            Config { file_extension: String::new(), ..Config::default() },
            Config { file_extension: "a/b".to_string(), ..Config::default() },
            Config { file_extension: "tmp".to_string(), ..Config::default() },
            Config { freshness_days: -1, ..Config::default() },
            Config { page_size: 0, ..Config::default() },
            Config { max_pages: 0, ..Config::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(ArchiveError::Config(_))));
        }
    }
}
