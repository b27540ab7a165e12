//! netqueue configuration types and loading

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::queue::QueueConfig;
use crate::transport::{CacheConfig, Headers, Method};

/// Main netqueue configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Queue limits
    pub queue: QueueConfig,

    /// Pipeline defaults applied to every call
    pub defaults: DefaultsConfig,

    /// Response cache
    pub cache: CacheConfig,
}

impl NetConfig {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if let Some(base_url) = &self.defaults.base_url
            && !(base_url.starts_with("http://") || base_url.starts_with("https://"))
        {
            return Err(eyre::eyre!(
                "defaults.base-url must start with http:// or https://, got {}",
                base_url
            ));
        }
        if self.cache.enabled && self.cache.expire_ms == 0 {
            return Err(eyre::eyre!("cache.expire-ms must be positive when the cache is enabled"));
        }
        Ok(())
    }

    /// Load configuration
    ///
    /// An explicit path must load. Otherwise the first readable file among
    /// [`NetConfig::search_paths`] wins, and unreadable candidates are
    /// skipped with a warning. With none found the defaults apply.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).wrap_err_with(|| format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths().into_iter().filter(|p| p.exists()) {
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => warn!(path = %candidate.display(), error = %e, "NetConfig::load: skipping candidate"),
            }
        }

        debug!("NetConfig::load: no config file found, using defaults");
        Ok(Self::default())
    }

    /// Candidate files in lookup order: `.netqueue.yml` in the working
    /// directory, then `<config_dir>/netqueue/netqueue.yml`
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".netqueue.yml")];
        paths.extend(dirs::config_dir().map(|dir| dir.join("netqueue").join("netqueue.yml")));
        paths
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).wrap_err("unreadable")?;
        let config: Self = serde_yaml::from_str(&content).wrap_err("invalid YAML")?;
        config.validate()?;

        info!(path = %path.display(), "NetConfig::load: loaded");
        Ok(config)
    }
}

/// Pipeline defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Prefix for relative URLs
    #[serde(rename = "base-url")]
    pub base_url: Option<String>,

    pub header: Headers,

    pub method: Method,

    /// Total attempts per call
    pub retry: u32,

    /// Per-attempt timeout in milliseconds (0 disables)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Queue calls ahead of the backlog
    pub jump: bool,

    /// Record send/response times
    pub timestamp: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            header: Headers::new(),
            method: Method::Get,
            retry: 1,
            timeout_ms: 0,
            jump: false,
            timestamp: false,
        }
    }
}

impl DefaultsConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = NetConfig::default();

        assert_eq!(config.queue.max_concurrent, 10);
        assert_eq!(config.defaults.retry, 1);
        assert_eq!(config.defaults.timeout(), None);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.expire_ms, 600_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
queue:
  max-concurrent: 4

defaults:
  base-url: https://api.example.com
  header:
    Accept: application/json
  method: POST
  retry: 3
  timeout-ms: 2500
  jump: true

cache:
  enabled: true
  expire-ms: 1000
  exclude-methods: [POST]
"#;

        let config: NetConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.queue.max_concurrent, 4);
        assert_eq!(config.defaults.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.defaults.header.get("Accept").map(String::as_str), Some("application/json"));
        assert_eq!(config.defaults.method, Method::Post);
        assert_eq!(config.defaults.retry, 3);
        assert_eq!(config.defaults.timeout(), Some(Duration::from_millis(2500)));
        assert!(config.defaults.jump);
        assert!(!config.defaults.timestamp);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.exclude_methods, vec![Method::Post]);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
defaults:
  retry: 2
"#;

        let config: NetConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.defaults.retry, 2);
        assert_eq!(config.defaults.method, Method::Get);
        assert_eq!(config.queue.max_concurrent, 10);
        assert_eq!(config.cache.exclude_methods.len(), 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = NetConfig::default();
        config.defaults.base_url = Some("ftp://files.example.com".to_string());
        assert!(config.validate().is_err());

        let mut config = NetConfig::default();
        config.cache.enabled = true;
        config.cache.expire_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "queue:\n  max-concurrent: 2").unwrap();

        let config = NetConfig::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.queue.max_concurrent, 2);
    }

    #[test]
    fn test_search_paths_order() {
        let paths = NetConfig::search_paths();
        assert_eq!(paths[0], PathBuf::from(".netqueue.yml"));
        if let Some(last) = paths.get(1) {
            assert!(last.ends_with("netqueue/netqueue.yml"));
        }
    }

    #[test]
    fn test_load_explicit_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yml");
        let err = NetConfig::load(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));

        let invalid = dir.path().join("invalid.yml");
        fs::write(&invalid, "defaults:\n  base-url: not-a-url\n").unwrap();
        assert!(NetConfig::load(Some(&invalid)).is_err());
    }
}
