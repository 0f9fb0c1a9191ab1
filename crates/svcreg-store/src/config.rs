use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Option key naming the store file in plugin-style option maps.
pub const PATH_OPTION: &str = "path";

/// Store file used when no path is configured.
pub const DEFAULT_PATH: &str = "./svcreg.redb";

/// Configuration for opening a [`BucketStore`](crate::BucketStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the store file. Created on first open.
    pub path: PathBuf,
    /// How long to wait for another handle to release the file lock.
    #[serde(rename = "lock_timeout_ms", with = "duration_ms")]
    pub lock_timeout: Duration,
    /// Page cache size in bytes; `None` keeps the engine default.
    pub cache_size: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            lock_timeout: Duration::from_secs(5),
            cache_size: None,
        }
    }
}

impl StoreConfig {
    /// Default configuration for a store file at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Parse from a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Build from a flat option map, as handed to storage plugins.
    ///
    /// Only `path` is recognised; other options are ignored.
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        match options.get(PATH_OPTION) {
            Some(path) => Self::at(path),
            None => Self::default(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.path, PathBuf::from("./svcreg.redb"));
        assert_eq!(c.lock_timeout, Duration::from_secs(5));
        assert!(c.cache_size.is_none());
    }

    #[test]
    fn options_override_path() {
        let mut options = HashMap::new();
        options.insert("path".to_string(), "/var/lib/svcreg/store.redb".to_string());
        options.insert("unrelated".to_string(), "x".to_string());
        let c = StoreConfig::from_options(&options);
        assert_eq!(c.path, PathBuf::from("/var/lib/svcreg/store.redb"));
        assert_eq!(c.lock_timeout, Duration::from_secs(5));

        let empty = StoreConfig::from_options(&HashMap::new());
        assert_eq!(empty, StoreConfig::default());
    }

    #[test]
    fn toml_with_partial_keys() {
        let text = "path = \"data/x.redb\"\nlock_timeout_ms = 250\n";
        let c = StoreConfig::from_toml_str(text).unwrap();
        assert_eq!(c.path, PathBuf::from("data/x.redb"));
        assert_eq!(c.lock_timeout, Duration::from_millis(250));
        assert!(c.cache_size.is_none());
    }

    #[test]
    fn toml_roundtrip() {
        let c = StoreConfig {
            path: "a.redb".into(),
            lock_timeout: Duration::from_millis(1500),
            cache_size: Some(1 << 20),
        };
        let text = toml::to_string(&c).unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = StoreConfig::from_toml_str("lock_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("store.toml");
        std::fs::write(&file, "cache_size = 4096\n").unwrap();
        let c = StoreConfig::load(&file).unwrap();
        assert_eq!(c.cache_size, Some(4096));
        assert_eq!(c.path, PathBuf::from(DEFAULT_PATH));
    }
}
