use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Engine configuration: defaults, then an optional TOML file, then
/// `LIKENESS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the snapshot and one subdirectory per identity.
    pub data_dir: PathBuf,
    /// Directory for crops written during recognition.
    pub scratch_dir: PathBuf,
    /// Width every face crop is resized to before vectorization.
    pub face_width: u32,
    /// Height every face crop is resized to before vectorization.
    pub face_height: u32,
    /// Timeout in seconds for a recognize request.
    pub recognize_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Data"),
            scratch_dir: PathBuf::from("tmp"),
            face_width: 100,
            face_height: 100,
            recognize_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load from `path` (if given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_env())
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `LIKENESS_*` environment variables.
    pub fn with_env(self) -> Self {
        Self {
            data_dir: env_path("LIKENESS_DATA_DIR", self.data_dir),
            scratch_dir: env_path("LIKENESS_SCRATCH_DIR", self.scratch_dir),
            face_width: env_u32("LIKENESS_FACE_WIDTH", self.face_width),
            face_height: env_u32("LIKENESS_FACE_HEIGHT", self.face_height),
            recognize_timeout_secs: env_u64(
                "LIKENESS_RECOGNIZE_TIMEOUT_SECS",
                self.recognize_timeout_secs,
            ),
        }
    }

    pub fn face_size(&self) -> (u32, u32) {
        (self.face_width, self.face_height)
    }

    pub fn recognize_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.recognize_timeout_secs)
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.data_dir, PathBuf::from("Data"));
        assert_eq!(config.scratch_dir, PathBuf::from("tmp"));
        assert_eq!(config.face_size(), (100, 100));
        assert_eq!(config.recognize_timeout().as_secs(), 30);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("likeness.toml");
        std::fs::write(&path, "data_dir = \"/var/lib/likeness\"\nface_width = 64\n").unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/likeness"));
        assert_eq!(config.face_width, 64);
        assert_eq!(config.face_height, 100);
        assert_eq!(config.scratch_dir, PathBuf::from("tmp"));
    }

    #[test]
    fn test_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("likeness.toml");
        std::fs::write(&path, "face_width = \"wide\"").unwrap();
        assert!(matches!(
            Config::from_toml_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_toml_file(Path::new("/nonexistent/likeness.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_env_parse_fallback() {
        // An unset variable falls back to the default.
        assert_eq!(env_u32("LIKENESS_TEST_UNSET_VARIABLE", 7), 7);
        assert_eq!(
            env_path("LIKENESS_TEST_UNSET_VARIABLE", PathBuf::from("x")),
            PathBuf::from("x")
        );
    }
}
