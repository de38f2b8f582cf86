use crate::error::{MemoptError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = ".memopt.toml";

/// Tunables for both the analyzer and the optimizer.
///
/// Every field has a default, so an empty or partial `.memopt.toml` is valid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Entries and dated files older than this many days are stale.
    pub stale_days: u32,
    /// Minimum similarity ratio (0.0 to 1.0) for two entries to be duplicates.
    pub similarity_threshold: f64,
    /// Canonical document; wins every dedup tie.
    pub primary_document: String,
    /// Other well-known files at the workspace root.
    pub root_documents: Vec<String>,
    /// Organized notes directory under the workspace root.
    pub memory_dir: String,
    /// File name pattern inside `memory_dir`.
    pub memory_glob: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stale_days: 30,
            similarity_threshold: 0.80,
            primary_document: "MEMORY.md".to_string(),
            root_documents: vec!["TOOLS.md".to_string(), "AGENTS.md".to_string()],
            memory_dir: "memory".to_string(),
            memory_glob: "*.md".to_string(),
        }
    }
}

impl Config {
    /// Load config from an explicit path, or from `<workspace>/.memopt.toml`
    /// when present. Falls back to defaults when no file exists.
    ///
    /// A relative explicit path is taken from the current directory.
    pub fn load(workspace: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path: PathBuf = match explicit {
            Some(p) => p.to_path_buf(),
            None => workspace.join(DEFAULT_CONFIG_FILE),
        };

        if !path.is_file() {
            if explicit.is_some() {
                return Err(MemoptError::Read {
                    path,
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
                });
            }
            tracing::debug!("no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|source| MemoptError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| MemoptError::Config { path: path.clone(), source })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(MemoptError::InvalidConfig(format!(
                "similarity_threshold must be within 0.0..=1.0, got {}",
                self.similarity_threshold
            )));
        }
        if self.stale_days == 0 {
            return Err(MemoptError::InvalidConfig("stale_days must be at least 1".to_string()));
        }
        if self.primary_document.trim().is_empty() {
            return Err(MemoptError::InvalidConfig("primary_document must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load(tmp.path(), None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.stale_days, 30);
        assert_eq!(config.primary_document, "MEMORY.md");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DEFAULT_CONFIG_FILE), "stale_days = 7\n").unwrap();

        let config = Config::load(tmp.path(), None).unwrap();
        assert_eq!(config.stale_days, 7);
        assert_eq!(config.similarity_threshold, 0.80);
        assert_eq!(config.memory_dir, "memory");
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DEFAULT_CONFIG_FILE), "similarity_threshold = 1.5\n").unwrap();

        let err = Config::load(tmp.path(), None).unwrap_err();
        assert!(matches!(err, MemoptError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DEFAULT_CONFIG_FILE), "stale_days = \"soon\"\n").unwrap();

        let err = Config::load(tmp.path(), None).unwrap_err();
        assert!(matches!(err, MemoptError::Config { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = Config::load(tmp.path(), Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, MemoptError::Read { .. }));
    }

    #[test]
    fn test_relative_explicit_path_not_joined_to_workspace() {
        let tmp = TempDir::new().unwrap();
        let name = "memopt-workspace-only.toml";
        fs::write(tmp.path().join(name), "stale_days = 7\n").unwrap();

        let err = Config::load(tmp.path(), Some(Path::new(name))).unwrap_err();
        assert!(matches!(err, MemoptError::Read { .. }));

        let config = Config::load(tmp.path(), Some(&tmp.path().join(name))).unwrap();
        assert_eq!(config.stale_days, 7);
    }
}
