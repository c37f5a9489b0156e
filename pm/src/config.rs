//! promptmill configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main promptmill configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generation defaults
    pub generation: GenerationConfig,

    /// Log level used when `--log-level` is not given
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.generation.separator.trim().is_empty() {
            return Err(eyre::eyre!("generation.separator must not be blank"));
        }
        if self.generation.random_attempt_factor == 0 {
            return Err(eyre::eyre!("generation.random-attempt-factor must be at least 1"));
        }
        Ok(())
    }

    /// Files consulted when no `--config` is given, most specific first
    pub fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".promptmill.yml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("promptmill").join("promptmill.yml"));
        }
        paths
    }

    /// Load the explicit file, else the first existing candidate, else defaults
    ///
    /// A candidate that exists but does not parse is an error rather than
    /// being skipped.
    pub fn load(explicit: Option<&PathBuf>) -> Result<Self> {
        let found = explicit
            .cloned()
            .or_else(|| Self::candidates().into_iter().find(|p| p.is_file()));
        match found {
            Some(path) => Self::from_file(&path),
            None => {
                tracing::debug!("Config::load: no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).wrap_err_with(|| format!("Failed to read {}", path.display()))?;
        let config = serde_yaml::from_str(&content).wrap_err_with(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}

/// Generation defaults shared by every compiled prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// List token the normalizer collapses and LoRA tags are joined with
    pub separator: String,

    /// Random mode gives up after `requested * factor` draws
    #[serde(rename = "random-attempt-factor")]
    pub random_attempt_factor: u64,

    /// Seed for the engine's random source; unset means entropy
    #[serde(rename = "rng-seed")]
    pub rng_seed: Option<u64>,

    /// Output count for random mode when a prompt sets no max-images
    #[serde(rename = "default-max-images")]
    pub default_max_images: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            separator: ",".to_string(),
            random_attempt_factor: 100,
            rng_seed: None,
            default_max_images: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.generation.separator, ",");
        assert_eq!(config.generation.random_attempt_factor, 100);
        assert_eq!(config.generation.default_max_images, 10);
        assert!(config.generation.rng_seed.is_none());
        assert!(config.log_level.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("promptmill.yml");
        fs::write(
            &path,
            "log-level: debug\ngeneration:\n  rng-seed: 7\n  random-attempt-factor: 20\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.generation.rng_seed, Some(7));
        assert_eq!(config.generation.random_attempt_factor, 20);
        // Unset keys keep their defaults
        assert_eq!(config.generation.separator, ",");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("broken.yml");
        fs::write(&path, "generation: [not, a, mapping]\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.yml"));
    }

    #[test]
    fn test_project_file_is_first_candidate() {
        let candidates = Config::candidates();
        assert_eq!(candidates[0], PathBuf::from(".promptmill.yml"));
        assert!(candidates.iter().skip(1).all(|p| p.ends_with("promptmill/promptmill.yml")));
    }

    #[test]
    fn test_validate_rejects_zero_factor() {
        let mut config = Config::default();
        config.generation.random_attempt_factor = 0;
        assert!(config.validate().is_err());
    }
}
