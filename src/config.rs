use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, RevflowError};

/// CLI-level defaults, loaded from `config.toml` when present.
///
/// Stage construction takes explicit options; this only feeds the command
/// line surface so runs are reproducible without long flag lists.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scoring: ScoringConfig,
    pub churn: ChurnConfig,
    pub revenue: RevenueConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Amount at which the amount factor saturates.
    pub amount_cap: f64,
    /// Amount above which priority is raised to at least HIGH.
    pub priority_amount_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChurnConfig {
    pub risk_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RevenueConfig {
    pub high_value_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            churn: ChurnConfig::default(),
            revenue: RevenueConfig::default(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            amount_cap: 100_000.0,
            priority_amount_threshold: 100_000.0,
        }
    }
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            risk_threshold: 0.6,
        }
    }
}

impl Default for RevenueConfig {
    fn default() -> Self {
        Self {
            high_value_threshold: 100_000.0,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RevflowError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[churn]\nrisk_threshold = 0.5").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.churn.risk_threshold, 0.5);
        assert_eq!(config.scoring.amount_cap, 100_000.0);
        assert_eq!(config.revenue.high_value_threshold, 100_000.0);
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        assert!(matches!(
            Config::load_from("/nonexistent/config.toml"),
            Err(RevflowError::Config(_))
        ));
    }
}
