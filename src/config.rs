use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_MEASURING_DURATION_MS: u64 = 3_000;
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 500;
pub const DEFAULT_TOUCH_EXPANSION: f32 = 1.5;

/// Tunable parameters of the measurement engine. Every field has a default, so a
/// YAML file only needs to mention what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScouterConfig {
    /// How long an identity is sampled before its averaged power is frozen.
    pub measuring_duration_ms: u64,
    /// Longest detection gap an identity survives. A gap of exactly this length evicts.
    pub grace_period_ms: u64,
    /// Scale applied around a finalized face's region when resolving a tap.
    pub touch_expansion: f32,
}

impl Default for ScouterConfig {
    fn default() -> Self {
        Self {
            measuring_duration_ms: DEFAULT_MEASURING_DURATION_MS,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            touch_expansion: DEFAULT_TOUCH_EXPANSION,
        }
    }
}

impl ScouterConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: ScouterConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// A zero grace period is allowed and means "evict on the first missed frame".
    pub fn validate(&self) -> Result<()> {
        if self.measuring_duration_ms == 0 {
            return Err(Error::InvalidConfig(
                "measuring_duration_ms must be greater than zero".to_string(),
            ));
        }
        if !self.touch_expansion.is_finite() || self.touch_expansion < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "touch_expansion must be a finite value >= 1.0, got {}",
                self.touch_expansion
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScouterConfig::default();
        assert_eq!(config.measuring_duration_ms, 3_000);
        assert_eq!(config.grace_period_ms, 500);
        assert_eq!(config.touch_expansion, 1.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ScouterConfig::from_yaml_str("grace_period_ms: 750\n").unwrap();
        assert_eq!(config.grace_period_ms, 750);
        assert_eq!(config.measuring_duration_ms, DEFAULT_MEASURING_DURATION_MS);
        assert_eq!(config.touch_expansion, DEFAULT_TOUCH_EXPANSION);
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        let err = ScouterConfig::from_yaml_str("measuring_duration_ms: 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_grace_is_allowed() {
        let config = ScouterConfig::from_yaml_str("grace_period_ms: 0\n").unwrap();
        assert_eq!(config.grace_period_ms, 0);
    }

    #[test]
    fn test_shrinking_touch_expansion_is_rejected() {
        let config = ScouterConfig {
            touch_expansion: 0.5,
            ..ScouterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let err = ScouterConfig::from_yaml_str("grace_period_ms: [not, a, number]\n").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = ScouterConfig::load("/definitely/not/here/scouter.yaml").unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }
}
