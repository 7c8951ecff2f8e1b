//! Search configuration, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Tuning knobs for a search.
///
/// ```ron
/// (
///     seed: Some(42),
///     slice_ms: 30,
///     max_depth: Some(12),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// RNG seed for candidate shuffling. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Wall-clock budget per scheduling quantum, in milliseconds.
    pub slice_ms: u64,
    /// Children deeper than this are treated as failed branches.
    pub max_depth: Option<usize>,
    /// Score added per `*high` marker in a candidate's storylet.
    pub high_priority_weight: i32,
    /// Score removed per `*low` marker in a candidate's storylet.
    pub low_priority_weight: i32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            seed: None,
            slice_ms: 30,
            max_depth: None,
            high_priority_weight: 10,
            low_priority_weight: 10,
        }
    }
}

impl SearchConfig {
    pub fn load_from_ron(path: &Path) -> Result<SearchConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<SearchConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }

    pub fn slice(&self) -> Duration {
        Duration::from_millis(self.slice_ms)
    }

    /// Ordering score of a storylet with the given marker counts.
    pub fn priority_score(&self, high: usize, low: usize) -> i64 {
        i64::from(self.high_priority_weight) * high as i64
            - i64::from(self.low_priority_weight) * low as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_thirty_ms_slices() {
        let config = SearchConfig::default();
        assert_eq!(config.slice(), Duration::from_millis(30));
        assert_eq!(config.seed, None);
        assert_eq!(config.priority_score(2, 1), 10);
    }

    #[test]
    fn partial_ron_fills_defaults() {
        let config = SearchConfig::parse_ron("(seed: Some(7), max_depth: Some(4))").unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.max_depth, Some(4));
        assert_eq!(config.slice_ms, 30);
        assert_eq!(config.high_priority_weight, 10);
    }

    #[test]
    fn bad_ron_is_an_error() {
        assert!(SearchConfig::parse_ron("(seed: \"x\")").is_err());
    }

    #[test]
    fn sample_config_loads() {
        let config = SearchConfig::load_from_ron(Path::new("corpora/search.ron")).unwrap();
        assert_eq!(config.slice_ms, 30);
        assert!(config.max_depth.is_some());
    }
}
