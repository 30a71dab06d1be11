//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default reciprocal-rank-fusion constant (K).
pub const DEFAULT_RANK_CONSTANT: f32 = 60.0;

/// Default number of k-NN candidates.
pub const DEFAULT_KNN_CANDIDATES: usize = 10;

/// Default k-NN similarity threshold.
pub const DEFAULT_KNN_SIMILARITY: f32 = 0.9;

/// Default rows per page emitted by sources.
pub const DEFAULT_PAGE_SIZE: usize = 1024;

/// Default name of the branch discriminator column.
pub const DEFAULT_DISCRIMINATOR: &str = "_fork";

/// Default bound on phased execution rounds.
pub const DEFAULT_MAX_PHASE_ROUNDS: usize = 16;

/// k-NN retrieval parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnConfig {
    /// Number of nearest-neighbour candidates to consider.
    pub num_candidates: usize,
    /// Minimum cosine similarity for a candidate to match.
    pub similarity: f32,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            num_candidates: DEFAULT_KNN_CANDIDATES,
            similarity: DEFAULT_KNN_SIMILARITY,
        }
    }
}

/// Query engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// RRF constant K.
    pub rank_constant: f32,

    /// k-NN retrieval parameters.
    pub knn: KnnConfig,

    /// Rows per page produced by relation sources.
    pub page_size: usize,

    /// Name of the synthesized branch discriminator column.
    pub discriminator: String,

    /// Maximum number of phased rounds before the query is failed.
    pub max_phase_rounds: usize,

    /// Run independent branch and phase pipelines on scoped threads.
    pub parallel_branches: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rank_constant: DEFAULT_RANK_CONSTANT,
            knn: KnnConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
            max_phase_rounds: DEFAULT_MAX_PHASE_ROUNDS,
            parallel_branches: true,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON document. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Set the RRF constant.
    pub fn with_rank_constant(mut self, rank_constant: f32) -> Self {
        self.rank_constant = rank_constant;
        self
    }

    /// Set the k-NN parameters.
    pub fn with_knn(mut self, num_candidates: usize, similarity: f32) -> Self {
        self.knn = KnnConfig {
            num_candidates,
            similarity,
        };
        self
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the discriminator column name.
    pub fn with_discriminator(mut self, name: impl Into<String>) -> Self {
        self.discriminator = name.into();
        self
    }

    /// Set the bound on phased rounds.
    pub fn with_max_phase_rounds(mut self, rounds: usize) -> Self {
        self.max_phase_rounds = rounds;
        self
    }

    /// Run branch pipelines sequentially on the calling thread.
    pub fn sequential(mut self) -> Self {
        self.parallel_branches = false;
        self
    }

    /// Check values a JSON document may have set out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.rank_constant.is_nan() || self.rank_constant < 0.0 {
            return Err(Error::Config(format!(
                "rank_constant must be non-negative, got {}",
                self.rank_constant
            )));
        }
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be positive".to_string()));
        }
        if self.discriminator.is_empty() {
            return Err(Error::Config("discriminator name must not be empty".to_string()));
        }
        if self.knn.num_candidates == 0 {
            return Err(Error::Config("knn.num_candidates must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.rank_constant, 60.0);
        assert_eq!(config.knn.num_candidates, 10);
        assert_eq!(config.knn.similarity, 0.9);
        assert_eq!(config.discriminator, "_fork");
        assert!(config.parallel_branches);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::default()
            .with_rank_constant(10.0)
            .with_knn(50, 0.5)
            .with_page_size(0)
            .with_discriminator("_branch")
            .sequential();

        assert_eq!(config.rank_constant, 10.0);
        assert_eq!(config.knn, KnnConfig { num_candidates: 50, similarity: 0.5 });
        assert_eq!(config.page_size, 1);
        assert_eq!(config.discriminator, "_branch");
        assert!(!config.parallel_branches);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{"rank_constant": 20, "knn": {"similarity": 0.7}}"#)
            .unwrap();
        assert_eq!(config.rank_constant, 20.0);
        assert_eq!(config.knn.num_candidates, 10);
        assert_eq!(config.knn.similarity, 0.7);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_invalid_json_values_rejected() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"page_size": 0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"rank_constant": -1}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(EngineConfig::from_json_str("not json"), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"discriminator": "_branch", "max_phase_rounds": 3}}"#).unwrap();
        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.discriminator, "_branch");
        assert_eq!(config.max_phase_rounds, 3);
    }
}
