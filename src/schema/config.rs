//! Configuration types for evolutionary input search.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level fuzzer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FuzzerConfig {
    /// Generation loop parameters.
    #[serde(default)]
    pub genetic: GeneticAlgorithmConfig,
    /// Random value generation limits.
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// How test cases are dispatched to the harness.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Scoring strategy.
    #[serde(default)]
    pub fitness: FitnessConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl FuzzerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.genetic.validate()?;
        self.generator.validate()?;
        self.fitness.validate()
    }
}

/// Genetic algorithm parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticAlgorithmConfig {
    /// Members per generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Hard limit on generations.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Probability that an offspring comes from crossover rather than mutation.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// Base mutation rate, scaled by adaptive mutation.
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Fraction of the population carried over unchanged.
    #[serde(default = "default_elitism_rate")]
    pub elitism_rate: f64,
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    /// Diversity below which the worst members are replaced.
    #[serde(default = "default_diversity_threshold")]
    pub diversity_threshold: f64,
    /// Generations without improvement before stopping.
    #[serde(default = "default_stagnation_limit")]
    pub stagnation_limit: usize,
    #[serde(default = "default_adaptive_mutation")]
    pub adaptive_mutation: bool,
    #[serde(default = "default_adaptive_mutation_factor")]
    pub adaptive_mutation_factor: f64,
}

impl Default for GeneticAlgorithmConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            max_generations: default_max_generations(),
            crossover_rate: default_crossover_rate(),
            mutation_rate: default_mutation_rate(),
            elitism_rate: default_elitism_rate(),
            tournament_size: default_tournament_size(),
            diversity_threshold: default_diversity_threshold(),
            stagnation_limit: default_stagnation_limit(),
            adaptive_mutation: default_adaptive_mutation(),
            adaptive_mutation_factor: default_adaptive_mutation_factor(),
        }
    }
}

fn default_population_size() -> usize {
    100
}
fn default_max_generations() -> usize {
    1000
}
fn default_crossover_rate() -> f64 {
    0.8
}
fn default_mutation_rate() -> f64 {
    0.1
}
fn default_elitism_rate() -> f64 {
    0.1
}
fn default_tournament_size() -> usize {
    3
}
fn default_diversity_threshold() -> f64 {
    0.3
}
fn default_stagnation_limit() -> usize {
    50
}
fn default_adaptive_mutation() -> bool {
    true
}
fn default_adaptive_mutation_factor() -> f64 {
    1.5
}

impl GeneticAlgorithmConfig {
    /// Number of members retained unchanged between generations.
    pub fn elite_count(&self) -> usize {
        (self.population_size as f64 * self.elitism_rate) as usize
    }

    /// Mutation rate after `stagnation` generations without improvement.
    ///
    /// Grows geometrically by the adaptive factor and saturates at 1.
    pub fn effective_mutation_rate(&self, stagnation: usize) -> f64 {
        if !self.adaptive_mutation || stagnation == 0 {
            return self.mutation_rate;
        }
        let exponent = stagnation.min(i32::MAX as usize) as i32;
        (self.mutation_rate * self.adaptive_mutation_factor.powi(exponent)).min(1.0)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::InvalidPopulationSize);
        }
        if self.tournament_size == 0 {
            return Err(ConfigError::InvalidTournamentSize);
        }
        let rates = [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
            ("elitism_rate", self.elitism_rate),
        ];
        for (name, value) in rates {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidRate { name, value });
            }
        }
        if self.diversity_threshold < 0.0 || !self.diversity_threshold.is_finite() {
            return Err(ConfigError::InvalidRate {
                name: "diversity_threshold",
                value: self.diversity_threshold,
            });
        }
        if self.adaptive_mutation_factor < 1.0 || !self.adaptive_mutation_factor.is_finite() {
            return Err(ConfigError::InvalidRate {
                name: "adaptive_mutation_factor",
                value: self.adaptive_mutation_factor,
            });
        }
        Ok(())
    }
}

/// Limits for random value generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_max_string_length")]
    pub max_string_length: usize,
    #[serde(default = "default_max_collection_size")]
    pub max_collection_size: usize,
    #[serde(default = "default_max_array_length")]
    pub max_array_length: usize,
    /// Containers nested deeper than this are generated empty.
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
    /// Cardinality of the "large" edge case (characters or elements).
    #[serde(default = "default_large_input_size")]
    pub large_input_size: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_string_length: default_max_string_length(),
            max_collection_size: default_max_collection_size(),
            max_array_length: default_max_array_length(),
            max_nesting_depth: default_max_nesting_depth(),
            large_input_size: default_large_input_size(),
        }
    }
}

fn default_max_string_length() -> usize {
    1000
}
fn default_max_collection_size() -> usize {
    100
}
fn default_max_array_length() -> usize {
    100
}
fn default_max_nesting_depth() -> usize {
    5
}
fn default_large_input_size() -> usize {
    10_000
}

impl GeneratorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_string_length == 0 {
            return Err(ConfigError::InvalidGeneratorLimit(
                "max_string_length must be at least 1".to_string(),
            ));
        }
        if self.large_input_size == 0 {
            return Err(ConfigError::InvalidGeneratorLimit(
                "large_input_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Harness dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EvaluationConfig {
    /// Worker threads for evaluation: 0 uses the global rayon pool, 1 runs
    /// sequentially, anything else builds a dedicated pool.
    #[serde(default)]
    pub parallel_workers: usize,
}

/// Scoring strategy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FitnessConfig {
    /// Rewards resource usage far above a baseline.
    Amplification {
        #[serde(default = "default_time_weight")]
        time_weight: f64,
        #[serde(default = "default_memory_weight")]
        memory_weight: f64,
        #[serde(default = "default_baseline_time_nanos")]
        baseline_time_nanos: u64,
        #[serde(default = "default_baseline_memory_bytes")]
        baseline_memory_bytes: u64,
        #[serde(default = "default_amplification_threshold")]
        amplification_threshold: f64,
    },
    /// Rewards execution time growing faster than `n log n` in input size.
    WorstCaseComplexity {
        #[serde(default = "default_exponential_bonus")]
        exponential_bonus: f64,
        #[serde(default = "default_polynomial_bonus")]
        polynomial_bonus: f64,
        #[serde(default = "default_linear_penalty")]
        linear_penalty: f64,
    },
    /// Rewards unusual inputs and unusual execution profiles.
    Diversity {
        #[serde(default = "default_novelty_weight")]
        novelty_weight: f64,
        #[serde(default = "default_uniqueness_weight")]
        uniqueness_weight: f64,
    },
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self::Amplification {
            time_weight: default_time_weight(),
            memory_weight: default_memory_weight(),
            baseline_time_nanos: default_baseline_time_nanos(),
            baseline_memory_bytes: default_baseline_memory_bytes(),
            amplification_threshold: default_amplification_threshold(),
        }
    }
}

fn default_time_weight() -> f64 {
    0.7
}
fn default_memory_weight() -> f64 {
    0.3
}
fn default_baseline_time_nanos() -> u64 {
    1_000_000
}
fn default_baseline_memory_bytes() -> u64 {
    1024 * 1024
}
fn default_amplification_threshold() -> f64 {
    2.0
}
fn default_exponential_bonus() -> f64 {
    10.0
}
fn default_polynomial_bonus() -> f64 {
    2.0
}
fn default_linear_penalty() -> f64 {
    0.1
}
fn default_novelty_weight() -> f64 {
    1.0
}
fn default_uniqueness_weight() -> f64 {
    1.0
}

impl FitnessConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let weights: Vec<(&'static str, f64)> = match self {
            Self::Amplification {
                time_weight,
                memory_weight,
                amplification_threshold,
                ..
            } => vec![
                ("time_weight", *time_weight),
                ("memory_weight", *memory_weight),
                ("amplification_threshold", *amplification_threshold),
            ],
            Self::WorstCaseComplexity {
                exponential_bonus,
                polynomial_bonus,
                linear_penalty,
            } => vec![
                ("exponential_bonus", *exponential_bonus),
                ("polynomial_bonus", *polynomial_bonus),
                ("linear_penalty", *linear_penalty),
            ],
            Self::Diversity {
                novelty_weight,
                uniqueness_weight,
            } => vec![
                ("novelty_weight", *novelty_weight),
                ("uniqueness_weight", *uniqueness_weight),
            ],
        };
        for (name, value) in weights {
            if value < 0.0 || !value.is_finite() {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        if let Self::Amplification {
            baseline_time_nanos,
            baseline_memory_bytes,
            ..
        } = self
            && (*baseline_time_nanos == 0 || *baseline_memory_bytes == 0)
        {
            return Err(ConfigError::InvalidBaseline);
        }
        Ok(())
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be non-zero")]
    InvalidPopulationSize,
    #[error("Tournament size must be non-zero")]
    InvalidTournamentSize,
    #[error("{name} out of range: {value}")]
    InvalidRate { name: &'static str, value: f64 },
    #[error("Fitness parameter {name} must be non-negative and finite: {value}")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("Amplification baselines must be non-zero")]
    InvalidBaseline,
    #[error("Invalid generator limit: {0}")]
    InvalidGeneratorLimit(String),
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_valid() {
        let config = FuzzerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.genetic.population_size, 100);
        assert_eq!(config.genetic.max_generations, 1000);
        assert_eq!(config.genetic.tournament_size, 3);
        assert_eq!(config.generator.max_nesting_depth, 5);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = FuzzerConfig::from_json_str(
            r#"{"genetic": {"population_size": 12}, "fitness": {"type": "Diversity"}}"#,
        )
        .unwrap();
        assert_eq!(config.genetic.population_size, 12);
        assert_eq!(config.genetic.crossover_rate, 0.8);
        assert!(matches!(
            config.fitness,
            FitnessConfig::Diversity {
                novelty_weight,
                uniqueness_weight
            } if novelty_weight == 1.0 && uniqueness_weight == 1.0
        ));
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let result = FuzzerConfig::from_json_str(r#"{"genetic": {"crossover_rate": 1.5}}"#);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidRate {
                name: "crossover_rate",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_population_rejected() {
        let mut config = FuzzerConfig::default();
        config.genetic.population_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPopulationSize)
        ));
    }

    #[test]
    fn test_zero_baseline_rejected() {
        let config = FuzzerConfig {
            fitness: FitnessConfig::Amplification {
                time_weight: 1.0,
                memory_weight: 1.0,
                baseline_time_nanos: 0,
                baseline_memory_bytes: 1,
                amplification_threshold: 2.0,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBaseline)));
    }

    #[test]
    fn test_elite_count() {
        let config = GeneticAlgorithmConfig {
            population_size: 25,
            elitism_rate: 0.1,
            ..Default::default()
        };
        assert_eq!(config.elite_count(), 2);
    }

    #[test]
    fn test_effective_mutation_rate() {
        let config = GeneticAlgorithmConfig {
            mutation_rate: 0.1,
            adaptive_mutation_factor: 2.0,
            ..Default::default()
        };
        assert_eq!(config.effective_mutation_rate(0), 0.1);
        assert!((config.effective_mutation_rate(2) - 0.4).abs() < 1e-12);
        assert_eq!(config.effective_mutation_rate(10), 1.0);

        let fixed = GeneticAlgorithmConfig {
            adaptive_mutation: false,
            ..config
        };
        assert_eq!(fixed.effective_mutation_rate(10), 0.1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"genetic": {{"stagnation_limit": 7}}, "random_seed": 42}}"#
        )
        .unwrap();

        let config = FuzzerConfig::load(file.path()).unwrap();
        assert_eq!(config.genetic.stagnation_limit, 7);
        assert_eq!(config.random_seed, Some(42));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FuzzerConfig::load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_serialization() {
        let config = FuzzerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: FuzzerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.genetic.population_size, config.genetic.population_size);
        assert!(json.contains(r#""type":"Amplification""#));
    }
}
