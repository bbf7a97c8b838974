//! Fitness strategies for scoring executed test cases.
//!
//! A strategy turns a test case and its measurements into one real score.
//! Strategies are pure and shared across evaluation workers.

use std::sync::Arc;

use crate::schema::{ExecutionMetrics, FitnessConfig, TestCase};

/// Scoring strategy.
pub trait FitnessFunction: Send + Sync {
    /// Score a test case. `metrics` is `None` when the harness failed.
    fn evaluate(&self, test_case: &TestCase, metrics: Option<&ExecutionMetrics>) -> f64;

    /// Whether a score is worth keeping as a finding.
    fn should_retain(&self, score: f64) -> bool;

    fn name(&self) -> &str;
}

impl FitnessConfig {
    /// Instantiate the configured strategy.
    pub fn build(&self) -> Arc<dyn FitnessFunction> {
        match *self {
            Self::Amplification {
                time_weight,
                memory_weight,
                baseline_time_nanos,
                baseline_memory_bytes,
                amplification_threshold,
            } => Arc::new(AmplificationFitness {
                time_weight,
                memory_weight,
                baseline_time_nanos,
                baseline_memory_bytes,
                amplification_threshold,
            }),
            Self::WorstCaseComplexity {
                exponential_bonus,
                polynomial_bonus,
                linear_penalty,
            } => Arc::new(WorstCaseComplexityFitness {
                exponential_bonus,
                polynomial_bonus,
                linear_penalty,
            }),
            Self::Diversity {
                novelty_weight,
                uniqueness_weight,
            } => Arc::new(DiversityFitness {
                novelty_weight,
                uniqueness_weight,
            }),
        }
    }
}

/// Score returned for runs that stay under the amplification threshold.
const UNINTERESTING: f64 = 0.1;

/// Rewards time and memory usage far above a baseline.
#[derive(Debug, Clone)]
pub struct AmplificationFitness {
    pub time_weight: f64,
    pub memory_weight: f64,
    pub baseline_time_nanos: u64,
    pub baseline_memory_bytes: u64,
    pub amplification_threshold: f64,
}

impl AmplificationFitness {
    /// Time and memory amplification factors for a run.
    pub fn amplification(&self, metrics: &ExecutionMetrics) -> (f64, f64) {
        let time = metrics.execution_time_nanos as f64 / self.baseline_time_nanos.max(1) as f64;
        let memory =
            metrics.peak_memory_bytes as f64 / self.baseline_memory_bytes.max(1) as f64;
        (time, memory)
    }
}

/// Natural log of an amplification factor. An unmeasured (zero) factor
/// contributes nothing.
fn log_factor(factor: f64) -> f64 {
    if factor > 0.0 { factor.ln() } else { 0.0 }
}

impl FitnessFunction for AmplificationFitness {
    fn evaluate(&self, _test_case: &TestCase, metrics: Option<&ExecutionMetrics>) -> f64 {
        let Some(metrics) = metrics.filter(|m| m.successful) else {
            return 0.0;
        };

        let (time_amp, memory_amp) = self.amplification(metrics);
        let threshold = self.amplification_threshold;

        if time_amp < threshold && memory_amp < threshold {
            return UNINTERESTING;
        }

        let mut score =
            log_factor(time_amp) * self.time_weight + log_factor(memory_amp) * self.memory_weight;

        if time_amp > threshold && memory_amp > threshold {
            score += time_amp.min(memory_amp) * 0.5;
        }

        score
    }

    fn should_retain(&self, score: f64) -> bool {
        score > 0.5
    }

    fn name(&self) -> &str {
        "ComplexityVulnerability"
    }
}

/// Rewards execution time that outgrows `n log n` in the input size.
#[derive(Debug, Clone)]
pub struct WorstCaseComplexityFitness {
    pub exponential_bonus: f64,
    pub polynomial_bonus: f64,
    pub linear_penalty: f64,
}

impl WorstCaseComplexityFitness {
    /// Ratio of execution time to `n ln n`.
    pub fn complexity_ratio(time_nanos: f64, size: f64) -> f64 {
        time_nanos / (size * size.ln())
    }
}

impl FitnessFunction for WorstCaseComplexityFitness {
    fn evaluate(&self, test_case: &TestCase, metrics: Option<&ExecutionMetrics>) -> f64 {
        let Some(metrics) = metrics.filter(|m| m.successful) else {
            return 0.0;
        };

        let size = test_case.input_size();
        if size <= 1.0 {
            return UNINTERESTING;
        }

        let ratio = Self::complexity_ratio(metrics.execution_time_nanos as f64, size);

        if ratio > 1000.0 {
            ratio * self.exponential_bonus
        } else if ratio > 100.0 {
            ratio * self.polynomial_bonus
        } else if ratio > 10.0 {
            ratio
        } else {
            ratio * self.linear_penalty
        }
    }

    fn should_retain(&self, score: f64) -> bool {
        score > 1.0
    }

    fn name(&self) -> &str {
        "WorstCaseComplexity"
    }
}

/// Rewards unusual input shapes and unusual execution profiles.
#[derive(Debug, Clone)]
pub struct DiversityFitness {
    pub novelty_weight: f64,
    pub uniqueness_weight: f64,
}

impl FitnessFunction for DiversityFitness {
    fn evaluate(&self, test_case: &TestCase, metrics: Option<&ExecutionMetrics>) -> f64 {
        let Some(metrics) = metrics else {
            return 0.0;
        };

        let novelty = (test_case.input_size() + 1.0).ln() * test_case.input_type_complexity();
        let uniqueness = ((metrics.execution_time_nanos as f64 + 1.0).ln()
            + (metrics.peak_memory_bytes as f64 + 1.0).ln()
            + metrics.cpu_usage_percent)
            / 3.0;

        novelty * self.novelty_weight + uniqueness * self.uniqueness_weight
    }

    fn should_retain(&self, score: f64) -> bool {
        score > 0.3
    }

    fn name(&self) -> &str {
        "Diversity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{InputSlot, TypeDescriptor, Value};

    fn text_case(len: usize) -> TestCase {
        TestCase::new(
            "parse",
            vec![InputSlot::new(
                TypeDescriptor::Text,
                Value::Text("x".repeat(len)),
            )],
        )
    }

    fn amplification() -> AmplificationFitness {
        AmplificationFitness {
            time_weight: 0.7,
            memory_weight: 0.3,
            baseline_time_nanos: 1_000_000,
            baseline_memory_bytes: 1024 * 1024,
            amplification_threshold: 2.0,
        }
    }

    #[test]
    fn test_amplification_slow_run_retained() {
        let fitness = amplification();
        let metrics = ExecutionMetrics::success(500_000_000, 1024 * 1024, 2 * 1024 * 1024, 50.0);
        let (time_amp, _) = fitness.amplification(&metrics);
        assert_eq!(time_amp, 500.0);

        let score = fitness.evaluate(&text_case(3), Some(&metrics));
        assert!(score > 0.5);
        assert!(fitness.should_retain(score));
    }

    #[test]
    fn test_amplification_without_memory_reading() {
        let fitness = amplification();
        let metrics = ExecutionMetrics::success(500_000_000, 0, 0, 50.0);
        let score = fitness.evaluate(&text_case(3), Some(&metrics));
        assert!(score.is_finite());
        assert!(fitness.should_retain(score));
    }

    #[test]
    fn test_amplification_uninteresting() {
        let fitness = amplification();
        let metrics = ExecutionMetrics::success(1_000_000, 1024 * 1024, 1024 * 1024, 10.0);
        assert_eq!(fitness.evaluate(&text_case(3), Some(&metrics)), 0.1);
        assert!(!fitness.should_retain(0.1));
    }

    #[test]
    fn test_amplification_synergy_bonus() {
        let fitness = amplification();
        let time_only = ExecutionMetrics::success(10_000_000, 1024 * 1024, 1024 * 1024, 10.0);
        let both = ExecutionMetrics::success(10_000_000, 10 * 1024 * 1024, 10 * 1024 * 1024, 10.0);

        let time_score = fitness.evaluate(&text_case(1), Some(&time_only));
        let both_score = fitness.evaluate(&text_case(1), Some(&both));
        let expected = 10f64.ln() * 0.7 + 10f64.ln() * 0.3 + 5.0;
        assert!((both_score - expected).abs() < 1e-9);
        assert!(both_score > time_score);
    }

    #[test]
    fn test_failures_score_zero() {
        let failed = ExecutionMetrics::failure("Overflow", "boom");
        let tc = text_case(10);
        assert_eq!(amplification().evaluate(&tc, None), 0.0);
        assert_eq!(amplification().evaluate(&tc, Some(&failed)), 0.0);

        let worst_case = WorstCaseComplexityFitness {
            exponential_bonus: 10.0,
            polynomial_bonus: 2.0,
            linear_penalty: 0.1,
        };
        assert_eq!(worst_case.evaluate(&tc, Some(&failed)), 0.0);
    }

    #[test]
    fn test_worst_case_regimes() {
        let fitness = WorstCaseComplexityFitness {
            exponential_bonus: 10.0,
            polynomial_bonus: 2.0,
            linear_penalty: 0.1,
        };
        let tc = text_case(100);
        let n_log_n = 100.0 * 100f64.ln();

        let run = |ratio: f64| {
            let nanos = (ratio * n_log_n).round() as u64;
            let metrics = ExecutionMetrics::success(nanos, 0, 0, 0.0);
            let score = fitness.evaluate(&tc, Some(&metrics));
            score / WorstCaseComplexityFitness::complexity_ratio(nanos as f64, 100.0)
        };

        assert!((run(5000.0) - 10.0).abs() < 1e-9);
        assert!((run(500.0) - 2.0).abs() < 1e-9);
        assert!((run(50.0) - 1.0).abs() < 1e-9);
        assert!((run(5.0) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_worst_case_trivial_input() {
        let fitness = WorstCaseComplexityFitness {
            exponential_bonus: 10.0,
            polynomial_bonus: 2.0,
            linear_penalty: 0.1,
        };
        let metrics = ExecutionMetrics::success(1_000_000_000, 0, 0, 0.0);
        assert_eq!(fitness.evaluate(&text_case(1), Some(&metrics)), 0.1);
        assert!(!fitness.should_retain(0.1));
    }

    #[test]
    fn test_diversity_fitness() {
        let fitness = DiversityFitness {
            novelty_weight: 1.0,
            uniqueness_weight: 1.0,
        };
        assert_eq!(fitness.evaluate(&text_case(5), None), 0.0);

        let metrics = ExecutionMetrics::success(1_000, 2_000, 2_000, 30.0);
        let score = fitness.evaluate(&text_case(5), Some(&metrics));
        let expected = 6f64.ln() * 2.0 + (1_001f64.ln() + 2_001f64.ln() + 30.0) / 3.0;
        assert!((score - expected).abs() < 1e-9);
        assert!(fitness.should_retain(score));

        // Failed runs still carry execution characteristics.
        let failed = ExecutionMetrics::failure("Overflow", "boom");
        assert!(fitness.evaluate(&text_case(5), Some(&failed)) > 0.0);
    }

    #[test]
    fn test_build_from_config() {
        let fitness = FitnessConfig::default().build();
        assert_eq!(fitness.name(), "ComplexityVulnerability");

        let fitness = FitnessConfig::Diversity {
            novelty_weight: 1.0,
            uniqueness_weight: 0.5,
        }
        .build();
        assert_eq!(fitness.name(), "Diversity");
    }
}
