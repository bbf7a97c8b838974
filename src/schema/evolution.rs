//! Progress and result types for evolution runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::TestCase;

/// Where the generation loop went after a report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EvolutionPhase {
    /// The evaluated generation was bred into the next one.
    Breeding,
    DoneMaxGenerations,
    DoneStagnation,
    /// Stopped through the cancel handle before evaluating.
    Cancelled,
}

impl EvolutionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::DoneMaxGenerations | Self::DoneStagnation | Self::Cancelled
        )
    }
}

/// Reason evolution stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Reached maximum generations.
    MaxGenerations,
    /// Stagnation limit hit.
    Stagnation,
    /// Cancelled through the engine's cancel handle.
    Cancelled,
}

impl StopReason {
    /// Terminal phase corresponding to this reason.
    pub fn phase(self) -> EvolutionPhase {
        match self {
            Self::MaxGenerations => EvolutionPhase::DoneMaxGenerations,
            Self::Stagnation => EvolutionPhase::DoneStagnation,
            Self::Cancelled => EvolutionPhase::Cancelled,
        }
    }
}

/// Point-in-time copy of population statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StatisticsSnapshot {
    pub total_test_cases: usize,
    pub evaluated_test_cases: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    /// `None` until something has been evaluated.
    pub best_fitness: Option<f64>,
    pub worst_fitness: Option<f64>,
    pub average_fitness: f64,
    /// Sample variance over evaluated members.
    pub fitness_variance: f64,
    pub average_input_size: f64,
    pub average_type_complexity: f64,
    pub diversity: f64,
    pub total_execution_time_nanos: u64,
    pub total_memory_bytes: u64,
    pub total_mutations: u64,
    pub total_crossovers: u64,
    /// Percentage of evaluated members whose execution succeeded.
    pub success_rate: f64,
    pub average_execution_time_ms: f64,
    pub average_memory_mb: f64,
    pub top_target_methods: Vec<(String, usize)>,
    pub top_exception_types: Vec<(String, usize)>,
    pub top_input_types: Vec<(String, usize)>,
}

impl fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} evaluated={} success={:.1}% best={} avg={:.4} std={:.4} diversity={:.4}",
            self.total_test_cases,
            self.evaluated_test_cases,
            self.success_rate,
            self.best_fitness
                .map(|b| format!("{b:.4}"))
                .unwrap_or_else(|| "-".to_string()),
            self.average_fitness,
            self.fitness_variance.sqrt(),
            self.diversity,
        )
    }
}

/// Progress update emitted once per evaluated generation, plus a final
/// report when the run is cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Generation index (0-based) the report describes.
    pub generation: usize,
    pub total_generations: usize,
    pub phase: EvolutionPhase,
    /// Best fitness seen so far.
    pub best_fitness: f64,
    /// Best fitness within this generation.
    pub generation_best: f64,
    /// Generations since last improvement.
    pub stagnation_count: usize,
    pub diversity: f64,
    /// Whether the worst members were replaced this generation.
    pub diversity_injected: bool,
    pub effective_mutation_rate: f64,
    pub statistics: StatisticsSnapshot,
}

/// Serializable outcome of an evolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionSummary {
    pub target: String,
    pub generations_completed: usize,
    pub best_fitness: f64,
    pub stop_reason: StopReason,
    pub elapsed_seconds: f64,
    pub total_evaluations: u64,
    /// Every test case that set a new running-best fitness, in discovery order.
    pub best_test_cases: Vec<TestCase>,
    pub final_statistics: StatisticsSnapshot,
    pub history: Vec<GenerationReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(!EvolutionPhase::Breeding.is_terminal());
        assert!(EvolutionPhase::Cancelled.is_terminal());
        assert!(StopReason::Stagnation.phase().is_terminal());
        assert_eq!(
            StopReason::MaxGenerations.phase(),
            EvolutionPhase::DoneMaxGenerations
        );
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = StatisticsSnapshot {
            total_test_cases: 4,
            evaluated_test_cases: 2,
            success_rate: 50.0,
            best_fitness: Some(1.5),
            ..Default::default()
        };
        let text = snapshot.to_string();
        assert!(text.contains("total=4"));
        assert!(text.contains("best=1.5000"));
        assert!(text.contains("success=50.0%"));
    }
}
