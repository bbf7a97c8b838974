//! Evolutionary search for inputs that trigger worst-case behavior.
//!
//! # Overview
//!
//! - **Value generation** (`generator`): random, edge-case and oversized inputs
//! - **Fitness functions** (`fitness`): pluggable scoring of executed test cases
//! - **Genetic operators** (`operators`): crossover and mutation over the value model
//! - **Population** (`population`): bounded concurrent membership and selection
//! - **Statistics** (`statistics`): lock-free aggregates over the population
//! - **Evolver** (`evolver`): the generation loop
//!
//! # Example
//!
//! ```rust,no_run
//! use complexity_fuzzer::evolution::Evolver;
//! use complexity_fuzzer::harness::{CostModel, CostModelHarness};
//! use complexity_fuzzer::schema::{FuzzerConfig, TargetSignature, TypeDescriptor};
//!
//! let config = FuzzerConfig::default();
//! let fitness = config.fitness.build();
//! let signature = TargetSignature::new("regex_match", vec![TypeDescriptor::Text]);
//! let harness = CostModelHarness::with_model(CostModel::Backtracking { cap: 24 });
//!
//! let mut evolver = Evolver::new(config);
//! let result = evolver.evolve_with_callback(
//!     "regex_match",
//!     &signature,
//!     fitness,
//!     &harness,
//!     |report| println!("Generation {}: best = {:.3}", report.generation, report.best_fitness),
//! );
//!
//! for test_case in result.potential_vulnerabilities(1.0) {
//!     println!("{} -> {:.3}", test_case.id(), test_case.fitness());
//! }
//! ```

mod evolver;
mod fitness;
mod generator;
mod operators;
mod population;
mod statistics;

pub use evolver::{EvolutionResult, Evolver};
pub use fitness::{
    AmplificationFitness, DiversityFitness, FitnessFunction, WorstCaseComplexityFitness,
};
pub use generator::{ValueGenerator, empty_value};
pub use operators::GeneticOperators;
pub use population::{Population, PopulationBuilder};
pub use statistics::{PopulationStatistics, SNAPSHOT_TOP_K};
