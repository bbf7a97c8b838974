//! Complexity fuzzer - genetic search for algorithmic-complexity weaknesses.
//!
//! This crate evolves structured call inputs ("test cases") for a target
//! operation, scoring each by the time and memory its execution consumes, to
//! surface inputs that drive the target into worst-case behavior.
//!
//! # Architecture
//!
//! - `schema`: Value model, test cases, configuration and reporting types
//! - `evolution`: Generation, fitness, genetic operators, population, evolver
//! - `harness`: Execution-side interfaces plus a cost-model harness
//!
//! # Example
//!
//! ```rust,no_run
//! use complexity_fuzzer::{
//!     evolution::Evolver,
//!     harness::CostModelHarness,
//!     schema::{FuzzerConfig, PrimitiveKind, TargetSignature, TypeDescriptor},
//! };
//!
//! let config = FuzzerConfig::default();
//! let signature = TargetSignature::new(
//!     "sort",
//!     vec![TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::Int))],
//! );
//!
//! let fitness = config.fitness.build();
//! let mut evolver = Evolver::new(config);
//! let result = evolver.evolve_test_cases("sort", &signature, fitness, &CostModelHarness::default());
//!
//! println!("Best fitness after {} generations: {:.3}",
//!     result.generations_completed, result.best_fitness);
//! ```

pub mod evolution;
pub mod harness;
pub mod schema;

// Re-export commonly used types
pub use evolution::{EvolutionResult, Evolver, FitnessFunction, Population};
pub use harness::{ExecutionHarness, HarnessError, TargetDescriptorProvider};
pub use schema::{ExecutionMetrics, FuzzerConfig, FuzzerError, TestCase, Value};
