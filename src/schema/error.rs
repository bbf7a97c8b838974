//! Precondition violations raised by the engine.

use super::{ConfigError, TestCaseId};

/// Programming errors: misuse of operators or builders. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum FuzzerError {
    #[error("Cannot cross test cases of different targets: {left} vs {right}")]
    MismatchedTargets { left: String, right: String },
    #[error("Test cases {left} and {right} have different input slot counts")]
    SlotCountMismatch { left: TestCaseId, right: TestCaseId },
    #[error("Population requires a fitness function")]
    MissingFitnessFunction,
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
