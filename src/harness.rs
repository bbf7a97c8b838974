//! Interfaces to the execution side, plus a cost-model harness.
//!
//! The engine never runs target code itself. It hands each [`TestCase`] to an
//! [`ExecutionHarness`] and scores whatever comes back. [`CostModelHarness`]
//! synthesizes metrics from a configurable growth model so the engine can be
//! driven end to end without a real sandbox.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::schema::{
    ExecutionMetrics, TargetSignature, Termination, TestCase, TypeDescriptor, Value,
};

/// Harness-level failure. Always folded into fitness 0 by the population.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HarnessError {
    #[error("Target crashed: {0}")]
    Crashed(String),
    #[error("Execution timed out")]
    Timeout,
    #[error("Memory limit exceeded")]
    MemoryLimit,
    #[error("Security policy violation")]
    SecurityViolation,
    #[error("Harness unavailable: {0}")]
    Unavailable(String),
}

/// Runs a test case against its target and reports measurements.
///
/// Called concurrently from evaluation workers.
pub trait ExecutionHarness: Send + Sync {
    fn execute(&self, test_case: &TestCase) -> Result<ExecutionMetrics, HarnessError>;
}

impl<F> ExecutionHarness for F
where
    F: Fn(&TestCase) -> Result<ExecutionMetrics, HarnessError> + Send + Sync,
{
    fn execute(&self, test_case: &TestCase) -> Result<ExecutionMetrics, HarnessError> {
        self(test_case)
    }
}

/// Resolves a target identifier to its declared input slots.
pub trait TargetDescriptorProvider {
    fn descriptors(&self, target: &str) -> Option<Vec<TypeDescriptor>>;
}

impl TargetDescriptorProvider for TargetSignature {
    fn descriptors(&self, target: &str) -> Option<Vec<TypeDescriptor>> {
        (self.target == target).then(|| self.slots.clone())
    }
}

impl TargetDescriptorProvider for HashMap<String, Vec<TypeDescriptor>> {
    fn descriptors(&self, target: &str) -> Option<Vec<TypeDescriptor>> {
        self.get(target).cloned()
    }
}

/// Growth of simulated work with respect to input size `n`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind")]
pub enum CostModel {
    Linear,
    Linearithmic,
    #[default]
    Quadratic,
    /// `2^n`, with `n` capped.
    Exponential { cap: u32 },
    /// `2^r` where `r` is the longest run of one repeated character in any
    /// text input, capped. Mimics a backtracking matcher.
    Backtracking { cap: u32 },
}

impl CostModel {
    /// Work units for a test case.
    pub fn units(&self, test_case: &TestCase) -> f64 {
        let n = test_case.input_size();
        match *self {
            Self::Linear => n,
            Self::Linearithmic => n * (n + 1.0).ln(),
            Self::Quadratic => n * n,
            Self::Exponential { cap } => 2f64.powf(n.min(cap as f64)),
            Self::Backtracking { cap } => {
                let run = test_case
                    .inputs()
                    .iter()
                    .filter_map(|slot| match &slot.value {
                        Value::Text(s) => Some(longest_char_run(s)),
                        _ => None,
                    })
                    .max()
                    .unwrap_or(0);
                n + 2f64.powi(run.min(cap as usize) as i32)
            }
        }
    }
}

fn longest_char_run(s: &str) -> usize {
    let mut best = 0;
    let mut current = 0;
    let mut previous = None;
    for c in s.chars() {
        if Some(c) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        best = best.max(current);
    }
    best
}

/// Configuration of the cost-model harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModelConfig {
    #[serde(default)]
    pub model: CostModel,
    #[serde(default = "default_base_time_nanos")]
    pub base_time_nanos: u64,
    #[serde(default = "default_nanos_per_unit")]
    pub nanos_per_unit: f64,
    #[serde(default = "default_base_memory_bytes")]
    pub base_memory_bytes: u64,
    #[serde(default = "default_bytes_per_element")]
    pub bytes_per_element: f64,
    /// Runs whose simulated time exceeds this are reported as timed out.
    #[serde(default)]
    pub timeout_nanos: Option<u64>,
    /// Runs whose simulated peak memory exceeds this hit the memory limit.
    #[serde(default)]
    pub memory_limit_bytes: Option<u64>,
    /// Null inputs make the target raise.
    #[serde(default = "default_reject_null")]
    pub reject_null: bool,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            model: CostModel::default(),
            base_time_nanos: default_base_time_nanos(),
            nanos_per_unit: default_nanos_per_unit(),
            base_memory_bytes: default_base_memory_bytes(),
            bytes_per_element: default_bytes_per_element(),
            timeout_nanos: None,
            memory_limit_bytes: None,
            reject_null: default_reject_null(),
        }
    }
}

fn default_base_time_nanos() -> u64 {
    200_000
}
fn default_nanos_per_unit() -> f64 {
    50.0
}
fn default_base_memory_bytes() -> u64 {
    512 * 1024
}
fn default_bytes_per_element() -> f64 {
    64.0
}
fn default_reject_null() -> bool {
    true
}

/// Harness that computes metrics from a [`CostModel`] instead of running code.
#[derive(Debug, Clone, Default)]
pub struct CostModelHarness {
    config: CostModelConfig,
}

impl CostModelHarness {
    pub fn new(config: CostModelConfig) -> Self {
        Self { config }
    }

    pub fn with_model(model: CostModel) -> Self {
        Self::new(CostModelConfig {
            model,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &CostModelConfig {
        &self.config
    }
}

impl ExecutionHarness for CostModelHarness {
    fn execute(&self, test_case: &TestCase) -> Result<ExecutionMetrics, HarnessError> {
        let execution_id = format!("{}-{}", test_case.target(), test_case.id());

        if self.config.reject_null && test_case.inputs().iter().any(|s| s.value.is_null()) {
            return Ok(
                ExecutionMetrics::failure("NullInput", "argument was null")
                    .with_execution_id(execution_id),
            );
        }

        let units = self.config.model.units(test_case);
        let time = self.config.base_time_nanos as f64 + units * self.config.nanos_per_unit;
        let time_nanos = if time.is_finite() {
            time.min(u64::MAX as f64) as u64
        } else {
            u64::MAX
        };
        let allocated = self.config.base_memory_bytes as f64
            + test_case.input_size() * self.config.bytes_per_element;
        let allocated_bytes = allocated.min(u64::MAX as f64) as u64;
        let peak_bytes = allocated_bytes - allocated_bytes / 4;

        if let Some(limit) = self.config.timeout_nanos
            && time_nanos > limit
        {
            return Ok(ExecutionMetrics::terminated(Termination::Timeout, limit)
                .with_execution_id(execution_id));
        }
        if let Some(limit) = self.config.memory_limit_bytes
            && peak_bytes > limit
        {
            return Ok(
                ExecutionMetrics::terminated(Termination::MemoryLimit, time_nanos)
                    .with_execution_id(execution_id),
            );
        }

        Ok(
            ExecutionMetrics::success(time_nanos, peak_bytes, allocated_bytes, 100.0)
                .with_execution_id(execution_id),
        )
    }
}
