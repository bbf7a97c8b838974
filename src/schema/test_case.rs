//! Test cases, execution metrics and target signatures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::{TypeDescriptor, Value};

/// Unique test case identifier.
pub type TestCaseId = u64;

static NEXT_TEST_CASE_ID: AtomicU64 = AtomicU64::new(1);

fn next_test_case_id() -> TestCaseId {
    NEXT_TEST_CASE_ID.fetch_add(1, Ordering::Relaxed)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Ordered input slots of an operation under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSignature {
    /// Opaque key identifying the operation.
    pub target: String,
    /// Declared type of each input slot.
    pub slots: Vec<TypeDescriptor>,
}

impl TargetSignature {
    pub fn new(target: impl Into<String>, slots: Vec<TypeDescriptor>) -> Self {
        Self {
            target: target.into(),
            slots,
        }
    }
}

/// One declared input slot and its current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSlot {
    pub descriptor: TypeDescriptor,
    pub value: Value,
}

impl InputSlot {
    pub fn new(descriptor: TypeDescriptor, value: Value) -> Self {
        Self { descriptor, value }
    }
}

/// A candidate input set for one target operation.
///
/// Input slots are fixed at construction. Only the fitness/metrics pair can
/// change afterwards, and only by deriving a new value through
/// [`TestCase::with_execution_results`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    id: TestCaseId,
    target: String,
    inputs: Vec<InputSlot>,
    generation: usize,
    fitness: f64,
    metrics: Option<ExecutionMetrics>,
    evaluated: bool,
    created_at_ms: u64,
    parents: Vec<TestCaseId>,
    mutation_count: u32,
    crossover_count: u32,
}

impl TestCase {
    /// Create a generation-zero test case with no lineage.
    pub fn new(target: impl Into<String>, inputs: Vec<InputSlot>) -> Self {
        Self {
            id: next_test_case_id(),
            target: target.into(),
            inputs,
            generation: 0,
            fitness: 0.0,
            metrics: None,
            evaluated: false,
            created_at_ms: now_millis(),
            parents: Vec::new(),
            mutation_count: 0,
            crossover_count: 0,
        }
    }

    /// Create a test case at a given generation with no lineage.
    pub fn seeded(target: impl Into<String>, inputs: Vec<InputSlot>, generation: usize) -> Self {
        Self {
            generation,
            ..Self::new(target, inputs)
        }
    }

    /// Offspring of a single parent.
    pub(crate) fn mutant_of(parent: &TestCase, inputs: Vec<InputSlot>) -> Self {
        Self {
            generation: parent.generation + 1,
            parents: vec![parent.id],
            mutation_count: parent.mutation_count + 1,
            crossover_count: parent.crossover_count,
            ..Self::new(parent.target.clone(), inputs)
        }
    }

    /// Offspring of two parents. Mutation history follows the first parent.
    pub(crate) fn child_of(first: &TestCase, second: &TestCase, inputs: Vec<InputSlot>) -> Self {
        Self {
            generation: first.generation.max(second.generation) + 1,
            parents: vec![first.id, second.id],
            mutation_count: first.mutation_count,
            crossover_count: first.crossover_count + 1,
            ..Self::new(first.target.clone(), inputs)
        }
    }

    /// Derive a copy carrying new evaluation results. Identity and lineage are kept.
    ///
    /// `metrics` is `None` when the harness itself failed.
    pub fn with_execution_results(&self, fitness: f64, metrics: Option<ExecutionMetrics>) -> Self {
        Self {
            fitness,
            metrics,
            evaluated: true,
            ..self.clone()
        }
    }

    pub fn id(&self) -> TestCaseId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn inputs(&self) -> &[InputSlot] {
        &self.inputs
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn metrics(&self) -> Option<&ExecutionMetrics> {
        self.metrics.as_ref()
    }

    /// Whether results have been attached, even if the harness failed.
    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    /// Evaluated and the target ran to completion.
    pub fn is_successful(&self) -> bool {
        self.metrics.as_ref().is_some_and(|m| m.successful)
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn parents(&self) -> &[TestCaseId] {
        &self.parents
    }

    pub fn mutation_count(&self) -> u32 {
        self.mutation_count
    }

    pub fn crossover_count(&self) -> u32 {
        self.crossover_count
    }

    /// Sum of the top-level sizes of every input value.
    pub fn input_size(&self) -> f64 {
        self.inputs.iter().map(|slot| slot.value.size()).sum()
    }

    /// Sum of the declared slot complexities.
    pub fn input_type_complexity(&self) -> f64 {
        self.inputs
            .iter()
            .map(|slot| slot.descriptor.complexity())
            .sum()
    }
}

/// Harness limit that ended a run early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    Timeout,
    MemoryLimit,
    SecurityViolation,
}

impl Termination {
    pub fn name(self) -> &'static str {
        match self {
            Self::Timeout => "Timeout",
            Self::MemoryLimit => "MemoryLimit",
            Self::SecurityViolation => "SecurityViolation",
        }
    }
}

/// Measurements produced by the execution harness for one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub execution_id: String,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub execution_time_nanos: u64,
    pub peak_memory_bytes: u64,
    pub total_memory_allocated: u64,
    pub cpu_usage_percent: f64,
    pub stack_depth: u32,
    pub exception_thrown: bool,
    pub exception_type: Option<String>,
    pub exception_message: Option<String>,
    pub successful: bool,
    pub timeout_occurred: bool,
    pub memory_limit_exceeded: bool,
    pub security_violation: bool,
    pub thread_count: u32,
    pub gc_count: u32,
    pub gc_time_ms: u64,
}

impl ExecutionMetrics {
    /// Metrics for a run that completed normally.
    pub fn success(
        execution_time_nanos: u64,
        peak_memory_bytes: u64,
        total_memory_allocated: u64,
        cpu_usage_percent: f64,
    ) -> Self {
        Self {
            execution_time_nanos,
            peak_memory_bytes,
            total_memory_allocated,
            cpu_usage_percent,
            successful: true,
            thread_count: 1,
            ..Default::default()
        }
    }

    /// Metrics for a run that raised an error inside the target.
    pub fn failure(exception_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception_thrown: true,
            exception_type: Some(exception_type.into()),
            exception_message: Some(message.into()),
            successful: false,
            ..Default::default()
        }
    }

    /// Metrics for a run the harness cut short after `execution_time_nanos`.
    pub fn terminated(reason: Termination, execution_time_nanos: u64) -> Self {
        Self {
            execution_time_nanos,
            exception_type: Some(reason.name().to_string()),
            successful: false,
            timeout_occurred: reason == Termination::Timeout,
            memory_limit_exceeded: reason == Termination::MemoryLimit,
            security_violation: reason == Termination::SecurityViolation,
            ..Default::default()
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    pub fn execution_time_ms(&self) -> f64 {
        self.execution_time_nanos as f64 / 1_000_000.0
    }

    pub fn peak_memory_mb(&self) -> f64 {
        self.peak_memory_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn total_allocated_mb(&self) -> f64 {
        self.total_memory_allocated as f64 / (1024.0 * 1024.0)
    }

    /// Any limit enforced by the harness cut the run short.
    pub fn was_terminated(&self) -> bool {
        self.timeout_occurred || self.memory_limit_exceeded || self.security_violation
    }

    /// Peak over total allocated, 0 when nothing was allocated.
    pub fn memory_efficiency(&self) -> f64 {
        if self.total_memory_allocated == 0 {
            return 0.0;
        }
        self.peak_memory_bytes as f64 / self.total_memory_allocated as f64
    }

    /// Milliseconds per CPU percent, 0 when no CPU usage was recorded.
    pub fn cpu_efficiency(&self) -> f64 {
        if self.cpu_usage_percent <= 0.0 {
            return 0.0;
        }
        self.execution_time_ms() / self.cpu_usage_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Primitive, PrimitiveKind};

    fn sample_inputs() -> Vec<InputSlot> {
        vec![
            InputSlot::new(TypeDescriptor::Text, Value::Text("abc".into())),
            InputSlot::new(
                TypeDescriptor::primitive(PrimitiveKind::Int),
                Value::Primitive(Primitive::Int(4)),
            ),
            InputSlot::new(TypeDescriptor::array_of(TypeDescriptor::Text), Value::Null),
        ]
    }

    #[test]
    fn test_ids_are_unique() {
        let a = TestCase::new("sort", sample_inputs());
        let b = TestCase::new("sort", sample_inputs());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_input_measures() {
        let tc = TestCase::new("sort", sample_inputs());
        assert_eq!(tc.input_size(), 4.0);
        assert_eq!(tc.input_type_complexity(), 6.0);
    }

    #[test]
    fn test_with_execution_results_keeps_identity() {
        let tc = TestCase::new("sort", sample_inputs());
        let metrics = ExecutionMetrics::success(1_000, 10, 20, 50.0);
        let scored = tc.with_execution_results(2.5, Some(metrics.clone()));

        assert_eq!(scored.id(), tc.id());
        assert_eq!(scored.created_at_ms(), tc.created_at_ms());
        assert_eq!(scored.inputs(), tc.inputs());
        assert_eq!(scored.fitness(), 2.5);
        assert_eq!(scored.metrics(), Some(&metrics));
        assert!(scored.is_evaluated());
        assert!(scored.is_successful());
        assert!(!tc.is_evaluated());

        let harness_failed = tc.with_execution_results(0.0, None);
        assert!(harness_failed.is_evaluated());
        assert!(!harness_failed.is_successful());
    }

    #[test]
    fn test_lineage() {
        let a = TestCase::seeded("sort", sample_inputs(), 2);
        let b = TestCase::seeded("sort", sample_inputs(), 5);

        let child = TestCase::child_of(&a, &b, sample_inputs());
        assert_eq!(child.generation(), 6);
        assert_eq!(child.parents(), &[a.id(), b.id()]);
        assert_eq!(child.crossover_count(), 1);
        assert_eq!(child.mutation_count(), 0);

        let mutant = TestCase::mutant_of(&child, sample_inputs());
        assert_eq!(mutant.generation(), 7);
        assert_eq!(mutant.parents(), &[child.id()]);
        assert_eq!(mutant.mutation_count(), 1);
        assert_eq!(mutant.crossover_count(), 1);
    }

    #[test]
    fn test_metrics_derived_readings() {
        let metrics = ExecutionMetrics::success(1_000_000, 1024 * 1024, 2 * 1024 * 1024, 50.0);
        assert_eq!(metrics.execution_time_ms(), 1.0);
        assert_eq!(metrics.peak_memory_mb(), 1.0);
        assert_eq!(metrics.total_allocated_mb(), 2.0);
        assert_eq!(metrics.memory_efficiency(), 0.5);
        assert_eq!(metrics.cpu_efficiency(), 0.02);
        assert!(!metrics.was_terminated());

        let empty = ExecutionMetrics::default();
        assert_eq!(empty.memory_efficiency(), 0.0);
        assert_eq!(empty.cpu_efficiency(), 0.0);

        let timed_out = ExecutionMetrics {
            timeout_occurred: true,
            ..Default::default()
        };
        assert!(timed_out.was_terminated());
    }

    #[test]
    fn test_failure_metrics() {
        let metrics = ExecutionMetrics::failure("StackOverflow", "recursion too deep");
        assert!(!metrics.successful);
        assert!(metrics.exception_thrown);
        assert_eq!(metrics.exception_type.as_deref(), Some("StackOverflow"));
    }

    #[test]
    fn test_terminated_metrics() {
        let metrics = ExecutionMetrics::terminated(Termination::MemoryLimit, 5_000);
        assert!(metrics.was_terminated());
        assert!(metrics.memory_limit_exceeded);
        assert!(!metrics.timeout_occurred);
        assert!(!metrics.successful);
        assert_eq!(metrics.execution_time_nanos, 5_000);
        assert_eq!(metrics.exception_type.as_deref(), Some("MemoryLimit"));
    }
}
