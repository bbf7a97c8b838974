//! Lock-free population statistics.
//!
//! Aggregates are updated from membership and evaluation events, possibly
//! from many evaluation workers at once. Counters are atomics, real-valued
//! accumulators and running extrema are `f64` bit patterns updated with
//! compare-and-swap, and frequency tables live in concurrent maps. None of
//! the update paths take an exclusive lock.
//!
//! Extrema only move outward on incremental updates. Removing the current
//! best leaves a stale maximum until [`PopulationStatistics::recompute`] runs.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::schema::{StatisticsSnapshot, TestCase};

/// Rows kept in each top-K table of a snapshot.
pub const SNAPSHOT_TOP_K: usize = 5;

/// `f64` stored as its bit pattern in an `AtomicU64`.
#[derive(Debug)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn update(&self, f: impl Fn(f64) -> Option<f64>) {
        // `None` from `f` leaves the value unchanged.
        let _ = self.0.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            f(f64::from_bits(bits)).map(f64::to_bits)
        });
    }

    fn add(&self, delta: f64) {
        self.update(|current| Some(current + delta));
    }

    fn max(&self, value: f64) {
        self.update(|current| (value > current).then_some(value));
    }

    fn min(&self, value: f64) {
        self.update(|current| (value < current).then_some(value));
    }
}

fn decrement(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_sub(1))
    });
}

fn subtract(counter: &AtomicU64, amount: u64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_sub(amount))
    });
}

fn bump(table: &DashMap<String, usize>, key: &str) {
    *table.entry(key.to_string()).or_insert(0) += 1;
}

fn unbump(table: &DashMap<String, usize>, key: &str) {
    if let Some(mut count) = table.get_mut(key) {
        *count = count.saturating_sub(1);
    }
    // Shard guard above must be released before this call.
    table.remove_if(key, |_, count| *count == 0);
}

fn top_k(table: &DashMap<String, usize>, n: usize) -> Vec<(String, usize)> {
    let mut rows: Vec<(String, usize)> = table
        .iter()
        .map(|entry| (entry.key().clone(), *entry.value()))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows.truncate(n);
    rows
}

/// Aggregates over a population's membership and evaluation results.
#[derive(Debug)]
pub struct PopulationStatistics {
    total: AtomicUsize,
    evaluated: AtomicUsize,
    successful: AtomicUsize,
    failed: AtomicUsize,

    best_fitness: AtomicF64,
    worst_fitness: AtomicF64,
    fitness_sum: AtomicF64,
    fitness_square_sum: AtomicF64,

    input_size_sum: AtomicF64,
    type_complexity_sum: AtomicF64,
    diversity: AtomicF64,

    total_execution_time_nanos: AtomicU64,
    total_memory_bytes: AtomicU64,
    total_mutations: AtomicU64,
    total_crossovers: AtomicU64,

    target_methods: DashMap<String, usize>,
    exception_types: DashMap<String, usize>,
    input_types: DashMap<String, usize>,
}

impl Default for PopulationStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl PopulationStatistics {
    pub fn new() -> Self {
        Self {
            total: AtomicUsize::new(0),
            evaluated: AtomicUsize::new(0),
            successful: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            best_fitness: AtomicF64::new(f64::NEG_INFINITY),
            worst_fitness: AtomicF64::new(f64::INFINITY),
            fitness_sum: AtomicF64::new(0.0),
            fitness_square_sum: AtomicF64::new(0.0),
            input_size_sum: AtomicF64::new(0.0),
            type_complexity_sum: AtomicF64::new(0.0),
            diversity: AtomicF64::new(0.0),
            total_execution_time_nanos: AtomicU64::new(0),
            total_memory_bytes: AtomicU64::new(0),
            total_mutations: AtomicU64::new(0),
            total_crossovers: AtomicU64::new(0),
            target_methods: DashMap::new(),
            exception_types: DashMap::new(),
            input_types: DashMap::new(),
        }
    }

    /// Account for a member joining the population.
    pub fn record_added(&self, test_case: &TestCase) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.input_size_sum.add(test_case.input_size());
        self.type_complexity_sum
            .add(test_case.input_type_complexity());
        self.total_mutations
            .fetch_add(test_case.mutation_count() as u64, Ordering::Relaxed);
        self.total_crossovers
            .fetch_add(test_case.crossover_count() as u64, Ordering::Relaxed);

        bump(&self.target_methods, test_case.target());
        for slot in test_case.inputs() {
            bump(&self.input_types, &slot.descriptor.kind_name());
        }

        if test_case.is_evaluated() {
            self.record_evaluation(test_case);
        }
    }

    /// Account for a member leaving the population.
    pub fn record_removed(&self, test_case: &TestCase) {
        decrement(&self.total);
        self.input_size_sum.add(-test_case.input_size());
        self.type_complexity_sum
            .add(-test_case.input_type_complexity());
        subtract(&self.total_mutations, test_case.mutation_count() as u64);
        subtract(&self.total_crossovers, test_case.crossover_count() as u64);

        unbump(&self.target_methods, test_case.target());
        for slot in test_case.inputs() {
            unbump(&self.input_types, &slot.descriptor.kind_name());
        }

        if test_case.is_evaluated() {
            self.retract_evaluation(test_case);
        }
    }

    /// Account for the results carried by an evaluated member.
    pub fn record_evaluation(&self, test_case: &TestCase) {
        let fitness = test_case.fitness();
        self.evaluated.fetch_add(1, Ordering::Relaxed);
        if test_case.is_successful() {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        self.best_fitness.max(fitness);
        self.worst_fitness.min(fitness);
        self.fitness_sum.add(fitness);
        self.fitness_square_sum.add(fitness * fitness);

        if let Some(metrics) = test_case.metrics() {
            self.total_execution_time_nanos
                .fetch_add(metrics.execution_time_nanos, Ordering::Relaxed);
            self.total_memory_bytes
                .fetch_add(metrics.peak_memory_bytes, Ordering::Relaxed);
            if let Some(kind) = &metrics.exception_type {
                bump(&self.exception_types, kind);
            }
        }
    }

    /// Undo [`record_evaluation`](Self::record_evaluation) for results being
    /// replaced or removed. Extrema are left for the next recompute.
    pub fn retract_evaluation(&self, test_case: &TestCase) {
        let fitness = test_case.fitness();
        decrement(&self.evaluated);
        if test_case.is_successful() {
            decrement(&self.successful);
        } else {
            decrement(&self.failed);
        }

        self.fitness_sum.add(-fitness);
        self.fitness_square_sum.add(-(fitness * fitness));

        if let Some(metrics) = test_case.metrics() {
            subtract(
                &self.total_execution_time_nanos,
                metrics.execution_time_nanos,
            );
            subtract(&self.total_memory_bytes, metrics.peak_memory_bytes);
            if let Some(kind) = &metrics.exception_type {
                unbump(&self.exception_types, kind);
            }
        }
    }

    /// Rebuild every aggregate from scratch. Diversity is kept.
    pub fn recompute<'a>(&self, members: impl IntoIterator<Item = &'a TestCase>) {
        let diversity = self.diversity();
        self.reset();
        self.diversity.store(diversity);
        for test_case in members {
            self.record_added(test_case);
        }
    }

    /// Zero every aggregate.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.evaluated.store(0, Ordering::Relaxed);
        self.successful.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.best_fitness.store(f64::NEG_INFINITY);
        self.worst_fitness.store(f64::INFINITY);
        self.fitness_sum.store(0.0);
        self.fitness_square_sum.store(0.0);
        self.input_size_sum.store(0.0);
        self.type_complexity_sum.store(0.0);
        self.diversity.store(0.0);
        self.total_execution_time_nanos.store(0, Ordering::Relaxed);
        self.total_memory_bytes.store(0, Ordering::Relaxed);
        self.total_mutations.store(0, Ordering::Relaxed);
        self.total_crossovers.store(0, Ordering::Relaxed);
        self.target_methods.clear();
        self.exception_types.clear();
        self.input_types.clear();
    }

    pub fn set_diversity(&self, diversity: f64) {
        self.diversity.store(diversity);
    }

    pub fn total_test_cases(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn evaluated_test_cases(&self) -> usize {
        self.evaluated.load(Ordering::Relaxed)
    }

    pub fn successful_executions(&self) -> usize {
        self.successful.load(Ordering::Relaxed)
    }

    pub fn failed_executions(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Highest fitness recorded, `None` before any evaluation.
    pub fn best_fitness(&self) -> Option<f64> {
        let best = self.best_fitness.load();
        (best != f64::NEG_INFINITY).then_some(best)
    }

    pub fn worst_fitness(&self) -> Option<f64> {
        let worst = self.worst_fitness.load();
        (worst != f64::INFINITY).then_some(worst)
    }

    /// Mean fitness over evaluated members.
    pub fn average_fitness(&self) -> f64 {
        let n = self.evaluated_test_cases();
        if n == 0 {
            return 0.0;
        }
        self.fitness_sum.load() / n as f64
    }

    /// Sample variance of fitness over evaluated members.
    pub fn fitness_variance(&self) -> f64 {
        let n = self.evaluated_test_cases();
        if n < 2 {
            return 0.0;
        }
        let n = n as f64;
        let mean = self.fitness_sum.load() / n;
        ((self.fitness_square_sum.load() - n * mean * mean) / (n - 1.0)).max(0.0)
    }

    pub fn fitness_std_dev(&self) -> f64 {
        self.fitness_variance().sqrt()
    }

    pub fn average_input_size(&self) -> f64 {
        let n = self.total_test_cases();
        if n == 0 {
            return 0.0;
        }
        self.input_size_sum.load() / n as f64
    }

    pub fn average_type_complexity(&self) -> f64 {
        let n = self.total_test_cases();
        if n == 0 {
            return 0.0;
        }
        self.type_complexity_sum.load() / n as f64
    }

    pub fn diversity(&self) -> f64 {
        self.diversity.load()
    }

    pub fn total_execution_time_nanos(&self) -> u64 {
        self.total_execution_time_nanos.load(Ordering::Relaxed)
    }

    pub fn total_memory_bytes(&self) -> u64 {
        self.total_memory_bytes.load(Ordering::Relaxed)
    }

    pub fn total_mutations(&self) -> u64 {
        self.total_mutations.load(Ordering::Relaxed)
    }

    pub fn total_crossovers(&self) -> u64 {
        self.total_crossovers.load(Ordering::Relaxed)
    }

    /// Percentage of evaluated members that ran successfully.
    pub fn success_rate(&self) -> f64 {
        let n = self.evaluated_test_cases();
        if n == 0 {
            return 0.0;
        }
        self.successful_executions() as f64 * 100.0 / n as f64
    }

    pub fn average_execution_time_ms(&self) -> f64 {
        let n = self.evaluated_test_cases();
        if n == 0 {
            return 0.0;
        }
        self.total_execution_time_nanos() as f64 / n as f64 / 1_000_000.0
    }

    pub fn average_memory_mb(&self) -> f64 {
        let n = self.evaluated_test_cases();
        if n == 0 {
            return 0.0;
        }
        self.total_memory_bytes() as f64 / n as f64 / (1024.0 * 1024.0)
    }

    pub fn top_target_methods(&self, n: usize) -> Vec<(String, usize)> {
        top_k(&self.target_methods, n)
    }

    pub fn top_exception_types(&self, n: usize) -> Vec<(String, usize)> {
        top_k(&self.exception_types, n)
    }

    pub fn top_input_types(&self, n: usize) -> Vec<(String, usize)> {
        top_k(&self.input_types, n)
    }

    /// Serializable copy of the current aggregates.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total_test_cases: self.total_test_cases(),
            evaluated_test_cases: self.evaluated_test_cases(),
            successful_executions: self.successful_executions(),
            failed_executions: self.failed_executions(),
            best_fitness: self.best_fitness(),
            worst_fitness: self.worst_fitness(),
            average_fitness: self.average_fitness(),
            fitness_variance: self.fitness_variance(),
            average_input_size: self.average_input_size(),
            average_type_complexity: self.average_type_complexity(),
            diversity: self.diversity(),
            total_execution_time_nanos: self.total_execution_time_nanos(),
            total_memory_bytes: self.total_memory_bytes(),
            total_mutations: self.total_mutations(),
            total_crossovers: self.total_crossovers(),
            success_rate: self.success_rate(),
            average_execution_time_ms: self.average_execution_time_ms(),
            average_memory_mb: self.average_memory_mb(),
            top_target_methods: self.top_target_methods(SNAPSHOT_TOP_K),
            top_exception_types: self.top_exception_types(SNAPSHOT_TOP_K),
            top_input_types: self.top_input_types(SNAPSHOT_TOP_K),
        }
    }
}
