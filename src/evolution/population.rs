//! Bounded, concurrently readable population of test cases for one target.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, warn};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rayon::prelude::*;

use crate::harness::ExecutionHarness;
use crate::schema::{ConfigError, ExecutionMetrics, FuzzerError, TestCase, TestCaseId};

use super::fitness::FitnessFunction;
use super::statistics::PopulationStatistics;

/// Population of test cases targeting a single operation.
///
/// Membership lives in a concurrent map. Adds reserve a slot against
/// `max_size` before inserting, so the size bound holds under concurrent
/// writers. During [`evaluate_all`](Self::evaluate_all) only the
/// fitness/metrics pair of existing members is replaced.
pub struct Population {
    members: DashMap<TestCaseId, Arc<TestCase>>,
    len: AtomicUsize,
    target: String,
    max_size: usize,
    generation: AtomicUsize,
    fitness: Arc<dyn FitnessFunction>,
    statistics: PopulationStatistics,
    parallel_workers: usize,
    pool: Option<rayon::ThreadPool>,
}

/// Builder for [`Population`]. A fitness function is mandatory.
pub struct PopulationBuilder {
    target: String,
    max_size: usize,
    generation: usize,
    fitness: Option<Arc<dyn FitnessFunction>>,
    parallel_workers: usize,
    initial: Vec<TestCase>,
}

impl PopulationBuilder {
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn generation(mut self, generation: usize) -> Self {
        self.generation = generation;
        self
    }

    pub fn fitness_function(mut self, fitness: Arc<dyn FitnessFunction>) -> Self {
        self.fitness = Some(fitness);
        self
    }

    /// 0 uses the global rayon pool, 1 evaluates sequentially, anything
    /// larger gets a dedicated pool of that many threads.
    pub fn parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers;
        self
    }

    /// Members added on build, subject to the size bound.
    pub fn initial_test_cases(mut self, test_cases: Vec<TestCase>) -> Self {
        self.initial = test_cases;
        self
    }

    pub fn build(self) -> Result<Population, FuzzerError> {
        let fitness = self.fitness.ok_or(FuzzerError::MissingFitnessFunction)?;
        if self.max_size == 0 {
            return Err(ConfigError::InvalidPopulationSize.into());
        }

        let population =
            Population::with_fitness(self.target, self.max_size, self.parallel_workers, fitness);
        population.set_generation(self.generation);
        for test_case in self.initial {
            population.add(test_case);
        }
        Ok(population)
    }
}

impl Population {
    pub fn builder(target: impl Into<String>) -> PopulationBuilder {
        PopulationBuilder {
            target: target.into(),
            max_size: 100,
            generation: 0,
            fitness: None,
            parallel_workers: 0,
            initial: Vec::new(),
        }
    }

    /// Empty population with a mandatory fitness function. A zero
    /// `max_size` is raised to 1.
    pub(crate) fn with_fitness(
        target: impl Into<String>,
        max_size: usize,
        parallel_workers: usize,
        fitness: Arc<dyn FitnessFunction>,
    ) -> Self {
        let max_size = max_size.max(1);
        let pool = if parallel_workers > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(parallel_workers)
                .build()
                .map_err(|e| warn!("Falling back to the global evaluation pool: {e}"))
                .ok()
        } else {
            None
        };

        Self {
            members: DashMap::with_capacity(max_size),
            len: AtomicUsize::new(0),
            target: target.into(),
            max_size,
            generation: AtomicUsize::new(0),
            fitness,
            statistics: PopulationStatistics::new(),
            parallel_workers,
            pool,
        }
    }

    /// Insert a member. Returns false when full or when the test case
    /// belongs to another target. A member with the same id is replaced in
    /// place, even at capacity.
    pub fn add(&self, test_case: impl Into<Arc<TestCase>>) -> bool {
        let test_case = test_case.into();
        if test_case.target() != self.target {
            warn!(
                "Rejecting test case {} for target {} in population of {}",
                test_case.id(),
                test_case.target(),
                self.target
            );
            return false;
        }

        match self.members.entry(test_case.id()) {
            // Replacing an existing member keeps its slot.
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(Arc::clone(&test_case));
                self.statistics.record_removed(&previous);
                self.statistics.record_added(&test_case);
                true
            }
            Entry::Vacant(vacant) => {
                let reserved = self
                    .len
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < self.max_size).then_some(n + 1)
                    })
                    .is_ok();
                if !reserved {
                    warn!(
                        "Population for {} is full ({}), dropping test case {}",
                        self.target,
                        self.max_size,
                        test_case.id()
                    );
                    return false;
                }

                self.statistics.record_added(&test_case);
                vacant.insert(test_case);
                true
            }
        }
    }

    pub fn remove(&self, id: TestCaseId) -> Option<Arc<TestCase>> {
        let (_, removed) = self.members.remove(&id)?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        self.statistics.record_removed(&removed);
        Some(removed)
    }

    pub fn get(&self, id: TestCaseId) -> Option<Arc<TestCase>> {
        self.members.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of every member, ordered by id.
    pub fn all_test_cases(&self) -> Vec<Arc<TestCase>> {
        let mut members: Vec<Arc<TestCase>> = self
            .members
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        members.sort_by_key(|tc| tc.id());
        members
    }

    /// Snapshot ordered by fitness, highest first. Ties go to the older id.
    pub fn test_cases_by_fitness(&self) -> Vec<Arc<TestCase>> {
        let mut members = self.all_test_cases();
        members.sort_by(|a, b| {
            b.fitness()
                .total_cmp(&a.fitness())
                .then_with(|| a.id().cmp(&b.id()))
        });
        members
    }

    pub fn top_test_cases(&self, n: usize) -> Vec<Arc<TestCase>> {
        let mut ranked = self.test_cases_by_fitness();
        ranked.truncate(n);
        ranked
    }

    pub fn best_test_case(&self) -> Option<Arc<TestCase>> {
        self.test_cases_by_fitness().into_iter().next()
    }

    pub fn worst_test_case(&self) -> Option<Arc<TestCase>> {
        self.test_cases_by_fitness().pop()
    }

    /// `count` independent tournaments of `tournament_size` draws with
    /// replacement. Empty when the population is empty.
    pub fn tournament_selection<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        tournament_size: usize,
        count: usize,
    ) -> Vec<Arc<TestCase>> {
        let members = self.all_test_cases();
        if members.is_empty() {
            return Vec::new();
        }

        let mut selected = Vec::with_capacity(count);
        for _ in 0..count {
            let mut best = &members[rng.gen_range(0..members.len())];
            for _ in 1..tournament_size {
                let contender = &members[rng.gen_range(0..members.len())];
                if contender.fitness() > best.fitness() {
                    best = contender;
                }
            }
            selected.push(Arc::clone(best));
        }
        selected
    }

    /// Fitness-proportionate selection over non-negative fitness. Uniform
    /// when no member has positive fitness.
    pub fn roulette_wheel_selection<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: usize,
    ) -> Vec<Arc<TestCase>> {
        let members = self.all_test_cases();
        if members.is_empty() {
            return Vec::new();
        }

        let weights = members.iter().map(|tc| tc.fitness().max(0.0));
        match WeightedIndex::new(weights) {
            Ok(wheel) => (0..count)
                .map(|_| Arc::clone(&members[wheel.sample(rng)]))
                .collect(),
            Err(_) => (0..count)
                .filter_map(|_| members.choose(rng).cloned())
                .collect(),
        }
    }

    /// Mean pairwise distance over all unordered pairs. Distance averages
    /// the input size, type complexity and fitness differences.
    pub fn calculate_diversity(&self) -> f64 {
        let points: Vec<[f64; 3]> = self
            .members
            .iter()
            .map(|entry| {
                let tc = entry.value();
                [tc.input_size(), tc.input_type_complexity(), tc.fitness()]
            })
            .collect();
        if points.len() < 2 {
            return 0.0;
        }

        let mut total = 0.0;
        let mut pairs = 0usize;
        for (i, a) in points.iter().enumerate() {
            for b in &points[i + 1..] {
                total += a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f64>() / 3.0;
                pairs += 1;
            }
        }
        total / pairs as f64
    }

    /// Evict the `n` lowest-fitness members.
    pub fn remove_worst_test_cases(&self, n: usize) -> Vec<Arc<TestCase>> {
        let ranked = self.test_cases_by_fitness();
        ranked
            .iter()
            .rev()
            .take(n)
            .filter_map(|tc| self.remove(tc.id()))
            .collect()
    }

    /// Swap in a new generation. Members past `max_size` are dropped.
    ///
    /// Must not run concurrently with [`evaluate_all`](Self::evaluate_all).
    pub fn replace_population<I, T>(&self, test_cases: I) -> usize
    where
        I: IntoIterator<Item = T>,
        T: Into<Arc<TestCase>>,
    {
        self.members.clear();
        self.len.store(0, Ordering::Release);
        self.statistics.reset();

        let mut added = 0;
        for test_case in test_cases {
            if self.is_full() {
                break;
            }
            if self.add(test_case) {
                added += 1;
            }
        }
        added
    }

    /// Attach new results to a member, replacing the previous pair as one
    /// unit. Returns false when the member is gone.
    pub fn update_fitness(
        &self,
        id: TestCaseId,
        fitness: f64,
        metrics: Option<ExecutionMetrics>,
    ) -> bool {
        let Some(mut entry) = self.members.get_mut(&id) else {
            return false;
        };

        let updated = Arc::new(entry.with_execution_results(fitness, metrics));
        if entry.is_evaluated() {
            self.statistics.retract_evaluation(entry.value());
        }
        self.statistics.record_evaluation(&updated);
        *entry = updated;
        true
    }

    /// Execute and score every member.
    ///
    /// Harness errors score 0 with no metrics. Executions run on the
    /// configured worker pool.
    pub fn evaluate_all(&self, harness: &dyn ExecutionHarness) {
        let members = self.all_test_cases();
        debug!(
            "Evaluating {} test cases for {} (generation {})",
            members.len(),
            self.target,
            self.generation()
        );

        let evaluate = |tc: &Arc<TestCase>| self.evaluate_one(tc, harness);
        match (&self.pool, self.parallel_workers) {
            (_, 1) => members.iter().for_each(evaluate),
            (Some(pool), _) => pool.install(|| members.par_iter().for_each(evaluate)),
            (None, _) => members.par_iter().for_each(evaluate),
        }

        debug!(
            "Evaluated {} test cases for {}: {} succeeded, {} failed",
            members.len(),
            self.target,
            self.statistics.successful_executions(),
            self.statistics.failed_executions()
        );
    }

    fn evaluate_one(&self, test_case: &TestCase, harness: &dyn ExecutionHarness) {
        let (fitness, metrics) = match harness.execute(test_case) {
            Ok(metrics) => (self.fitness.evaluate(test_case, Some(&metrics)), Some(metrics)),
            Err(e) => {
                warn!("Execution of test case {} failed: {e}", test_case.id());
                (0.0, None)
            }
        };
        self.update_fitness(test_case.id(), fitness, metrics);
    }

    /// Rebuild statistics from current membership.
    pub fn recompute_statistics(&self) {
        let members = self.all_test_cases();
        self.statistics
            .recompute(members.iter().map(|tc| tc.as_ref()));
    }

    pub fn statistics(&self) -> &PopulationStatistics {
        &self.statistics
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn generation(&self) -> usize {
        self.generation.load(Ordering::Relaxed)
    }

    pub fn set_generation(&self, generation: usize) {
        self.generation.store(generation, Ordering::Relaxed);
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn fitness_function(&self) -> &Arc<dyn FitnessFunction> {
        &self.fitness
    }
}

impl fmt::Debug for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Population")
            .field("target", &self.target)
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .field("generation", &self.generation())
            .field("fitness", &self.fitness.name())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Population[{}] generation {}: {}/{} members, best {}, diversity {:.3}",
            self.target,
            self.generation(),
            self.len(),
            self.max_size,
            self.statistics
                .best_fitness()
                .map_or_else(|| "n/a".to_string(), |b| format!("{b:.3}")),
            self.statistics.diversity()
        )
    }
}
