//! Generation loop: seeding, evaluation, stagnation and diversity checks,
//! elitism and breeding.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info, warn};
use rand::prelude::*;

use crate::harness::{ExecutionHarness, TargetDescriptorProvider};
use crate::schema::{
    EvolutionPhase, EvolutionSummary, FuzzerConfig, GenerationReport, GeneticAlgorithmConfig,
    StopReason, TargetSignature, TestCase,
};

use super::fitness::FitnessFunction;
use super::generator::ValueGenerator;
use super::operators::GeneticOperators;
use super::population::Population;

/// Outcome of one evolution run.
#[derive(Debug)]
pub struct EvolutionResult {
    pub target: String,
    /// Test cases that set a new running-best fitness, in discovery order.
    pub best_test_cases: Vec<Arc<TestCase>>,
    pub final_population: Population,
    /// Generations evaluated.
    pub generations_completed: usize,
    /// Running best, 0 when nothing was evaluated.
    pub best_fitness: f64,
    pub stop_reason: StopReason,
    pub history: Vec<GenerationReport>,
    pub elapsed_seconds: f64,
    pub total_evaluations: u64,
}

impl EvolutionResult {
    /// Recorded bests with fitness at or above `threshold`.
    pub fn potential_vulnerabilities(&self, threshold: f64) -> Vec<Arc<TestCase>> {
        self.best_test_cases
            .iter()
            .filter(|tc| tc.fitness() >= threshold)
            .cloned()
            .collect()
    }

    pub fn most_promising_test_case(&self) -> Option<Arc<TestCase>> {
        self.best_test_cases
            .iter()
            .max_by(|a, b| a.fitness().total_cmp(&b.fitness()))
            .cloned()
    }

    pub fn evaluations_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.total_evaluations as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Serializable view of the run.
    pub fn summary(&self) -> EvolutionSummary {
        EvolutionSummary {
            target: self.target.clone(),
            generations_completed: self.generations_completed,
            best_fitness: self.best_fitness,
            stop_reason: self.stop_reason,
            elapsed_seconds: self.elapsed_seconds,
            total_evaluations: self.total_evaluations,
            best_test_cases: self
                .best_test_cases
                .iter()
                .map(|tc| TestCase::clone(tc))
                .collect(),
            final_statistics: self.final_population.statistics().snapshot(),
            history: self.history.clone(),
        }
    }
}

/// Genetic-algorithm driver.
pub struct Evolver {
    config: FuzzerConfig,
    generator: ValueGenerator,
    operators: GeneticOperators,
    rng: StdRng,
    generation: usize,
    cancelled: Arc<AtomicBool>,
}

impl Evolver {
    pub fn new(config: FuzzerConfig) -> Self {
        let seed = config.random_seed.unwrap_or_else(rand::random);
        let mut generator = ValueGenerator::new(config.generator.clone(), seed);
        let operators = GeneticOperators::new(ValueGenerator::new(
            config.generator.clone(),
            generator.next_seed(),
        ));
        let rng = StdRng::seed_from_u64(generator.next_seed());

        Self {
            config,
            generator,
            operators,
            rng,
            generation: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the flag stops the run at the next generation boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn config(&self) -> &FuzzerConfig {
        &self.config
    }

    /// Generation counter, carried across runs until reset.
    pub fn current_generation(&self) -> usize {
        self.generation
    }

    pub fn reset_generation_counter(&mut self) {
        self.generation = 0;
    }

    /// Evolve test cases for `target`.
    pub fn evolve_test_cases(
        &mut self,
        target: &str,
        provider: &dyn TargetDescriptorProvider,
        fitness: Arc<dyn FitnessFunction>,
        harness: &dyn ExecutionHarness,
    ) -> EvolutionResult {
        self.evolve_with_callback(target, provider, fitness, harness, |_| {})
    }

    /// Evolve with a callback invoked once per evaluated generation.
    pub fn evolve_with_callback<F>(
        &mut self,
        target: &str,
        provider: &dyn TargetDescriptorProvider,
        fitness: Arc<dyn FitnessFunction>,
        harness: &dyn ExecutionHarness,
        mut callback: F,
    ) -> EvolutionResult
    where
        F: FnMut(&GenerationReport),
    {
        let start_time = Instant::now();
        let ga = self.config.genetic.clone();

        let slots = provider.descriptors(target).unwrap_or_else(|| {
            warn!("No input descriptors for {target}, evolving zero-argument calls");
            Vec::new()
        });
        let signature = TargetSignature::new(target, slots);

        let population = Population::with_fitness(
            target,
            ga.population_size,
            self.config.evaluation.parallel_workers,
            fitness,
        );
        population.set_generation(self.generation);
        self.seed_population(&population, &signature);

        info!(
            "Evolving {} test cases for {target} with {} fitness, up to {} generations",
            population.len(),
            population.fitness_function().name(),
            ga.max_generations
        );

        let mut best_fitness = f64::NEG_INFINITY;
        let mut best_test_cases = Vec::new();
        let mut stagnation_count = 0;
        let mut generations_completed = 0;
        let mut total_evaluations = 0u64;
        let mut history = Vec::new();

        let stop_reason = loop {
            if self.cancelled.load(Ordering::Relaxed) {
                info!("Cancelled evolution of {target} at generation {}", self.generation);
                let mut report = self.report(
                    &population,
                    &ga,
                    best_fitness,
                    f64::NEG_INFINITY,
                    stagnation_count,
                );
                report.phase = StopReason::Cancelled.phase();
                callback(&report);
                history.push(report);
                break StopReason::Cancelled;
            }
            if generations_completed >= ga.max_generations {
                break StopReason::MaxGenerations;
            }

            population.evaluate_all(harness);
            population.recompute_statistics();
            total_evaluations += population.len() as u64;
            generations_completed += 1;

            let generation_best = population.best_test_case();
            let generation_best_fitness = generation_best
                .as_ref()
                .map_or(f64::NEG_INFINITY, |tc| tc.fitness());
            match generation_best {
                Some(tc) if tc.fitness() > best_fitness => {
                    info!(
                        "New best fitness {:.4} for {target} at generation {} (test case {})",
                        tc.fitness(),
                        self.generation,
                        tc.id()
                    );
                    best_fitness = tc.fitness();
                    best_test_cases.push(tc);
                    stagnation_count = 0;
                }
                _ => stagnation_count += 1,
            }

            let mut report = self.report(
                &population,
                &ga,
                best_fitness,
                generation_best_fitness,
                stagnation_count,
            );
            debug!(
                "Generation {} of {target}: {}, top exceptions {:?}",
                self.generation,
                report.statistics,
                &report.statistics.top_exception_types
                    [..report.statistics.top_exception_types.len().min(3)]
            );

            let stop = if stagnation_count >= ga.stagnation_limit {
                info!("Stopping {target}: no improvement for {stagnation_count} generations");
                Some(StopReason::Stagnation)
            } else if generations_completed >= ga.max_generations {
                Some(StopReason::MaxGenerations)
            } else {
                None
            };
            if let Some(stop) = stop {
                report.phase = stop.phase();
                callback(&report);
                history.push(report);
                break stop;
            }

            if report.diversity < ga.diversity_threshold {
                report.diversity_injected =
                    self.inject_diversity(&population, &signature, report.diversity, &ga);
            }

            let next = self.breed(&population, &signature, &ga);
            population.replace_population(next);
            self.generation += 1;
            population.set_generation(self.generation);

            callback(&report);
            history.push(report);
        };

        let best_fitness = finite_or_zero(best_fitness);
        info!(
            "Finished evolving {target}: {stop_reason:?} after {generations_completed} generations, best fitness {best_fitness:.4}"
        );

        EvolutionResult {
            target: target.to_string(),
            best_test_cases,
            final_population: population,
            generations_completed,
            best_fitness,
            stop_reason,
            history,
            elapsed_seconds: start_time.elapsed().as_secs_f64(),
            total_evaluations,
        }
    }

    /// Report for the current generation. Records the population diversity
    /// in its statistics first.
    fn report(
        &self,
        population: &Population,
        ga: &GeneticAlgorithmConfig,
        best_fitness: f64,
        generation_best: f64,
        stagnation_count: usize,
    ) -> GenerationReport {
        let diversity = population.calculate_diversity();
        population.statistics().set_diversity(diversity);

        GenerationReport {
            generation: self.generation,
            total_generations: ga.max_generations,
            phase: EvolutionPhase::Breeding,
            best_fitness: finite_or_zero(best_fitness),
            generation_best: finite_or_zero(generation_best),
            stagnation_count,
            diversity,
            diversity_injected: false,
            effective_mutation_rate: ga.effective_mutation_rate(stagnation_count),
            statistics: population.statistics().snapshot(),
        }
    }

    /// Half random cases, every edge case, then random cases up to size.
    fn seed_population(&mut self, population: &Population, signature: &TargetSignature) {
        let size = population.max_size();
        let mut seeds = Vec::with_capacity(size);
        for _ in 0..size / 2 {
            seeds.push(self.generator.generate_test_case(signature, self.generation));
        }
        seeds.extend(self.generator.edge_cases(signature, self.generation));
        while seeds.len() < size {
            seeds.push(self.generator.generate_test_case(signature, self.generation));
        }
        seeds.truncate(size);
        population.replace_population(seeds);
    }

    /// Replace the worst fifth with edge cases and fresh random cases.
    fn inject_diversity(
        &mut self,
        population: &Population,
        signature: &TargetSignature,
        diversity: f64,
        ga: &GeneticAlgorithmConfig,
    ) -> bool {
        let evict = population.len() / 5;
        if evict == 0 {
            return false;
        }

        population.remove_worst_test_cases(evict);
        let mut fresh = self.generator.edge_cases(signature, self.generation);
        while fresh.len() < evict {
            fresh.push(self.generator.generate_test_case(signature, self.generation));
        }
        fresh.truncate(evict);
        for test_case in fresh {
            population.add(test_case);
        }

        info!(
            "Diversity {diversity:.4} below {:.4} for {}: replaced {evict} test cases",
            ga.diversity_threshold,
            signature.target
        );
        true
    }

    /// Elites followed by offspring until the configured size is reached.
    fn breed(
        &mut self,
        population: &Population,
        signature: &TargetSignature,
        ga: &GeneticAlgorithmConfig,
    ) -> Vec<Arc<TestCase>> {
        let size = ga.population_size;
        let mut next = population.top_test_cases(ga.elite_count());

        while next.len() < size {
            let offspring = if self.rng.r#gen::<f64>() < ga.crossover_rate {
                let parents = population.tournament_selection(&mut self.rng, ga.tournament_size, 2);
                match parents.as_slice() {
                    [first, second] => match self.operators.crossover(first, second) {
                        Ok(child) => child,
                        Err(e) => {
                            debug!("Crossover failed, mutating instead: {e}");
                            self.operators.mutate(first)
                        }
                    },
                    _ => self.fresh_offspring(signature),
                }
            } else {
                let parents = population.tournament_selection(&mut self.rng, ga.tournament_size, 1);
                match parents.first() {
                    Some(parent) => self.operators.mutate(parent),
                    None => self.fresh_offspring(signature),
                }
            };
            next.push(Arc::new(offspring));
        }

        next.truncate(size);
        next
    }

    fn fresh_offspring(&mut self, signature: &TargetSignature) -> TestCase {
        self.generator
            .generate_test_case(signature, self.generation + 1)
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
