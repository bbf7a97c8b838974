//! Quick evolution performance test

use complexity_fuzzer::{
    Evolver,
    harness::{CostModel, CostModelHarness},
    schema::{
        EvaluationConfig, FuzzerConfig, GeneratorConfig, GeneticAlgorithmConfig, PrimitiveKind,
        TargetSignature, TypeDescriptor,
    },
};
use std::time::Instant;

fn signature() -> TargetSignature {
    TargetSignature::new(
        "parse",
        vec![
            TypeDescriptor::Text,
            TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::Long)),
            TypeDescriptor::map_of(TypeDescriptor::Text, TypeDescriptor::Text),
        ],
    )
}

fn config(population_size: usize, max_generations: usize, workers: usize) -> FuzzerConfig {
    FuzzerConfig {
        genetic: GeneticAlgorithmConfig {
            population_size,
            max_generations,
            // Run every generation
            stagnation_limit: usize::MAX,
            ..Default::default()
        },
        generator: GeneratorConfig {
            max_string_length: 200,
            max_collection_size: 50,
            max_array_length: 50,
            ..Default::default()
        },
        evaluation: EvaluationConfig {
            parallel_workers: workers,
        },
        random_seed: Some(42),
        ..Default::default()
    }
}

fn main() {
    println!("=== Evolution Performance Test ===\n");

    // Test different cost models
    for model in [
        CostModel::Linear,
        CostModel::Quadratic,
        CostModel::Backtracking { cap: 24 },
    ] {
        println!("Cost model: {:?}", model);

        let harness = CostModelHarness::with_model(model);
        let config = config(40, 20, 0);
        let fitness = config.fitness.build();

        let start = Instant::now();
        let mut evolver = Evolver::new(config);
        let result = evolver.evolve_test_cases("parse", &signature(), fitness, &harness);
        let elapsed = start.elapsed();

        let evals_per_sec = result.total_evaluations as f64 / elapsed.as_secs_f64();

        println!("  Generations:    {}", result.generations_completed);
        println!("  Evaluations:    {}", result.total_evaluations);
        println!("  Elapsed:        {:.2}s", elapsed.as_secs_f64());
        println!("  Evals/sec:      {:.1}", evals_per_sec);
        println!("  Best fitness:   {:.4}", result.best_fitness);
        println!("  Stop reason:    {:?}", result.stop_reason);
        println!();
    }

    println!("=== Scalability Test (quadratic model) ===\n");

    // Test different population sizes and worker counts
    let harness = CostModelHarness::with_model(CostModel::Quadratic);
    for pop_size in [10, 20, 40, 80] {
        for workers in [1, 0] {
            let config = config(pop_size, 10, workers);
            let fitness = config.fitness.build();

            let start = Instant::now();
            let mut evolver = Evolver::new(config);
            let result = evolver.evolve_test_cases("parse", &signature(), fitness, &harness);
            let elapsed = start.elapsed();

            let ms_per_gen =
                elapsed.as_secs_f64() * 1000.0 / result.generations_completed.max(1) as f64;
            println!(
                "  Pop {:3} ({}): {:.1}ms/gen, {:.1} evals/sec",
                pop_size,
                if workers == 1 { "sequential" } else { "parallel" },
                ms_per_gen,
                result.total_evaluations as f64 / elapsed.as_secs_f64()
            );
        }
    }
}
