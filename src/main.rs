//! Complexity fuzzer CLI - evolve inputs against a cost-model harness.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use complexity_fuzzer::{
    evolution::Evolver,
    harness::{CostModel, CostModelConfig, CostModelHarness},
    schema::{FuzzerConfig, PrimitiveKind, TargetSignature, TypeDescriptor},
};

/// Target operation plus the cost model standing in for its execution.
#[derive(Debug, Serialize, Deserialize)]
struct TargetFile {
    #[serde(flatten)]
    signature: TargetSignature,
    #[serde(default)]
    harness: CostModelConfig,
}

impl Default for TargetFile {
    fn default() -> Self {
        Self {
            signature: TargetSignature::new(
                "regex_match",
                vec![
                    TypeDescriptor::Text,
                    TypeDescriptor::primitive(PrimitiveKind::Int),
                    TypeDescriptor::list_of(TypeDescriptor::Text),
                ],
            ),
            harness: CostModelConfig {
                model: CostModel::Backtracking { cap: 24 },
                timeout_nanos: Some(5_000_000_000),
                ..Default::default()
            },
        }
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [target.json]", args[0]);
        eprintln!();
        eprintln!("Evolve inputs that maximize the cost of a target operation.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to fuzzer configuration file");
        eprintln!("  target.json  Target signature and cost model");
        eprintln!("               (default: <config>.target.json, else a built-in example)");
        eprintln!();
        eprintln!("Example files are generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let config = FuzzerConfig::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Error loading config: {}", e);
        std::process::exit(1);
    });

    let target_path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_path.with_extension("target.json"));
    let target = load_target(&target_path);

    let generations = config.genetic.max_generations;
    println!("Complexity Fuzzer");
    println!("=================");
    println!("Target: {}", target.signature.target);
    println!(
        "Inputs: {}",
        target
            .signature
            .slots
            .iter()
            .map(TypeDescriptor::kind_name)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Cost model: {:?}", target.harness.model);
    println!(
        "Population: {} for up to {} generations",
        config.genetic.population_size, generations
    );
    println!();

    let fitness = config.fitness.build();
    println!("Fitness: {}", fitness.name());
    println!("Running evolution...");

    let harness = CostModelHarness::new(target.harness);
    let mut evolver = Evolver::new(config);
    let start = Instant::now();
    let interval = (generations / 10).max(1);

    let result = evolver.evolve_with_callback(
        &target.signature.target,
        &target.signature,
        fitness,
        &harness,
        |report| {
            // Print progress every 10%
            if (report.generation + 1) % interval == 0 || report.phase.is_terminal() {
                let elapsed = start.elapsed().as_secs_f32();
                println!(
                    "  Generation {}/{}: best={:.4}, gen_best={:.4}, diversity={:.3}, stagnation={}, {:.1} gen/s",
                    report.generation + 1,
                    report.total_generations,
                    report.best_fitness,
                    report.generation_best,
                    report.diversity,
                    report.stagnation_count,
                    (report.generation + 1) as f32 / elapsed.max(f32::EPSILON)
                );
            }
        },
    );

    println!();
    println!("Stopped: {:?}", result.stop_reason);
    println!("Generations: {}", result.generations_completed);
    println!("Best fitness: {:.4}", result.best_fitness);
    println!(
        "Time: {:.2}s ({:.1} evaluations/s)",
        result.elapsed_seconds,
        result.evaluations_per_second()
    );

    let fitness = result.final_population.fitness_function();
    let retained = result
        .best_test_cases
        .iter()
        .filter(|tc| fitness.should_retain(tc.fitness()))
        .count();
    println!("Retained findings: {}", retained);
    println!();
    println!("{}", to_json(&result.summary()));
}

fn load_target(path: &Path) -> TargetFile {
    if !path.exists() {
        eprintln!(
            "No target file at {}, using the built-in example target",
            path.display()
        );
        return TargetFile::default();
    }

    let target_str = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading target file: {}", e);
        std::process::exit(1);
    });
    serde_json::from_str(&target_str).unwrap_or_else(|e| {
        eprintln!("Error parsing target: {}", e);
        std::process::exit(1);
    })
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error serializing output: {}", e);
        std::process::exit(1);
    })
}

fn print_example_config() {
    let config = FuzzerConfig::default();
    let target = TargetFile::default();

    println!("Example configuration (config.json):");
    println!("{}", to_json(&config));
    println!();
    println!("Example target (config.target.json):");
    println!("{}", to_json(&target));
}
