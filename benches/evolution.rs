//! Benchmarks for value generation, genetic operators and the generation loop.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use complexity_fuzzer::{
    evolution::{Evolver, GeneticOperators, ValueGenerator},
    harness::{CostModel, CostModelHarness},
    schema::{
        FuzzerConfig, GeneratorConfig, GeneticAlgorithmConfig, PrimitiveKind, TargetSignature,
        TypeDescriptor,
    },
};

fn signature() -> TargetSignature {
    TargetSignature::new(
        "sort",
        vec![
            TypeDescriptor::Text,
            TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::Int)),
            TypeDescriptor::list_of(TypeDescriptor::map_of(
                TypeDescriptor::Text,
                TypeDescriptor::primitive(PrimitiveKind::Double),
            )),
        ],
    )
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_test_case");
    let signature = signature();

    for limit in [10, 100, 1000] {
        let config = GeneratorConfig {
            max_string_length: limit,
            max_collection_size: limit,
            max_array_length: limit,
            ..Default::default()
        };
        let mut generator = ValueGenerator::new(config, 42);

        group.bench_with_input(BenchmarkId::from_parameter(limit), &limit, |b, _| {
            b.iter(|| black_box(generator.generate_test_case(&signature, 0)));
        });
    }

    group.finish();
}

fn bench_operators(c: &mut Criterion) {
    let signature = signature();
    let mut generator = ValueGenerator::new(GeneratorConfig::default(), 7);
    let first = generator.generate_test_case(&signature, 0);
    let second = generator.generate_test_case(&signature, 0);
    let mut operators = GeneticOperators::new(ValueGenerator::new(GeneratorConfig::default(), 8));

    c.bench_function("mutate", |b| {
        b.iter(|| black_box(operators.mutate(black_box(&first))));
    });

    c.bench_function("crossover", |b| {
        b.iter(|| black_box(operators.crossover(black_box(&first), black_box(&second))));
    });
}

fn bench_evolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("evolve");
    group.sample_size(10);
    let signature = signature();
    let harness = CostModelHarness::with_model(CostModel::Quadratic);

    for size in [20, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let config = FuzzerConfig {
                    genetic: GeneticAlgorithmConfig {
                        population_size: size,
                        max_generations: 5,
                        ..Default::default()
                    },
                    random_seed: Some(1),
                    ..Default::default()
                };
                let fitness = config.fitness.build();
                let mut evolver = Evolver::new(config);
                black_box(evolver.evolve_test_cases("sort", &signature, fitness, &harness))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_generate, bench_operators, bench_evolve);
criterion_main!(benches);
