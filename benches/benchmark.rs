// Performance benchmarks for scoring, blocking and clustering
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use relink::{
    BlockIndex, Classifier, Clusterer, Dataset, DistanceType, FeatureBuilder, FieldSpec,
    PairwiseScorer, Predicate, PredicateKind, PredicateSet, Record, RecordId, RecordPair,
    ScoredPair, ScoredPairs, SimilaritySchema, SimplePredicate,
};
use std::sync::Arc;

const SYLLABLES: [&str; 12] = [
    "ka", "lo", "mi", "ren", "sa", "to", "vel", "an", "dor", "is", "bru", "nex",
];
const CITIES: [&str; 6] = ["oslo", "lima", "kyiv", "doha", "rome", "baku"];

fn random_name(rng: &mut StdRng) -> String {
    let words = rng.random_range(2..4);
    (0..words)
        .map(|_| {
            let parts = rng.random_range(2..4);
            (0..parts)
                .map(|_| SYLLABLES[rng.random_range(0..SYLLABLES.len())])
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop or double one character.
fn typo(name: &str, rng: &mut StdRng) -> String {
    let mut chars: Vec<char> = name.chars().collect();
    let at = rng.random_range(0..chars.len());
    if rng.random_bool(0.5) {
        chars.remove(at);
    } else {
        chars.insert(at, chars[at]);
    }
    chars.into_iter().collect()
}

/// Two catalogs of `size` records where most right records are typo'd
/// copies of a left one.
fn generate_catalogs(size: usize) -> Dataset {
    let mut rng = StdRng::seed_from_u64(42);
    let mut left = Vec::with_capacity(size);
    let mut right = Vec::with_capacity(size);
    for i in 0..size {
        let name = random_name(&mut rng);
        let city = CITIES[rng.random_range(0..CITIES.len())];
        let copy = if rng.random_bool(0.8) {
            typo(&name, &mut rng)
        } else {
            random_name(&mut rng)
        };
        left.push(Record::new(format!("l{i}")).with_field("name", name).with_field("city", city));
        right.push(Record::new(format!("r{i}")).with_field("name", copy).with_field("city", city));
    }
    Dataset::link(left, right).unwrap()
}

fn schema() -> SimilaritySchema {
    SimilaritySchema::new(vec![
        FieldSpec::string("name").with_distance(DistanceType::Levenshtein),
        FieldSpec::categorical("city"),
    ])
    .unwrap()
}

fn predicates() -> PredicateSet {
    PredicateSet::new(vec![
        Predicate::Simple(SimplePredicate::new("name", PredicateKind::Prefix(3))),
        Predicate::Compound(
            SimplePredicate::new("name", PredicateKind::TokenField),
            SimplePredicate::new("city", PredicateKind::WholeField),
        ),
    ])
}

fn scorer() -> PairwiseScorer {
    let classifier = Classifier::from_parts(vec![6.0, 1.0], vec![-1.0; 2], -4.0, 0.01).unwrap();
    PairwiseScorer::new(FeatureBuilder::new(&schema()), Arc::new(classifier)).unwrap()
}

fn benchmark_blocking(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_index");

    for size in [1_000, 10_000] {
        let data = generate_catalogs(size);
        let predicates = predicates();
        group.bench_with_input(BenchmarkId::new("build", size), &data, |b, data| {
            b.iter(|| black_box(BlockIndex::build(&predicates, data).candidate_pairs()));
        });
    }

    group.finish();
}

fn benchmark_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("score");
    let scorer = scorer();

    for size in [1_000, 10_000] {
        let data = generate_catalogs(size);
        let candidates = BlockIndex::build(&predicates(), &data).candidate_pairs();
        group.bench_with_input(
            BenchmarkId::new("candidates", candidates.len()),
            &candidates,
            |b, candidates| {
                b.iter(|| black_box(scorer.score(&data, candidates).unwrap()));
            },
        );
    }

    group.finish();
}

fn benchmark_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster");
    let clusterer = Clusterer::default();
    // Few enough edges pass 0.9 that components stay small.

    for size in [1_000, 10_000] {
        let mut rng = StdRng::seed_from_u64(7);
        let ids: Vec<RecordId> = (0..size).map(|i| RecordId::left(format!("r{i}"))).collect();
        let scored: ScoredPairs = (0..size * 4)
            .map(|_| {
                let a = rng.random_range(0..size);
                let b = (a + rng.random_range(1..20)) % size;
                ScoredPair {
                    pair: RecordPair::new(ids[a].clone(), ids[b].clone()),
                    score: rng.random(),
                }
            })
            .collect();
        group.bench_with_input(BenchmarkId::new("hierarchical", size), &scored, |b, scored| {
            b.iter(|| black_box(clusterer.cluster(scored, ids.iter().cloned(), 0.9)));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_blocking, benchmark_scoring, benchmark_clustering);
criterion_main!(benches);
