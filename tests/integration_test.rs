// Integration tests for relink
use relink::{
    load_settings, load_training, save_settings, save_training, training_pairs_from_identifier,
    BlockIndex, BlockingLearner, ClassifierConfig, Dataset, DistanceType, Error, FeatureBuilder,
    FieldSpec, Label, LabelQuery, LabelResponse, Linker, LinkerConfig, OracleLabeler, Record,
    RecordId, RecordPair, SimilaritySchema, StaticLinker, ThresholdSource, TrainingPool,
};
use tempfile::TempDir;

fn titled(key: &str, title: &str) -> Record {
    Record::new(key).with_field("title", title)
}

fn catalogs() -> Dataset {
    Dataset::link(
        vec![titled("A1", "foo"), titled("A2", "bar"), titled("A3", "qux")],
        vec![titled("B1", "foo"), titled("B2", "baz"), titled("B3", "zzz")],
    )
    .unwrap()
}

fn exact_title() -> SimilaritySchema {
    SimilaritySchema::new(vec![FieldSpec::string("title").with_distance(DistanceType::Exact)]).unwrap()
}

fn lenient() -> LinkerConfig {
    LinkerConfig {
        classifier: ClassifierConfig {
            min_examples_per_class: 1,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn link_pair(a: &str, b: &str) -> RecordPair {
    RecordPair::new(RecordId::left(a), RecordId::right(b))
}

fn catalog_seeds() -> TrainingPool {
    let mut pool = TrainingPool::new();
    pool.insert(link_pair("A1", "B1"), Label::Match);
    pool.insert(link_pair("A2", "B2"), Label::Distinct);
    pool
}

/// Two records per person, a typo apart, sharing an `eid`.
fn people() -> Dataset {
    let people = [
        ("john smith", "jon smith", "boston"),
        ("mary jones", "marie jones", "denver"),
        ("peter parker", "peter parkr", "queens"),
        ("bruce wayne", "bruce wayn", "gotham"),
        ("clark kent", "clark kentt", "smallville"),
        ("diana prince", "dianna prince", "themyscira"),
        ("tony stark", "tony starc", "malibu"),
        ("steve rogers", "steven rogers", "brooklyn"),
    ];
    let mut records = Vec::new();
    for (i, (a, b, city)) in people.iter().enumerate() {
        for (suffix, name) in [("a", a), ("b", b)] {
            records.push(
                Record::new(format!("p{i}{suffix}"))
                    .with_field("name", *name)
                    .with_field("city", *city)
                    .with_field("eid", format!("e{i}")),
            );
        }
    }
    Dataset::dedup(records).unwrap()
}

fn people_schema() -> SimilaritySchema {
    SimilaritySchema::new(vec![
        FieldSpec::string("name").with_distance(DistanceType::Levenshtein),
        FieldSpec::categorical("city"),
    ])
    .unwrap()
}

fn assert_people_resolved(partition: &relink::Partition) {
    assert_eq!(partition.len(), 8);
    for i in 0..8 {
        assert!(partition.same_cluster(
            &RecordId::left(format!("p{i}a")),
            &RecordId::left(format!("p{i}b"))
        ));
    }
}

#[test]
fn test_end_to_end_catalog_scenario() {
    let data = catalogs();
    let linker = Linker::new(exact_title(), lenient()).unwrap();
    let model = linker.fit(&data, &catalog_seeds()).unwrap();
    let linker = model.into_static().unwrap();

    let features = FeatureBuilder::new(&exact_title());
    let score = |a: &str, b: &str| {
        linker.scorer().classifier().score(&features.build_pair(&data, &link_pair(a, b)).unwrap())
    };
    assert!(score("A1", "B1") > 0.9);
    assert!(score("A2", "B2") < 0.1);
    assert!(score("A3", "B3") < 0.1);

    let partition = linker.match_records(&data).unwrap();
    assert!(partition.same_cluster(&RecordId::left("A1"), &RecordId::right("B1")));
    for id in [
        RecordId::left("A2"),
        RecordId::left("A3"),
        RecordId::right("B2"),
        RecordId::right("B3"),
    ] {
        assert!(partition.cluster_of(&id).unwrap().is_singleton());
    }
    assert_eq!(partition.record_count(), 6);
}

#[test]
fn test_empty_pool_is_insufficient_data() {
    let linker = Linker::new(exact_title(), LinkerConfig::default()).unwrap();
    let err = linker.fit(&catalogs(), &TrainingPool::new()).unwrap_err();
    assert!(err.is_insufficient_data());
}

#[test]
fn test_identifier_seeds_resolve_people() {
    let data = people();
    let seeds = training_pairs_from_identifier(&data, "eid", 20, 7).unwrap();
    assert_eq!(seeds.count(Label::Match), 8);

    let linker = Linker::new(people_schema(), lenient()).unwrap();
    let partition = linker
        .fit(&data, &seeds)
        .unwrap()
        .into_static()
        .unwrap()
        .match_records(&data)
        .unwrap();
    assert_people_resolved(&partition);
}

#[test]
fn test_active_learning_with_oracle() {
    let data = people();
    let linker = Linker::new(people_schema(), lenient()).unwrap();

    let mut seeds = TrainingPool::new();
    seeds.insert(
        RecordPair::new(RecordId::left("p0a"), RecordId::left("p0b")),
        Label::Match,
    );
    seeds.insert(
        RecordPair::new(RecordId::left("p0a"), RecordId::left("p1a")),
        Label::Distinct,
    );
    let session = linker.prepare(&data).unwrap().seed(&seeds).unwrap();

    let mut oracle = OracleLabeler::new(|q: &LabelQuery<'_>| {
        if q.left.get("eid") == q.right.get("eid") {
            LabelResponse::Match
        } else {
            LabelResponse::Distinct
        }
    });
    let model = linker.train(session, &mut oracle).unwrap();
    // 16 records give 120 pairs, two of them seeded
    assert_eq!(oracle.answered(), 118);
    assert_eq!(model.pool().count(Label::Match), 8);

    let partition = model.into_static().unwrap().match_records(&data).unwrap();
    assert_people_resolved(&partition);
}

#[test]
fn test_blocking_covers_every_match() {
    let data = people();
    let pool = training_pairs_from_identifier(&data, "eid", 0, 0).unwrap();
    let outcome = BlockingLearner::default().learn(&data, &pool, ["name", "city"]);

    let candidates = BlockIndex::build(&outcome.predicates, &data).candidate_pairs();
    assert!(outcome.warning.is_none());
    assert_eq!(outcome.coverage, 1.0);
    for pair in pool.matches() {
        assert!(candidates.binary_search(pair).is_ok(), "{pair} not a candidate");
    }
    assert!((candidates.len() as u64) < data.total_pairs());
}

#[test]
fn test_settings_roundtrip_reproduces_scores() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.bin");
    let data = catalogs();

    let trained = Linker::new(exact_title(), lenient())
        .unwrap()
        .fit(&data, &catalog_seeds())
        .unwrap();
    save_settings(&path, &trained.settings().unwrap()).unwrap();
    let original = trained.into_static().unwrap();

    let settings = load_settings(&path).unwrap().unwrap();
    let restored = StaticLinker::from_settings(exact_title(), settings, &lenient()).unwrap();

    let candidates = original.candidate_pairs(&data).unwrap();
    assert_eq!(candidates, restored.candidate_pairs(&data).unwrap());
    assert_eq!(
        original.score(&data, &candidates).unwrap().scores(),
        restored.score(&data, &candidates).unwrap().scores()
    );
    assert_eq!(
        original.match_records(&data).unwrap(),
        restored.match_records(&data).unwrap()
    );
}

#[test]
fn test_settings_for_other_schema_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.bin");
    let model = Linker::new(exact_title(), lenient())
        .unwrap()
        .fit(&catalogs(), &catalog_seeds())
        .unwrap();
    save_settings(&path, &model.settings().unwrap()).unwrap();

    let other = SimilaritySchema::new(vec![FieldSpec::string("name")]).unwrap();
    let settings = load_settings(&path).unwrap().unwrap();
    let err = StaticLinker::from_settings(other, settings, &lenient()).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_training_file_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("training.json");
    let data = people();
    let pool = training_pairs_from_identifier(&data, "eid", 10, 3).unwrap();

    save_training(&path, &pool, &data).unwrap();
    let loaded = load_training(&path, &data).unwrap().unwrap();
    assert_eq!(loaded.matches(), pool.matches());
    assert_eq!(loaded.distinct(), pool.distinct());
}

#[test]
fn test_rethreshold_without_rescoring() {
    let data = catalogs();
    let linker = Linker::new(exact_title(), lenient())
        .unwrap()
        .fit(&data, &catalog_seeds())
        .unwrap()
        .into_static()
        .unwrap();
    let candidates = linker.candidate_pairs(&data).unwrap();
    let scored = linker.score(&data, &candidates).unwrap();

    assert_eq!(linker.cluster(&data, &scored, 0.5).len(), 5);
    assert_eq!(linker.cluster(&data, &scored, 1.1).len(), 6);
}

#[test]
fn test_recall_weight_drives_estimated_threshold() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.bin");
    let data = catalogs();
    let model = Linker::new(exact_title(), lenient())
        .unwrap()
        .fit(&data, &catalog_seeds())
        .unwrap();
    save_settings(&path, &model.settings().unwrap()).unwrap();

    let run_with = |recall_weight: f64| {
        let config = LinkerConfig {
            recall_weight,
            ..lenient()
        };
        let settings = load_settings(&path).unwrap().unwrap();
        StaticLinker::from_settings(exact_title(), settings, &config)
            .unwrap()
            .estimating()
            .run(&data)
            .unwrap()
    };
    let balanced = run_with(1.0);
    let recall_heavy = run_with(10.0);

    assert_eq!(balanced.selection.source, ThresholdSource::Estimated);
    assert_eq!(recall_heavy.selection.source, ThresholdSource::Estimated);
    assert!(recall_heavy.selection.threshold <= balanced.selection.threshold);
    assert!(recall_heavy.merged_pairs() >= balanced.merged_pairs());
    assert!(balanced
        .partition
        .same_cluster(&RecordId::left("A1"), &RecordId::right("B1")));
}

#[test]
fn test_estimated_threshold_is_monotone_in_recall_weight() {
    let data = people();
    let seeds = training_pairs_from_identifier(&data, "eid", 20, 7).unwrap();
    let linker = Linker::new(people_schema(), lenient())
        .unwrap()
        .fit(&data, &seeds)
        .unwrap()
        .into_static()
        .unwrap()
        .estimating();
    let candidates = linker.candidate_pairs(&data).unwrap();
    let scored = linker.score(&data, &candidates).unwrap();

    let mut previous = f64::INFINITY;
    for weight in [0.1, 1.0, 4.0, 10.0, 100.0] {
        let threshold = relink::ThresholdOptimizer::new(weight)
            .unwrap()
            .estimate(&scored.scores())
            .unwrap()
            .threshold;
        assert!(threshold <= previous, "weight {weight} raised the threshold");
        previous = threshold;
    }
    let selected = linker.select_threshold(&scored).unwrap();
    assert_eq!(selected.source, ThresholdSource::Estimated);
    assert_eq!(selected.threshold, linker.estimate_threshold(&scored).unwrap().threshold);
}
