//! End-to-end linking pipeline
//!
//! [`Linker`] covers the training half: sample, label, fit the classifier,
//! learn blocking, pick a threshold. The result is a [`TrainedModel`], which
//! freezes into a [`StaticLinker`] for the matching half: candidates,
//! scores, clusters. A `StaticLinker` can also be restored from saved
//! [`Settings`], skipping training entirely.

use relink_blocking::{BlockIndex, BlockingConfig, BlockingLearner, BlockingOutcome, PredicateSet};
use relink_core::{
    Classifier, ClassifierConfig, ClusterConfig, Clusterer, Dataset, Error, Label, Partition,
    RecordPair, Result, ScoredPairs, ThresholdChoice, ThresholdOptimizer, TrainingPool,
};
use relink_similarity::{ExplainedPair, FeatureBuilder, PairwiseScorer, ScoreStats, SimilaritySchema};
use relink_storage::Settings;
use relink_training::{Labeler, Trainer, TrainingSession, WorkingSample};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Unlabeled pairs drawn for active learning
    pub sample_size: usize,
    /// β² of the F-measure used to pick the threshold
    pub recall_weight: f64,
    /// Predicate budget for blocking
    pub max_predicates: usize,
    pub seed: u64,
    pub classifier: ClassifierConfig,
    pub blocking: BlockingConfig,
    pub clustering: ClusterConfig,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            sample_size: 150_000,
            recall_weight: 1.0,
            max_predicates: 8,
            seed: 42,
            classifier: ClassifierConfig::default(),
            blocking: BlockingConfig::default(),
            clustering: ClusterConfig::default(),
        }
    }
}

impl LinkerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::configuration(format!("linker config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_size == 0 {
            return Err(Error::configuration("sample_size must be at least 1"));
        }
        if self.max_predicates == 0 {
            return Err(Error::configuration("max_predicates must be at least 1"));
        }
        ThresholdOptimizer::new(self.recall_weight)?;
        self.classifier.validate()?;
        self.blocking.validate()?;
        self.clustering.validate()
    }
}

/// The training half of the pipeline.
#[derive(Debug, Clone)]
pub struct Linker {
    schema: SimilaritySchema,
    features: FeatureBuilder,
    config: LinkerConfig,
}

impl Linker {
    pub fn new(schema: SimilaritySchema, config: LinkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            features: FeatureBuilder::new(&schema),
            schema,
            config,
        })
    }

    #[inline]
    pub fn schema(&self) -> &SimilaritySchema {
        &self.schema
    }

    #[inline]
    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    /// Check the data against the schema, draw the working sample and open
    /// an unseeded training session.
    pub fn prepare<'a>(&self, data: &'a Dataset) -> Result<TrainingSession<'a>> {
        data.require_fields(self.schema.required_fields())?;
        let sample = WorkingSample::draw(data, self.config.sample_size, self.config.seed);
        info!(
            records = data.len(),
            comparisons = data.total_pairs(),
            sampled = sample.len(),
            "training session prepared"
        );
        TrainingSession::new(data, self.features.clone(), sample, self.config.classifier.clone())
    }

    /// Run active learning to completion, then fit everything downstream.
    pub fn train(&self, session: TrainingSession<'_>, labeler: &mut dyn Labeler) -> Result<TrainedModel> {
        let session = Trainer::train(session, labeler)?;
        let classifier = session.finish()?;
        self.complete(session.data(), session.pool().clone(), classifier)
    }

    /// Fit from an already labeled pool without asking for more labels.
    pub fn fit(&self, data: &Dataset, pool: &TrainingPool) -> Result<TrainedModel> {
        data.require_fields(self.schema.required_fields())?;
        let pairs: Vec<RecordPair> = pool.iter().map(|(p, _)| p.clone()).collect();
        let vectors = self.features.build_many(data, &pairs)?;
        let examples: Vec<_> = vectors.into_iter().zip(pool.iter().map(|(_, l)| l)).collect();
        let classifier = Classifier::fit_cross_validated(&examples, &self.config.classifier)?;
        self.complete(data, pool.clone(), classifier)
    }

    fn complete(&self, data: &Dataset, pool: TrainingPool, classifier: Classifier) -> Result<TrainedModel> {
        let blocking = BlockingLearner::new(self.config.blocking.clone())?
            .with_max_predicates(self.config.max_predicates)
            .learn(data, &pool, self.schema.field_names());

        let classifier = Arc::new(classifier);
        let scorer = PairwiseScorer::new(self.features.clone(), classifier.clone())?;
        let pairs: Vec<RecordPair> = pool.iter().map(|(p, _)| p.clone()).collect();
        let scored = scorer.score(data, &pairs)?;
        let labeled: Vec<(f64, Label)> = scored
            .iter()
            .zip(pool.iter())
            .map(|(sp, (_, label))| (sp.score, label))
            .collect();
        let threshold = ThresholdOptimizer::new(self.config.recall_weight)?.optimize(&labeled)?;

        info!(
            matches = pool.count(Label::Match),
            distinct = pool.count(Label::Distinct),
            predicates = blocking.predicates.len(),
            coverage = blocking.coverage,
            threshold = threshold.threshold,
            "model trained"
        );
        Ok(TrainedModel {
            schema: self.schema.clone(),
            config: self.config.clone(),
            classifier,
            blocking,
            threshold,
            pool,
        })
    }
}

/// Everything training produced
#[derive(Debug, Clone)]
pub struct TrainedModel {
    schema: SimilaritySchema,
    config: LinkerConfig,
    classifier: Arc<Classifier>,
    blocking: BlockingOutcome,
    threshold: ThresholdChoice,
    pool: TrainingPool,
}

impl TrainedModel {
    #[inline]
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    #[inline]
    pub fn blocking(&self) -> &BlockingOutcome {
        &self.blocking
    }

    #[inline]
    pub fn threshold(&self) -> &ThresholdChoice {
        &self.threshold
    }

    /// The labeled pool, for saving as a training file.
    #[inline]
    pub fn pool(&self) -> &TrainingPool {
        &self.pool
    }

    pub fn settings(&self) -> Result<Settings> {
        Settings::new(
            self.schema.descriptor(),
            (*self.classifier).clone(),
            self.blocking.predicates.clone(),
            Some(self.threshold.threshold),
        )
    }

    pub fn into_static(self) -> Result<StaticLinker> {
        StaticLinker::new(
            self.schema,
            self.classifier,
            self.blocking.predicates,
            Some(self.threshold.threshold),
            &self.config,
        )
    }
}

/// Where the threshold used for clustering came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdSource {
    /// Chosen against the labeled pool at training time
    Trained,
    /// Estimated from the candidate scores with the configured recall weight
    Estimated,
    /// Nothing scored above zero, so no pair is merged
    NoLikelyMatches,
}

impl fmt::Display for ThresholdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdSource::Trained => write!(f, "trained"),
            ThresholdSource::Estimated => write!(f, "estimated"),
            ThresholdSource::NoLikelyMatches => write!(f, "no likely matches"),
        }
    }
}

/// The threshold picked for one matching run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSelection {
    pub threshold: f64,
    pub source: ThresholdSource,
}

/// The matching half of the pipeline: a frozen model applied to data.
#[derive(Debug, Clone)]
pub struct StaticLinker {
    schema: SimilaritySchema,
    scorer: PairwiseScorer,
    predicates: PredicateSet,
    /// `None` re-estimates the threshold from each run's candidate scores
    threshold: Option<f64>,
    clusterer: Clusterer,
    optimizer: ThresholdOptimizer,
}

impl StaticLinker {
    fn new(
        schema: SimilaritySchema,
        classifier: Arc<Classifier>,
        predicates: PredicateSet,
        threshold: Option<f64>,
        config: &LinkerConfig,
    ) -> Result<Self> {
        Ok(Self {
            scorer: PairwiseScorer::new(FeatureBuilder::new(&schema), classifier)?,
            schema,
            predicates,
            threshold,
            clusterer: Clusterer::new(config.clustering.clone())?,
            optimizer: ThresholdOptimizer::new(config.recall_weight)?,
        })
    }

    /// Restore from a saved artifact trained against the same schema.
    ///
    /// Settings stored without a threshold estimate one from the candidate
    /// scores of every run, using `config.recall_weight`.
    pub fn from_settings(schema: SimilaritySchema, settings: Settings, config: &LinkerConfig) -> Result<Self> {
        settings.verify(&schema.descriptor())?;
        if settings.predicates.is_degenerate() {
            warn!("saved blocking compares every pair");
        }
        Self::new(
            schema,
            Arc::new(settings.classifier),
            settings.predicates,
            settings.threshold,
            config,
        )
    }

    pub fn settings(&self) -> Result<Settings> {
        Settings::new(
            self.schema.descriptor(),
            self.scorer.classifier().clone(),
            self.predicates.clone(),
            self.threshold,
        )
    }

    /// The fixed threshold, or `None` when each run estimates its own.
    #[inline]
    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    #[inline]
    pub fn recall_weight(&self) -> f64 {
        self.optimizer.recall_weight()
    }

    #[inline]
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Drop the fixed threshold and estimate one from each run's scores.
    #[inline]
    #[must_use]
    pub fn estimating(mut self) -> Self {
        self.threshold = None;
        self
    }

    #[inline]
    pub fn predicates(&self) -> &PredicateSet {
        &self.predicates
    }

    #[inline]
    pub fn scorer(&self) -> &PairwiseScorer {
        &self.scorer
    }

    /// Pairs surfaced by the learned blocking.
    pub fn candidate_pairs(&self, data: &Dataset) -> Result<Vec<RecordPair>> {
        data.require_fields(self.schema.required_fields())?;
        let candidates = BlockIndex::build(&self.predicates, data).candidate_pairs();
        info!(
            candidates = candidates.len(),
            comparisons = data.total_pairs(),
            "candidate pairs generated"
        );
        Ok(candidates)
    }

    pub fn score(&self, data: &Dataset, candidates: &[RecordPair]) -> Result<ScoredPairs> {
        self.scorer.score(data, candidates)
    }

    /// Threshold estimated from unlabeled scores, treating each as a match probability.
    pub fn estimate_threshold(&self, scored: &ScoredPairs) -> Result<ThresholdChoice> {
        self.optimizer.estimate(&scored.scores())
    }

    /// The fixed threshold if there is one, otherwise an estimate from `scored`.
    ///
    /// When no candidate scores above zero there is nothing to estimate
    /// from; the selection is then infinite and clustering merges nothing.
    pub fn select_threshold(&self, scored: &ScoredPairs) -> Result<ThresholdSelection> {
        if let Some(threshold) = self.threshold {
            return Ok(ThresholdSelection {
                threshold,
                source: ThresholdSource::Trained,
            });
        }
        match self.estimate_threshold(scored) {
            Ok(choice) => Ok(ThresholdSelection {
                threshold: choice.threshold,
                source: ThresholdSource::Estimated,
            }),
            Err(e) if e.is_insufficient_data() => {
                warn!(candidates = scored.len(), "no candidate looks like a match, nothing will be merged");
                Ok(ThresholdSelection {
                    threshold: f64::INFINITY,
                    source: ThresholdSource::NoLikelyMatches,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Cluster every record of `data` at `threshold` without re-scoring.
    pub fn cluster(&self, data: &Dataset, scored: &ScoredPairs, threshold: f64) -> Partition {
        self.clusterer.cluster(scored, data.record_ids(), threshold)
    }

    pub fn explain(&self, data: &Dataset, pair: &RecordPair) -> Result<ExplainedPair> {
        self.scorer.explain(data, pair)
    }

    /// Candidates, scores and clusters at the selected threshold.
    pub fn match_records(&self, data: &Dataset) -> Result<Partition> {
        self.run(data).map(|run| run.partition)
    }

    /// Like [`match_records`](Self::match_records), keeping the scores and
    /// the threshold selection alongside the partition.
    pub fn run(&self, data: &Dataset) -> Result<MatchRun> {
        let candidates = self.candidate_pairs(data)?;
        let scored = self.score(data, &candidates)?;
        let selection = self.select_threshold(&scored)?;
        let stats = ScoreStats::compute(&scored, selection.threshold);
        info!(
            threshold = selection.threshold,
            source = %selection.source,
            recall_weight = self.recall_weight(),
            above_threshold = stats.above_threshold,
            mean_score = stats.mean_score,
            best_score = stats.best_score,
            "threshold selected"
        );
        let partition = self.cluster(data, &scored, selection.threshold);
        info!(
            clusters = partition.len(),
            merged = partition.non_singletons().count(),
            "records matched"
        );
        Ok(MatchRun {
            scored,
            selection,
            stats,
            partition,
        })
    }
}

/// Output of one [`StaticLinker::run`]
#[derive(Debug, Clone)]
pub struct MatchRun {
    pub scored: ScoredPairs,
    pub selection: ThresholdSelection,
    pub stats: ScoreStats,
    pub partition: Partition,
}

impl MatchRun {
    /// Pairs placed in the same cluster.
    pub fn merged_pairs(&self) -> usize {
        self.partition
            .iter()
            .map(|c| c.len() * (c.len() - 1) / 2)
            .sum()
    }
}
