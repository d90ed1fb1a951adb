//! Active-learning session
//!
//! A [`TrainingSession`] walks through
//! `Unseeded → Sampling → AwaitingLabel → Updated → … → Converged | Exhausted`.
//! Every transition consumes the session and hands back the next one, so
//! the current [`TrainerState`] can always be inspected between steps.
//!
//! The query picked in `Sampling` is the unlabeled pair whose score is
//! closest to 0.5 under the current model. Before the first successful fit
//! pairs are taken in sample order.

use crate::labeler::{LabelQuery, LabelResponse, Labeler};
use crate::sample::WorkingSample;
use ahash::AHashMap;
use rayon::prelude::*;
use relink_core::{
    Classifier, ClassifierConfig, Dataset, Error, FeatureVector, Label, RecordPair, Result,
    TrainingPool,
};
use relink_similarity::FeatureBuilder;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum TrainerState {
    /// No usable model yet: the pool lacks an example of some class
    Unseeded,
    /// Ready to pick the next query
    Sampling,
    /// Waiting for a label on this pair
    AwaitingLabel(RecordPair),
    /// A label was added and the model refit
    Updated,
    /// The labeler asked to stop
    Converged,
    /// Every sampled pair has been labeled or skipped
    Exhausted,
}

impl TrainerState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainerState::Converged | TrainerState::Exhausted)
    }
}

#[derive(Debug, Clone)]
pub struct TrainingSession<'a> {
    data: &'a Dataset,
    features: FeatureBuilder,
    config: ClassifierConfig,
    fields: Vec<String>,
    /// Unlabeled pairs with their feature vectors, in draw order
    sample: Vec<(RecordPair, FeatureVector)>,
    pool: TrainingPool,
    pool_vectors: AHashMap<RecordPair, FeatureVector>,
    model: Option<Classifier>,
    state: TrainerState,
    labeled: usize,
}

impl<'a> TrainingSession<'a> {
    /// Start an unseeded session over a working sample.
    pub fn new(
        data: &'a Dataset,
        features: FeatureBuilder,
        sample: WorkingSample,
        config: ClassifierConfig,
    ) -> Result<Self> {
        config.validate()?;
        let vectors = features.build_many(data, sample.pairs())?;
        let fields = features.registry().field_names().map(str::to_string).collect();
        Ok(Self {
            data,
            features,
            config,
            fields,
            sample: sample.into_pairs().into_iter().zip(vectors).collect(),
            pool: TrainingPool::new(),
            pool_vectors: AHashMap::new(),
            model: None,
            state: TrainerState::Unseeded,
            labeled: 0,
        })
    }

    /// Fold labeled pairs into the pool before any query.
    ///
    /// Seeded pairs leave the working sample and are never queried.
    pub fn seed(mut self, pairs: &TrainingPool) -> Result<Self> {
        if matches!(self.state, TrainerState::AwaitingLabel(_)) || self.state.is_terminal() {
            return Err(Error::configuration(format!(
                "cannot seed a session in state {:?}",
                self.state
            )));
        }
        for (pair, label) in pairs.iter() {
            let vector = self.features.build_pair(self.data, pair)?;
            self.pool.insert(pair.clone(), label);
            self.pool_vectors.insert(pair.clone(), vector);
        }
        let pool = &self.pool;
        self.sample.retain(|(p, _)| !pool.contains(p));
        self.refit()?;
        self.state = if self.model.is_some() {
            TrainerState::Sampling
        } else {
            TrainerState::Unseeded
        };
        debug!(seeded = pairs.len(), state = ?self.state, "training session seeded");
        Ok(self)
    }

    /// Pick the next pair to label, or end the session if none remain.
    ///
    /// Has no effect while a query is pending or after termination.
    #[must_use]
    pub fn next_query(mut self) -> Self {
        match self.state {
            TrainerState::Unseeded | TrainerState::Sampling | TrainerState::Updated => {
                self.state = if self.sample.is_empty() {
                    TrainerState::Exhausted
                } else {
                    let position = self.model.as_ref().map_or(0, |m| self.most_uncertain(m));
                    TrainerState::AwaitingLabel(self.sample[position].0.clone())
                };
            }
            TrainerState::AwaitingLabel(_) | TrainerState::Converged | TrainerState::Exhausted => {}
        }
        self
    }

    /// Record the answer to the pending query.
    pub fn apply(mut self, response: LabelResponse) -> Result<Self> {
        let pair = match &self.state {
            TrainerState::AwaitingLabel(pair) => pair.clone(),
            other => {
                return Err(Error::configuration(format!(
                    "no pending query to answer in state {other:?}"
                )))
            }
        };

        if response == LabelResponse::Finished {
            self.state = TrainerState::Converged;
            return Ok(self);
        }

        let taken = self.take_from_sample(&pair);
        match response.label() {
            Some(label) => {
                let vector = match taken {
                    Some(vector) => vector,
                    None => self.features.build_pair(self.data, &pair)?,
                };
                debug!(%pair, %label, "pair labeled");
                self.pool.insert(pair.clone(), label);
                self.pool_vectors.insert(pair, vector);
                self.labeled += 1;
                self.refit()?;
                self.state = TrainerState::Updated;
            }
            None => {
                debug!(%pair, "pair skipped");
                self.state = if self.model.is_some() {
                    TrainerState::Sampling
                } else {
                    TrainerState::Unseeded
                };
            }
        }
        Ok(self)
    }

    /// Fit the final model with the configured per-class minimum.
    pub fn finish(&self) -> Result<Classifier> {
        Classifier::fit_cross_validated(&self.examples(), &self.config)
    }

    /// The pending query with both records, if one is outstanding.
    pub fn query(&self) -> Result<Option<LabelQuery<'_>>> {
        let TrainerState::AwaitingLabel(pair) = &self.state else {
            return Ok(None);
        };
        let score = self.model.as_ref().and_then(|model| {
            self.sample
                .iter()
                .find(|(p, _)| p == pair)
                .map(|(_, v)| model.score(v))
        });
        Ok(Some(LabelQuery {
            pair,
            left: self.data.require(&pair.left)?,
            right: self.data.require(&pair.right)?,
            fields: &self.fields,
            score,
            labeled_matches: self.pool.count(Label::Match),
            labeled_distinct: self.pool.count(Label::Distinct),
            remaining: self.sample.len(),
        }))
    }

    #[inline]
    pub fn state(&self) -> &TrainerState {
        &self.state
    }

    #[inline]
    pub fn pool(&self) -> &TrainingPool {
        &self.pool
    }

    pub fn into_pool(self) -> TrainingPool {
        self.pool
    }

    /// Latest model fit during the session, possibly provisional.
    #[inline]
    pub fn model(&self) -> Option<&Classifier> {
        self.model.as_ref()
    }

    /// Unlabeled pairs left in the working sample.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.sample.len()
    }

    /// Labels given through [`TrainingSession::apply`], excluding seeds.
    #[inline]
    pub fn labeled(&self) -> usize {
        self.labeled
    }

    #[inline]
    pub fn data(&self) -> &'a Dataset {
        self.data
    }

    #[inline]
    pub fn features(&self) -> &FeatureBuilder {
        &self.features
    }

    fn take_from_sample(&mut self, pair: &RecordPair) -> Option<FeatureVector> {
        let position = self.sample.iter().position(|(p, _)| p == pair)?;
        Some(self.sample.remove(position).1)
    }

    fn examples(&self) -> Vec<(FeatureVector, Label)> {
        self.pool
            .iter()
            .filter_map(|(pair, label)| self.pool_vectors.get(pair).map(|v| (v.clone(), label)))
            .collect()
    }

    /// Refit on the pool; stays unfit until both classes are present.
    fn refit(&mut self) -> Result<()> {
        let min = self.config.min_examples_per_class;
        let config = if self.pool.count(Label::Match) >= min && self.pool.count(Label::Distinct) >= min {
            self.config.clone()
        } else {
            self.config.provisional()
        };
        match Classifier::fit_cross_validated(&self.examples(), &config) {
            Ok(model) => self.model = Some(model),
            Err(e) if e.is_insufficient_data() => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Sample position whose score is closest to 0.5, lowest position on ties.
    fn most_uncertain(&self, model: &Classifier) -> usize {
        let distances: Vec<f64> = self
            .sample
            .par_iter()
            .map(|(_, v)| (model.score(v) - 0.5).abs())
            .collect();
        let mut best = 0;
        for (i, &d) in distances.iter().enumerate() {
            if d < distances[best] {
                best = i;
            }
        }
        best
    }
}

/// Drives a session against a labeler until it converges or runs dry.
pub struct Trainer;

impl Trainer {
    pub fn train<'a>(
        mut session: TrainingSession<'a>,
        labeler: &mut dyn Labeler,
    ) -> Result<TrainingSession<'a>> {
        loop {
            session = session.next_query();
            let response = match session.query()? {
                Some(query) => labeler.label(&query),
                None => break,
            };
            session = session.apply(response)?;
        }
        info!(
            state = ?session.state(),
            labeled = session.labeled(),
            matches = session.pool().count(Label::Match),
            distinct = session.pool().count(Label::Distinct),
            "active learning finished"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeler::{OracleLabeler, ScriptedLabeler};
    use relink_core::{Record, RecordId};
    use relink_similarity::{DistanceType, FieldSpec, SimilaritySchema};

    fn pair(a: &str, b: &str) -> RecordPair {
        RecordPair::new(RecordId::left(a), RecordId::right(b))
    }

    fn dataset() -> Dataset {
        let titled = |key: &str, title: &str| Record::new(key).with_field("title", title);
        Dataset::link(
            vec![titled("a1", "foo"), titled("a2", "bar"), titled("a3", "abcd")],
            vec![titled("b1", "foo"), titled("b2", "xyz"), titled("b3", "abxy")],
        )
        .unwrap()
    }

    fn session(data: &Dataset) -> TrainingSession<'_> {
        let schema =
            SimilaritySchema::new(vec![FieldSpec::string("title").with_distance(DistanceType::Levenshtein)])
                .unwrap();
        let sample = WorkingSample::draw(data, 100, 0);
        TrainingSession::new(data, FeatureBuilder::new(&schema), sample, ClassifierConfig::default()).unwrap()
    }

    fn seeds() -> TrainingPool {
        let mut pool = TrainingPool::new();
        pool.insert(pair("a1", "b1"), Label::Match);
        pool.insert(pair("a2", "b2"), Label::Distinct);
        pool
    }

    #[test]
    fn test_seeded_session_queries_most_uncertain_pair() {
        let data = dataset();
        let session = session(&data).seed(&seeds()).unwrap();
        assert_eq!(session.state(), &TrainerState::Sampling);
        assert_eq!(session.remaining(), 7);

        // abcd/abxy is the only pair at similarity 0.5
        let session = session.next_query();
        assert_eq!(session.state(), &TrainerState::AwaitingLabel(pair("a3", "b3")));
        let query = session.query().unwrap().unwrap();
        assert!((query.score.unwrap() - 0.5).abs() < 0.05);
        assert_eq!(query.fields, ["title".to_string()]);
    }

    #[test]
    fn test_unseeded_session_starts_in_sample_order() {
        let data = dataset();
        let mut labeler = ScriptedLabeler::new([LabelResponse::Match, LabelResponse::Distinct]);
        let session = Trainer::train(session(&data), &mut labeler).unwrap();

        assert_eq!(
            labeler.asked(),
            &[pair("a1", "b1"), pair("a1", "b2"), pair("a3", "b3")]
        );
        assert_eq!(session.state(), &TrainerState::Converged);
        assert_eq!(session.pool().len(), 2);
        assert!(session.model().is_some());
    }

    #[test]
    fn test_never_requeries_and_exhausts() {
        let data = dataset();
        let mut asked = Vec::new();
        let session = {
            let mut labeler = OracleLabeler::new(|q: &LabelQuery<'_>| {
                asked.push(q.pair.clone());
                if q.left.get("title") == q.right.get("title") {
                    LabelResponse::Match
                } else {
                    LabelResponse::Distinct
                }
            });
            let seeded = session(&data).seed(&seeds()).unwrap();
            Trainer::train(seeded, &mut labeler).unwrap()
        };

        assert_eq!(session.state(), &TrainerState::Exhausted);
        assert_eq!(session.pool().len(), 9);
        assert_eq!(asked.len(), 7);
        assert!(!asked.contains(&pair("a1", "b1")));
        assert!(!asked.contains(&pair("a2", "b2")));
        let unique: std::collections::HashSet<_> = asked.iter().collect();
        assert_eq!(unique.len(), asked.len());
    }

    #[test]
    fn test_skip_drops_pair_without_label() {
        let data = dataset();
        let session = session(&data).seed(&seeds()).unwrap().next_query();
        let session = session.apply(LabelResponse::Skip).unwrap();
        assert_eq!(session.state(), &TrainerState::Sampling);
        assert_eq!(session.remaining(), 6);
        assert_eq!(session.pool().len(), 2);

        let session = session.next_query();
        assert_ne!(session.state(), &TrainerState::AwaitingLabel(pair("a3", "b3")));
    }

    #[test]
    fn test_finish_enforces_configured_minimum() {
        let data = dataset();
        let session = session(&data).seed(&seeds()).unwrap();
        let err = session.finish().unwrap_err();
        assert!(err.is_insufficient_data());

        let schema = SimilaritySchema::new(vec![FieldSpec::string("title")]).unwrap();
        let config = ClassifierConfig {
            min_examples_per_class: 1,
            ..Default::default()
        };
        let lenient = TrainingSession::new(
            &data,
            FeatureBuilder::new(&schema),
            WorkingSample::default(),
            config,
        )
        .unwrap()
        .seed(&seeds())
        .unwrap();
        assert_eq!(lenient.finish().unwrap().arity(), 1);
    }

    #[test]
    fn test_apply_without_pending_query() {
        let data = dataset();
        assert!(session(&data).apply(LabelResponse::Match).is_err());
    }

    #[test]
    fn test_seed_with_unknown_record() {
        let data = dataset();
        let mut pool = TrainingPool::new();
        pool.insert(pair("a1", "nope"), Label::Match);
        assert!(matches!(
            session(&data).seed(&pool),
            Err(Error::UnknownRecord(_))
        ));
    }

    #[test]
    fn test_finished_keeps_labels() {
        let data = dataset();
        let mut labeler = ScriptedLabeler::new([LabelResponse::Distinct, LabelResponse::Finished]);
        let seeded = session(&data).seed(&seeds()).unwrap();
        let session = Trainer::train(seeded, &mut labeler).unwrap();
        assert_eq!(session.state(), &TrainerState::Converged);
        assert_eq!(session.pool().count(Label::Distinct), 2);
        assert_eq!(session.labeled(), 1);
    }
}
