//! Regularized logistic regression over pair feature vectors.
//!
//! The model is `σ(bias + Σ wᵢ·xᵢ + Σ mᵢ·missingᵢ)`: every field has a
//! similarity weight and a separate weight that only applies when the
//! similarity is undefined. Fitting minimizes class-balanced log-loss with an
//! L2 penalty using Newton–Raphson from a zero start, so a fixed pool always
//! produces the same model.

use crate::feature::FeatureVector;
use crate::pair::Label;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Diagonal jitter keeping the Newton system solvable when λ = 0.
const RIDGE: f64 = 1e-9;

/// Ties in cross-validated loss closer than this favour stronger regularization.
const LOSS_EPSILON: f64 = 1e-12;
/// Smallest line-search step tried before giving up on an iteration.
const MIN_STEP: f64 = 1e-6;

/// Training settings for [`Classifier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// L2 penalty strength λ
    pub regularization: f64,
    /// Fitting fails below this many examples in either class
    pub min_examples_per_class: usize,
    pub max_iterations: usize,
    /// Newton stops once no parameter moves more than this
    pub tolerance: f64,
    /// Folds for choosing λ from `regularization_grid`; below 2 disables it
    pub cv_folds: usize,
    pub regularization_grid: Vec<f64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            regularization: 0.01,
            min_examples_per_class: 10,
            max_iterations: 50,
            tolerance: 1e-8,
            cv_folds: 0,
            regularization_grid: vec![0.001, 0.01, 0.1, 1.0],
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        let valid = |l: f64| l.is_finite() && l >= 0.0;
        if !valid(self.regularization) {
            return Err(Error::configuration("regularization must be a non-negative number"));
        }
        if self.regularization_grid.iter().any(|&l| !valid(l)) {
            return Err(Error::configuration("regularization grid must hold non-negative numbers"));
        }
        if self.max_iterations == 0 {
            return Err(Error::configuration("max_iterations must be at least 1"));
        }
        Ok(())
    }

    /// Same settings with a floor of one example per class and no
    /// cross-validation, for refits while a pool is still being seeded.
    #[must_use]
    pub fn provisional(&self) -> Self {
        Self {
            min_examples_per_class: 1,
            cv_folds: 0,
            ..self.clone()
        }
    }
}

/// A trained linear match model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    weights: Vec<f64>,
    missing_weights: Vec<f64>,
    bias: f64,
    regularization: f64,
}

impl Classifier {
    /// Build a model from explicit parameters.
    pub fn from_parts(
        weights: Vec<f64>,
        missing_weights: Vec<f64>,
        bias: f64,
        regularization: f64,
    ) -> Result<Self> {
        if weights.len() != missing_weights.len() {
            return Err(Error::configuration(format!(
                "classifier has {} field weights but {} missing weights",
                weights.len(),
                missing_weights.len()
            )));
        }
        Ok(Self {
            weights,
            missing_weights,
            bias,
            regularization,
        })
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn field_weights(&self) -> &[f64] {
        &self.weights
    }

    #[inline]
    pub fn missing_weights(&self) -> &[f64] {
        &self.missing_weights
    }

    #[inline]
    pub fn bias(&self) -> f64 {
        self.bias
    }

    #[inline]
    pub fn regularization(&self) -> f64 {
        self.regularization
    }

    /// Per-field contribution to the linear term.
    pub fn contributions(&self, vector: &FeatureVector) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.missing_weights)
            .enumerate()
            .map(|(i, (w, mw))| match vector.get(i) {
                Some(x) => w * x,
                None => *mw,
            })
            .collect()
    }

    /// Affine score before squashing.
    #[inline]
    pub fn linear(&self, vector: &FeatureVector) -> f64 {
        self.bias + self.contributions(vector).iter().sum::<f64>()
    }

    /// Match probability in (0, 1).
    #[inline]
    pub fn score(&self, vector: &FeatureVector) -> f64 {
        sigmoid(self.linear(vector))
    }

    /// Fit with the configured regularization strength.
    pub fn fit(examples: &[(FeatureVector, Label)], config: &ClassifierConfig) -> Result<Self> {
        config.validate()?;
        let arity = check_examples(examples, config.min_examples_per_class)?;
        let refs: Vec<(&FeatureVector, Label)> = examples.iter().map(|(v, l)| (v, *l)).collect();
        newton(&refs, arity, config.regularization, config)
    }

    /// Choose λ from `config.regularization_grid` by k-fold cross-validation
    /// on held-out log-loss, then fit on the whole pool.
    ///
    /// Folds are assigned round-robin within each class in pool order. Falls
    /// back to [`Classifier::fit`] when CV is disabled or a class has fewer
    /// examples than folds.
    pub fn fit_cross_validated(
        examples: &[(FeatureVector, Label)],
        config: &ClassifierConfig,
    ) -> Result<Self> {
        config.validate()?;
        let arity = check_examples(examples, config.min_examples_per_class)?;
        let folds = config.cv_folds;
        let smallest_class = count(examples, Label::Match).min(count(examples, Label::Distinct));
        if folds < 2 || smallest_class < folds || config.regularization_grid.is_empty() {
            return Self::fit(examples, config);
        }

        let mut seen = [0usize; 2];
        let assignment: Vec<usize> = examples
            .iter()
            .map(|(_, label)| {
                let slot = &mut seen[class_slot(*label)];
                let fold = *slot % folds;
                *slot += 1;
                fold
            })
            .collect();

        let mut best: Option<(f64, f64)> = None;
        for &lambda in &config.regularization_grid {
            let mut total = 0.0;
            let mut held_out = 0usize;
            for fold in 0..folds {
                let train: Vec<(&FeatureVector, Label)> = examples
                    .iter()
                    .zip(&assignment)
                    .filter(|(_, &f)| f != fold)
                    .map(|((v, l), _)| (v, *l))
                    .collect();
                let model = newton(&train, arity, lambda, config)?;
                for ((vector, label), _) in examples.iter().zip(&assignment).filter(|(_, &f)| f == fold) {
                    total += log_loss(model.linear(vector), *label);
                    held_out += 1;
                }
            }
            let mean = total / held_out.max(1) as f64;
            debug!(lambda, loss = mean, "cross-validated regularization candidate");

            best = match best {
                Some((best_lambda, best_loss))
                    if mean > best_loss + LOSS_EPSILON
                        || ((mean - best_loss).abs() <= LOSS_EPSILON && lambda <= best_lambda) =>
                {
                    Some((best_lambda, best_loss))
                }
                _ => Some((lambda, mean)),
            };
        }

        let lambda = best.map(|(l, _)| l).unwrap_or(config.regularization);
        debug!(lambda, folds, "selected regularization strength");
        let refs: Vec<(&FeatureVector, Label)> = examples.iter().map(|(v, l)| (v, *l)).collect();
        newton(&refs, arity, lambda, config)
    }
}

fn class_slot(label: Label) -> usize {
    match label {
        Label::Match => 0,
        Label::Distinct => 1,
    }
}

fn count(examples: &[(FeatureVector, Label)], label: Label) -> usize {
    examples.iter().filter(|(_, l)| *l == label).count()
}

/// Enforce the per-class floor and a common arity; returns the arity.
fn check_examples(examples: &[(FeatureVector, Label)], min_per_class: usize) -> Result<usize> {
    let required = min_per_class.max(1);
    for label in [Label::Match, Label::Distinct] {
        let found = count(examples, label);
        if found < required {
            return Err(Error::InsufficientData {
                class: label,
                found,
                required,
            });
        }
    }

    let arity = examples[0].0.arity();
    if let Some((v, _)) = examples.iter().find(|(v, _)| v.arity() != arity) {
        return Err(Error::configuration(format!(
            "feature vectors disagree on arity: {} vs {}",
            arity,
            v.arity()
        )));
    }
    Ok(arity)
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// ln(1 + eˣ) without overflow.
#[inline]
fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

#[inline]
fn log_loss(linear: f64, label: Label) -> f64 {
    match label {
        Label::Match => softplus(-linear),
        Label::Distinct => softplus(linear),
    }
}

fn newton(
    examples: &[(&FeatureVector, Label)],
    arity: usize,
    lambda: f64,
    config: &ClassifierConfig,
) -> Result<Classifier> {
    let dim = 2 * arity + 1;
    let penalized = 2 * arity;
    let n = examples.len() as f64;
    let n_match = examples.iter().filter(|(_, l)| *l == Label::Match).count().max(1) as f64;
    let n_distinct = examples.iter().filter(|(_, l)| *l == Label::Distinct).count().max(1) as f64;

    // Balanced weights so both classes carry equal total mass.
    let rows: Vec<(Vec<f64>, f64, f64)> = examples
        .iter()
        .map(|(v, label)| match label {
            Label::Match => (v.design_row(), 1.0, n / (2.0 * n_match)),
            Label::Distinct => (v.design_row(), 0.0, n / (2.0 * n_distinct)),
        })
        .collect();

    let objective = |theta: &[f64]| -> f64 {
        let data: f64 = rows
            .iter()
            .map(|(z, y, c)| {
                let s = dot(z, theta);
                let label = if *y > 0.5 { Label::Match } else { Label::Distinct };
                c * log_loss(s, label)
            })
            .sum();
        let penalty: f64 = theta[..penalized].iter().map(|t| t * t).sum();
        data + 0.5 * lambda * penalty
    };

    let mut theta = vec![0.0; dim];
    let mut iterations = 0;
    for _ in 0..config.max_iterations {
        iterations += 1;
        let mut grad = vec![0.0; dim];
        let mut hess = vec![vec![0.0; dim]; dim];
        for (z, y, c) in &rows {
            let p = sigmoid(dot(z, &theta));
            let residual = c * (p - y);
            let curvature = c * p * (1.0 - p);
            for j in 0..dim {
                if z[j] == 0.0 {
                    continue;
                }
                grad[j] += residual * z[j];
                for k in 0..dim {
                    hess[j][k] += curvature * z[j] * z[k];
                }
            }
        }
        for j in 0..dim {
            if j < penalized {
                grad[j] += lambda * theta[j];
                hess[j][j] += lambda;
            }
            hess[j][j] += RIDGE;
        }

        let step = solve(hess, grad)
            .ok_or_else(|| Error::configuration("singular system while fitting classifier"))?;

        let Some((candidate, t)) = backtrack(&theta, &step, &objective) else {
            debug!(iterations, "no step lowers the loss, keeping current weights");
            break;
        };

        let moved = step.iter().map(|s| (t * s).abs()).fold(0.0, f64::max);
        theta = candidate;
        if moved < config.tolerance {
            break;
        }
    }
    debug!(iterations, lambda, examples = examples.len(), "classifier fit");

    let bias = theta[dim - 1];
    let missing_weights = theta[arity..penalized].to_vec();
    theta.truncate(arity);
    Ok(Classifier {
        weights: theta,
        missing_weights,
        bias,
        regularization: lambda,
    })
}

/// Backtracking search along `-step`, halving from a full step.
///
/// Returns the accepted point and step size, or `None` when no step down to
/// `MIN_STEP` keeps the objective from rising.
fn backtrack(
    theta: &[f64],
    step: &[f64],
    objective: impl Fn(&[f64]) -> f64,
) -> Option<(Vec<f64>, f64)> {
    let current = objective(theta);
    let mut t = 1.0;
    while t >= MIN_STEP {
        let candidate: Vec<f64> = theta.iter().zip(step).map(|(th, s)| th - t * s).collect();
        if objective(&candidate) <= current + LOSS_EPSILON {
            return Some((candidate, t));
        }
        t *= 0.5;
    }
    None
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Solve `a·x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permissive() -> ClassifierConfig {
        ClassifierConfig {
            min_examples_per_class: 1,
            ..Default::default()
        }
    }

    fn example(values: &[f64], label: Label) -> (FeatureVector, Label) {
        (FeatureVector::dense(values.to_vec()), label)
    }

    #[test]
    fn test_empty_pool_is_insufficient() {
        let err = Classifier::fit(&[], &ClassifierConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { class: Label::Match, found: 0, .. }));

        let err = Classifier::fit(&[], &permissive()).unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_below_minimum_distinct() {
        let mut examples: Vec<_> = (0..10).map(|_| example(&[1.0], Label::Match)).collect();
        examples.push(example(&[0.0], Label::Distinct));
        let err = Classifier::fit(&examples, &ClassifierConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientData { class: Label::Distinct, found: 1, required: 10 }
        ));
    }

    #[test]
    fn test_single_pair_per_class_separates() {
        let examples = vec![example(&[1.0], Label::Match), example(&[0.0], Label::Distinct)];
        let model = Classifier::fit(&examples, &permissive()).unwrap();

        assert!(model.score(&FeatureVector::dense(vec![1.0])) > 0.9);
        assert!(model.score(&FeatureVector::dense(vec![0.0])) < 0.1);
        assert!(model.field_weights()[0] > 0.0);
    }

    #[test]
    fn test_class_imbalance_is_balanced() {
        let mut examples = vec![example(&[0.9, 0.8], Label::Match), example(&[0.95, 0.7], Label::Match)];
        for i in 0..40 {
            let x = (i % 5) as f64 * 0.05;
            examples.push(example(&[x, 0.1], Label::Distinct));
        }
        let model = Classifier::fit(&examples, &permissive()).unwrap();
        assert!(model.score(&FeatureVector::dense(vec![0.9, 0.8])) > 0.5);
        assert!(model.score(&FeatureVector::dense(vec![0.1, 0.1])) < 0.5);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let examples = vec![
            example(&[0.9, 0.2], Label::Match),
            example(&[0.7, 0.9], Label::Match),
            example(&[0.1, 0.3], Label::Distinct),
            example(&[0.4, 0.1], Label::Distinct),
        ];
        let a = Classifier::fit(&examples, &permissive()).unwrap();
        let b = Classifier::fit(&examples, &permissive()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_indicator_gets_own_weight() {
        let missing = FeatureVector::from_similarities(vec![Some(0.2), None]);
        let mut examples = Vec::new();
        for _ in 0..3 {
            examples.push(example(&[0.9, 0.9], Label::Match));
            examples.push((missing.clone(), Label::Distinct));
        }
        let model = Classifier::fit(&examples, &permissive()).unwrap();
        assert!(model.missing_weights()[1] < 0.0);
        assert!(model.score(&missing) < 0.5);
        assert_eq!(model.contributions(&missing)[1], model.missing_weights()[1]);
    }

    #[test]
    fn test_score_monotone_with_positive_weight() {
        let model = Classifier::from_parts(vec![2.0, 1.0], vec![0.0, 0.0], -1.0, 0.0).unwrap();
        let mut last = 0.0;
        for step in 0..=10 {
            let s = model.score(&FeatureVector::dense(vec![step as f64 / 10.0, 0.5]));
            assert!(s >= last);
            last = s;
        }
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let examples = vec![example(&[1.0], Label::Match), example(&[0.0, 1.0], Label::Distinct)];
        assert!(matches!(
            Classifier::fit(&examples, &permissive()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_cross_validation_picks_grid_value() {
        let mut examples = Vec::new();
        for i in 0..6 {
            let jitter = i as f64 * 0.02;
            examples.push(example(&[0.8 + jitter], Label::Match));
            examples.push(example(&[0.2 - jitter], Label::Distinct));
        }
        let config = ClassifierConfig {
            min_examples_per_class: 1,
            cv_folds: 3,
            ..Default::default()
        };
        let model = Classifier::fit_cross_validated(&examples, &config).unwrap();
        assert!(config.regularization_grid.contains(&model.regularization()));
        assert!(model.score(&FeatureVector::dense(vec![0.9])) > 0.5);
    }

    #[test]
    fn test_backtrack_never_raises_objective() {
        let bowl = |theta: &[f64]| theta.iter().map(|t| t * t).sum::<f64>();
        // Descent direction: accepted at full step.
        let (point, t) = backtrack(&[2.0], &[2.0], bowl).unwrap();
        assert_eq!(t, 1.0);
        assert_eq!(point, vec![0.0]);
        // Overshoot: halved until the loss no longer rises.
        let (point, t) = backtrack(&[1.0], &[3.0], bowl).unwrap();
        assert_eq!(t, 0.5);
        assert!(bowl(&point) <= 1.0);
        // Ascent direction: every step raises the loss.
        assert_eq!(backtrack(&[1.0], &[-1.0], bowl), None);
    }

    #[test]
    fn test_negative_regularization_rejected() {
        let config = ClassifierConfig {
            regularization: -1.0,
            ..permissive()
        };
        let examples = vec![example(&[1.0], Label::Match), example(&[0.0], Label::Distinct)];
        assert!(matches!(Classifier::fit(&examples, &config), Err(Error::Configuration(_))));
    }
}
