//! Train/test evaluation of a pooled dataset.
//!
//! [`EvaluationPipeline::evaluate`] splits a pool with a seeded stratified
//! split, fits a fresh copy of its classifier on the training rows and
//! reports accuracy on both partitions. The aggregator calls it once on
//! every client's data and once on the data that survived screening.

pub mod forest;
pub mod split;

pub use forest::RandomForest;
pub use split::{stratified_split, Split};

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::config::EvaluationConfig;
use crate::data::Label;
use crate::error::FedGuardError;

/// A trainable classifier over real-valued features.
pub trait Classifier: Send + Sync {
    /// Fit on `features` (rows are samples) and aligned `labels`.
    fn fit(
        &mut self,
        features: ArrayView2<'_, f64>,
        labels: ArrayView1<'_, Label>,
    ) -> Result<(), FedGuardError>;

    /// Predict one label per row.
    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<Label>, FedGuardError>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}

/// Accuracy on both partitions of one evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    /// Fraction of training rows predicted exactly
    pub train: f64,
    /// Fraction of held-out rows predicted exactly
    pub test: f64,
}

/// Fraction of `predicted` equal to `truth`; zero for empty input.
pub fn accuracy(predicted: ArrayView1<'_, Label>, truth: ArrayView1<'_, Label>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(truth.iter())
        .filter(|(p, t)| p == t)
        .count();
    correct as f64 / truth.len() as f64
}

/// Split, fit and score.
///
/// Holds an unfitted classifier prototype; every evaluation trains its
/// own clone so calls are independent and repeatable.
#[derive(Clone, Debug)]
pub struct EvaluationPipeline<C = RandomForest> {
    config: EvaluationConfig,
    prototype: C,
}

impl EvaluationPipeline<RandomForest> {
    /// Pipeline with the configured random forest.
    pub fn new(config: EvaluationConfig) -> Result<Self, FedGuardError> {
        let forest = RandomForest::new(config.forest.clone())?;
        Self::with_classifier(config, forest)
    }
}

impl<C: Classifier + Clone> EvaluationPipeline<C> {
    /// Pipeline with a custom classifier prototype.
    pub fn with_classifier(config: EvaluationConfig, prototype: C) -> Result<Self, FedGuardError> {
        config.validate()?;
        Ok(Self { config, prototype })
    }

    /// Evaluation settings.
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Name of the classifier being trained.
    pub fn classifier_name(&self) -> &str {
        self.prototype.name()
    }

    /// Train on a stratified split of the pool and score both partitions.
    ///
    /// An empty pool yields zero accuracy without fitting anything.
    pub fn evaluate(
        &self,
        features: ArrayView2<'_, f32>,
        labels: ArrayView1<'_, Label>,
    ) -> Result<Accuracy, FedGuardError> {
        if features.nrows() != labels.len() {
            return Err(FedGuardError::ShapeError(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        if labels.is_empty() {
            return Ok(Accuracy::default());
        }

        let label_vec = labels.to_vec();
        let Split { train, test } =
            stratified_split(&label_vec, self.config.test_fraction, self.config.seed);

        let x = features.mapv(f64::from);
        let x_train = x.select(Axis(0), &train);
        let y_train = labels.select(Axis(0), &train);
        let x_test = x.select(Axis(0), &test);
        let y_test = labels.select(Axis(0), &test);

        let mut classifier = self.prototype.clone();
        classifier.fit(x_train.view(), y_train.view())?;

        let train_acc = accuracy(classifier.predict(x_train.view())?.view(), y_train.view());
        let test_acc = if test.is_empty() {
            0.0
        } else {
            accuracy(classifier.predict(x_test.view())?.view(), y_test.view())
        };

        log::debug!(
            "{}: train={} rows acc={:.4}, test={} rows acc={:.4}",
            classifier.name(),
            train.len(),
            train_acc,
            test.len(),
            test_acc
        );

        Ok(Accuracy {
            train: train_acc,
            test: test_acc,
        })
    }
}
