//! Random forest: bootstrap-aggregated `linfa-trees` CART trees with
//! majority voting.
//!
//! Tree `t` draws its bootstrap sample from ChaCha stream `t` of the
//! configured seed, so the fitted forest does not depend on how rayon
//! schedules the trees. Every tree sees all features.

use linfa::prelude::{Dataset, Fit, Predict};
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::Classifier;
use crate::config::ForestConfig;
use crate::data::Label;
use crate::error::FedGuardError;

/// Most frequent class index; ties go to the lowest index.
fn majority(counts: &[usize]) -> usize {
    let mut best = 0;
    for (k, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = k;
        }
    }
    best
}

/// Random-forest classifier.
#[derive(Clone, Debug, Default)]
pub struct RandomForest {
    config: ForestConfig,
    classes: Vec<Label>,
    trees: Vec<DecisionTree<f64, usize>>,
}

impl RandomForest {
    /// Create an unfitted forest.
    pub fn new(config: ForestConfig) -> Result<Self, FedGuardError> {
        config.validate()?;
        Ok(Self {
            config,
            classes: Vec::new(),
            trees: Vec::new(),
        })
    }

    /// Forest settings.
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Fitted trees.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Classes seen during fitting, ascending.
    pub fn classes(&self) -> &[Label] {
        &self.classes
    }
}

impl Classifier for RandomForest {
    fn fit(
        &mut self,
        features: ArrayView2<'_, f64>,
        labels: ArrayView1<'_, Label>,
    ) -> Result<(), FedGuardError> {
        let n = features.nrows();
        if n == 0 || n != labels.len() {
            return Err(FedGuardError::ShapeError(format!(
                "cannot fit on {} rows with {} labels",
                n,
                labels.len()
            )));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(FedGuardError::InvalidRequest(
                "random forest features must be finite".to_string(),
            ));
        }

        let mut classes: Vec<Label> = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        let targets: Array1<usize> = labels
            .iter()
            .map(|l| classes.binary_search(l).unwrap_or(0))
            .collect();

        let params = DecisionTree::<f64, usize>::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(self.config.max_depth)
            .min_weight_split(self.config.min_samples_split as f32)
            .min_weight_leaf(1.0);
        let seed = self.config.seed;

        let trees: Result<Vec<DecisionTree<f64, usize>>, FedGuardError> = (0..self
            .config
            .n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(t as u64);
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let dataset = Dataset::new(
                    features.select(Axis(0), &rows),
                    targets.select(Axis(0), &rows),
                );
                let tree: Result<DecisionTree<f64, usize>, linfa::Error> = params.fit(&dataset);
                tree.map_err(|e| FedGuardError::Classifier(e.to_string()))
            })
            .collect();

        self.trees = trees?;
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<Label>, FedGuardError> {
        if self.trees.is_empty() {
            return Err(FedGuardError::InvalidRequest(
                "random forest has not been fitted".to_string(),
            ));
        }
        let per_tree: Vec<Array1<usize>> = self
            .trees
            .par_iter()
            .map(|tree| -> Array1<usize> { tree.predict(&features) })
            .collect();

        let predictions: Vec<Label> = (0..features.nrows())
            .into_par_iter()
            .map(|row| {
                let mut votes = vec![0usize; self.classes.len()];
                for tree_votes in &per_tree {
                    votes[tree_votes[row]] += 1;
                }
                self.classes[majority(&votes)]
            })
            .collect();
        Ok(Array1::from(predictions))
    }

    fn name(&self) -> &str {
        "random_forest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn small_forest(n_estimators: usize) -> RandomForest {
        RandomForest::new(ForestConfig {
            n_estimators,
            ..ForestConfig::default()
        })
        .unwrap()
    }

    fn blobs() -> (Array2<f64>, Array1<Label>) {
        let x = array![
            [0.0, 0.1],
            [0.2, 0.0],
            [0.1, 0.3],
            [0.3, 0.2],
            [5.0, 5.1],
            [5.2, 4.9],
            [4.9, 5.0],
            [5.1, 5.3]
        ];
        let y = array![10, 10, 10, 10, 20, 20, 20, 20];
        (x, y)
    }

    #[test]
    fn test_majority_tie_goes_to_lowest() {
        assert_eq!(majority(&[2, 5, 5]), 1);
        assert_eq!(majority(&[0, 0]), 0);
    }

    #[test]
    fn test_forest_learns_separable_blobs() {
        let (x, y) = blobs();
        let mut forest = small_forest(25);
        forest.fit(x.view(), y.view()).unwrap();

        assert_eq!(forest.n_trees(), 25);
        assert_eq!(forest.classes(), &[10, 20]);
        let pred = forest.predict(array![[0.1, 0.1], [5.0, 5.0]].view()).unwrap();
        assert_eq!(pred.to_vec(), vec![10, 20]);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (x, y) = blobs();
        let queries = array![[0.1, 0.1], [2.5, 2.5], [2.6, 2.4], [5.0, 5.0]];
        let mut a = small_forest(10);
        let mut b = small_forest(10);
        a.fit(x.view(), y.view()).unwrap();
        b.fit(x.view(), y.view()).unwrap();
        assert_eq!(
            a.predict(queries.view()).unwrap(),
            b.predict(queries.view()).unwrap()
        );
    }

    #[test]
    fn test_predict_before_fit_errors() {
        let forest = small_forest(3);
        assert!(forest.predict(array![[1.0]].view()).is_err());
    }

    #[test]
    fn test_fit_rejects_empty() {
        let mut forest = small_forest(3);
        let x = Array2::<f64>::zeros((0, 2));
        let y = Array1::<Label>::zeros(0);
        assert!(forest.fit(x.view(), y.view()).is_err());
    }

    #[test]
    fn test_fit_rejects_non_finite() {
        let mut forest = small_forest(3);
        let x = array![[0.0, 1.0], [f64::NEG_INFINITY, 2.0], [3.0, 4.0]];
        let y = array![0, 1, 0];
        let err = forest.fit(x.view(), y.view()).unwrap_err();
        assert!(matches!(err, FedGuardError::InvalidRequest(_)));
        assert_eq!(forest.n_trees(), 0);
    }

    #[test]
    fn test_single_class_pool() {
        let mut forest = small_forest(5);
        forest
            .fit(array![[1.0], [2.0]].view(), array![4, 4].view())
            .unwrap();
        let pred = forest.predict(array![[9.0]].view()).unwrap();
        assert_eq!(pred.to_vec(), vec![4]);
    }
}
