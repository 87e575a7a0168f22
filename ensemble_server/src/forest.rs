//! Bagged tree models backed by smartcore random forests.

use log::debug;
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::config::BaggingConfig;
use crate::error::EnsembleError;
use crate::models::{Classifier, Regressor};

type Matrix = DenseMatrix<f64>;

fn to_matrix(rows: &[Vec<f64>]) -> Result<Matrix, EnsembleError> {
    DenseMatrix::from_2d_array(&rows.iter().map(|row| row.as_slice()).collect::<Vec<_>>())
        .map_err(|e| EnsembleError::Model(format!("cannot build feature matrix: {e:?}")))
}

/// Both forests share the classifier's `u16` tree count.
fn tree_count(config: &BaggingConfig) -> Result<u16, EnsembleError> {
    u16::try_from(config.n_trees)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            EnsembleError::Model(format!(
                "n_trees must be in [1, {}], got {}",
                u16::MAX,
                config.n_trees
            ))
        })
}

fn check_shape(x: &[Vec<f64>], targets: usize) -> Result<usize, EnsembleError> {
    let width = x.first().map(Vec::len).unwrap_or(0);
    if x.is_empty() || width == 0 {
        return Err(EnsembleError::TrainingData("empty training matrix".to_string()));
    }
    if x.len() != targets || x.iter().any(|row| row.len() != width) {
        return Err(EnsembleError::TrainingData(format!(
            "matrix of {} rows does not match {targets} targets",
            x.len()
        )));
    }
    Ok(width)
}

pub struct BaggedRegressor {
    model: RandomForestRegressor<f64, f64, Matrix, Vec<f64>>,
}

impl BaggedRegressor {
    /// Every split considers all features, as a regression forest usually does.
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &BaggingConfig) -> Result<Self, EnsembleError> {
        let width = check_shape(x, y.len())?;
        let n_trees = tree_count(config)?;
        let matrix = to_matrix(x)?;

        let mut params = RandomForestRegressorParameters::default()
            .with_n_trees(usize::from(n_trees))
            .with_m(width)
            .with_seed(config.seed);
        if let Some(depth) = config.max_depth {
            params = params.with_max_depth(depth);
        }

        let model = RandomForestRegressor::fit(&matrix, &y.to_vec(), params)
            .map_err(|e| EnsembleError::Model(format!("bagged regressor: {e}")))?;
        debug!("Fitted bagged regressor on {} rows", x.len());
        Ok(Self { model })
    }
}

impl Regressor for BaggedRegressor {
    fn name(&self) -> &str {
        "bagged_regressor"
    }

    fn predict(&self, features: &[f64]) -> Result<f64, EnsembleError> {
        let input = to_matrix(&[features.to_vec()])?;
        let prediction = self
            .model
            .predict(&input)
            .map_err(|e| EnsembleError::Model(format!("bagged regressor: {e}")))?;
        prediction
            .first()
            .copied()
            .ok_or_else(|| EnsembleError::Model("bagged regressor returned nothing".to_string()))
    }
}

enum ClassifierModel {
    Forest(RandomForestClassifier<f64, i32, Matrix, Vec<i32>>),
    /// The training labels held a single class.
    Constant(u8),
}

pub struct BaggedClassifier {
    model: ClassifierModel,
}

impl BaggedClassifier {
    pub fn fit(x: &[Vec<f64>], y: &[u8], config: &BaggingConfig) -> Result<Self, EnsembleError> {
        check_shape(x, y.len())?;
        let n_trees = tree_count(config)?;

        if let Some(first) = y.first().copied().filter(|c| y.iter().all(|v| v == c)) {
            debug!("Bagged classifier saw only class {first}; predicting it constantly");
            return Ok(Self {
                model: ClassifierModel::Constant(first),
            });
        }

        let matrix = to_matrix(x)?;
        let labels: Vec<i32> = y.iter().map(|c| i32::from(*c)).collect();

        let mut params = RandomForestClassifierParameters::default()
            .with_n_trees(n_trees)
            .with_seed(config.seed);
        if let Some(depth) = config.max_depth {
            params = params.with_max_depth(depth);
        }

        let model = RandomForestClassifier::fit(&matrix, &labels, params)
            .map_err(|e| EnsembleError::Model(format!("bagged classifier: {e}")))?;
        debug!("Fitted bagged classifier on {} rows", x.len());
        Ok(Self {
            model: ClassifierModel::Forest(model),
        })
    }
}

impl Classifier for BaggedClassifier {
    fn name(&self) -> &str {
        "bagged_classifier"
    }

    fn predict_class(&self, features: &[f64]) -> Result<u8, EnsembleError> {
        match &self.model {
            ClassifierModel::Constant(class) => Ok(*class),
            ClassifierModel::Forest(model) => {
                let input = to_matrix(&[features.to_vec()])?;
                let prediction = model
                    .predict(&input)
                    .map_err(|e| EnsembleError::Model(format!("bagged classifier: {e}")))?;
                match prediction.first() {
                    Some(class) => Ok(u8::from(*class == 1)),
                    None => Err(EnsembleError::Model(
                        "bagged classifier returned nothing".to_string(),
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> BaggingConfig {
        BaggingConfig {
            n_trees: 20,
            ..Default::default()
        }
    }

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<u8>) {
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64, (i % 7) as f64]).collect();
        let y: Vec<f64> = (0..60).map(|i| if i < 30 { 1.0 } else { 5.0 }).collect();
        let c: Vec<u8> = (0..60).map(|i| u8::from(i >= 30)).collect();
        (x, y, c)
    }

    #[test]
    fn test_regressor_learns_step() {
        let (x, y, _) = step_data();
        let model = BaggedRegressor::fit(&x, &y, &small_config()).unwrap();
        assert!(model.predict(&[5.0, 5.0]).unwrap() < 2.0);
        assert!(model.predict(&[55.0, 6.0]).unwrap() > 4.0);
    }

    #[test]
    fn test_classifier_learns_step() {
        let (x, _, c) = step_data();
        let model = BaggedClassifier::fit(&x, &c, &small_config()).unwrap();
        assert_eq!(model.predict_class(&[2.0, 2.0]).unwrap(), 0);
        assert_eq!(model.predict_class(&[58.0, 2.0]).unwrap(), 1);
    }

    #[test]
    fn test_single_class_is_constant() {
        let (x, _, _) = step_data();
        let zeros = vec![0u8; x.len()];
        let model = BaggedClassifier::fit(&x, &zeros, &small_config()).unwrap();
        assert_eq!(model.predict_class(&[58.0, 2.0]).unwrap(), 0);
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let (x, y, _) = step_data();
        let a = BaggedRegressor::fit(&x, &y, &small_config()).unwrap();
        let b = BaggedRegressor::fit(&x, &y, &small_config()).unwrap();
        for point in [[3.0, 1.0], [29.5, 4.0], [31.0, 0.0]] {
            assert_eq!(a.predict(&point).unwrap(), b.predict(&point).unwrap());
        }
    }

    #[test]
    fn test_tree_count_out_of_range_rejected() {
        let (x, y, c) = step_data();
        for n_trees in [0, usize::from(u16::MAX) + 1] {
            let cfg = BaggingConfig {
                n_trees,
                ..small_config()
            };
            assert!(matches!(
                BaggedRegressor::fit(&x, &y, &cfg),
                Err(EnsembleError::Model(_))
            ));
            assert!(matches!(
                BaggedClassifier::fit(&x, &c, &cfg),
                Err(EnsembleError::Model(_))
            ));
            // rejected before the single-class shortcut
            assert!(BaggedClassifier::fit(&x, &vec![1u8; x.len()], &cfg).is_err());
        }
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let x = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            BaggedRegressor::fit(&x, &[1.0, 2.0], &small_config()),
            Err(EnsembleError::TrainingData(_))
        ));
    }
}
