use std::time::Instant;

use feature_processing::misc::{FWD_RETURN, HYPE, dense_column};
use feature_processing::{FeatureError, FeatureRow, FeatureSchema};
use log::{debug, info};
use polars::prelude::DataFrame;
use serde::Serialize;

use crate::boosting::{BoostedClassifier, BoostedRegressor};
use crate::config::EnsembleConfig;
use crate::error::EnsembleError;
use crate::forest::{BaggedClassifier, BaggedRegressor};
use crate::models::{Classifier, Regressor};

/// The four fitted models and the schema they were trained on. Immutable once
/// built.
pub struct EnsembleModelSet {
    schema: FeatureSchema,
    bagged_regressor: Box<dyn Regressor>,
    boosted_regressor: Box<dyn Regressor>,
    bagged_classifier: Box<dyn Classifier>,
    boosted_classifier: Box<dyn Classifier>,
}

impl EnsembleModelSet {
    pub fn from_parts(
        schema: FeatureSchema,
        bagged_regressor: Box<dyn Regressor>,
        boosted_regressor: Box<dyn Regressor>,
        bagged_classifier: Box<dyn Classifier>,
        boosted_classifier: Box<dyn Classifier>,
    ) -> Self {
        Self {
            schema,
            bagged_regressor,
            boosted_regressor,
            bagged_classifier,
            boosted_classifier,
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    /// Expected fractional change over the label horizon.
    pub growth: f64,
    pub hype: u8,
}

fn timed<T>(name: &str, fit: impl FnOnce() -> Result<T, EnsembleError>) -> Result<T, EnsembleError> {
    let started = Instant::now();
    let model = fit()?;
    info!("{name} fitted in {:?}", started.elapsed());
    Ok(model)
}

fn training_error(e: FeatureError) -> EnsembleError {
    match e {
        FeatureError::InputData(msg) => EnsembleError::TrainingData(msg),
        other => other.into(),
    }
}

fn hype_labels(rows: &DataFrame) -> Result<Vec<u8>, EnsembleError> {
    let column = rows
        .column(HYPE)
        .map_err(|_| EnsembleError::TrainingData(format!("missing `{HYPE}` column")))?
        .i32()?;
    column
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Some(0) => Ok(0),
            Some(1) => Ok(1),
            other => Err(EnsembleError::TrainingData(format!(
                "hype label at row {i} is {other:?}"
            ))),
        })
        .collect()
}

/// Fits the two regressors on `fwd_return` and the two classifiers on `hype`.
/// The four fits run concurrently and share nothing but the input matrix.
pub fn train(
    rows: &DataFrame,
    schema: &FeatureSchema,
    config: &EnsembleConfig,
) -> Result<EnsembleModelSet, EnsembleError> {
    if rows.height() < config.min_training_rows {
        return Err(EnsembleError::TrainingData(format!(
            "{} labelled rows, need at least {}",
            rows.height(),
            config.min_training_rows
        )));
    }

    let x = schema.matrix(rows).map_err(training_error)?;
    let growth = dense_column(rows, FWD_RETURN).map_err(training_error)?;
    let hype = hype_labels(rows)?;

    info!(
        "Training ensemble on {} rows x {} features ({} hype rows)",
        x.len(),
        schema.len(),
        hype.iter().filter(|h| **h == 1).count()
    );

    let ((bagged_regressor, boosted_regressor), (bagged_classifier, boosted_classifier)) =
        rayon::join(
            || {
                rayon::join(
                    || timed("bagged regressor", || BaggedRegressor::fit(&x, &growth, &config.bagging)),
                    || timed("boosted regressor", || BoostedRegressor::fit(&x, &growth, &config.boosting)),
                )
            },
            || {
                rayon::join(
                    || timed("bagged classifier", || BaggedClassifier::fit(&x, &hype, &config.bagging)),
                    || timed("boosted classifier", || BoostedClassifier::fit(&x, &hype, &config.boosting)),
                )
            },
        );

    Ok(EnsembleModelSet::from_parts(
        schema.clone(),
        Box::new(bagged_regressor?),
        Box::new(boosted_regressor?),
        Box::new(bagged_classifier?),
        Box::new(boosted_classifier?),
    ))
}

/// Arithmetic mean of the two regressor outputs.
pub fn fuse_growth(bagged: f64, boosted: f64) -> f64 {
    (bagged + boosted) / 2.0
}

/// Mean of the two votes rounded half to even, so a split vote is 0 and a
/// positive needs both classifiers.
pub fn fuse_hype(bagged: u8, boosted: u8) -> u8 {
    let mean = (f64::from(bagged) + f64::from(boosted)) / 2.0;
    mean.round_ties_even() as u8
}

pub fn predict(models: &EnsembleModelSet, row: &FeatureRow) -> Result<Prediction, EnsembleError> {
    let x = models.schema.vector(row)?;

    let growth = fuse_growth(
        models.bagged_regressor.predict(&x)?,
        models.boosted_regressor.predict(&x)?,
    );
    let hype = fuse_hype(
        models.bagged_classifier.predict_class(&x)?,
        models.boosted_classifier.predict_class(&x)?,
    );
    debug!(
        "{}/{} and {}/{} gave growth {growth:.5}, hype {hype}",
        models.bagged_regressor.name(),
        models.boosted_regressor.name(),
        models.bagged_classifier.name(),
        models.boosted_classifier.name()
    );

    Ok(Prediction { growth, hype })
}

#[cfg(test)]
mod tests {
    use super::*;
    use feature_processing::Feature;
    use feature_processing::misc::{MA10, RSI};
    use polars::prelude::*;

    struct Fixed(f64);

    impl Regressor for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&self, _: &[f64]) -> Result<f64, EnsembleError> {
            Ok(self.0)
        }
    }

    struct Vote(u8);

    impl Classifier for Vote {
        fn name(&self) -> &str {
            "vote"
        }

        fn predict_class(&self, _: &[f64]) -> Result<u8, EnsembleError> {
            Ok(self.0)
        }
    }

    fn stub_set(a: f64, b: f64, c: u8, d: u8) -> EnsembleModelSet {
        EnsembleModelSet::from_parts(
            FeatureSchema::new(vec![Feature::Rsi, Feature::Ma10]).unwrap(),
            Box::new(Fixed(a)),
            Box::new(Fixed(b)),
            Box::new(Vote(c)),
            Box::new(Vote(d)),
        )
    }

    fn row() -> FeatureRow {
        [(Feature::Rsi, 55.0), (Feature::Ma10, 101.0)].into_iter().collect()
    }

    #[test]
    fn test_hype_needs_both_votes() {
        assert_eq!(fuse_hype(0, 0), 0);
        assert_eq!(fuse_hype(1, 0), 0);
        assert_eq!(fuse_hype(0, 1), 0);
        assert_eq!(fuse_hype(1, 1), 1);
    }

    #[test]
    fn test_growth_is_mean() {
        assert_eq!(fuse_growth(0.02, 0.04), 0.03);
        for v in [0.0, -0.013, 0.1234567, 1e-9] {
            assert_eq!(fuse_growth(v, v), v);
        }
    }

    #[test]
    fn test_predict_with_stub_models() {
        let p = predict(&stub_set(0.01, 0.03, 1, 1), &row()).unwrap();
        assert!((p.growth - 0.02).abs() < 1e-12);
        assert_eq!(p.hype, 1);

        let p = predict(&stub_set(0.01, 0.03, 1, 0), &row()).unwrap();
        assert_eq!(p.hype, 0);
    }

    #[test]
    fn test_predict_missing_feature() {
        let partial: FeatureRow = [(Feature::Rsi, 55.0)].into_iter().collect();
        match predict(&stub_set(0.0, 0.0, 0, 0), &partial) {
            Err(EnsembleError::FeatureUnavailable(name)) => assert_eq!(name, "ma10"),
            other => panic!("expected FeatureUnavailable, got {:?}", other.map(|p| p.growth)),
        }
    }

    fn labelled(n: usize) -> DataFrame {
        let rsi: Vec<f64> = (0..n).map(|i| 30.0 + (i % 40) as f64).collect();
        let ma10: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 0.1).collect();
        let fwd: Vec<f64> = rsi.iter().map(|r| (r - 50.0) / 1000.0).collect();
        let hype: Vec<i32> = rsi.iter().map(|r| i32::from(*r > 65.0)).collect();
        df!(
            RSI => rsi,
            MA10 => ma10,
            FWD_RETURN => fwd,
            HYPE => hype
        )
        .unwrap()
    }

    fn quick_config() -> EnsembleConfig {
        let mut cfg = EnsembleConfig::default();
        cfg.bagging.n_trees = 10;
        cfg.boosting.rounds = 20;
        cfg
    }

    #[test]
    fn test_train_rejects_short_table() {
        let schema = FeatureSchema::new(vec![Feature::Rsi, Feature::Ma10]).unwrap();
        assert!(matches!(
            train(&labelled(20), &schema, &quick_config()),
            Err(EnsembleError::TrainingData(_))
        ));
    }

    #[test]
    fn test_train_rejects_undefined_cell() {
        let schema = FeatureSchema::new(vec![Feature::Rsi, Feature::Ma10]).unwrap();
        let mut df = labelled(60);
        let mut rsi: Vec<Option<f64>> = (0..60).map(|i| Some(30.0 + i as f64)).collect();
        rsi[10] = None;
        df.with_column(Series::new(RSI, rsi)).unwrap();
        assert!(matches!(
            train(&df, &schema, &quick_config()),
            Err(EnsembleError::TrainingData(_))
        ));
    }

    #[test]
    fn test_train_missing_schema_column() {
        let schema = FeatureSchema::new(vec![Feature::Rsi, Feature::Macd]).unwrap();
        assert!(matches!(
            train(&labelled(60), &schema, &quick_config()),
            Err(EnsembleError::FeatureUnavailable(_))
        ));
    }

    #[test]
    fn test_train_then_predict() {
        let schema = FeatureSchema::new(vec![Feature::Rsi, Feature::Ma10]).unwrap();
        let models = train(&labelled(120), &schema, &quick_config()).unwrap();
        assert_eq!(models.schema(), &schema);

        let p = predict(&models, &row()).unwrap();
        assert!(p.growth.is_finite());
        assert!(p.hype <= 1);
    }
}
