use data_ingestion::error::DataIngestionError;
use feature_processing::error::FeatureError;
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("Training data error: {0}")]
    TrainingData(String),

    #[error("Feature unavailable: {0}")]
    FeatureUnavailable(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Pipeline worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Feature(FeatureError),

    #[error(transparent)]
    Ingestion(#[from] DataIngestionError),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

impl From<FeatureError> for EnsembleError {
    fn from(e: FeatureError) -> Self {
        match e {
            FeatureError::FeatureUnavailable(name) => EnsembleError::FeatureUnavailable(name),
            other => EnsembleError::Feature(other),
        }
    }
}
