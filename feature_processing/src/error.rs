use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Invalid input data: {0}")]
    InputData(String),

    #[error("Feature unavailable: {0}")]
    FeatureUnavailable(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}
