//! Trains a bagged/boosted ensemble per request and serves forecasts over
//! HTTP.

pub mod boosting;
pub mod config;
pub mod engine;
pub mod error;
pub mod forest;
pub mod misc;
pub mod models;
pub mod pipeline;
pub mod server;

pub use config::{EnsembleConfig, PipelineConfig};
pub use engine::{EnsembleModelSet, Prediction, fuse_growth, fuse_hype, predict, train};
pub use error::EnsembleError;
pub use models::{Classifier, Regressor};
pub use pipeline::{Forecast, forecast_ticker, run_pipeline};
