use std::path::Path;

use data_ingestion::config::ProviderConfig;
use data_ingestion::csv_store::merge_csv;
use data_ingestion::{
    DataIngestionError, Fundamentals, FundamentalsProvider, PriceProvider, PriceSeries,
};
use feature_processing::fundamentals::attach_fundamentals_with;
use feature_processing::misc::DATE;
use feature_processing::{FeatureSchema, compute_features, detect_hype, generate_labels};
use log::{info, warn};
use polars::prelude::DataFrame;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::engine::{predict, train};
use crate::error::EnsembleError;

#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub ticker: String,
    /// Date of the row the forecast was made from.
    pub as_of: String,
    #[serde(rename = "predicted_growth_5d")]
    pub predicted_growth: f64,
    pub hype_flag: u8,
    pub degraded_fundamentals: bool,
    pub training_rows: usize,
    pub features: Vec<&'static str>,
}

fn date_at(df: &DataFrame, index: usize) -> String {
    df.column(DATE)
        .ok()
        .and_then(|s| s.str().ok().and_then(|c| c.get(index).map(str::to_string)))
        .unwrap_or_default()
}

/// Runs every stage over an already acquired series and fundamentals
/// snapshot: features, fair value, hype, labels, training, then a forecast
/// for the most recent labelled row. CPU bound; call from a blocking worker.
pub fn run_pipeline(
    prices: &PriceSeries,
    fundamentals: &Fundamentals,
    config: &PipelineConfig,
) -> Result<Forecast, EnsembleError> {
    let ticker = prices.ticker();

    let table = compute_features(prices, config.fill_policy)?;
    let table = attach_fundamentals_with(table, ticker, fundamentals, config.reference_pe)?;
    let table = detect_hype(table, &config.hype)?;
    let labelled = generate_labels(table, config.horizon)?;

    let (schema, dropped) = FeatureSchema::standard().usable_for(&labelled)?;
    if !dropped.is_empty() {
        let names: Vec<&str> = dropped.iter().map(|f| f.column()).collect();
        warn!("{ticker}: training without undefined features {names:?}");
    }

    let latest = labelled
        .height()
        .checked_sub(1)
        .ok_or_else(|| EnsembleError::TrainingData(format!("{ticker}: no labelled rows")))?;
    let models = train(&labelled, &schema, &config.ensemble)?;

    let row = schema.row(&labelled, latest)?;
    let prediction = predict(&models, &row)?;

    let forecast = Forecast {
        ticker: ticker.to_string(),
        as_of: date_at(&labelled, latest),
        predicted_growth: prediction.growth,
        hype_flag: prediction.hype,
        degraded_fundamentals: fundamentals.usable_pe().is_none(),
        training_rows: labelled.height(),
        features: schema.column_names(),
    };
    info!(
        "{ticker} as of {}: growth {:.5}, hype {}",
        forecast.as_of, forecast.predicted_growth, forecast.hype_flag
    );
    Ok(forecast)
}

/// Fetches the configured history and merges the configured CSV under it.
pub async fn load_prices<P: PriceProvider>(
    ticker: &str,
    prices: &P,
    provider: &ProviderConfig,
) -> Result<PriceSeries, EnsembleError> {
    let mut rows = prices.fetch_history(ticker, &provider.period).await?;
    if let Some(path) = provider.csv_path.clone() {
        rows = tokio::task::spawn_blocking(move || merge_csv(rows, Path::new(&path)))
            .await
            .map_err(|e| EnsembleError::Worker(e.to_string()))?;
    }
    if rows.is_empty() {
        return Err(DataIngestionError::NoData(ticker.to_string()).into());
    }
    Ok(PriceSeries::new(ticker, rows)?)
}

/// A failed lookup degrades to an empty snapshot rather than failing the
/// forecast.
pub async fn load_fundamentals<F: FundamentalsProvider>(ticker: &str, provider: &F) -> Fundamentals {
    match provider.fetch_fundamentals(ticker).await {
        Ok(fundamentals) => fundamentals,
        Err(e) => {
            warn!("Fundamentals lookup for {ticker} failed, continuing without: {e}");
            Fundamentals::default()
        }
    }
}

/// Acquires prices and fundamentals, then runs the pipeline on a blocking
/// worker. Every provider call completes before the first table is built.
pub async fn forecast_ticker<P, F>(
    ticker: &str,
    prices: &P,
    fundamentals: &F,
    provider: &ProviderConfig,
    config: &PipelineConfig,
) -> Result<Forecast, EnsembleError>
where
    P: PriceProvider,
    F: FundamentalsProvider,
{
    let series = load_prices(ticker, prices, provider).await?;
    let snapshot = load_fundamentals(series.ticker(), fundamentals).await;
    let config = config.clone();

    tokio::task::spawn_blocking(move || run_pipeline(&series, &snapshot, &config))
        .await
        .map_err(|e| EnsembleError::Worker(e.to_string()))?
}
