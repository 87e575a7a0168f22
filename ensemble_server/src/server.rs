use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{
    Router,
    extract::State,
    response::Json,
    routing::{get, post},
};
use data_ingestion::config::ProviderConfig;
use data_ingestion::csv_store::PriceSource;
use data_ingestion::fetcher::QuoteClient;
use data_ingestion::{DataIngestionError, FundamentalsProvider, PriceProvider, PriceSeries};
use feature_processing::{CorrelationMatrix, FeatureError, correlation_matrix};
use log::{error, info, warn};
use tokio::signal;

use crate::config::PipelineConfig;
use crate::error::EnsembleError;
use crate::misc::{CorrelationRequest, ErrorBody, PredictRequest};
use crate::pipeline::{Forecast, forecast_ticker, load_prices};

/// Shared, read-only handles for the request handlers.
pub struct AppState<P, F> {
    prices: Arc<P>,
    fundamentals: Arc<F>,
    provider: Arc<ProviderConfig>,
    pipeline: Arc<PipelineConfig>,
}

impl<P, F> Clone for AppState<P, F> {
    fn clone(&self) -> Self {
        Self {
            prices: self.prices.clone(),
            fundamentals: self.fundamentals.clone(),
            provider: self.provider.clone(),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<P, F> AppState<P, F> {
    pub fn new(prices: P, fundamentals: F, provider: ProviderConfig, pipeline: PipelineConfig) -> Self {
        Self {
            prices: Arc::new(prices),
            fundamentals: Arc::new(fundamentals),
            provider: Arc::new(provider),
            pipeline: Arc::new(pipeline),
        }
    }
}

pub struct ApiError(EnsembleError);

impl From<EnsembleError> for ApiError {
    fn from(e: EnsembleError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EnsembleError::Ingestion(DataIngestionError::NoData(_)) => StatusCode::NOT_FOUND,
            EnsembleError::Ingestion(DataIngestionError::InputData(_))
            | EnsembleError::TrainingData(_)
            | EnsembleError::Feature(FeatureError::InputData(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            EnsembleError::Ingestion(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// POST /predict trains a fresh ensemble for the ticker and returns its
/// forecast.
async fn predict<P, F>(
    State(state): State<AppState<P, F>>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<Forecast>, ApiError>
where
    P: PriceProvider + 'static,
    F: FundamentalsProvider + 'static,
{
    let ticker = req.ticker.trim().to_uppercase();
    info!("Forecast requested for {ticker}");
    let forecast = forecast_ticker(
        &ticker,
        state.prices.as_ref(),
        state.fundamentals.as_ref(),
        &state.provider,
        &state.pipeline,
    )
    .await?;
    Ok(Json(forecast))
}

/// POST /correlation returns return correlations over one year of history.
async fn correlation<P, F>(
    State(state): State<AppState<P, F>>,
    Json(req): Json<CorrelationRequest>,
) -> Result<Json<CorrelationMatrix>, ApiError>
where
    P: PriceProvider + 'static,
    F: FundamentalsProvider + 'static,
{
    let provider = ProviderConfig {
        period: "1y".to_string(),
        csv_path: None,
        ..state.provider.as_ref().clone()
    };

    let mut series: Vec<PriceSeries> = Vec::with_capacity(req.tickers.len());
    for ticker in &req.tickers {
        match load_prices(&ticker.trim().to_uppercase(), state.prices.as_ref(), &provider).await {
            Ok(s) => series.push(s),
            Err(e) => warn!("Skipping {ticker} in correlation: {e}"),
        }
    }

    let matrix = correlation_matrix(&series).map_err(EnsembleError::from)?;
    Ok(Json(matrix))
}

async fn health() -> &'static str {
    "ok"
}

pub fn router<P, F>(state: AppState<P, F>) -> Router
where
    P: PriceProvider + 'static,
    F: FundamentalsProvider + 'static,
{
    Router::new()
        .route("/predict", post(predict::<P, F>))
        .route("/correlation", post(correlation::<P, F>))
        .route("/health", get(health))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Received shutdown signal, initiating graceful shutdown");
}

pub struct Server {
    state: AppState<PriceSource, QuoteClient>,
    addr: SocketAddr,
}

impl Server {
    pub fn init(provider: ProviderConfig, pipeline: PipelineConfig) -> Result<Self> {
        let addr: SocketAddr = pipeline.bind_addr.parse()?;
        let prices = PriceSource::from_config(&provider)?;
        let fundamentals = QuoteClient::new(provider.clone())?;

        Ok(Self {
            state: AppState::new(prices, fundamentals, provider, pipeline),
            addr,
        })
    }

    pub async fn run(&self) -> Result<()> {
        let app = router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("HTTP server running on {}", self.addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}
