use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    pub ticker: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorrelationRequest {
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
