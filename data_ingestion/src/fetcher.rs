use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::DataIngestionError;

/// One trading day of one security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Point-in-time snapshot of an issuer's fundamentals. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub trailing_pe: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub ebitda: Option<f64>,
}

impl Fundamentals {
    /// Trailing PE when it can anchor a fair value: finite and positive.
    pub fn usable_pe(&self) -> Option<f64> {
        self.trailing_pe.filter(|pe| pe.is_finite() && *pe > 0.0)
    }
}

/// An ordered, validated price history. Dates strictly increase.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    ticker: String,
    rows: Vec<PriceRow>,
}

impl PriceSeries {
    pub fn new(ticker: &str, rows: Vec<PriceRow>) -> Result<Self, DataIngestionError> {
        if rows.is_empty() {
            return Err(DataIngestionError::InputData(format!(
                "empty price series for {ticker}"
            )));
        }

        for (i, row) in rows.iter().enumerate() {
            if !validate_data(row) {
                return Err(DataIngestionError::InputData(format!(
                    "malformed row {i} ({}) for {ticker}",
                    row.date
                )));
            }
        }

        if let Some(pair) = rows.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(DataIngestionError::InputData(format!(
                "dates must strictly increase: {} followed by {}",
                pair[0].date, pair[1].date
            )));
        }

        Ok(Self {
            ticker: ticker.to_uppercase(),
            rows,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }
}

pub fn validate_data(data: &PriceRow) -> bool {
    let mut is_valid = true;
    if !(data.volume >= 0.0 && data.volume.is_finite()) {
        warn!("Invalid Volume data on {}", data.date);
        is_valid = false;
    }

    for (name, value) in [
        ("Open", data.open),
        ("High", data.high),
        ("Low", data.low),
        ("Close", data.close),
    ] {
        if !(value > 0.0 && value.is_finite()) {
            warn!("{name} must be positive on {}", data.date);
            is_valid = false;
        }
    }

    is_valid
}

/// Sorts by date and keeps the last occurrence of each date.
pub fn normalize_rows(mut rows: Vec<PriceRow>) -> Vec<PriceRow> {
    rows.sort_by_key(|r| r.date);
    let mut out: Vec<PriceRow> = Vec::with_capacity(rows.len());
    for row in rows {
        match out.last_mut() {
            Some(last) if last.date == row.date => *last = row,
            _ => out.push(row),
        }
    }
    out
}

pub trait PriceProvider: Send + Sync {
    /// Daily history for `ticker` over `period` (e.g. `5y`). May be empty.
    fn fetch_history(
        &self,
        ticker: &str,
        period: &str,
    ) -> impl Future<Output = Result<Vec<PriceRow>, DataIngestionError>> + Send;
}

pub trait FundamentalsProvider: Send + Sync {
    fn fetch_fundamentals(
        &self,
        ticker: &str,
    ) -> impl Future<Output = Result<Fundamentals, DataIngestionError>> + Send;
}

#[derive(Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
}

#[derive(Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Quote provider backed by the Yahoo chart and quote-summary endpoints.
pub struct QuoteClient {
    client: Client,
    config: ProviderConfig,
}

impl QuoteClient {
    pub fn new(config: ProviderConfig) -> Result<Self, DataIngestionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("hypecast/0.1")
            .build()?;
        Ok(Self { client, config })
    }
}

impl PriceProvider for QuoteClient {
    async fn fetch_history(
        &self,
        ticker: &str,
        period: &str,
    ) -> Result<Vec<PriceRow>, DataIngestionError> {
        let url = format!("{}/{}", self.config.chart_url, ticker);
        info!("Fetching {period} of daily history for {ticker}");

        let response: ChartResponse = self
            .client
            .get(url)
            .query(&[("range", period), ("interval", "1d")])
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let rows = response
            .chart
            .result
            .and_then(|mut results| results.pop())
            .map(chart_rows)
            .unwrap_or_default();

        debug!("Received {} rows for {ticker}", rows.len());
        Ok(normalize_rows(rows))
    }
}

impl FundamentalsProvider for QuoteClient {
    async fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals, DataIngestionError> {
        let url = format!("{}/{}", self.config.summary_url, ticker);
        let json_resp: serde_json::Value = self
            .client
            .get(url)
            .query(&[(
                "modules",
                "summaryDetail,defaultKeyStatistics,financialData",
            )])
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let summary = &json_resp["quoteSummary"]["result"][0];
        let fundamentals = Fundamentals {
            trailing_pe: summary["summaryDetail"]["trailingPE"]["raw"].as_f64(),
            enterprise_value: summary["defaultKeyStatistics"]["enterpriseValue"]["raw"].as_f64(),
            ebitda: summary["financialData"]["ebitda"]["raw"].as_f64(),
        };
        debug!("Fundamentals for {ticker}: {fundamentals:?}");
        Ok(fundamentals)
    }
}

// rows with any missing field are dropped
fn chart_rows(result: ChartResult) -> Vec<PriceRow> {
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Vec::new();
    };

    result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            Some(PriceRow {
                date,
                open: (*quote.open.get(i)?)?,
                high: (*quote.high.get(i)?)?,
                low: (*quote.low.get(i)?)?,
                close: (*quote.close.get(i)?)?,
                volume: (*quote.volume.get(i)?)?,
            })
        })
        .collect()
}
