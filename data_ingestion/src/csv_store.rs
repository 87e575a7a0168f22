use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::DataIngestionError;
use crate::fetcher::{PriceProvider, PriceRow, QuoteClient, normalize_rows};

/// On-disk layout: `Date,Open,High,Low,Close,Volume`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CsvRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl From<CsvRow> for PriceRow {
    fn from(r: CsvRow) -> Self {
        PriceRow {
            date: r.date,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
        }
    }
}

impl From<&PriceRow> for CsvRow {
    fn from(r: &PriceRow) -> Self {
        CsvRow {
            date: r.date,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
        }
    }
}

pub fn read_csv(path: &Path) -> Result<Vec<PriceRow>, DataIngestionError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize::<CsvRow>() {
        rows.push(record?.into());
    }
    Ok(rows)
}

pub fn write_csv(path: &Path, rows: &[PriceRow]) -> Result<(), DataIngestionError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(CsvRow::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

/// Merges an uploaded CSV under the fetched history. On a shared date the
/// fetched row wins. An unreadable CSV leaves `fetched` untouched.
pub fn merge_csv(fetched: Vec<PriceRow>, path: &Path) -> Vec<PriceRow> {
    let uploaded = match read_csv(path) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Skipping CSV merge from {}: {e}", path.display());
            return fetched;
        }
    };

    debug!(
        "Merging {} uploaded rows with {} fetched rows",
        uploaded.len(),
        fetched.len()
    );

    // normalize_rows keeps the last row per date, so fetched goes second
    let mut combined = uploaded;
    combined.extend(fetched);
    normalize_rows(combined)
}

/// Serves `<dir>/<TICKER>.csv`. The period argument is ignored; the file is
/// the whole history.
pub struct CsvPriceProvider {
    dir: PathBuf,
}

impl CsvPriceProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", ticker.to_uppercase()))
    }
}

impl PriceProvider for CsvPriceProvider {
    async fn fetch_history(
        &self,
        ticker: &str,
        _period: &str,
    ) -> Result<Vec<PriceRow>, DataIngestionError> {
        let path = self.path_for(ticker);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(normalize_rows(read_csv(&path)?))
    }
}

/// Where the server reads price history from.
pub enum PriceSource {
    Quote(QuoteClient),
    Csv(CsvPriceProvider),
}

impl PriceSource {
    /// A CSV directory in the config takes precedence over the HTTP provider.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, DataIngestionError> {
        match &config.csv_dir {
            Some(dir) => Ok(PriceSource::Csv(CsvPriceProvider::new(dir))),
            None => Ok(PriceSource::Quote(QuoteClient::new(config.clone())?)),
        }
    }
}

impl PriceProvider for PriceSource {
    async fn fetch_history(
        &self,
        ticker: &str,
        period: &str,
    ) -> Result<Vec<PriceRow>, DataIngestionError> {
        match self {
            PriceSource::Quote(client) => client.fetch_history(ticker, period).await,
            PriceSource::Csv(store) => store.fetch_history(ticker, period).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: u32, close: f64) -> PriceRow {
        PriceRow {
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 500.0,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hypecast-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_write_then_read_preserves_rows() {
        let path = temp_path("roundtrip.csv");
        let rows = vec![row(1, 10.0), row(4, 12.5)];
        write_csv(&path, &rows).unwrap();
        let back = read_csv(&path).unwrap();
        assert_eq!(back, rows);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_merge_prefers_fetched_rows() {
        let path = temp_path("merge.csv");
        write_csv(&path, &[row(1, 10.0), row(2, 99.0)]).unwrap();

        let merged = merge_csv(vec![row(2, 11.0), row(3, 12.0)], &path);
        let closes: Vec<f64> = merged.iter().map(|r| r.close).collect();
        assert_eq!(closes, vec![10.0, 11.0, 12.0]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_merge_missing_file_is_noop() {
        let fetched = vec![row(1, 10.0)];
        let merged = merge_csv(fetched.clone(), Path::new("/nonexistent/upload.csv"));
        assert_eq!(merged, fetched);
    }

    #[tokio::test]
    async fn test_csv_provider_missing_ticker_is_empty() {
        let provider = CsvPriceProvider::new(std::env::temp_dir());
        let rows = provider.fetch_history("NO_SUCH_TICKER_XYZ", "5y").await.unwrap();
        assert!(rows.is_empty());
    }
}
