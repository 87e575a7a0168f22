use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use data_ingestion::config::ProviderConfig;
use data_ingestion::csv_store::{merge_csv, write_csv};
use data_ingestion::error::DataIngestionError;
use data_ingestion::fetcher::{PriceProvider, PriceSeries, QuoteClient};
use data_ingestion::logger::init_logger;
use log::info;

/// Fetch daily history for one ticker and snapshot it to CSV.
#[derive(Parser)]
struct Args {
    ticker: String,
    output: PathBuf,
    /// Overrides the configured history period.
    #[arg(long)]
    period: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logger();

    let args = Args::parse();
    let config = ProviderConfig::from_env()?;
    let period = args.period.unwrap_or_else(|| config.period.clone());
    let ticker = args.ticker.to_uppercase();

    let client = QuoteClient::new(config.clone())?;
    let mut rows = client.fetch_history(&ticker, &period).await?;
    if rows.is_empty() {
        return Err(DataIngestionError::NoData(ticker).into());
    }

    if let Some(csv_path) = config.csv_path.as_deref() {
        rows = merge_csv(rows, Path::new(csv_path));
    }

    // validates ordering and OHLCV before anything is written
    let series = PriceSeries::new(&ticker, rows)?;
    write_csv(&args.output, series.rows())?;

    info!(
        "Wrote {} rows for {} to {}",
        series.len(),
        series.ticker(),
        args.output.display()
    );
    Ok(())
}
