use data_ingestion::fetcher::PriceSeries;
use log::debug;
use polars::prelude::*;
use serde::Deserialize;

use crate::error::FeatureError;
use crate::indicators::{macd, rsi};
use crate::misc::*;

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL_PERIOD: usize = 9;
pub const VOLATILITY_WINDOW: usize = 10;
pub const VOLUME_WINDOW: usize = 20;

/// Rows at the head of a [`FillPolicy::Filled`] table whose indicators were
/// back-filled from later values: the longest window used (MA50).
pub const WARM_UP_ROWS: usize = 50;

/// Indicator columns produced by [`compute_features`].
pub const INDICATOR_COLUMNS: [&str; 8] = [
    RSI,
    MA10,
    MA20,
    MA50,
    MACD,
    MACD_SIGNAL,
    VOLATILITY,
    VOL_SPIKE,
];

/// How undefined warm-up cells are returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillPolicy {
    /// Leave warm-up cells null.
    Raw,
    /// Back-fill then forward-fill every indicator. The first
    /// [`WARM_UP_ROWS`] rows are approximate: they carry later indicator
    /// values.
    #[default]
    Filled,
}

pub fn to_dataframe(prices: &PriceSeries) -> Result<DataFrame, FeatureError> {
    let rows = prices.rows();
    let dates: Vec<String> = rows.iter().map(|d| d.date.to_string()).collect();
    let open: Vec<f64> = rows.iter().map(|d| d.open).collect();
    let high: Vec<f64> = rows.iter().map(|d| d.high).collect();
    let low: Vec<f64> = rows.iter().map(|d| d.low).collect();
    let close: Vec<f64> = rows.iter().map(|d| d.close).collect();
    let volume: Vec<f64> = rows.iter().map(|d| d.volume).collect();

    let df = DataFrame::new(vec![
        Series::new(DATE, dates),
        Series::new(OPEN, open),
        Series::new(HIGH, high),
        Series::new(LOW, low),
        Series::new(CLOSE, close),
        Series::new(VOLUME, volume),
    ])?;
    Ok(df)
}

/// Trailing window of `window` rows that stays null until the window is full.
pub fn rolling_options(window: usize) -> RollingOptions {
    RollingOptions {
        window_size: Duration::parse(&format!("{window}i")),
        min_periods: window,
        ..Default::default()
    }
}

/// Volume over its trailing 20-row mean; null while the mean is undefined or
/// zero.
pub fn volume_spike_expr() -> Expr {
    let mean = col(VOLUME).rolling_mean(rolling_options(VOLUME_WINDOW));
    when(mean.clone().gt(lit(0.0)))
        .then(col(VOLUME) / mean)
        .otherwise(null_f64())
}

/// Fractional change of close over `periods` rows.
pub fn momentum_expr(periods: usize) -> Expr {
    col(CLOSE).pct_change(lit(periods as i64))
}

/// Technical feature engine: RSI(14), MA10/20/50, MACD(12, 26, 9), 10-row
/// return volatility and 20-row volume spike, appended to the price table.
pub fn compute_features(prices: &PriceSeries, policy: FillPolicy) -> Result<DataFrame, FeatureError> {
    if prices.is_empty() {
        return Err(FeatureError::InputData("empty price series".to_string()));
    }

    let closes = prices.closes();
    let macd = macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL_PERIOD);

    let mut df = to_dataframe(prices)?;
    df.with_column(Series::new(RSI, rsi(&closes, RSI_PERIOD)))?;
    df.with_column(Series::new(MACD, macd.macd_line))?;
    df.with_column(Series::new(MACD_SIGNAL, macd.signal_line))?;

    let mut df = df
        .lazy()
        .with_columns([
            col(CLOSE).rolling_mean(rolling_options(10)).alias(MA10),
            col(CLOSE).rolling_mean(rolling_options(20)).alias(MA20),
            col(CLOSE).rolling_mean(rolling_options(50)).alias(MA50),
            momentum_expr(1)
                .rolling_std(rolling_options(VOLATILITY_WINDOW))
                .alias(VOLATILITY),
            volume_spike_expr().alias(VOL_SPIKE),
        ])
        .collect()?;

    if policy == FillPolicy::Filled {
        fill_indicators(&mut df)?;
    }

    debug!(
        "Computed technical features for {} ({} rows, {policy:?})",
        prices.ticker(),
        df.height()
    );
    Ok(df)
}

/// Nearest later value first, then nearest earlier value.
fn fill_indicators(df: &mut DataFrame) -> Result<(), FeatureError> {
    for name in INDICATOR_COLUMNS {
        let filled = df
            .column(name)?
            .fill_null(FillNullStrategy::Backward(None))?
            .fill_null(FillNullStrategy::Forward(None))?;
        df.with_column(filled)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use data_ingestion::fetcher::PriceRow;

    fn series(len: usize) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let rows = (0..len)
            .map(|i| {
                let close = 100.0 + 5.0 * (i as f64 * 0.2).sin() + i as f64 * 0.1;
                PriceRow {
                    date: start + chrono::Duration::days(i as i64),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000_000.0 + 10_000.0 * (i % 7) as f64,
                }
            })
            .collect();
        PriceSeries::new("TEST", rows).unwrap()
    }

    #[test]
    fn test_filled_features_have_no_undefined_cells() {
        for len in [50, 51, 120] {
            let df = compute_features(&series(len), FillPolicy::Filled).unwrap();
            assert_eq!(df.height(), len);
            for name in INDICATOR_COLUMNS {
                let column = float_column(&df, name).unwrap();
                assert!(
                    column.iter().all(Option::is_some),
                    "{name} has undefined cells at length {len}"
                );
            }
        }
    }

    #[test]
    fn test_raw_features_keep_warm_up_nulls() {
        let df = compute_features(&series(60), FillPolicy::Raw).unwrap();
        let ma50 = float_column(&df, MA50).unwrap();
        assert!(ma50[48].is_none());
        assert!(ma50[49].is_some());

        let vol_spike = float_column(&df, VOL_SPIKE).unwrap();
        assert!(vol_spike[18].is_none());
        assert!(vol_spike[19].is_some());

        // RSI is defined from the first row under either policy
        let rsi = float_column(&df, RSI).unwrap();
        assert!(rsi.iter().all(Option::is_some));
    }

    #[test]
    fn test_rsi_in_range() {
        let df = compute_features(&series(200), FillPolicy::Filled).unwrap();
        for value in dense_column(&df, RSI).unwrap() {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_features_do_not_look_ahead() {
        let full = compute_features(&series(120), FillPolicy::Raw).unwrap();
        let prefix = compute_features(&series(80), FillPolicy::Raw).unwrap();
        for name in [MA20, MACD, MACD_SIGNAL, VOLATILITY, VOL_SPIKE, RSI] {
            let a = float_column(&full, name).unwrap();
            let b = float_column(&prefix, name).unwrap();
            assert_eq!(&a[..80], &b[..], "{name} changed when later rows were appended");
        }
    }

    #[test]
    fn test_filled_warm_up_backfills_from_first_defined_value() {
        let df = compute_features(&series(60), FillPolicy::Filled).unwrap();
        let ma50 = dense_column(&df, MA50).unwrap();
        assert_eq!(ma50[0], ma50[WARM_UP_ROWS - 1]);
    }

    #[test]
    fn test_volatility_and_spike_match_window_math() {
        let df = compute_features(&series(40), FillPolicy::Raw).unwrap();
        let closes = series(40).closes();

        let ma10 = float_column(&df, MA10).unwrap();
        let expected: f64 = closes[20..30].iter().sum::<f64>() / 10.0;
        assert!((ma10[29].unwrap() - expected).abs() < 1e-9);

        // ten one-row returns need eleven closes
        let volatility = float_column(&df, VOLATILITY).unwrap();
        assert!(volatility[9].is_none());
        let returns: Vec<f64> = (1..=10).map(|i| closes[i] / closes[i - 1] - 1.0).collect();
        let mean = returns.iter().sum::<f64>() / 10.0;
        let sample_var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 9.0;
        assert!((volatility[10].unwrap() - sample_var.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_zero_volume_window_has_no_spike() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let rows = (0..30)
            .map(|i| PriceRow {
                date: start + chrono::Duration::days(i),
                open: 10.0,
                high: 10.0,
                low: 10.0,
                close: 10.0,
                volume: 0.0,
            })
            .collect();
        let series = PriceSeries::new("FLAT", rows).unwrap();
        let df = compute_features(&series, FillPolicy::Raw).unwrap();
        assert!(float_column(&df, VOL_SPIKE).unwrap().iter().all(Option::is_none));
    }
}
