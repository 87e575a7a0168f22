use data_ingestion::fetcher::PriceSeries;
use log::warn;
use polars::prelude::*;
use serde::Serialize;

use crate::error::FeatureError;
use crate::misc::{CLOSE, DATE};
use crate::processor::to_dataframe;

const CORR: &str = "corr";

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    pub tickers: Vec<String>,
    /// `values[i][j]` is the correlation of ticker i with ticker j; `None` when
    /// the pair shares fewer than two returns or either side is constant.
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == a)?;
        let j = self.tickers.iter().position(|t| t == b)?;
        self.values[i][j]
    }
}

/// Pearson correlation of daily returns across tickers. Closes are aligned on
/// the union of dates and forward-filled before returns are taken; each pair
/// is then correlated over the dates where both returns exist.
pub fn correlation_matrix(series: &[PriceSeries]) -> Result<CorrelationMatrix, FeatureError> {
    let usable: Vec<&PriceSeries> = series
        .iter()
        .filter(|s| {
            if s.is_empty() {
                warn!("Skipping {}: no data", s.ticker());
            }
            !s.is_empty()
        })
        .collect();

    if usable.len() < 2 {
        return Err(FeatureError::InputData(
            "need at least 2 tickers with data to compute correlation".to_string(),
        ));
    }

    // Positional column names keep repeated or odd tickers from clashing.
    let names: Vec<String> = (0..usable.len()).map(|i| format!("c{i}")).collect();
    let closes = usable
        .iter()
        .zip(&names)
        .map(|(s, name)| {
            Ok(to_dataframe(s)?
                .lazy()
                .select([col(DATE), col(CLOSE).alias(name)]))
        })
        .collect::<Result<Vec<_>, FeatureError>>()?;

    let dates: Vec<LazyFrame> = closes.iter().map(|lf| lf.clone().select([col(DATE)])).collect();
    let calendar = concat(dates, UnionArgs::default())?
        .unique(None, UniqueKeepStrategy::Any)
        .sort(DATE, SortOptions::default());

    let aligned = closes
        .into_iter()
        .fold(calendar, |acc, lf| acc.left_join(lf, col(DATE), col(DATE)))
        .sort(DATE, SortOptions::default());

    let returns = aligned
        .select(
            names
                .iter()
                .map(|name| col(name).forward_fill(None).pct_change(lit(1)).alias(name))
                .collect::<Vec<_>>(),
        )
        .collect()?;

    let n = names.len();
    let mut values = vec![vec![None; n]; n];
    for i in 0..n {
        for j in i..n {
            let r = pair_correlation(&returns, &names[i], &names[j])?;
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    Ok(CorrelationMatrix {
        tickers: usable.iter().map(|s| s.ticker().to_string()).collect(),
        values,
    })
}

fn pair_correlation(returns: &DataFrame, a: &str, b: &str) -> Result<Option<f64>, FeatureError> {
    let df = returns
        .clone()
        .lazy()
        .drop_nulls(Some(vec![col(a), col(b)]))
        .select([pearson_corr(col(a), col(b), 1).alias(CORR)])
        .collect()?;
    let r = df.column(CORR)?.f64()?.get(0);
    Ok(r.filter(|v| v.is_finite()).map(|v| v.clamp(-1.0, 1.0)))
}
