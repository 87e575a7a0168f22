//! Column names of the pipeline table and small accessors over it.

use polars::prelude::*;

use crate::error::FeatureError;

pub const DATE: &str = "date";
pub const OPEN: &str = "open";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const CLOSE: &str = "close";
pub const VOLUME: &str = "volume";

pub const RSI: &str = "rsi";
pub const MA10: &str = "ma10";
pub const MA20: &str = "ma20";
pub const MA50: &str = "ma50";
pub const MACD: &str = "macd";
pub const MACD_SIGNAL: &str = "macd_signal";
pub const VOLATILITY: &str = "volatility";
pub const VOL_SPIKE: &str = "vol_spike";

pub const PE: &str = "pe";
pub const EV: &str = "ev";
pub const EBITDA: &str = "ebitda";
pub const FAIR_VALUE: &str = "fair_value";
pub const PRICE_GAP: &str = "price_gap";

pub const MOMENTUM: &str = "momentum";
pub const HYPE: &str = "hype";

pub const FUTURE_PRICE: &str = "future_price";
pub const FWD_RETURN: &str = "fwd_return";

pub fn require_columns(df: &DataFrame, names: &[&str]) -> Result<(), FeatureError> {
    let present = df.get_column_names();
    for name in names {
        if !present.contains(name) {
            return Err(FeatureError::InputData(format!("missing column `{name}`")));
        }
    }
    Ok(())
}

/// Float column with NaN and infinities read as undefined.
pub fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, FeatureError> {
    let values = df
        .column(name)?
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();
    Ok(values)
}

/// Float column that must be fully defined, e.g. close or volume.
pub fn dense_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, FeatureError> {
    float_column(df, name)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.ok_or_else(|| FeatureError::InputData(format!("undefined `{name}` at row {i}")))
        })
        .collect()
}

pub fn null_f64() -> Expr {
    lit(NULL).cast(DataType::Float64)
}

/// Constant column, undefined when the value is absent or not finite.
pub fn optional_lit(value: Option<f64>) -> Expr {
    match value.filter(|v| v.is_finite()) {
        Some(v) => lit(v),
        None => null_f64(),
    }
}
