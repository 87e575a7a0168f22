use log::debug;
use polars::prelude::*;

use crate::error::FeatureError;
use crate::misc::*;

pub const DEFAULT_HORIZON: usize = 5;

/// Columns that are null on every row, i.e. a degraded fundamentals block.
pub fn undefined_columns(df: &DataFrame) -> Vec<String> {
    let height = df.height();
    df.get_columns()
        .iter()
        .filter(|s| height > 0 && s.null_count() == height)
        .map(|s| s.name().to_string())
        .collect()
}

/// Appends `future_price` (close shifted back by `horizon` rows) and
/// `fwd_return`, then drops every row with an undefined cell. This is the
/// only stage that reads later rows.
///
/// Columns undefined on every row are left in place and ignored by the drop,
/// so a security without fundamentals still keeps its technical rows.
pub fn generate_labels(rows: DataFrame, horizon: usize) -> Result<DataFrame, FeatureError> {
    if horizon == 0 {
        return Err(FeatureError::InputData("label horizon must be positive".to_string()));
    }
    require_columns(&rows, &[CLOSE])?;

    let skipped = undefined_columns(&rows);
    let subset: Vec<Expr> = rows
        .get_column_names()
        .into_iter()
        .filter(|name| !skipped.iter().any(|s| s.as_str() == *name))
        .chain([FUTURE_PRICE, FWD_RETURN])
        .map(col)
        .collect();

    let future_price = rows
        .column(CLOSE)?
        .shift(-(horizon as i64))
        .with_name(FUTURE_PRICE);

    let before = rows.height();
    let mut df = rows;
    df.with_column(future_price)?;

    let df = df
        .lazy()
        .with_columns([((col(FUTURE_PRICE) - col(CLOSE)) / col(CLOSE)).alias(FWD_RETURN)])
        .drop_nulls(Some(subset))
        .collect()?;

    debug!(
        "Labelled {} of {before} rows (horizon {horizon}, ignoring {skipped:?})",
        df.height()
    );
    Ok(df)
}
