use data_ingestion::fetcher::Fundamentals;
use log::{debug, warn};
use polars::prelude::*;

use crate::error::FeatureError;
use crate::misc::*;

/// Sector-neutral PE the fair value is normalized against.
pub const REFERENCE_PE: f64 = 25.0;

/// `(close - fair_value) / fair_value`; null wherever fair value is null.
pub fn price_gap_expr() -> Expr {
    (col(CLOSE) - col(FAIR_VALUE)) / col(FAIR_VALUE)
}

pub fn attach_fundamentals(
    features: DataFrame,
    ticker: &str,
    fundamentals: &Fundamentals,
) -> Result<DataFrame, FeatureError> {
    attach_fundamentals_with(features, ticker, fundamentals, REFERENCE_PE)
}

/// Broadcasts the fundamentals snapshot as constant PE/EV/EBITDA columns and
/// derives `fair_value = close * (reference_pe / pe)` and `price_gap`.
///
/// Without a usable (finite, positive) PE both derived columns are null on
/// every row and a degraded-fundamentals warning is logged; this is not an
/// error.
pub fn attach_fundamentals_with(
    features: DataFrame,
    ticker: &str,
    fundamentals: &Fundamentals,
    reference_pe: f64,
) -> Result<DataFrame, FeatureError> {
    require_columns(&features, &[CLOSE])?;

    let fair_value = match fundamentals.usable_pe() {
        Some(pe) => col(CLOSE) * lit(reference_pe / pe),
        None => {
            warn!(
                "Degraded fundamentals for {ticker}: no usable trailing PE ({:?}), fair value undefined",
                fundamentals.trailing_pe
            );
            null_f64()
        }
    };

    let df = features
        .lazy()
        .with_columns([
            optional_lit(fundamentals.trailing_pe).alias(PE),
            optional_lit(fundamentals.enterprise_value).alias(EV),
            optional_lit(fundamentals.ebitda).alias(EBITDA),
            fair_value.alias(FAIR_VALUE),
        ])
        .with_columns([price_gap_expr().alias(PRICE_GAP)])
        .collect()?;

    debug!("Attached fundamentals for {ticker}: {fundamentals:?}");
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df!(
            CLOSE => &[100.0, 110.0, 90.0],
            VOLUME => &[1.0, 1.0, 1.0]
        )
        .unwrap()
    }

    #[test]
    fn test_fair_value_and_gap() {
        let fundamentals = Fundamentals {
            trailing_pe: Some(50.0),
            enterprise_value: Some(1.0e9),
            ebitda: Some(2.0e8),
        };
        let df = attach_fundamentals(frame(), "ABC", &fundamentals).unwrap();

        let fair = dense_column(&df, FAIR_VALUE).unwrap();
        assert!((fair[0] - 50.0).abs() < 1e-9);
        assert!((fair[1] - 55.0).abs() < 1e-9);

        // gap = pe / 25 - 1 for every row
        for gap in dense_column(&df, PRICE_GAP).unwrap() {
            assert!((gap - 1.0).abs() < 1e-9);
        }

        let pe = dense_column(&df, PE).unwrap();
        assert_eq!(pe, vec![50.0; 3]);
        assert_eq!(dense_column(&df, EV).unwrap(), vec![1.0e9; 3]);
        assert_eq!(dense_column(&df, EBITDA).unwrap(), vec![2.0e8; 3]);
    }

    #[test]
    fn test_missing_pe_degrades_to_undefined() {
        let df = attach_fundamentals(frame(), "ABC", &Fundamentals::default()).unwrap();
        assert_eq!(df.height(), 3);
        for name in [PE, FAIR_VALUE, PRICE_GAP, EV, EBITDA] {
            assert!(float_column(&df, name).unwrap().iter().all(Option::is_none));
        }
    }

    #[test]
    fn test_negative_pe_keeps_pe_but_no_fair_value() {
        let fundamentals = Fundamentals {
            trailing_pe: Some(-12.0),
            ..Default::default()
        };
        let df = attach_fundamentals(frame(), "ABC", &fundamentals).unwrap();
        assert_eq!(dense_column(&df, PE).unwrap(), vec![-12.0; 3]);
        assert!(float_column(&df, FAIR_VALUE).unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn test_requires_close() {
        let df = df!(VOLUME => &[1.0]).unwrap();
        let err = attach_fundamentals(df, "ABC", &Fundamentals::default()).unwrap_err();
        assert!(matches!(err, FeatureError::InputData(_)));
    }
}
