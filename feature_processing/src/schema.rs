//! The feature set shared by trainer and predictor.

use std::collections::BTreeMap;
use std::fmt;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::error::FeatureError;
use crate::labels::undefined_columns;
use crate::misc::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Feature {
    Rsi,
    Ma10,
    Ma20,
    Ma50,
    Macd,
    MacdSignal,
    VolSpike,
    Volatility,
    Pe,
    Ev,
    Ebitda,
    PriceGap,
}

impl Feature {
    pub const ALL: [Feature; 12] = [
        Feature::Rsi,
        Feature::Ma10,
        Feature::Ma20,
        Feature::Ma50,
        Feature::Macd,
        Feature::MacdSignal,
        Feature::VolSpike,
        Feature::Volatility,
        Feature::Pe,
        Feature::Ev,
        Feature::Ebitda,
        Feature::PriceGap,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Feature::Rsi => RSI,
            Feature::Ma10 => MA10,
            Feature::Ma20 => MA20,
            Feature::Ma50 => MA50,
            Feature::Macd => MACD,
            Feature::MacdSignal => MACD_SIGNAL,
            Feature::VolSpike => VOL_SPIKE,
            Feature::Volatility => VOLATILITY,
            Feature::Pe => PE,
            Feature::Ev => EV,
            Feature::Ebitda => EBITDA,
            Feature::PriceGap => PRICE_GAP,
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.column() == name)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One row of named feature values. Lookup is by name, so insertion order
/// does not matter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    values: BTreeMap<Feature, f64>,
}

impl FeatureRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: Feature, value: f64) {
        self.values.insert(feature, value);
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.values.get(&feature).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(Feature, f64)> for FeatureRow {
    fn from_iter<I: IntoIterator<Item = (Feature, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Ordered, duplicate-free list of features fed to the models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: Vec<Feature>,
}

impl FeatureSchema {
    pub fn new(features: Vec<Feature>) -> Result<Self, FeatureError> {
        if features.is_empty() {
            return Err(FeatureError::InputData("feature schema is empty".to_string()));
        }
        for (i, feature) in features.iter().enumerate() {
            if features[..i].contains(feature) {
                return Err(FeatureError::InputData(format!(
                    "feature `{feature}` listed twice"
                )));
            }
        }
        Ok(Self { features })
    }

    /// RSI, MA10/20/50, MACD, MACD signal, volume spike, volatility, PE, EV,
    /// EBITDA and price gap.
    pub fn standard() -> Self {
        Self {
            features: Feature::ALL.to_vec(),
        }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.column()).collect()
    }

    /// Drops features whose column is undefined on every row of `df`.
    /// Returns the narrowed schema and the dropped features.
    pub fn usable_for(&self, df: &DataFrame) -> Result<(Self, Vec<Feature>), FeatureError> {
        let undefined = undefined_columns(df);
        let (kept, dropped): (Vec<Feature>, Vec<Feature>) = self
            .features
            .iter()
            .partition(|f| !undefined.iter().any(|u| u == f.column()));
        Ok((Self::new(kept)?, dropped))
    }

    fn check_columns(&self, df: &DataFrame) -> Result<(), FeatureError> {
        let present = df.get_column_names();
        match self.features.iter().find(|f| !present.contains(&f.column())) {
            Some(missing) => Err(FeatureError::FeatureUnavailable(missing.to_string())),
            None => Ok(()),
        }
    }

    /// Row-major matrix in schema order. Any undefined cell is an error.
    pub fn matrix(&self, df: &DataFrame) -> Result<Vec<Vec<f64>>, FeatureError> {
        self.check_columns(df)?;
        let mut rows = vec![Vec::with_capacity(self.len()); df.height()];
        for feature in &self.features {
            for (i, value) in float_column(df, feature.column())?.into_iter().enumerate() {
                let value = value.ok_or_else(|| {
                    FeatureError::InputData(format!("undefined `{feature}` at row {i}"))
                })?;
                rows[i].push(value);
            }
        }
        Ok(rows)
    }

    /// The defined schema features of row `index`. Undefined cells are left
    /// out, which [`FeatureSchema::vector`] then reports.
    pub fn row(&self, df: &DataFrame, index: usize) -> Result<FeatureRow, FeatureError> {
        self.check_columns(df)?;
        if index >= df.height() {
            return Err(FeatureError::InputData(format!(
                "row {index} out of range for {} rows",
                df.height()
            )));
        }
        let mut row = FeatureRow::new();
        for feature in &self.features {
            let value = df.column(feature.column())?.f64()?.get(index);
            if let Some(v) = value.filter(|v| v.is_finite()) {
                row.insert(*feature, v);
            }
        }
        Ok(row)
    }

    /// Orders a row's values by the schema.
    pub fn vector(&self, row: &FeatureRow) -> Result<Vec<f64>, FeatureError> {
        self.features
            .iter()
            .map(|f| {
                row.get(*f)
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| FeatureError::FeatureUnavailable(f.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn frame() -> DataFrame {
        df!(
            RSI => &[40.0, 55.0, 60.0],
            MA10 => &[1.0, 2.0, 3.0],
            PE => &[None::<f64>, None, None]
        )
        .unwrap()
    }

    #[test]
    fn test_column_names_round_trip() {
        for feature in Feature::ALL {
            assert_eq!(Feature::from_column(feature.column()), Some(feature));
        }
        assert_eq!(Feature::from_column("close"), None);
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        assert!(FeatureSchema::new(vec![]).is_err());
        assert!(FeatureSchema::new(vec![Feature::Rsi, Feature::Rsi]).is_err());
        assert_eq!(FeatureSchema::standard().len(), 12);
    }

    #[test]
    fn test_vector_is_order_independent() {
        let schema = FeatureSchema::new(vec![Feature::Ma10, Feature::Rsi]).unwrap();
        let a: FeatureRow = [(Feature::Rsi, 50.0), (Feature::Ma10, 3.0)].into_iter().collect();
        let b: FeatureRow = [(Feature::Ma10, 3.0), (Feature::Rsi, 50.0)].into_iter().collect();
        assert_eq!(schema.vector(&a).unwrap(), vec![3.0, 50.0]);
        assert_eq!(schema.vector(&a).unwrap(), schema.vector(&b).unwrap());
    }

    #[test]
    fn test_vector_reports_missing_feature() {
        let schema = FeatureSchema::new(vec![Feature::Rsi, Feature::Pe]).unwrap();
        let row: FeatureRow = [(Feature::Rsi, 50.0)].into_iter().collect();
        match schema.vector(&row) {
            Err(FeatureError::FeatureUnavailable(name)) => assert_eq!(name, "pe"),
            other => panic!("expected FeatureUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_matrix_missing_column() {
        let schema = FeatureSchema::new(vec![Feature::Rsi, Feature::Macd]).unwrap();
        assert!(matches!(
            schema.matrix(&frame()),
            Err(FeatureError::FeatureUnavailable(_))
        ));
    }

    #[test]
    fn test_matrix_undefined_cell() {
        let schema = FeatureSchema::new(vec![Feature::Rsi, Feature::Pe]).unwrap();
        assert!(matches!(schema.matrix(&frame()), Err(FeatureError::InputData(_))));
    }

    #[test]
    fn test_matrix_row_major_in_schema_order() {
        let schema = FeatureSchema::new(vec![Feature::Ma10, Feature::Rsi]).unwrap();
        let m = schema.matrix(&frame()).unwrap();
        assert_eq!(m, vec![vec![1.0, 40.0], vec![2.0, 55.0], vec![3.0, 60.0]]);
    }

    #[test]
    fn test_usable_for_drops_undefined_fundamentals() {
        let schema = FeatureSchema::new(vec![Feature::Rsi, Feature::Ma10, Feature::Pe]).unwrap();
        let (usable, dropped) = schema.usable_for(&frame()).unwrap();
        assert_eq!(usable.features(), &[Feature::Rsi, Feature::Ma10]);
        assert_eq!(dropped, vec![Feature::Pe]);
    }

    #[test]
    fn test_row_skips_undefined() {
        let schema = FeatureSchema::new(vec![Feature::Rsi, Feature::Pe]).unwrap();
        let row = schema.row(&frame(), 2).unwrap();
        assert_eq!(row.get(Feature::Rsi), Some(60.0));
        assert_eq!(row.get(Feature::Pe), None);
        assert!(schema.row(&frame(), 3).is_err());
    }
}
