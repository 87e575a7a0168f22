use log::debug;
use polars::prelude::*;
use serde::Deserialize;

use crate::error::FeatureError;
use crate::fundamentals::price_gap_expr;
use crate::misc::*;
use crate::processor::{momentum_expr, volume_spike_expr};

pub const MOMENTUM_PERIODS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct HypeThresholds {
    /// Minimum absolute 3-row price change.
    pub momentum: f64,
    /// Minimum volume over its 20-row mean.
    pub volume_spike: f64,
    /// Minimum absolute deviation from fair value.
    pub price_gap: f64,
}

impl Default for HypeThresholds {
    fn default() -> Self {
        Self {
            momentum: 0.07,
            volume_spike: 1.8,
            price_gap: 0.10,
        }
    }
}

impl HypeThresholds {
    /// 1 only when all three signals are defined and past their thresholds.
    pub fn flag(
        &self,
        momentum: Option<f64>,
        volume_spike: Option<f64>,
        price_gap: Option<f64>,
    ) -> i32 {
        let hit = matches!(momentum, Some(m) if m.abs() > self.momentum)
            && matches!(volume_spike, Some(v) if v > self.volume_spike)
            && matches!(price_gap, Some(g) if g.abs() > self.price_gap);
        i32::from(hit)
    }
}

/// Recomputes momentum, volume spike and price gap from close, volume and
/// fair value, then sets `hype` per row. `vol_spike` and `price_gap` are
/// overwritten with their unfilled values.
pub fn detect_hype(rows: DataFrame, thresholds: &HypeThresholds) -> Result<DataFrame, FeatureError> {
    require_columns(&rows, &[CLOSE, VOLUME, FAIR_VALUE])?;

    let mut df = rows
        .lazy()
        .with_columns([
            momentum_expr(MOMENTUM_PERIODS).alias(MOMENTUM),
            volume_spike_expr().alias(VOL_SPIKE),
            when(col(FAIR_VALUE).neq(lit(0.0)))
                .then(price_gap_expr())
                .otherwise(null_f64())
                .alias(PRICE_GAP),
        ])
        .collect()?;

    let momentum = float_column(&df, MOMENTUM)?;
    let vol_spike = float_column(&df, VOL_SPIKE)?;
    let price_gap = float_column(&df, PRICE_GAP)?;

    let hype: Vec<i32> = momentum
        .iter()
        .zip(&vol_spike)
        .zip(&price_gap)
        .map(|((m, v), g)| thresholds.flag(*m, *v, *g))
        .collect();

    debug!(
        "Hype detected on {} of {} rows",
        hype.iter().filter(|h| **h == 1).count(),
        hype.len()
    );

    df.with_column(Series::new(HYPE, hype))?;
    Ok(df)
}
