//! Histogram gradient-boosted trees with second-order (Newton) leaf weights.
//!
//! Feature values are bucketed into at most `max_bins` quantile bins once per
//! fit. Each round draws a row subsample and each tree a feature subsample
//! from a seeded generator, so a fit is reproducible for a given seed. Split
//! search runs per feature in parallel.

use log::debug;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::BoostingConfig;
use crate::error::EnsembleError;
use crate::models::{Classifier, Regressor};

const PROBABILITY_CLIP: f64 = 1e-6;

/// Loss being minimised: initial score and per-row gradient/hessian.
trait Objective: Sync {
    fn base_score(&self, targets: &[f64]) -> f64;

    fn gradient(&self, target: f64, score: f64) -> (f64, f64);
}

struct SquaredError;

impl Objective for SquaredError {
    fn base_score(&self, targets: &[f64]) -> f64 {
        targets.iter().sum::<f64>() / targets.len() as f64
    }

    fn gradient(&self, target: f64, score: f64) -> (f64, f64) {
        (score - target, 1.0)
    }
}

struct Logistic;

impl Objective for Logistic {
    fn base_score(&self, targets: &[f64]) -> f64 {
        let p = (targets.iter().sum::<f64>() / targets.len() as f64)
            .clamp(PROBABILITY_CLIP, 1.0 - PROBABILITY_CLIP);
        (p / (1.0 - p)).ln()
    }

    fn gradient(&self, target: f64, score: f64) -> (f64, f64) {
        let p = sigmoid(score);
        (p - target, (p * (1.0 - p)).max(PROBABILITY_CLIP))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Bin indices are stored as `u16`.
const MAX_BINS: usize = u16::MAX as usize + 1;

/// Ascending upper edges per feature; bin `b` holds values in
/// `(cuts[b - 1], cuts[b]]`.
struct Bins {
    cuts: Vec<Vec<f64>>,
}

impl Bins {
    fn fit(x: &[Vec<f64>], width: usize, max_bins: usize) -> Self {
        let cuts = (0..width)
            .map(|f| {
                let mut values: Vec<f64> = x.iter().map(|row| row[f]).collect();
                values.sort_by(f64::total_cmp);
                values.dedup();
                if values.len() <= max_bins {
                    return values;
                }
                let n = values.len();
                let mut edges: Vec<f64> = (1..=max_bins)
                    .map(|k| values[(k * n / max_bins).saturating_sub(1)])
                    .collect();
                edges.dedup();
                edges
            })
            .collect();
        Self { cuts }
    }

    fn bin(&self, feature: usize, value: f64) -> u16 {
        let edges = &self.cuts[feature];
        let idx = edges.partition_point(|edge| *edge < value);
        idx.min(edges.len().saturating_sub(1)) as u16
    }

    /// Column-major bin indices.
    fn transform(&self, x: &[Vec<f64>]) -> Vec<Vec<u16>> {
        (0..self.cuts.len())
            .map(|f| x.iter().map(|row| self.bin(f, row[f])).collect())
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: u16,
    gain: f64,
}

impl SplitCandidate {
    /// Higher gain wins; ties go to the lower feature so the parallel
    /// reduction is order independent.
    fn better(self, other: Self) -> Self {
        if other.gain > self.gain || (other.gain == self.gain && other.feature < self.feature) {
            other
        } else {
            self
        }
    }
}

struct TreeBuilder<'a> {
    binned: &'a [Vec<u16>],
    bins: &'a Bins,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    config: &'a BoostingConfig,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.config.lambda) * self.config.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.config.lambda)
    }

    fn build(mut self, rows: Vec<usize>) -> Tree {
        self.grow(rows, 0);
        Tree { nodes: self.nodes }
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|r| self.grad[*r]).sum();
        let h: f64 = rows.iter().map(|r| self.hess[*r]).sum();

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_weight(g, h),
        });

        if depth >= self.config.max_depth || rows.len() < 2 {
            return idx;
        }
        let Some(split) = self.best_split(&rows, g, h) else {
            return idx;
        };

        let column = &self.binned[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|r| column[*r] <= split.bin);

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: self.bins.cuts[split.feature][split.bin as usize],
            left,
            right,
        };
        idx
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = self.score(g, h);
        self.features
            .par_iter()
            .filter_map(|&feature| {
                let n_bins = self.bins.cuts[feature].len();
                if n_bins < 2 {
                    return None;
                }
                let mut histogram = vec![(0.0, 0.0); n_bins];
                let column = &self.binned[feature];
                for &r in rows {
                    let slot = &mut histogram[column[r] as usize];
                    slot.0 += self.grad[r];
                    slot.1 += self.hess[r];
                }

                let mut best: Option<SplitCandidate> = None;
                let (mut gl, mut hl) = (0.0, 0.0);
                for (bin, (bg, bh)) in histogram.iter().enumerate().take(n_bins - 1) {
                    gl += bg;
                    hl += bh;
                    let (gr, hr) = (g - gl, h - hl);
                    if hl < self.config.min_child_weight || hr < self.config.min_child_weight {
                        continue;
                    }
                    let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent);
                    if gain > 0.0 && best.is_none_or(|b| gain > b.gain) {
                        best = Some(SplitCandidate {
                            feature,
                            bin: bin as u16,
                            gain,
                        });
                    }
                }
                best
            })
            .reduce_with(SplitCandidate::better)
    }
}

/// An additive ensemble of trees over a raw score.
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    base_score: f64,
    trees: Vec<Tree>,
}

impl GradientBoostedTrees {
    fn fit(
        x: &[Vec<f64>],
        targets: &[f64],
        objective: &dyn Objective,
        config: &BoostingConfig,
    ) -> Result<Self, EnsembleError> {
        let n = x.len();
        let width = x.first().map(Vec::len).unwrap_or(0);
        if n == 0 || width == 0 {
            return Err(EnsembleError::TrainingData("empty training matrix".to_string()));
        }
        if targets.len() != n || x.iter().any(|row| row.len() != width) {
            return Err(EnsembleError::TrainingData(format!(
                "matrix of {n} rows does not match {} targets",
                targets.len()
            )));
        }
        if !(config.subsample > 0.0 && config.subsample <= 1.0)
            || !(config.colsample > 0.0 && config.colsample <= 1.0)
        {
            return Err(EnsembleError::Model(
                "subsample and colsample must be in (0, 1]".to_string(),
            ));
        }

        if !(2..=MAX_BINS).contains(&config.max_bins) {
            return Err(EnsembleError::Model(format!(
                "max_bins must be in [2, {MAX_BINS}], got {}",
                config.max_bins
            )));
        }

        let bins = Bins::fit(x, width, config.max_bins);
        let binned = bins.transform(x);
        let base_score = objective.base_score(targets);
        let mut scores = vec![base_score; n];
        let mut rng = StdRng::seed_from_u64(config.seed);
        let n_features = ((config.colsample * width as f64).round() as usize).clamp(1, width);

        let mut trees = Vec::with_capacity(config.rounds);
        for _ in 0..config.rounds {
            let (grad, hess): (Vec<f64>, Vec<f64>) = targets
                .iter()
                .zip(&scores)
                .map(|(t, s)| objective.gradient(*t, *s))
                .unzip();

            let mut rows: Vec<usize> = (0..n).filter(|_| rng.r#gen::<f64>() < config.subsample).collect();
            if rows.is_empty() {
                rows = (0..n).collect();
            }
            let mut features = sample(&mut rng, width, n_features).into_vec();
            features.sort_unstable();

            let tree = TreeBuilder {
                binned: &binned,
                bins: &bins,
                grad: &grad,
                hess: &hess,
                features: &features,
                config,
                nodes: Vec::new(),
            }
            .build(rows);

            for (score, row) in scores.iter_mut().zip(x) {
                *score += tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self { base_score, trees })
    }

    fn raw_score(&self, features: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(features)).sum::<f64>()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn check_width(expected: usize, features: &[f64]) -> Result<(), EnsembleError> {
    if features.len() != expected {
        return Err(EnsembleError::Model(format!(
            "expected {expected} features, got {}",
            features.len()
        )));
    }
    Ok(())
}

pub struct BoostedRegressor {
    model: GradientBoostedTrees,
    width: usize,
}

impl BoostedRegressor {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &BoostingConfig) -> Result<Self, EnsembleError> {
        let model = GradientBoostedTrees::fit(x, y, &SquaredError, config)?;
        debug!("Fitted boosted regressor: {} trees on {} rows", model.n_trees(), x.len());
        Ok(Self {
            model,
            width: x[0].len(),
        })
    }
}

impl Regressor for BoostedRegressor {
    fn name(&self) -> &str {
        "boosted_regressor"
    }

    fn predict(&self, features: &[f64]) -> Result<f64, EnsembleError> {
        check_width(self.width, features)?;
        Ok(self.model.raw_score(features))
    }
}

pub struct BoostedClassifier {
    model: GradientBoostedTrees,
    width: usize,
}

impl BoostedClassifier {
    pub fn fit(x: &[Vec<f64>], y: &[u8], config: &BoostingConfig) -> Result<Self, EnsembleError> {
        let targets: Vec<f64> = y.iter().map(|c| f64::from(*c)).collect();
        let model = GradientBoostedTrees::fit(x, &targets, &Logistic, config)?;
        debug!("Fitted boosted classifier: {} trees on {} rows", model.n_trees(), x.len());
        Ok(Self {
            model,
            width: x[0].len(),
        })
    }

    pub fn probability(&self, features: &[f64]) -> Result<f64, EnsembleError> {
        check_width(self.width, features)?;
        Ok(sigmoid(self.model.raw_score(features)))
    }
}

impl Classifier for BoostedClassifier {
    fn name(&self) -> &str {
        "boosted_classifier"
    }

    fn predict_class(&self, features: &[f64]) -> Result<u8, EnsembleError> {
        Ok(u8::from(self.probability(features)? > 0.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BoostingConfig {
        BoostingConfig {
            rounds: 60,
            learning_rate: 0.3,
            max_depth: 3,
            ..Default::default()
        }
    }

    fn data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<u8>) {
        let x: Vec<Vec<f64>> = (0..80).map(|i| vec![i as f64, ((i * 7) % 11) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| if r[0] < 40.0 { -1.0 } else { 3.0 }).collect();
        let c: Vec<u8> = x.iter().map(|r| u8::from(r[0] >= 40.0)).collect();
        (x, y, c)
    }

    #[test]
    fn test_bins_cap_and_cover_range() {
        let x: Vec<Vec<f64>> = (0..1000).map(|i| vec![i as f64]).collect();
        let bins = Bins::fit(&x, 1, 16);
        assert!(bins.cuts[0].len() <= 16);
        assert_eq!(*bins.cuts[0].last().unwrap(), 999.0);
        assert_eq!(bins.bin(0, -5.0), 0);
        assert_eq!(bins.bin(0, 999.0) as usize, bins.cuts[0].len() - 1);
    }

    #[test]
    fn test_regressor_fits_step() {
        let (x, y, _) = data();
        let model = BoostedRegressor::fit(&x, &y, &config()).unwrap();
        assert!((model.predict(&[10.0, 3.0]).unwrap() + 1.0).abs() < 0.2);
        assert!((model.predict(&[70.0, 3.0]).unwrap() - 3.0).abs() < 0.2);
    }

    #[test]
    fn test_classifier_fits_step() {
        let (x, _, c) = data();
        let model = BoostedClassifier::fit(&x, &c, &config()).unwrap();
        assert_eq!(model.predict_class(&[5.0, 1.0]).unwrap(), 0);
        assert_eq!(model.predict_class(&[75.0, 1.0]).unwrap(), 1);
    }

    #[test]
    fn test_single_class_labels_stay_negative() {
        let (x, _, _) = data();
        let zeros = vec![0u8; x.len()];
        let model = BoostedClassifier::fit(&x, &zeros, &config()).unwrap();
        assert!(model.probability(&[75.0, 1.0]).unwrap() < 0.01);
        assert_eq!(model.predict_class(&[75.0, 1.0]).unwrap(), 0);
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let (x, y, _) = data();
        let cfg = BoostingConfig {
            subsample: 0.5,
            colsample: 0.5,
            ..config()
        };
        let a = BoostedRegressor::fit(&x, &y, &cfg).unwrap();
        let b = BoostedRegressor::fit(&x, &y, &cfg).unwrap();
        for point in [[1.0, 0.0], [39.0, 5.0], [41.0, 10.0]] {
            assert_eq!(a.predict(&point).unwrap(), b.predict(&point).unwrap());
        }
    }

    #[test]
    fn test_wrong_width_rejected() {
        let (x, y, _) = data();
        let model = BoostedRegressor::fit(&x, &y, &config()).unwrap();
        assert!(model.predict(&[1.0]).is_err());
    }

    #[test]
    fn test_max_bins_outside_u16_range_rejected() {
        let (x, y, _) = data();
        for max_bins in [1, MAX_BINS + 1] {
            let cfg = BoostingConfig {
                max_bins,
                ..config()
            };
            assert!(matches!(
                BoostedRegressor::fit(&x, &y, &cfg),
                Err(EnsembleError::Model(_))
            ));
        }
        let cfg = BoostingConfig {
            max_bins: MAX_BINS,
            ..config()
        };
        assert!(BoostedRegressor::fit(&x, &y, &cfg).is_ok());
    }

    #[test]
    fn test_empty_matrix_rejected() {
        assert!(matches!(
            BoostedRegressor::fit(&[], &[], &config()),
            Err(EnsembleError::TrainingData(_))
        ));
    }
}
