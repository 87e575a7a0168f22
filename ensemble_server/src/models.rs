//! The seam between the ensemble and its member models.

use crate::error::EnsembleError;

/// A fitted model producing a point estimate from one feature vector in
/// schema order.
pub trait Regressor: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, features: &[f64]) -> Result<f64, EnsembleError>;
}

/// A fitted binary classifier producing a hard 0/1 class.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn predict_class(&self, features: &[f64]) -> Result<u8, EnsembleError>;
}
