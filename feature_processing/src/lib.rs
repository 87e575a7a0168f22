//! Feature, fundamentals, hype and label stages over a polars table. Each
//! stage takes the table by value and returns it with columns appended.

pub mod correlation;
pub mod error;
pub mod fundamentals;
pub mod hype;
pub mod indicators;
pub mod labels;
pub mod misc;
pub mod processor;
pub mod schema;

pub use correlation::{CorrelationMatrix, correlation_matrix};
pub use error::FeatureError;
pub use fundamentals::attach_fundamentals;
pub use hype::{HypeThresholds, detect_hype};
pub use labels::{DEFAULT_HORIZON, generate_labels};
pub use processor::{FillPolicy, WARM_UP_ROWS, compute_features};
pub use schema::{Feature, FeatureRow, FeatureSchema};
