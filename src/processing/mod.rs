//! Analysis stages over a machine's reading window
//!
//! - `features`: aligned, gap-filled feature matrix with rolling statistics
//! - `failure_prediction`: heuristic trend scorer
//! - `health_scoring`: combines thresholds, anomalies and trends into a verdict

mod failure_prediction;
mod features;
mod health_scoring;

pub use failure_prediction::{trend_slope, FailurePredictor, PredictorSettings};
pub use features::{DerivedFeature, FeatureBuilder, FeatureColumn, FeatureMatrix};
pub use health_scoring::{classify_status, HealthAggregator};
