//! Shared data structures for the machine-health pipeline
//!
//! - `Reading` / `SensorType`: normalized sensor samples (input)
//! - `ThresholdBounds` / `SensorRules`: configured and critical bounds
//! - `AnomalyResult`, `FailurePrediction`, `ThresholdViolation`, `HealthVerdict`: outputs

mod reading;
pub mod thresholds;
mod analysis;

pub use reading::*;
pub use thresholds::{critical_bounds, default_rules, SensorRules, ThresholdBounds};
pub use analysis::*;
