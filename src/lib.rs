//! machine-health: Industrial Sensor Analytics
//!
//! Turns time-stamped readings from heterogeneous industrial sensors into one
//! health verdict per machine.
//!
//! ## Architecture
//!
//! - **Acquisition**: vendor payload adapters and sensor-label normalization
//! - **Thresholds**: two-tier rule check (configured bounds, fixed critical bounds)
//! - **Processing**: feature engineering, failure-trend scoring, verdict aggregation
//! - **ML Engine**: isolation-forest anomaly detection with persisted, atomically swapped models
//! - **Config**: TOML configuration with a process-wide handle

pub mod acquisition;
pub mod config;
pub mod ml_engine;
pub mod processing;
pub mod sensors;
pub mod simulation;
pub mod thresholds;
pub mod types;

pub use config::AnalyticsConfig;

pub use types::{
    AnomalyResult, FailurePrediction, HealthStatus, HealthVerdict, Reading, SensorType, Severity,
    ThresholdBounds, ThresholdViolation, ViolationKind,
};

pub use acquisition::{IngestBatch, IngestError, Vendor, VendorPayload};
pub use ml_engine::{AnomalyDetector, DetectorState, ModelStore, StorageError, TrainingError};
pub use processing::{FailurePredictor, FeatureBuilder, FeatureMatrix, HealthAggregator};
pub use thresholds::{ThresholdEvaluator, ThresholdStore};

use std::sync::Arc;

/// Wire a [`HealthAggregator`] from configuration.
///
/// The detector loads the persisted model if there is one. A store that
/// cannot be opened is an error; a model that cannot be read is logged and
/// the detector starts untrained.
pub fn build_aggregator(config: &AnalyticsConfig) -> Result<HealthAggregator, StorageError> {
    let store = config.model.open_store()?;
    let detector = Arc::new(AnomalyDetector::open(config.model.detector_params(), store));
    let thresholds = ThresholdEvaluator::new(Arc::new(config.thresholds.build_store()));

    Ok(HealthAggregator::new(
        FeatureBuilder::new(config.features.rolling_window),
        thresholds,
        detector,
        FailurePredictor::new(config.prediction),
    ))
}
