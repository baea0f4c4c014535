//! ML engine for unsupervised anomaly detection
//!
//! ## Architecture
//! - `scaler`: per-column standardization fitted at training time
//! - `isolation_forest`: seeded isolation-tree ensemble, fitted in parallel (rayon)
//! - `detector`: training, atomic model publication (arc-swap) and inference
//! - `storage`: model persistence behind the `ModelStore` trait (file, sled, in-memory)

pub mod detector;
pub mod isolation_forest;
pub mod scaler;
pub mod storage;

pub use detector::{
    severity_for, AnomalyDetector, AnomalyModel, DetectorParams, DetectorState, ModelInfo,
    TrainingError,
};
pub use isolation_forest::{ForestParams, IsolationForest};
pub use scaler::StandardScaler;
pub use storage::{FileModelStore, InMemoryModelStore, ModelStore, SledModelStore, StorageError};
