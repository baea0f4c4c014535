//! System-wide default constants.
//!
//! Every configurable value's built-in default lives here so the config
//! structs and the modules that run without a config agree.

// ============================================================================
// Feature engineering
// ============================================================================

/// Trailing window for rolling mean / std (samples).
pub const DEFAULT_ROLLING_WINDOW: usize = 10;

// ============================================================================
// Anomaly model
// ============================================================================

pub const DEFAULT_N_ESTIMATORS: usize = 100;

/// Expected outlier fraction in the training data.
pub const DEFAULT_CONTAMINATION: f64 = 0.1;

/// Upper bound on the per-tree subsample.
pub const DEFAULT_MAX_SAMPLES: usize = 256;

pub const DEFAULT_SEED: u64 = 42;

/// Default on-disk location of the persisted model.
pub const DEFAULT_MODEL_PATH: &str = "data/anomaly_model.json";

// ============================================================================
// Failure prediction
// ============================================================================

/// Below this many timesteps the prediction is neutral.
pub const DEFAULT_MIN_TIMESTEPS: usize = 10;

/// Trailing samples used for each trend slope.
pub const DEFAULT_TREND_WINDOW: usize = 20;

/// Trailing timesteps checked for recent anomalies.
pub const DEFAULT_ANOMALY_WINDOW: usize = 10;

/// Above this many timesteps confidence rises from 0.6 to 0.8.
pub const DEFAULT_HIGH_CONFIDENCE_TIMESTEPS: usize = 100;

// ============================================================================
// Synthetic data
// ============================================================================

/// Sample cadence of generated training data (minutes).
pub const SYNTHETIC_INTERVAL_MINUTES: i64 = 5;

/// Default number of generated timesteps (about 3.5 days at 5-minute cadence).
pub const SYNTHETIC_DEFAULT_SAMPLES: usize = 1_000;

/// Probability that a generated vibration sample carries a spike.
pub const SYNTHETIC_SPIKE_PROBABILITY: f64 = 0.05;
