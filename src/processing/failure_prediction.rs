//! Heuristic failure-trend estimator
//!
//! Scores recent channel trends and recent anomalies into a failure
//! probability:
//!
//! | indicator                                   | points |
//! |---------------------------------------------|--------|
//! | temperature slope > 1.0 per step            | 2      |
//! | vibration slope > 0.5 per step              | 2      |
//! | \|humidity slope\| > 2.0 per step           | 1      |
//! | each anomaly in the trailing window         | 1      |
//!
//! Probability is `min(points / 10, 1)`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::defaults;
use crate::ml_engine::AnomalyDetector;
use crate::processing::FeatureMatrix;
use crate::types::{FailurePrediction, SensorType};

const TEMPERATURE_SLOPE_LIMIT: f64 = 1.0;
const VIBRATION_SLOPE_LIMIT: f64 = 0.5;
const HUMIDITY_SLOPE_LIMIT: f64 = 2.0;

const POINTS_PER_PROBABILITY_UNIT: f64 = 10.0;

/// Window sizes for the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorSettings {
    /// Fewer timesteps than this gives a neutral prediction
    pub min_timesteps: usize,
    /// Trailing samples used for each slope
    pub trend_window: usize,
    /// Trailing timesteps checked for anomalies
    pub anomaly_window: usize,
    /// More timesteps than this raises confidence from 0.6 to 0.8
    pub high_confidence_timesteps: usize,
}

impl Default for PredictorSettings {
    fn default() -> Self {
        Self {
            min_timesteps: defaults::DEFAULT_MIN_TIMESTEPS,
            trend_window: defaults::DEFAULT_TREND_WINDOW,
            anomaly_window: defaults::DEFAULT_ANOMALY_WINDOW,
            high_confidence_timesteps: defaults::DEFAULT_HIGH_CONFIDENCE_TIMESTEPS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FailurePredictor {
    settings: PredictorSettings,
}

impl FailurePredictor {
    pub fn new(settings: PredictorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PredictorSettings {
        &self.settings
    }

    pub fn predict(&self, features: &FeatureMatrix, detector: &AnomalyDetector) -> FailurePrediction {
        let timesteps = features.len();
        if timesteps < self.settings.min_timesteps {
            debug!(timesteps, min = self.settings.min_timesteps, "Too few timesteps for failure prediction");
            return FailurePrediction::insufficient_data();
        }

        let mut points = 0usize;
        let mut factors = Vec::new();

        let slope_of = |channel: &SensorType| {
            features
                .channel_values(channel)
                .and_then(|values| trend_slope(tail(values, self.settings.trend_window)))
        };

        if slope_of(&SensorType::Temperature).is_some_and(|s| s > TEMPERATURE_SLOPE_LIMIT) {
            points += 2;
            factors.push("Rising temperature trend".to_string());
        }

        if slope_of(&SensorType::Vibration).is_some_and(|s| s > VIBRATION_SLOPE_LIMIT) {
            points += 2;
            factors.push("Increasing vibration".to_string());
        }

        if slope_of(&SensorType::Humidity).is_some_and(|s| s.abs() > HUMIDITY_SLOPE_LIMIT) {
            points += 1;
            factors.push("Unstable humidity".to_string());
        }

        let recent = detector.detect(&features.tail(self.settings.anomaly_window));
        if !recent.is_empty() {
            points += recent.len();
            factors.push(format!("{} recent anomalies detected", recent.len()));
        }

        let failure_probability = (points as f64 / POINTS_PER_PROBABILITY_UNIT).min(1.0);
        let confidence = if timesteps > self.settings.high_confidence_timesteps {
            0.8
        } else {
            0.6
        };

        debug!(points, failure_probability, factors = factors.len(), "Failure prediction computed");

        FailurePrediction {
            failure_probability,
            confidence,
            time_to_failure_hours: time_to_failure(failure_probability),
            contributing_factors: factors,
        }
    }
}

fn time_to_failure(probability: f64) -> Option<u32> {
    if probability > 0.7 {
        Some(24)
    } else if probability > 0.5 {
        Some(72)
    } else if probability > 0.3 {
        Some(168)
    } else {
        None
    }
}

fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

/// Least-squares slope of `values` against their index; `None` under 2 points.
pub fn trend_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n_f;

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });

    Some(num / den)
}
