//! Threshold bounds, the built-in default rule set and the fixed critical table

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::SensorType;

/// Inclusive operating range for one sensor type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBounds {
    pub min: f64,
    pub max: f64,
}

impl ThresholdBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Per-sensor-type bounds for one machine.
pub type SensorRules = BTreeMap<SensorType, ThresholdBounds>;

/// Built-in configured bounds, used for any machine without an override
pub mod default_thresholds {
    use super::ThresholdBounds;

    /// Temperature (°C)
    pub const TEMPERATURE: ThresholdBounds = ThresholdBounds::new(-10.0, 80.0);
    /// Relative humidity (%)
    pub const HUMIDITY: ThresholdBounds = ThresholdBounds::new(0.0, 100.0);
    /// Tension (N)
    pub const TENSION: ThresholdBounds = ThresholdBounds::new(0.0, 1000.0);
    /// Vibration (g)
    pub const VIBRATION: ThresholdBounds = ThresholdBounds::new(0.0, 50.0);

    /// Overshoot beyond a configured bound, as a fraction of the bound's
    /// magnitude, above which a violation is `high` rather than `medium`.
    pub const HIGH_SEVERITY_OVERSHOOT: f64 = 0.2;
}

/// Absolute safety limits. Breaching these is always critical, whatever the
/// machine's configured bounds say.
pub mod critical_thresholds {
    use super::ThresholdBounds;

    pub const TEMPERATURE: ThresholdBounds = ThresholdBounds::new(-40.0, 120.0);
    pub const HUMIDITY: ThresholdBounds = ThresholdBounds::new(5.0, 95.0);
    pub const TENSION: ThresholdBounds = ThresholdBounds::new(-100.0, 800.0);
    pub const VIBRATION: ThresholdBounds = ThresholdBounds::new(-10.0, 80.0);
}

/// The default rule set applied when a machine has no override.
pub fn default_rules() -> SensorRules {
    BTreeMap::from([
        (SensorType::Temperature, default_thresholds::TEMPERATURE),
        (SensorType::Humidity, default_thresholds::HUMIDITY),
        (SensorType::Tension, default_thresholds::TENSION),
        (SensorType::Vibration, default_thresholds::VIBRATION),
    ])
}

/// Critical bounds for a canonical type; `None` for unknown types.
pub fn critical_bounds(sensor_type: &SensorType) -> Option<ThresholdBounds> {
    match sensor_type {
        SensorType::Temperature => Some(critical_thresholds::TEMPERATURE),
        SensorType::Humidity => Some(critical_thresholds::HUMIDITY),
        SensorType::Tension => Some(critical_thresholds::TENSION),
        SensorType::Vibration => Some(critical_thresholds::VIBRATION),
        SensorType::Other(_) => None,
    }
}
