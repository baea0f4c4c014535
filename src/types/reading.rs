//! Reading and sensor type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acquisition::normalizer;

/// Sensor category after vendor label normalization.
///
/// The four canonical variants are listed in normalization priority order,
/// which is also the derived `Ord` used for column layout. Labels that match
/// no keyword set are kept verbatim (lowercased, trimmed) in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SensorType {
    Temperature,
    Humidity,
    Tension,
    Vibration,
    Other(String),
}

impl SensorType {
    /// Canonical channels in priority order.
    pub const CANONICAL: [SensorType; 4] = [
        SensorType::Temperature,
        SensorType::Humidity,
        SensorType::Tension,
        SensorType::Vibration,
    ];

    /// Classify a raw vendor label.
    pub fn from_label(label: &str) -> Self {
        match normalizer::normalize_sensor_type(label).as_str() {
            normalizer::TEMPERATURE => Self::Temperature,
            normalizer::HUMIDITY => Self::Humidity,
            normalizer::TENSION => Self::Tension,
            normalizer::VIBRATION => Self::Vibration,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Temperature => normalizer::TEMPERATURE,
            Self::Humidity => normalizer::HUMIDITY,
            Self::Tension => normalizer::TENSION,
            Self::Vibration => normalizer::VIBRATION,
            Self::Other(label) => label,
        }
    }

    pub fn is_canonical(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for SensorType {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<&str> for SensorType {
    fn from(label: &str) -> Self {
        Self::from_label(label)
    }
}

impl From<SensorType> for String {
    fn from(sensor_type: SensorType) -> Self {
        match sensor_type {
            SensorType::Other(label) => label,
            canonical => canonical.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single time-stamped scalar sample from one sensor on one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub machine_id: String,
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(
        machine_id: impl Into<String>,
        sensor_id: impl Into<String>,
        sensor_type: SensorType,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            sensor_id: sensor_id.into(),
            sensor_type,
            value,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_maps_vendor_names() {
        assert_eq!(SensorType::from_label("Motor Temp"), SensorType::Temperature);
        assert_eq!(SensorType::from_label("Belt Force"), SensorType::Tension);
        assert_eq!(
            SensorType::from_label("  Flow Rate "),
            SensorType::Other("flow rate".to_string())
        );
    }

    #[test]
    fn test_serde_uses_plain_labels() {
        let json = serde_json::to_string(&SensorType::Vibration).unwrap();
        assert_eq!(json, "\"vibration\"");

        let parsed: SensorType = serde_json::from_str("\"Thermal Gauge\"").unwrap();
        assert_eq!(parsed, SensorType::Temperature);
    }

    #[test]
    fn test_canonical_order_matches_priority() {
        let mut shuffled = vec![
            SensorType::Vibration,
            SensorType::Other("flow".to_string()),
            SensorType::Temperature,
            SensorType::Tension,
            SensorType::Humidity,
        ];
        shuffled.sort();
        assert_eq!(&shuffled[..4], &SensorType::CANONICAL);
        assert!(!shuffled[4].is_canonical());
    }
}
