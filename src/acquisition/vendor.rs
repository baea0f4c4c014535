//! Vendor payload adapters
//!
//! Each PLC/SCADA vendor posts readings in its own JSON shape. Every shape is
//! modelled as its own schema with one adapter that turns it into canonical
//! [`Reading`]s:
//!
//! - **Siemens** (TIA Portal): `machine_id`, `sensors[]` of `{sensor_id, type, value}`
//! - **Schneider**: `device_id` or `machine_id`, `measurements[]` or `sensors[]`
//!   of `{id | sensor_id, parameter | type, value | reading}`
//! - **Generic**: any of `machine_id | device_id | equipment_id | asset_id`,
//!   list under `sensors | measurements | readings | data`, entries
//!   `{sensor_id | id | name, type | parameter | measurement_type,
//!   value | reading | measurement}`
//!
//! When several alternative keys are present the first one listed wins.
//! A sensor entry with a missing id, type or value is skipped on its own; the
//! rest of the batch is still ingested.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::sensors::parse_timestamp;
use crate::types::{Reading, SensorType};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("payload has no machine identifier")]
    MissingMachineId,

    #[error("payload has no sensor entries")]
    NoSensorData,

    #[error("invalid batch timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Source system of a payload (normally implied by the ingestion endpoint).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Siemens,
    Schneider,
    Generic,
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vendor::Siemens => write!(f, "siemens"),
            Vendor::Schneider => write!(f, "schneider"),
            Vendor::Generic => write!(f, "generic"),
        }
    }
}

/// Readings decoded from one vendor payload.
#[derive(Debug, Clone)]
pub struct IngestBatch {
    pub vendor: Vendor,
    pub machine_id: String,
    pub timestamp: DateTime<Utc>,
    pub readings: Vec<Reading>,
    /// Entries dropped because a required field was missing or unparseable
    pub skipped: usize,
}

/// JSON scalar that vendors send as either a number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
        .filter(|v: &f64| v.is_finite())
    }

    fn as_label(&self) -> Option<String> {
        match self {
            Scalar::Number(n) => Some(n.to_string()),
            Scalar::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Scalar::Text(_) => None,
        }
    }
}

fn label(field: Option<&Scalar>) -> Option<String> {
    field.and_then(Scalar::as_label)
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.trim().is_empty())
}

// ============================================================================
// Vendor schemas
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SiemensPayload {
    machine_id: Option<Scalar>,
    timestamp: Option<String>,
    #[serde(default)]
    sensors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SiemensSensor {
    sensor_id: Option<Scalar>,
    #[serde(rename = "type")]
    sensor_type: Option<String>,
    value: Option<Scalar>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchneiderPayload {
    device_id: Option<Scalar>,
    machine_id: Option<Scalar>,
    timestamp: Option<String>,
    measurements: Option<Vec<Value>>,
    sensors: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct SchneiderMeasurement {
    id: Option<Scalar>,
    sensor_id: Option<Scalar>,
    parameter: Option<String>,
    #[serde(rename = "type")]
    sensor_type: Option<String>,
    value: Option<Scalar>,
    reading: Option<Scalar>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenericPayload {
    machine_id: Option<Scalar>,
    device_id: Option<Scalar>,
    equipment_id: Option<Scalar>,
    asset_id: Option<Scalar>,
    timestamp: Option<String>,
    sensors: Option<Vec<Value>>,
    measurements: Option<Vec<Value>>,
    readings: Option<Vec<Value>>,
    data: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct GenericEntry {
    sensor_id: Option<Scalar>,
    id: Option<Scalar>,
    name: Option<Scalar>,
    #[serde(rename = "type")]
    sensor_type: Option<String>,
    parameter: Option<String>,
    measurement_type: Option<String>,
    value: Option<Scalar>,
    reading: Option<Scalar>,
    measurement: Option<Scalar>,
}

/// Fields every vendor entry must yield before it becomes a [`Reading`].
struct EntryFields {
    sensor_id: Option<String>,
    sensor_type: Option<String>,
    value: Option<f64>,
}

impl From<SiemensSensor> for EntryFields {
    fn from(s: SiemensSensor) -> Self {
        Self {
            sensor_id: label(s.sensor_id.as_ref()),
            sensor_type: non_empty(s.sensor_type),
            value: s.value.as_ref().and_then(Scalar::as_f64),
        }
    }
}

impl From<SchneiderMeasurement> for EntryFields {
    fn from(m: SchneiderMeasurement) -> Self {
        Self {
            sensor_id: label(m.id.as_ref()).or_else(|| label(m.sensor_id.as_ref())),
            sensor_type: non_empty(m.parameter).or_else(|| non_empty(m.sensor_type)),
            value: m
                .value
                .as_ref()
                .or(m.reading.as_ref())
                .and_then(Scalar::as_f64),
        }
    }
}

impl From<GenericEntry> for EntryFields {
    fn from(g: GenericEntry) -> Self {
        Self {
            sensor_id: label(g.sensor_id.as_ref())
                .or_else(|| label(g.id.as_ref()))
                .or_else(|| label(g.name.as_ref())),
            sensor_type: non_empty(g.sensor_type)
                .or_else(|| non_empty(g.parameter))
                .or_else(|| non_empty(g.measurement_type)),
            value: g
                .value
                .as_ref()
                .or(g.reading.as_ref())
                .or(g.measurement.as_ref())
                .and_then(Scalar::as_f64),
        }
    }
}

// ============================================================================
// Tagged payload
// ============================================================================

/// A decoded payload from one of the supported vendors.
#[derive(Debug, Clone)]
pub enum VendorPayload {
    Siemens(SiemensPayload),
    Schneider(SchneiderPayload),
    Generic(GenericPayload),
}

impl VendorPayload {
    /// Decode a JSON body according to the vendor's schema.
    pub fn parse(vendor: Vendor, body: &str) -> Result<Self, IngestError> {
        Ok(match vendor {
            Vendor::Siemens => Self::Siemens(serde_json::from_str(body)?),
            Vendor::Schneider => Self::Schneider(serde_json::from_str(body)?),
            Vendor::Generic => Self::Generic(serde_json::from_str(body)?),
        })
    }

    pub fn vendor(&self) -> Vendor {
        match self {
            Self::Siemens(_) => Vendor::Siemens,
            Self::Schneider(_) => Vendor::Schneider,
            Self::Generic(_) => Vendor::Generic,
        }
    }

    /// Convert into canonical readings.
    ///
    /// `now` stamps the batch when the payload carries no timestamp.
    pub fn into_batch(self, now: DateTime<Utc>) -> Result<IngestBatch, IngestError> {
        let vendor = self.vendor();
        match self {
            Self::Siemens(p) => build_batch::<SiemensSensor>(
                vendor,
                label(p.machine_id.as_ref()),
                p.timestamp,
                Some(p.sensors),
                now,
            ),
            Self::Schneider(p) => build_batch::<SchneiderMeasurement>(
                vendor,
                label(p.device_id.as_ref()).or_else(|| label(p.machine_id.as_ref())),
                p.timestamp,
                first_non_empty([p.measurements, p.sensors]),
                now,
            ),
            Self::Generic(p) => build_batch::<GenericEntry>(
                vendor,
                label(p.machine_id.as_ref())
                    .or_else(|| label(p.device_id.as_ref()))
                    .or_else(|| label(p.equipment_id.as_ref()))
                    .or_else(|| label(p.asset_id.as_ref())),
                p.timestamp,
                first_non_empty([p.sensors, p.measurements, p.readings, p.data]),
                now,
            ),
        }
    }
}

/// Parse and convert in one step.
pub fn ingest(vendor: Vendor, body: &str, now: DateTime<Utc>) -> Result<IngestBatch, IngestError> {
    VendorPayload::parse(vendor, body)?.into_batch(now)
}

fn first_non_empty<const N: usize>(lists: [Option<Vec<Value>>; N]) -> Option<Vec<Value>> {
    lists.into_iter().flatten().find(|list| !list.is_empty())
}

fn build_batch<E>(
    vendor: Vendor,
    machine_id: Option<String>,
    timestamp: Option<String>,
    entries: Option<Vec<Value>>,
    now: DateTime<Utc>,
) -> Result<IngestBatch, IngestError>
where
    E: for<'de> Deserialize<'de> + Into<EntryFields>,
{
    let machine_id = machine_id.ok_or(IngestError::MissingMachineId)?;
    let entries = entries
        .filter(|e| !e.is_empty())
        .ok_or(IngestError::NoSensorData)?;

    let timestamp = match timestamp {
        Some(ts) => parse_timestamp(&ts).map_err(IngestError::InvalidTimestamp)?,
        None => now,
    };

    let mut readings = Vec::with_capacity(entries.len());
    let mut skipped = 0;

    for (index, raw) in entries.into_iter().enumerate() {
        let fields: EntryFields = match serde_json::from_value::<E>(raw) {
            Ok(entry) => entry.into(),
            Err(e) => {
                warn!(%vendor, machine_id = %machine_id, index, error = %e, "Skipping malformed sensor entry");
                skipped += 1;
                continue;
            }
        };

        match (fields.sensor_id, fields.sensor_type, fields.value) {
            (Some(sensor_id), Some(sensor_type), Some(value)) => {
                readings.push(Reading::new(
                    machine_id.clone(),
                    sensor_id,
                    SensorType::from_label(&sensor_type),
                    value,
                    timestamp,
                ));
            }
            _ => {
                warn!(%vendor, machine_id = %machine_id, index, "Skipping sensor entry with missing id, type or value");
                skipped += 1;
            }
        }
    }

    debug!(%vendor, machine_id = %machine_id, readings = readings.len(), skipped, "Decoded vendor payload");

    Ok(IngestBatch {
        vendor,
        machine_id,
        timestamp,
        readings,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_siemens_payload() {
        let body = r#"{
            "machine_id": "press-01",
            "timestamp": "2024-03-01T10:00:00Z",
            "sensors": [
                {"sensor_id": "t1", "type": "temperature", "value": 42.5, "unit": "C"},
                {"sensor_id": "v1", "type": "Vibration", "value": 3.1}
            ]
        }"#;
        let batch = ingest(Vendor::Siemens, body, now()).unwrap();
        assert_eq!(batch.machine_id, "press-01");
        assert_eq!(batch.readings.len(), 2);
        assert_eq!(batch.skipped, 0);
        assert_eq!(batch.readings[1].sensor_type, SensorType::Vibration);
        assert_eq!(
            batch.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_schneider_alternative_keys() {
        let body = r#"{
            "device_id": "M-7",
            "measurements": [
                {"id": "a", "parameter": "Motor Temp", "value": 61.0},
                {"sensor_id": "b", "type": "line pressure", "reading": "212.5"}
            ]
        }"#;
        let batch = ingest(Vendor::Schneider, body, now()).unwrap();
        assert_eq!(batch.machine_id, "M-7");
        assert_eq!(batch.timestamp, now());
        assert_eq!(batch.readings[0].sensor_type, SensorType::Temperature);
        assert_eq!(batch.readings[1].sensor_type, SensorType::Tension);
        assert_eq!(batch.readings[1].value, 212.5);
    }

    #[test]
    fn test_zero_value_is_kept() {
        let body = r#"{
            "machine_id": "M-1",
            "sensors": [{"id": "h", "type": "humidity", "value": 0, "reading": 55}]
        }"#;
        let batch = ingest(Vendor::Schneider, body, now()).unwrap();
        assert_eq!(batch.readings[0].value, 0.0);
    }

    #[test]
    fn test_generic_payload_fallbacks() {
        let body = r#"{
            "asset_id": "line-3",
            "data": [
                {"name": "vib-left", "measurement_type": "shake", "measurement": 7.5},
                {"id": 12, "parameter": "rh", "value": 48}
            ]
        }"#;
        let batch = ingest(Vendor::Generic, body, now()).unwrap();
        assert_eq!(batch.machine_id, "line-3");
        assert_eq!(batch.readings.len(), 2);
        assert_eq!(batch.readings[0].sensor_id, "vib-left");
        assert_eq!(batch.readings[1].sensor_id, "12");
        assert_eq!(batch.readings[1].sensor_type, SensorType::Humidity);
    }

    #[test]
    fn test_malformed_entries_are_skipped_individually() {
        let body = r#"{
            "machine_id": "M-2",
            "sensors": [
                {"sensor_id": "t1", "type": "temperature", "value": 20.0},
                {"sensor_id": "t2", "type": "temperature"},
                {"sensor_id": "t3", "type": "temperature", "value": "n/a"},
                {"sensor_id": "t4", "type": "temperature", "value": true},
                "not an object"
            ]
        }"#;
        let batch = ingest(Vendor::Siemens, body, now()).unwrap();
        assert_eq!(batch.readings.len(), 1);
        assert_eq!(batch.skipped, 4);
    }

    #[test]
    fn test_numeric_machine_id_accepted() {
        let body = r#"{"machine_id": 1042, "sensors": [{"sensor_id": "t", "type": "temp", "value": 1}]}"#;
        assert_eq!(ingest(Vendor::Siemens, body, now()).unwrap().machine_id, "1042");

        let body = r#"{"device_id": 7, "measurements": [{"id": "p", "parameter": "force", "value": 3}]}"#;
        assert_eq!(ingest(Vendor::Schneider, body, now()).unwrap().machine_id, "7");

        let body = r#"{"machine_id": "", "asset_id": 88, "data": [{"name": "v", "type": "vibr", "value": 2}]}"#;
        assert_eq!(ingest(Vendor::Generic, body, now()).unwrap().machine_id, "88");
    }

    #[test]
    fn test_missing_machine_id_rejected() {
        let body = r#"{"sensors": [{"sensor_id": "t", "type": "temp", "value": 1}]}"#;
        assert!(matches!(
            ingest(Vendor::Generic, body, now()),
            Err(IngestError::MissingMachineId)
        ));
    }

    #[test]
    fn test_empty_sensor_list_rejected() {
        let body = r#"{"machine_id": "M-1", "sensors": []}"#;
        assert!(matches!(
            ingest(Vendor::Siemens, body, now()),
            Err(IngestError::NoSensorData)
        ));
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let body = r#"{"machine_id": "M-1", "timestamp": "yesterday",
                       "sensors": [{"sensor_id": "t", "type": "temp", "value": 1}]}"#;
        assert!(matches!(
            ingest(Vendor::Siemens, body, now()),
            Err(IngestError::InvalidTimestamp(_))
        ));
    }
}
