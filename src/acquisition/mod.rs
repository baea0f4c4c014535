//! Sensor data acquisition
//!
//! Turns vendor payloads into canonical [`Reading`](crate::types::Reading)s:
//! label normalization plus one adapter per PLC/SCADA vendor.

pub mod normalizer;
pub mod vendor;

pub use normalizer::normalize_sensor_type;
pub use vendor::{ingest, IngestBatch, IngestError, Vendor, VendorPayload};
