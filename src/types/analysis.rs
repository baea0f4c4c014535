//! Analysis outputs: anomaly results, failure predictions, violations, verdicts
//!
//! These are plain records handed to the alerting and presentation layers.
//! Field names are part of the external contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::SensorType;

/// Ordinal severity shared by anomalies and threshold violations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One out-of-distribution timestep flagged by the anomaly detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Row index within the analysed feature matrix
    pub timestep_index: usize,
    pub timestamp: DateTime<Utc>,
    /// Isolation decision score; negative means outlier, lower is worse
    pub anomaly_score: f64,
    pub severity: Severity,
    /// Channels whose z-score exceeded the extremity cutoff in this row
    pub affected_channels: BTreeSet<SensorType>,
}

/// Heuristic failure-trend estimate for one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePrediction {
    pub failure_probability: f64,
    pub confidence: f64,
    pub time_to_failure_hours: Option<u32>,
    pub contributing_factors: Vec<String>,
}

impl FailurePrediction {
    /// Neutral result for windows too short to assess.
    pub fn insufficient_data() -> Self {
        Self {
            failure_probability: 0.0,
            confidence: 0.0,
            time_to_failure_hours: None,
            contributing_factors: Vec::new(),
        }
    }
}

impl Default for FailurePrediction {
    fn default() -> Self {
        Self::insufficient_data()
    }
}

/// Which tier of the threshold evaluator produced a violation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Machine-specific (or default) operating bounds
    ConfiguredBounds,
    /// Fixed absolute safety bounds
    CriticalBounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdViolation {
    pub machine_id: String,
    /// Present when evaluated from a raw reading; aligned rows have no single sensor
    pub sensor_id: Option<String>,
    pub sensor_type: SensorType,
    pub value: f64,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub threshold_min: f64,
    pub threshold_max: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Overall machine condition, lowest to highest concern (`NoData` aside).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    NoData,
    Healthy,
    Attention,
    Warning,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::NoData => write!(f, "no_data"),
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Attention => write!(f, "attention"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Aggregated verdict for one machine and one observation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub machine_id: String,
    pub status: HealthStatus,
    pub failure_prediction: FailurePrediction,
    pub anomalies: Vec<AnomalyResult>,
    pub threshold_violations: Vec<ThresholdViolation>,
    /// When the analysis ran
    pub timestamp: DateTime<Utc>,
}

impl HealthVerdict {
    pub fn no_data(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            status: HealthStatus::NoData,
            failure_prediction: FailurePrediction::insufficient_data(),
            anomalies: Vec::new(),
            threshold_violations: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}
