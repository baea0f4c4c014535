//! Health Scoring Module
//!
//! Deterministic aggregation of one machine's readings into a single verdict.
//! The feature matrix is built once and fanned out to the threshold
//! evaluator (latest timestep only), the anomaly detector (whole window) and
//! the failure predictor (whole window).
//!
//! # Status rules
//!
//! - failure probability > 0.7 → `critical`
//! - failure probability > 0.5, or any threshold violation → `warning`
//! - any anomaly → `attention`
//! - otherwise → `healthy`
//!
//! An empty window short-circuits to `no_data`.

use chrono::Utc;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::ml_engine::AnomalyDetector;
use crate::processing::{FailurePredictor, FeatureBuilder};
use crate::thresholds::ThresholdEvaluator;
use crate::types::{
    AnomalyResult, FailurePrediction, HealthStatus, HealthVerdict, Reading, ThresholdViolation,
};

const CRITICAL_PROBABILITY: f64 = 0.7;
const WARNING_PROBABILITY: f64 = 0.5;

/// Status from the three analysis outputs.
pub fn classify_status(
    prediction: &FailurePrediction,
    anomalies: &[AnomalyResult],
    violations: &[ThresholdViolation],
) -> HealthStatus {
    if prediction.failure_probability > CRITICAL_PROBABILITY {
        HealthStatus::Critical
    } else if prediction.failure_probability > WARNING_PROBABILITY || !violations.is_empty() {
        HealthStatus::Warning
    } else if !anomalies.is_empty() {
        HealthStatus::Attention
    } else {
        HealthStatus::Healthy
    }
}

/// Combines the analysis stages into one verdict per machine.
#[derive(Debug, Clone)]
pub struct HealthAggregator {
    features: FeatureBuilder,
    thresholds: ThresholdEvaluator,
    detector: Arc<AnomalyDetector>,
    predictor: FailurePredictor,
}

impl HealthAggregator {
    pub fn new(
        features: FeatureBuilder,
        thresholds: ThresholdEvaluator,
        detector: Arc<AnomalyDetector>,
        predictor: FailurePredictor,
    ) -> Self {
        Self {
            features,
            thresholds,
            detector,
            predictor,
        }
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn thresholds(&self) -> &ThresholdEvaluator {
        &self.thresholds
    }

    /// Analyze one machine's readings for one window.
    pub fn analyze(&self, machine_id: &str, readings: &[Reading]) -> HealthVerdict {
        let matrix = self.features.build(readings);
        if matrix.is_empty() {
            debug!(machine_id, "No readings in window");
            return HealthVerdict::no_data(machine_id);
        }

        let threshold_violations = self.thresholds.evaluate_latest(machine_id, &matrix);
        let anomalies = self.detector.detect(&matrix);
        let failure_prediction = self.predictor.predict(&matrix, &self.detector);

        let status = classify_status(&failure_prediction, &anomalies, &threshold_violations);

        info!(
            machine_id,
            status = %status,
            timesteps = matrix.len(),
            anomalies = anomalies.len(),
            violations = threshold_violations.len(),
            failure_probability = failure_prediction.failure_probability,
            "Machine health analyzed"
        );

        HealthVerdict {
            machine_id: machine_id.to_string(),
            status,
            failure_prediction,
            anomalies,
            threshold_violations,
            timestamp: Utc::now(),
        }
    }

    /// Analyze many machines in parallel. Readings are grouped by
    /// `machine_id`; verdicts come back sorted by machine id.
    pub fn analyze_fleet(&self, readings: &[Reading]) -> Vec<HealthVerdict> {
        let mut by_machine: BTreeMap<&str, Vec<Reading>> = BTreeMap::new();
        for r in readings {
            by_machine.entry(r.machine_id.as_str()).or_default().push(r.clone());
        }

        let groups: Vec<(&str, Vec<Reading>)> = by_machine.into_iter().collect();
        groups
            .into_par_iter()
            .map(|(machine_id, readings)| self.analyze(machine_id, &readings))
            .collect()
    }
}
