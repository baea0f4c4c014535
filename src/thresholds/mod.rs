//! Two-tier threshold evaluation
//!
//! Every value is checked against two independent tiers:
//!
//! 1. **Configured bounds**: per-machine rules from the [`ThresholdStore`],
//!    falling back to the store's default rule set. Breach severity is `high`
//!    when the overshoot exceeds 20% of the breached bound's magnitude,
//!    otherwise `medium`.
//! 2. **Critical bounds**: a fixed safety table per canonical sensor type.
//!    A breach is always `critical`, whatever the configured outcome.
//!
//! Evaluation is stateless: no memory of earlier readings, no deduplication.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::processing::FeatureMatrix;
use crate::types::thresholds::default_thresholds::HIGH_SEVERITY_OVERSHOOT;
use crate::types::{
    critical_bounds, default_rules, Reading, SensorRules, SensorType, Severity, ThresholdBounds,
    ThresholdViolation, ViolationKind,
};

// ============================================================================
// Rule storage
// ============================================================================

/// Per-machine threshold overrides on top of a default rule set.
///
/// An override replaces the machine's whole rule map; there is no per-type
/// merge with the defaults. Last write wins.
#[derive(Debug)]
pub struct ThresholdStore {
    defaults: Arc<SensorRules>,
    machines: RwLock<HashMap<String, Arc<SensorRules>>>,
}

impl Default for ThresholdStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ThresholdStore {
    /// Store with the built-in default rule set and no overrides.
    pub fn new() -> Self {
        Self::with_defaults(default_rules())
    }

    pub fn with_defaults(defaults: SensorRules) -> Self {
        Self {
            defaults: Arc::new(defaults),
            machines: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the rule map for one machine.
    pub fn set_rules(&self, machine_id: impl Into<String>, rules: SensorRules) {
        let machine_id = machine_id.into();
        debug!(machine_id = %machine_id, rules = rules.len(), "Threshold override set");
        let mut machines = self.machines.write().unwrap_or_else(|e| {
            warn!("RwLock poisoned on ThresholdStore write, recovering");
            e.into_inner()
        });
        machines.insert(machine_id, Arc::new(rules));
    }

    /// Drop a machine's override so it falls back to the defaults.
    pub fn remove_rules(&self, machine_id: &str) -> bool {
        let mut machines = self.machines.write().unwrap_or_else(|e| {
            warn!("RwLock poisoned on ThresholdStore write, recovering");
            e.into_inner()
        });
        machines.remove(machine_id).is_some()
    }

    /// Effective rules for a machine: its override, else the defaults.
    pub fn rules_for(&self, machine_id: &str) -> Arc<SensorRules> {
        let machines = self.machines.read().unwrap_or_else(|e| {
            warn!("RwLock poisoned on ThresholdStore read, recovering");
            e.into_inner()
        });
        machines
            .get(machine_id)
            .map_or_else(|| Arc::clone(&self.defaults), Arc::clone)
    }

    pub fn has_override(&self, machine_id: &str) -> bool {
        let machines = self.machines.read().unwrap_or_else(|e| {
            warn!("RwLock poisoned on ThresholdStore read, recovering");
            e.into_inner()
        });
        machines.contains_key(machine_id)
    }

    pub fn defaults(&self) -> &SensorRules {
        &self.defaults
    }
}

// ============================================================================
// Pure checks
// ============================================================================

/// One breached tier for a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breach {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub bounds: ThresholdBounds,
}

/// Check a value against configured bounds (if any) and the critical table.
///
/// Returns at most one configured and at most one critical breach, in that
/// order. Unknown sensor types only get the configured check.
pub fn check_value(
    sensor_type: &SensorType,
    configured: Option<ThresholdBounds>,
    value: f64,
) -> Vec<Breach> {
    let mut breaches = Vec::with_capacity(2);

    if let Some(bounds) = configured {
        if let Some(severity) = configured_severity(bounds, value) {
            breaches.push(Breach {
                kind: ViolationKind::ConfiguredBounds,
                severity,
                bounds,
            });
        }
    }

    if let Some(bounds) = critical_bounds(sensor_type) {
        if !bounds.contains(value) {
            breaches.push(Breach {
                kind: ViolationKind::CriticalBounds,
                severity: Severity::Critical,
                bounds,
            });
        }
    }

    breaches
}

fn configured_severity(bounds: ThresholdBounds, value: f64) -> Option<Severity> {
    let (overshoot, bound) = if value > bounds.max {
        (value - bounds.max, bounds.max)
    } else if value < bounds.min {
        (bounds.min - value, bounds.min)
    } else {
        return None;
    };

    if overshoot > HIGH_SEVERITY_OVERSHOOT * bound.abs() {
        Some(Severity::High)
    } else {
        Some(Severity::Medium)
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// Evaluates readings and feature rows against a [`ThresholdStore`].
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    store: Arc<ThresholdStore>,
}

impl ThresholdEvaluator {
    pub fn new(store: Arc<ThresholdStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ThresholdStore {
        &self.store
    }

    /// Check a single raw reading, as at ingestion time.
    pub fn evaluate_reading(&self, reading: &Reading) -> Vec<ThresholdViolation> {
        let rules = self.store.rules_for(&reading.machine_id);
        self.evaluate(
            &reading.machine_id,
            Some(&reading.sensor_id),
            &reading.sensor_type,
            rules.get(&reading.sensor_type).copied(),
            reading.value,
            reading.timestamp,
        )
    }

    /// Check the last timestep of an aligned feature matrix, one channel at a time.
    pub fn evaluate_latest(&self, machine_id: &str, features: &FeatureMatrix) -> Vec<ThresholdViolation> {
        let Some(timestamp) = features.timestamps().last().copied() else {
            return Vec::new();
        };
        let rules = self.store.rules_for(machine_id);

        features
            .channels()
            .iter()
            .filter_map(|channel| {
                let value = features.channel_values(channel)?.last().copied()?;
                Some(self.evaluate(
                    machine_id,
                    None,
                    channel,
                    rules.get(channel).copied(),
                    value,
                    timestamp,
                ))
            })
            .flatten()
            .collect()
    }

    fn evaluate(
        &self,
        machine_id: &str,
        sensor_id: Option<&str>,
        sensor_type: &SensorType,
        configured: Option<ThresholdBounds>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Vec<ThresholdViolation> {
        check_value(sensor_type, configured, value)
            .into_iter()
            .map(|breach| {
                let message = violation_message(sensor_type, value, &breach);
                debug!(machine_id, sensor_type = %sensor_type, value, severity = %breach.severity, "Threshold violation");
                ThresholdViolation {
                    machine_id: machine_id.to_string(),
                    sensor_id: sensor_id.map(str::to_string),
                    sensor_type: sensor_type.clone(),
                    value,
                    kind: breach.kind,
                    severity: breach.severity,
                    threshold_min: breach.bounds.min,
                    threshold_max: breach.bounds.max,
                    timestamp,
                    message,
                }
            })
            .collect()
    }
}

fn violation_message(sensor_type: &SensorType, value: f64, breach: &Breach) -> String {
    let tier = match breach.kind {
        ViolationKind::ConfiguredBounds => "configured",
        ViolationKind::CriticalBounds => "critical",
    };
    if value > breach.bounds.max {
        format!(
            "{sensor_type} {value:.2} above {tier} maximum {:.2}",
            breach.bounds.max
        )
    } else {
        format!(
            "{sensor_type} {value:.2} below {tier} minimum {:.2}",
            breach.bounds.min
        )
    }
}
