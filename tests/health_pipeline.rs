//! End-to-end health pipeline tests
//!
//! Readings → features → thresholds / anomaly model / failure predictor → verdict.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use machine_health::acquisition::{ingest, Vendor};
use machine_health::ml_engine::{DetectorParams, InMemoryModelStore};
use machine_health::processing::PredictorSettings;
use machine_health::simulation::SyntheticGenerator;
use machine_health::types::{SensorRules, ThresholdBounds};
use machine_health::{
    AnomalyDetector, FailurePredictor, FeatureBuilder, HealthAggregator, HealthStatus, Reading,
    SensorType, Severity, ThresholdEvaluator, ThresholdStore, ViolationKind,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn aggregator_with(store: Arc<ThresholdStore>) -> HealthAggregator {
    let detector = AnomalyDetector::new(DetectorParams::default(), Arc::new(InMemoryModelStore::new()));
    HealthAggregator::new(
        FeatureBuilder::default(),
        ThresholdEvaluator::new(store),
        Arc::new(detector),
        FailurePredictor::new(PredictorSettings::default()),
    )
}

fn aggregator() -> HealthAggregator {
    aggregator_with(Arc::new(ThresholdStore::new()))
}

fn channel(machine: &str, sensor_type: SensorType, values: &[f64]) -> Vec<Reading> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            Reading::new(machine, "s1", sensor_type.clone(), *v, start() + Duration::minutes(5 * i as i64))
        })
        .collect()
}

// ============================================================================
// Threshold scenarios
// ============================================================================

#[test]
fn temperature_spike_on_last_step_is_single_medium_violation() {
    let mut values = vec![25.0; 19];
    values.push(95.0);
    let verdict = aggregator().analyze("press-01", &channel("press-01", SensorType::Temperature, &values));

    assert_eq!(verdict.status, HealthStatus::Warning);
    assert_eq!(verdict.threshold_violations.len(), 1);
    let v = &verdict.threshold_violations[0];
    assert_eq!(v.kind, ViolationKind::ConfiguredBounds);
    assert_eq!(v.severity, Severity::Medium);
    assert_eq!(v.value, 95.0);
    assert!(v.sensor_id.is_none());
}

#[test]
fn machine_override_changes_verdict() {
    let store = Arc::new(ThresholdStore::new());
    store.set_rules(
        "press-02",
        SensorRules::from([(SensorType::Vibration, ThresholdBounds::new(0.0, 8.0))]),
    );
    let aggregator = aggregator_with(Arc::clone(&store));

    let mut values = vec![7.0; 15];
    values.push(9.0);
    let readings = channel("press-02", SensorType::Vibration, &values);
    let verdict = aggregator.analyze("press-02", &readings);
    assert_eq!(verdict.status, HealthStatus::Warning);
    assert_eq!(verdict.threshold_violations[0].threshold_max, 8.0);

    // same readings under another machine id use the defaults
    let readings: Vec<Reading> = readings
        .into_iter()
        .map(|r| Reading { machine_id: "press-03".into(), ..r })
        .collect();
    assert_eq!(aggregator.analyze("press-03", &readings).status, HealthStatus::Healthy);
}

#[test]
fn empty_window_is_no_data() {
    let verdict = aggregator().analyze("idle", &[]);
    assert_eq!(verdict.status, HealthStatus::NoData);
    assert!(verdict.anomalies.is_empty());
    assert_eq!(verdict.failure_prediction.confidence, 0.0);
}

// ============================================================================
// Trend scenarios
// ============================================================================

#[test]
fn vibration_ramp_is_reported_as_contributing_factor() {
    let values: Vec<f64> = (0..20).map(|i| 10.0 + 0.75 * i as f64).collect();
    let verdict = aggregator().analyze("press-04", &channel("press-04", SensorType::Vibration, &values));

    let prediction = &verdict.failure_prediction;
    assert!(prediction.contributing_factors.contains(&"Increasing vibration".to_string()));
    assert!(prediction.failure_probability >= 0.2);
}

#[test]
fn short_window_prediction_is_neutral() {
    let values = [10.0, 20.0, 30.0, 40.0, 50.0];
    let verdict = aggregator().analyze("press-05", &channel("press-05", SensorType::Vibration, &values));
    assert_eq!(verdict.failure_prediction.failure_probability, 0.0);
    assert!(verdict.failure_prediction.contributing_factors.is_empty());
}

// ============================================================================
// Anomaly model
// ============================================================================

#[test]
fn trained_model_flags_few_training_rows_and_catches_spike() {
    let aggregator = aggregator();
    let training = SyntheticGenerator::new(42).generate("press-06", 600, start());
    let matrix = FeatureBuilder::default().build(&training);
    aggregator.detector().train(&matrix).unwrap();

    let self_flagged = aggregator.detector().detect(&matrix).len();
    assert!(
        self_flagged as f64 <= 0.11 * matrix.len() as f64,
        "{self_flagged} of {} training rows flagged",
        matrix.len()
    );

    let mut window = SyntheticGenerator::new(7).generate("press-06", 120, start());
    let last = window.last().unwrap().timestamp + Duration::minutes(5);
    for (sensor_type, value) in [
        (SensorType::Temperature, 70.0),
        (SensorType::Humidity, 5.0),
        (SensorType::Tension, 600.0),
        (SensorType::Vibration, 75.0),
    ] {
        window.push(Reading::new("press-06", "s", sensor_type, value, last));
    }

    let verdict = aggregator.analyze("press-06", &window);
    let spike = verdict
        .anomalies
        .iter()
        .find(|a| a.timestamp == last)
        .expect("spike row flagged");
    assert!(spike.anomaly_score < 0.0);
    assert!(spike.affected_channels.contains(&SensorType::Vibration));
    assert_ne!(verdict.status, HealthStatus::Healthy);
}

#[test]
fn combined_drift_with_recent_anomalies_is_critical() {
    let aggregator = aggregator();
    let training = SyntheticGenerator::new(42).generate("press-08", 600, start());
    aggregator.detector().train(&FeatureBuilder::default().build(&training)).unwrap();

    // temperature +3/step, vibration +2/step, humidity -2.5/step, tension steady
    let mut window = Vec::new();
    for i in 0..30 {
        let step = i as f64;
        let ts = start() + Duration::minutes(5 * i);
        for (sensor_type, value) in [
            (SensorType::Temperature, 25.0 + 3.0 * step),
            (SensorType::Humidity, 55.0 - 2.5 * step),
            (SensorType::Tension, 150.0),
            (SensorType::Vibration, 10.0 + 2.0 * step),
        ] {
            window.push(Reading::new("press-08", "s", sensor_type, value, ts));
        }
    }

    let verdict = aggregator.analyze("press-08", &window);
    let prediction = &verdict.failure_prediction;

    assert!(prediction.failure_probability > 0.7, "{prediction:?}");
    for factor in ["Rising temperature trend", "Increasing vibration", "Unstable humidity"] {
        assert!(prediction.contributing_factors.contains(&factor.to_string()), "missing {factor}");
    }
    assert!(prediction
        .contributing_factors
        .iter()
        .any(|f| f.ends_with("recent anomalies detected")));
    assert_eq!(prediction.time_to_failure_hours, Some(24));

    // violations and anomalies are present, probability still decides
    assert!(!verdict.threshold_violations.is_empty());
    assert!(!verdict.anomalies.is_empty());
    assert_eq!(verdict.status, HealthStatus::Critical);
}

// ============================================================================
// Fleet + vendor ingestion
// ============================================================================

#[test]
fn vendor_payloads_feed_fleet_analysis() {
    let mut readings = Vec::new();
    for minute in 0..12 {
        let ts = (start() + Duration::minutes(minute)).to_rfc3339();
        let siemens = format!(
            r#"{{"machine_id": "siemens-1", "timestamp": "{ts}",
                "sensors": [{{"sensor_id": "t", "type": "Motor Temp", "value": 40.0}}]}}"#
        );
        let schneider = format!(
            r#"{{"device_id": "schneider-1", "timestamp": "{ts}",
                "measurements": [{{"id": "p", "parameter": "line pressure", "value": {}}}]}}"#,
            if minute == 11 { 900.0 } else { 200.0 }
        );
        readings.extend(ingest(Vendor::Siemens, &siemens, Utc::now()).unwrap().readings);
        readings.extend(ingest(Vendor::Schneider, &schneider, Utc::now()).unwrap().readings);
    }

    let verdicts = aggregator().analyze_fleet(&readings);
    assert_eq!(verdicts.len(), 2);

    let schneider = &verdicts[0];
    assert_eq!(schneider.machine_id, "schneider-1");
    assert_eq!(schneider.status, HealthStatus::Warning);
    // 900 is inside configured [0, 1000] but above the critical 800
    assert_eq!(schneider.threshold_violations.len(), 1);
    assert_eq!(schneider.threshold_violations[0].kind, ViolationKind::CriticalBounds);
    assert_eq!(schneider.threshold_violations[0].severity, Severity::Critical);

    let siemens = &verdicts[1];
    assert_eq!(siemens.machine_id, "siemens-1");
    assert_eq!(siemens.status, HealthStatus::Healthy);
}

#[test]
fn verdict_serializes_with_contract_field_names() {
    let mut values = vec![25.0; 11];
    values.push(95.0);
    let verdict = aggregator().analyze("press-07", &channel("press-07", SensorType::Temperature, &values));
    let json = serde_json::to_value(&verdict).unwrap();

    assert_eq!(json["status"], "warning");
    assert_eq!(json["machine_id"], "press-07");
    assert!(json["failure_prediction"]["failure_probability"].is_number());
    assert_eq!(json["threshold_violations"][0]["sensor_type"], "temperature");
    assert_eq!(json["threshold_violations"][0]["kind"], "configured_bounds");
    assert_eq!(json["threshold_violations"][0]["severity"], "medium");
}
