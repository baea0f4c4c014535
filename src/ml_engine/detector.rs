//! Anomaly detector: training, persistence and inference
//!
//! Lifecycle: `untrained` → train → `ready` → retrain → `ready`. On startup
//! the detector loads the last persisted model if one exists.
//!
//! The current model sits behind an [`ArcSwapOption`]. Training builds a new
//! model off to the side, persists it, then publishes it with one atomic
//! store; inference always sees either the old or the new model in full.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::isolation_forest::{percentile, ForestParams, IsolationForest};
use super::scaler::StandardScaler;
use super::storage::{ModelStore, StorageError};
use crate::config::defaults;
use crate::processing::{DerivedFeature, FeatureMatrix};
use crate::types::{AnomalyResult, Severity};

/// |z| above which a channel counts as affected in a flagged row
const AFFECTED_ZSCORE: f64 = 2.0;

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("no training data")]
    EmptyInput,
    #[error("no feature columns name a known sensor type")]
    NoFeatureColumns,
    #[error("feature values too large to standardize")]
    NonFiniteFeatures,
    #[error("failed to persist model: {0}")]
    Persistence(#[from] StorageError),
}

/// Isolation forest hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    pub n_estimators: usize,
    pub contamination: f64,
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            n_estimators: defaults::DEFAULT_N_ESTIMATORS,
            contamination: defaults::DEFAULT_CONTAMINATION,
            max_samples: defaults::DEFAULT_MAX_SAMPLES,
            seed: defaults::DEFAULT_SEED,
        }
    }
}

/// A fitted, immutable anomaly model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyModel {
    /// Increments on every retrain
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
    /// Ordered feature columns the model was fitted on
    pub feature_names: Vec<String>,
    pub contamination: f64,
    /// Score percentile at `contamination`; decisions below it are outliers
    pub offset: f64,
    pub scaler: StandardScaler,
    pub forest: IsolationForest,
}

impl AnomalyModel {
    /// Offset-adjusted scores: higher is more normal, negative is an outlier.
    pub fn decision_function(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        let scaled = self.scaler.transform(rows);
        self.forest
            .score_samples(&scaled)
            .into_iter()
            .map(|score| score - self.offset)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorState {
    Untrained,
    Ready,
}

/// Summary of the published model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
    pub feature_names: Vec<String>,
    pub n_estimators: usize,
    pub contamination: f64,
}

impl From<&AnomalyModel> for ModelInfo {
    fn from(model: &AnomalyModel) -> Self {
        Self {
            version: model.version,
            trained_at: model.trained_at,
            training_rows: model.training_rows,
            feature_names: model.feature_names.clone(),
            n_estimators: model.forest.n_estimators(),
            contamination: model.contamination,
        }
    }
}

/// Map a decision score to a severity.
pub fn severity_for(score: f64) -> Severity {
    if score < -0.5 {
        Severity::Critical
    } else if score < -0.3 {
        Severity::High
    } else if score < -0.1 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub struct AnomalyDetector {
    params: DetectorParams,
    store: Arc<dyn ModelStore>,
    current: ArcSwapOption<AnomalyModel>,
    /// Serializes version bump, persist and publish across concurrent retrains
    training: Mutex<()>,
}

impl std::fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("params", &self.params)
            .field("store", &self.store.backend_name())
            .field("state", &self.state())
            .finish()
    }
}

impl AnomalyDetector {
    /// Untrained detector; nothing is loaded.
    pub fn new(params: DetectorParams, store: Arc<dyn ModelStore>) -> Self {
        Self {
            params,
            store,
            current: ArcSwapOption::empty(),
            training: Mutex::new(()),
        }
    }

    /// Detector with the last persisted model, if any.
    ///
    /// A load failure is logged and leaves the detector untrained.
    pub fn open(params: DetectorParams, store: Arc<dyn ModelStore>) -> Self {
        let detector = Self::new(params, store);
        match detector.reload() {
            Ok(true) => {}
            Ok(false) => info!(backend = detector.store.backend_name(), "No persisted anomaly model, starting untrained"),
            Err(e) => warn!(backend = detector.store.backend_name(), error = %e, "Failed to load anomaly model, starting untrained"),
        }
        detector
    }

    /// Re-read the store and publish what it holds. Returns whether a model was found.
    pub fn reload(&self) -> Result<bool, StorageError> {
        match self.store.load()? {
            Some(model) => {
                info!(
                    version = model.version,
                    features = model.feature_names.len(),
                    backend = self.store.backend_name(),
                    "Loaded anomaly model"
                );
                self.current.store(Some(Arc::new(model)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    pub fn state(&self) -> DetectorState {
        if self.current.load().is_some() {
            DetectorState::Ready
        } else {
            DetectorState::Untrained
        }
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.current.load().as_deref().map(ModelInfo::from)
    }

    /// Snapshot of the published model.
    pub fn current(&self) -> Option<Arc<AnomalyModel>> {
        self.current.load_full()
    }

    /// Fit a new model on `features`, persist it, then publish it.
    ///
    /// On any error the previously published model stays in place.
    pub fn train(&self, features: &FeatureMatrix) -> Result<ModelInfo, TrainingError> {
        if features.is_empty() {
            return Err(TrainingError::EmptyInput);
        }

        let feature_names = features.model_columns();
        if feature_names.is_empty() {
            return Err(TrainingError::NoFeatureColumns);
        }

        let rows = features
            .rows(&feature_names)
            .ok_or(TrainingError::NoFeatureColumns)?;
        let scaler = StandardScaler::fit(&rows).ok_or(TrainingError::NonFiniteFeatures)?;
        let scaled = scaler.transform(&rows);

        let forest = IsolationForest::fit(
            &scaled,
            ForestParams {
                n_estimators: self.params.n_estimators,
                max_samples: self.params.max_samples,
                seed: self.params.seed,
            },
        )
        .ok_or(TrainingError::EmptyInput)?;

        let scores = forest.score_samples(&scaled);
        let offset = percentile(&scores, 100.0 * self.params.contamination)
            .ok_or(TrainingError::EmptyInput)?;

        let _guard = self.training.lock().unwrap_or_else(|e| {
            warn!("Training lock poisoned, recovering");
            e.into_inner()
        });

        let version = self.current.load().as_ref().map_or(1, |m| m.version + 1);
        let model = AnomalyModel {
            version,
            trained_at: Utc::now(),
            training_rows: rows.len(),
            feature_names,
            contamination: self.params.contamination,
            offset,
            scaler,
            forest,
        };

        self.store.save(&model)?;
        let info = ModelInfo::from(&model);
        self.current.store(Some(Arc::new(model)));

        info!(
            version,
            rows = info.training_rows,
            features = info.feature_names.len(),
            offset,
            backend = self.store.backend_name(),
            "Anomaly model trained"
        );

        Ok(info)
    }

    /// Flag outlying rows of `features`.
    ///
    /// Untrained, empty input or a column layout that differs from training
    /// all yield an empty result.
    pub fn detect(&self, features: &FeatureMatrix) -> Vec<AnomalyResult> {
        let Some(model) = self.current.load_full() else {
            debug!("Anomaly detector untrained, skipping detection");
            return Vec::new();
        };
        if features.is_empty() {
            return Vec::new();
        }

        let columns = features.model_columns();
        if columns != model.feature_names {
            warn!(
                expected = model.feature_names.len(),
                found = columns.len(),
                "Feature columns differ from training, skipping detection"
            );
            return Vec::new();
        }

        let Some(rows) = features.rows(&model.feature_names) else {
            warn!("Feature matrix missing training columns, skipping detection");
            return Vec::new();
        };

        let zscores: Vec<_> = features
            .channels()
            .iter()
            .filter_map(|c| Some((c, features.derived(c, DerivedFeature::ZScore)?)))
            .collect();

        let anomalies: Vec<AnomalyResult> = model
            .decision_function(&rows)
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score < 0.0)
            .map(|(index, score)| AnomalyResult {
                timestep_index: index,
                timestamp: features.timestamps()[index],
                anomaly_score: score,
                severity: severity_for(score),
                affected_channels: zscores
                    .iter()
                    .filter(|(_, z)| z[index].abs() > AFFECTED_ZSCORE)
                    .map(|(c, _)| (*c).clone())
                    .collect::<BTreeSet<_>>(),
            })
            .collect();

        debug!(rows = rows.len(), anomalies = anomalies.len(), "Anomaly detection complete");
        anomalies
    }
}
