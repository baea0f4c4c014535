//! Feature engineering over aligned multi-channel sensor series
//!
//! Readings for one machine are pivoted onto a common timeline (one row per
//! distinct timestamp, one column per sensor type, duplicates averaged), gap
//! filled forward then backward, and extended with four derived columns per
//! canonical channel:
//!
//! | column                 | definition                                    |
//! |------------------------|-----------------------------------------------|
//! | `<type>_rolling_mean`  | trailing mean, window ≤ N, min periods 1      |
//! | `<type>_rolling_std`   | trailing sample std, 0 with fewer than 2 rows |
//! | `<type>_rate_of_change`| first difference, 0 on the first row          |
//! | `<type>_zscore`        | whole-series z-score, 0 when std is 0         |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::config::defaults::DEFAULT_ROLLING_WINDOW;
use crate::types::{Reading, SensorType};

/// Derived per-channel feature kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedFeature {
    RollingMean,
    RollingStd,
    RateOfChange,
    ZScore,
}

impl DerivedFeature {
    pub const ALL: [DerivedFeature; 4] = [
        DerivedFeature::RollingMean,
        DerivedFeature::RollingStd,
        DerivedFeature::RateOfChange,
        DerivedFeature::ZScore,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Self::RollingMean => "rolling_mean",
            Self::RollingStd => "rolling_std",
            Self::RateOfChange => "rate_of_change",
            Self::ZScore => "zscore",
        }
    }

    pub fn column_name(self, channel: &SensorType) -> String {
        format!("{}_{}", channel, self.suffix())
    }
}

/// A named column of the feature matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Column-major feature matrix for one machine and window.
///
/// Every column has exactly `timestamps.len()` finite values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    timestamps: Vec<DateTime<Utc>>,
    channels: Vec<SensorType>,
    columns: Vec<FeatureColumn>,
}

impl FeatureMatrix {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of timesteps (rows).
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Sensor types with a raw column, in column order.
    pub fn channels(&self) -> &[SensorType] {
        &self.channels
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Aligned raw values of one channel.
    pub fn channel_values(&self, channel: &SensorType) -> Option<&[f64]> {
        self.column(channel.as_str())
    }

    pub fn derived(&self, channel: &SensorType, feature: DerivedFeature) -> Option<&[f64]> {
        self.column(&feature.column_name(channel))
    }

    /// Columns that name a canonical channel (raw or derived), in column order.
    pub fn model_columns(&self) -> Vec<String> {
        self.column_names()
            .filter(|name| {
                SensorType::CANONICAL
                    .iter()
                    .any(|canonical| name.contains(canonical.as_str()))
            })
            .map(str::to_string)
            .collect()
    }

    /// Row-major values for the named columns, or `None` if any is missing.
    pub fn rows(&self, names: &[String]) -> Option<Vec<Vec<f64>>> {
        let selected = names
            .iter()
            .map(|name| self.column(name))
            .collect::<Option<Vec<_>>>()?;

        Some(
            (0..self.len())
                .map(|row| selected.iter().map(|col| col[row]).collect())
                .collect(),
        )
    }

    /// The last `n` rows (all rows if fewer). Derived values are kept as
    /// computed over the full matrix.
    pub fn tail(&self, n: usize) -> Self {
        let start = self.len().saturating_sub(n);
        Self {
            timestamps: self.timestamps[start..].to_vec(),
            channels: self.channels.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| FeatureColumn {
                    name: c.name.clone(),
                    values: c.values[start..].to_vec(),
                })
                .collect(),
        }
    }
}

/// Builds [`FeatureMatrix`]es from raw readings.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder {
    rolling_window: usize,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_ROLLING_WINDOW)
    }
}

impl FeatureBuilder {
    pub fn new(rolling_window: usize) -> Self {
        Self {
            rolling_window: rolling_window.max(1),
        }
    }

    pub fn rolling_window(&self) -> usize {
        self.rolling_window
    }

    /// Build the aligned feature matrix. Empty input gives an empty matrix.
    pub fn build(&self, readings: &[Reading]) -> FeatureMatrix {
        let mut valid: Vec<&Reading> = readings
            .iter()
            .filter(|r| {
                let finite = r.value.is_finite();
                if !finite {
                    warn!(machine_id = %r.machine_id, sensor_id = %r.sensor_id, "Skipping non-finite reading");
                }
                finite
            })
            .collect();

        if valid.is_empty() {
            debug!("No readings to build features from");
            return FeatureMatrix::empty();
        }

        valid.sort_by_key(|r| r.timestamp);

        // (1) pivot, averaging duplicates per (timestamp, type)
        let mut grid: BTreeMap<DateTime<Utc>, BTreeMap<&SensorType, (f64, usize)>> = BTreeMap::new();
        let mut channels: BTreeSet<&SensorType> = BTreeSet::new();
        for r in &valid {
            let cell = grid
                .entry(r.timestamp)
                .or_default()
                .entry(&r.sensor_type)
                .or_insert((0.0, 0));
            cell.0 += r.value;
            cell.1 += 1;
            channels.insert(&r.sensor_type);
        }

        let timestamps: Vec<DateTime<Utc>> = grid.keys().copied().collect();

        // (2) per-channel series with gaps filled
        let mut raw: Vec<(SensorType, Vec<f64>)> = Vec::with_capacity(channels.len());
        for channel in &channels {
            let sparse: Vec<Option<f64>> = grid
                .values()
                .map(|row| row.get(channel).map(|(sum, n)| sum / *n as f64))
                .collect();
            raw.push(((*channel).clone(), fill_gaps(&sparse)));
        }

        // (3) derived columns for canonical channels
        let mut columns: Vec<FeatureColumn> = raw
            .iter()
            .map(|(channel, values)| FeatureColumn {
                name: channel.to_string(),
                values: values.clone(),
            })
            .collect();

        for (channel, values) in raw.iter().filter(|(c, _)| c.is_canonical()) {
            for feature in DerivedFeature::ALL {
                let derived = match feature {
                    DerivedFeature::RollingMean => rolling_mean(values, self.rolling_window),
                    DerivedFeature::RollingStd => rolling_std(values, self.rolling_window),
                    DerivedFeature::RateOfChange => rate_of_change(values),
                    DerivedFeature::ZScore => z_scores(values),
                };
                columns.push(FeatureColumn {
                    name: feature.column_name(channel),
                    values: derived,
                });
            }
        }

        // (4) anything left non-finite becomes 0
        for column in &mut columns {
            for v in &mut column.values {
                if !v.is_finite() {
                    *v = 0.0;
                }
            }
        }

        debug!(
            rows = timestamps.len(),
            channels = raw.len(),
            columns = columns.len(),
            "Feature matrix built"
        );

        FeatureMatrix {
            timestamps,
            channels: raw.into_iter().map(|(c, _)| c).collect(),
            columns,
        }
    }
}

/// Forward fill, then backward fill for leading gaps.
fn fill_gaps(sparse: &[Option<f64>]) -> Vec<f64> {
    let mut filled = Vec::with_capacity(sparse.len());
    let mut last = None;
    for v in sparse {
        last = v.or(last);
        filled.push(last);
    }

    let first = filled.iter().flatten().next().copied().unwrap_or(0.0);
    filled.into_iter().map(|v| v.unwrap_or(first)).collect()
}

fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| values[window_start(i, window)..=i].iter().mean())
        .collect()
}

fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let slice = &values[window_start(i, window)..=i];
            if slice.len() < 2 {
                0.0
            } else {
                slice.iter().std_dev()
            }
        })
        .collect()
}

fn window_start(i: usize, window: usize) -> usize {
    (i + 1).saturating_sub(window)
}

fn rate_of_change(values: &[f64]) -> Vec<f64> {
    std::iter::once(0.0)
        .chain(values.windows(2).map(|w| w[1] - w[0]))
        .take(values.len())
        .collect()
}

fn z_scores(values: &[f64]) -> Vec<f64> {
    let mean = values.iter().mean();
    let std = values.iter().std_dev();
    if !std.is_finite() || std == 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn reading(sensor_type: SensorType, value: f64, minutes: i64) -> Reading {
        Reading::new("m1", "s", sensor_type, value, t(minutes))
    }

    #[test]
    fn test_empty_input_gives_empty_matrix() {
        let matrix = FeatureBuilder::default().build(&[]);
        assert!(matrix.is_empty());
        assert!(matrix.columns().is_empty());
    }

    #[test]
    fn test_alignment_fills_gaps_and_equalizes_lengths() {
        let readings = vec![
            reading(SensorType::Humidity, 50.0, 10),
            reading(SensorType::Temperature, 20.0, 0),
            reading(SensorType::Temperature, 22.0, 20),
            reading(SensorType::Humidity, 54.0, 20),
        ];
        let matrix = FeatureBuilder::default().build(&readings);

        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix.timestamps(), &[t(0), t(10), t(20)]);
        assert_eq!(
            matrix.channel_values(&SensorType::Temperature).unwrap(),
            &[20.0, 20.0, 22.0]
        );
        // leading gap filled backward
        assert_eq!(
            matrix.channel_values(&SensorType::Humidity).unwrap(),
            &[50.0, 50.0, 54.0]
        );
        for column in matrix.columns() {
            assert_eq!(column.values.len(), 3, "column {}", column.name);
            assert!(column.values.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_duplicates_are_averaged() {
        let readings = vec![
            reading(SensorType::Tension, 100.0, 0),
            reading(SensorType::Tension, 200.0, 0),
        ];
        let matrix = FeatureBuilder::default().build(&readings);
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix.channel_values(&SensorType::Tension).unwrap(), &[150.0]);
        // single row: std undefined, reported as 0
        assert_eq!(
            matrix.derived(&SensorType::Tension, DerivedFeature::RollingStd).unwrap(),
            &[0.0]
        );
        assert_eq!(
            matrix.derived(&SensorType::Tension, DerivedFeature::ZScore).unwrap(),
            &[0.0]
        );
    }

    #[test]
    fn test_constant_channel_has_zero_zscore() {
        let readings: Vec<Reading> = (0..15)
            .map(|i| reading(SensorType::Vibration, 7.0, i))
            .collect();
        let matrix = FeatureBuilder::default().build(&readings);
        let z = matrix.derived(&SensorType::Vibration, DerivedFeature::ZScore).unwrap();
        assert!(z.iter().all(|v| *v == 0.0));
        let std = matrix.derived(&SensorType::Vibration, DerivedFeature::RollingStd).unwrap();
        assert!(std.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_rolling_window_and_rate_of_change() {
        let readings: Vec<Reading> = (0..12)
            .map(|i| reading(SensorType::Temperature, i as f64, i))
            .collect();
        let matrix = FeatureBuilder::new(10).build(&readings);

        let mean = matrix.derived(&SensorType::Temperature, DerivedFeature::RollingMean).unwrap();
        assert_eq!(mean[0], 0.0);
        assert_eq!(mean[1], 0.5);
        // rows 2..=11 → mean 6.5
        assert!((mean[11] - 6.5).abs() < 1e-12);

        let roc = matrix.derived(&SensorType::Temperature, DerivedFeature::RateOfChange).unwrap();
        assert_eq!(roc[0], 0.0);
        assert!(roc[1..].iter().all(|v| (*v - 1.0).abs() < 1e-12));

        let std = matrix.derived(&SensorType::Temperature, DerivedFeature::RollingStd).unwrap();
        // sample std of [0, 1]
        assert!((std[1] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_channels_get_no_derived_columns() {
        let flow = SensorType::Other("flow".into());
        let readings = vec![
            reading(flow.clone(), 1.0, 0),
            reading(SensorType::Temperature, 20.0, 0),
        ];
        let matrix = FeatureBuilder::default().build(&readings);
        assert!(matrix.channel_values(&flow).is_some());
        assert!(matrix.derived(&flow, DerivedFeature::ZScore).is_none());
        assert_eq!(matrix.columns().len(), 2 + 4);
        assert!(!matrix.model_columns().contains(&"flow".to_string()));
        assert_eq!(matrix.model_columns().len(), 5);
    }

    #[test]
    fn test_non_finite_readings_skipped() {
        let readings = vec![
            reading(SensorType::Temperature, f64::NAN, 0),
            reading(SensorType::Temperature, 21.0, 5),
        ];
        let matrix = FeatureBuilder::default().build(&readings);
        assert_eq!(matrix.len(), 1);
    }

    #[test]
    fn test_tail_and_rows() {
        let readings: Vec<Reading> = (0..5)
            .map(|i| reading(SensorType::Temperature, i as f64 * 10.0, i))
            .collect();
        let matrix = FeatureBuilder::default().build(&readings);
        let tail = matrix.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.channel_values(&SensorType::Temperature).unwrap(), &[30.0, 40.0]);
        assert_eq!(matrix.tail(100).len(), 5);

        let rows = tail.rows(&["temperature".to_string()]).unwrap();
        assert_eq!(rows, vec![vec![30.0], vec![40.0]]);
        assert!(tail.rows(&["humidity".to_string()]).is_none());
    }
}
