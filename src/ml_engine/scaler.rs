//! Per-column standardization fitted at training time

use serde::{Deserialize, Serialize};

/// Zero-mean, unit-variance scaling per column.
///
/// Uses the population standard deviation. Constant columns get scale 1 so
/// they transform to 0 instead of NaN. A column whose mean or variance
/// overflows cannot be standardized and fails the fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on row-major data. Returns `None` for empty input or when a
    /// column's mean or variance is not finite.
    pub fn fit(rows: &[Vec<f64>]) -> Option<Self> {
        let n_features = rows.first()?.len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; n_features];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0; n_features];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m).powi(2);
            }
        }

        if !mean.iter().chain(&var).all(|v| v.is_finite()) {
            return None;
        }

        let scale = var
            .into_iter()
            .map(|ss| {
                let std = (ss / n).sqrt();
                if std > 0.0 {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Some(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}
