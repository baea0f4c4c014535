//! Synthetic sensor data for training and demos
//!
//! One machine, four canonical channels, 5-minute cadence:
//!
//! - temperature: 25 + 3·sin(daily) + 2·sin(weekly) + N(0, 1), floored at 0
//! - humidity: 55 − 0.5·(temperature − 25) + N(0, 3), clamped to [0, 100]
//! - tension: 150 + 20·N(0, 1), floored at 0
//! - vibration: 10 + 2·N(0, 1), plus U(10, 20) on 5% of samples, floored at 0
//!
//! Output is fully determined by the seed.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::TAU;
use tracing::info;

use crate::config::defaults::{
    DEFAULT_SEED, SYNTHETIC_INTERVAL_MINUTES, SYNTHETIC_SPIKE_PROBABILITY,
};
use crate::types::{Reading, SensorType};

/// Samples per day at the 5-minute cadence
const SAMPLES_PER_DAY: f64 = 24.0 * 12.0;
const SAMPLES_PER_WEEK: f64 = SAMPLES_PER_DAY * 7.0;

#[derive(Debug)]
pub struct SyntheticGenerator {
    rng: StdRng,
    interval: Duration,
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl SyntheticGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            interval: Duration::minutes(SYNTHETIC_INTERVAL_MINUTES),
        }
    }

    fn normal(&mut self) -> f64 {
        StandardNormal.sample(&mut self.rng)
    }

    /// Generate `samples` timesteps for `machine_id` starting at `start`.
    ///
    /// Each timestep yields one reading per canonical channel.
    pub fn generate(&mut self, machine_id: &str, samples: usize, start: DateTime<Utc>) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(samples * 4);

        for i in 0..samples {
            let timestamp = start + self.interval * i as i32;
            let step = i as f64;
            let daily = (TAU * step / SAMPLES_PER_DAY).sin();
            let weekly = (TAU * step / SAMPLES_PER_WEEK).sin();

            let temperature = 25.0 + 3.0 * daily + 2.0 * weekly + self.normal();
            let humidity = 55.0 - 0.5 * (temperature - 25.0) + 3.0 * self.normal();
            let tension = 150.0 + 20.0 * self.normal();
            let mut vibration = 10.0 + 2.0 * self.normal();
            if self.rng.gen::<f64>() < SYNTHETIC_SPIKE_PROBABILITY {
                vibration += self.rng.gen_range(10.0..20.0);
            }

            for (sensor_id, sensor_type, value) in [
                ("temp-1", SensorType::Temperature, temperature.max(0.0)),
                ("hum-1", SensorType::Humidity, humidity.clamp(0.0, 100.0)),
                ("ten-1", SensorType::Tension, tension.max(0.0)),
                ("vib-1", SensorType::Vibration, vibration.max(0.0)),
            ] {
                readings.push(Reading::new(machine_id, sensor_id, sensor_type, value, timestamp));
            }
        }

        info!(machine_id, samples, readings = readings.len(), "Generated synthetic readings");
        readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_shape_and_cadence() {
        let readings = SyntheticGenerator::default().generate("m1", 10, start());
        assert_eq!(readings.len(), 40);
        assert_eq!(readings[4].timestamp - readings[0].timestamp, Duration::minutes(5));
        assert!(readings.iter().all(|r| r.machine_id == "m1"));
    }

    #[test]
    fn test_values_within_physical_ranges() {
        let readings = SyntheticGenerator::new(3).generate("m1", 2_000, start());
        for r in &readings {
            assert!(r.value >= 0.0, "{r:?}");
            if r.sensor_type == SensorType::Humidity {
                assert!(r.value <= 100.0);
            }
        }
        let spikes = readings
            .iter()
            .filter(|r| r.sensor_type == SensorType::Vibration && r.value > 25.0)
            .count();
        assert!(spikes > 0);
    }

    #[test]
    fn test_same_seed_same_data() {
        let a = SyntheticGenerator::new(9).generate("m1", 50, start());
        let b = SyntheticGenerator::new(9).generate("m1", 50, start());
        assert_eq!(a, b);
    }
}
