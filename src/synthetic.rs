//! Synthetic telemetry for tests and the `simulate` command.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};
use std::io::{self, Write};

use crate::types::{CoordinateSample, Sample};
use crate::util::start_of_day;

const HILT_ROW_PERIOD_S: f64 = 0.1;

pub fn flat_counts<R: Rng>(
    rng: &mut R,
    start: NaiveDateTime,
    n: usize,
    dt: f64,
    level: f64,
    sigma: f64,
) -> Vec<Sample> {
    let noise = Normal::new(0.0, sigma.abs()).ok();
    (0..n)
        .map(|i| Sample {
            time: start + Duration::microseconds((i as f64 * dt * 1e6).round() as i64),
            value: level + noise.as_ref().map_or(0.0, |d| d.sample(rng)),
        })
        .collect()
}

pub fn insert_gap(samples: &mut [Sample], index: usize, gap_s: f64) {
    let shift = Duration::microseconds((gap_s * 1e6).round() as i64);
    for sample in samples.iter_mut().skip(index + 1) {
        sample.time += shift;
    }
}

/// `L` swings between `l_min` and `l_max` once per `period_s`.
pub fn orbit_trace(
    start: NaiveDateTime,
    n: usize,
    dt_s: f64,
    period_s: f64,
    l_min: f64,
    l_max: f64,
) -> Vec<CoordinateSample> {
    let mid = 0.5 * (l_min + l_max);
    let half = 0.5 * (l_max - l_min);
    (0..n)
        .map(|i| {
            let t = i as f64 * dt_s;
            let phase = 2.0 * std::f64::consts::PI * t / period_s;
            CoordinateSample {
                time: start + Duration::microseconds((t * 1e6).round() as i64),
                coordinate: mid - half * (2.0 * phase).cos(),
                auxiliary: (t / 3600.0) % 24.0,
                quality_flag: 0.0,
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct HiltDay {
    pub date: NaiveDate,
    pub rows: usize,
    pub level: f64,
    pub spikes: usize,
    pub spike_amplitude: f64,
}

impl HiltDay {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            rows: 36_000,
            level: 200.0,
            spikes: 5,
            spike_amplitude: 2_000.0,
        }
    }

    /// Writes a whitespace-separated State-4 file with Poisson counts and
    /// `spikes` evenly spaced 100 ms bursts. Returns the burst times.
    pub fn write<W: Write, R: Rng>(&self, out: &mut W, rng: &mut R) -> io::Result<Vec<NaiveDateTime>> {
        let background = Poisson::new(self.level.max(1e-3))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let spike_rows: Vec<usize> = (1..=self.spikes)
            .map(|k| k * self.rows / (self.spikes + 1))
            .collect();

        writeln!(out, "Time Rate1 Rate2 Rate3 Rate4 Rate5 Rate6")?;
        for row in 0..self.rows {
            let seconds = row as f64 * HILT_ROW_PERIOD_S;
            let burst = if spike_rows.contains(&row) { self.spike_amplitude } else { 0.0 };
            let mut rates = [0.0f64; 6];
            for rate in rates.iter_mut() {
                *rate = background.sample(rng) + burst;
            }
            writeln!(
                out,
                "{:.2} {} {} {} {} {} {}",
                seconds, rates[0], rates[1], rates[2], rates[3], rates[4], rates[5]
            )?;
        }

        let day = start_of_day(self.date);
        Ok(spike_rows
            .into_iter()
            .map(|row| day + Duration::milliseconds((row as f64 * HILT_ROW_PERIOD_S * 1e3).round() as i64))
            .collect())
    }
}
