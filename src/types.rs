use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: NaiveDateTime,
    pub value: f64,
}

/// Significance of one sample. `n_std` is `None` where the score is undefined
/// (baseline window not yet full, or a flat baseline).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub time: NaiveDateTime,
    pub n_std: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub sample_index: usize,
    pub time: NaiveDateTime,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSample {
    pub time: NaiveDateTime,
    pub coordinate: f64,
    pub auxiliary: f64,
    pub quality_flag: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pass {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub duration_seconds: f64,
    pub mean_auxiliary: f64,
    pub min_auxiliary: f64,
    pub max_auxiliary: f64,
    pub max_quality_flag: f64,
}

pub fn seconds_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

fn check_order<I>(times: I) -> Result<(), TelemetryError>
where
    I: IntoIterator<Item = NaiveDateTime>,
{
    let mut previous: Option<NaiveDateTime> = None;
    for (index, current) in times.into_iter().enumerate() {
        if let Some(previous) = previous {
            if current < previous {
                return Err(TelemetryError::OutOfOrder {
                    index,
                    previous,
                    current,
                });
            }
        }
        previous = Some(current);
    }
    Ok(())
}

/// Count-rate samples of one unit at a fixed nominal resolution.
///
/// Construction rejects streams whose timestamps decrease anywhere, so every
/// stage downstream can rely on time order. Equal timestamps are kept.
#[derive(Debug, Clone)]
pub struct SampleStream {
    samples: Vec<Sample>,
    resolution: f64,
}

impl SampleStream {
    pub fn new(samples: Vec<Sample>, resolution: f64) -> Result<Self, TelemetryError> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(TelemetryError::InvalidParameters(format!(
                "resolution must be positive, got {}",
                resolution
            )));
        }
        check_order(samples.iter().map(|s| s.time))?;
        Ok(Self { samples, resolution })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoordinateStream {
    samples: Vec<CoordinateSample>,
}

impl CoordinateStream {
    pub fn new(samples: Vec<CoordinateSample>) -> Result<Self, TelemetryError> {
        check_order(samples.iter().map(|s| s.time))?;
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[CoordinateSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
