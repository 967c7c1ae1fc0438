use log::debug;

use crate::error::TelemetryError;
use crate::types::{SampleStream, Score};

/// Sliding updates are exact in theory but drift in floating point, so the
/// accumulators are rebuilt from the window this often.
const RESEED_INTERVAL: usize = 4096;

/// Baseline variance below this fraction of `mean^2` counts as flat.
const DEGENERATE_REL_VARIANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSizes {
    pub baseline: usize,
    pub foreground: usize,
}

pub fn window_sizes(
    resolution: f64,
    baseline_width_s: f64,
    foreground_width_s: f64,
) -> Result<WindowSizes, TelemetryError> {
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(TelemetryError::InvalidParameters(format!(
            "resolution must be positive, got {}",
            resolution
        )));
    }
    if !baseline_width_s.is_finite() || !foreground_width_s.is_finite() || foreground_width_s < 0.0 {
        return Err(TelemetryError::InvalidParameters(
            "window widths must be finite and non-negative".to_string(),
        ));
    }
    if foreground_width_s >= baseline_width_s {
        return Err(TelemetryError::InvalidParameters(format!(
            "foreground width {}s must be shorter than baseline width {}s",
            foreground_width_s, baseline_width_s
        )));
    }

    let baseline = (baseline_width_s / resolution).round() as usize;
    let foreground = (foreground_width_s / resolution).round() as usize;
    if baseline < 1 {
        return Err(TelemetryError::InvalidParameters(format!(
            "baseline width {}s is shorter than one sample at {}s resolution",
            baseline_width_s, resolution
        )));
    }

    Ok(WindowSizes {
        baseline,
        foreground: foreground.min(baseline),
    })
}

#[derive(Debug, Clone, Copy, Default)]
struct RollingStats {
    n: usize,
    mean: f64,
    m2: f64,
}

impl RollingStats {
    fn seed(window: &[f64]) -> Self {
        let n = window.len();
        if n == 0 {
            return Self::default();
        }
        let mean = window.iter().sum::<f64>() / n as f64;
        let m2 = window.iter().map(|&x| (x - mean) * (x - mean)).sum();
        Self { n, mean, m2 }
    }

    fn push(&mut self, x: f64) {
        self.n += 1;
        let d = x - self.mean;
        self.mean += d / self.n as f64;
        self.m2 += d * (x - self.mean);
    }

    fn pop(&mut self, x: f64) {
        if self.n <= 1 {
            *self = Self::default();
            return;
        }
        self.n -= 1;
        let d = x - self.mean;
        self.mean -= d / self.n as f64;
        self.m2 -= d * (x - self.mean);
        if self.m2 < 0.0 {
            self.m2 = 0.0;
        }
    }

    fn std(&self) -> Option<f64> {
        if self.n < 2 {
            return None;
        }
        let variance = self.m2 / (self.n - 1) as f64;
        let floor = DEGENERATE_REL_VARIANCE * (self.mean * self.mean).max(1.0);
        if variance <= floor {
            None
        } else {
            Some(variance.sqrt())
        }
    }
}

/// Scores every sample of `stream` as `(foreground_mean - baseline_mean) /
/// baseline_std` over trailing windows.
///
/// The first `n_b` samples and samples over a flat baseline stay unscored.
pub fn significance(
    stream: &SampleStream,
    baseline_width_s: f64,
    foreground_width_s: f64,
) -> Result<Vec<Score>, TelemetryError> {
    let sizes = window_sizes(stream.resolution(), baseline_width_s, foreground_width_s)?;
    let samples = stream.samples();
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let (n_b, n_f) = (sizes.baseline, sizes.foreground);

    debug!(
        "Scoring {} samples with baseline={} foreground={} samples",
        values.len(),
        n_b,
        n_f
    );

    let mut scores: Vec<Score> = samples
        .iter()
        .map(|s| Score { time: s.time, n_std: None })
        .collect();
    if values.len() <= n_b {
        return Ok(scores);
    }

    let mut baseline = RollingStats::seed(&values[..=n_b]);
    let mut foreground = RollingStats::seed(&values[n_b - n_f..=n_b]);

    for i in n_b..values.len() {
        if i > n_b {
            if (i - n_b) % RESEED_INTERVAL == 0 {
                baseline = RollingStats::seed(&values[i - n_b..=i]);
                foreground = RollingStats::seed(&values[i - n_f..=i]);
            } else {
                baseline.push(values[i]);
                baseline.pop(values[i - n_b - 1]);
                foreground.push(values[i]);
                foreground.pop(values[i - n_f - 1]);
            }
        }

        scores[i].n_std = baseline
            .std()
            .map(|std| (foreground.mean - baseline.mean) / std)
            .filter(|n_std| n_std.is_finite());
    }

    Ok(scores)
}
