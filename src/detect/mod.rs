pub mod gaps;
pub mod peaks;
pub mod significance;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;
use crate::types::{Detection, SampleStream};

pub use gaps::{gap_radius, remove_near_gaps};
pub use peaks::{detections_at, find_peaks};
pub use significance::{significance, window_sizes, WindowSizes};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionParams {
    pub baseline_width_s: f64,
    pub foreground_width_s: f64,
    pub threshold: f64,
    pub gap_tolerance_s: f64,
    /// Defaults to twice the baseline width.
    pub gap_window_s: Option<f64>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            baseline_width_s: 10.0,
            foreground_width_s: 0.1,
            threshold: 5.0,
            gap_tolerance_s: 1.0,
            gap_window_s: None,
        }
    }
}

impl DetectionParams {
    pub fn gap_window(&self) -> f64 {
        self.gap_window_s.unwrap_or(2.0 * self.baseline_width_s)
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        let (baseline, foreground) = (self.baseline_width_s, self.foreground_width_s);
        if !baseline.is_finite() || !foreground.is_finite() || baseline <= 0.0 || foreground < 0.0 {
            return Err(TelemetryError::InvalidParameters(format!(
                "window widths must be finite with a positive baseline, got baseline {}s foreground {}s",
                baseline, foreground
            )));
        }
        if foreground >= baseline {
            return Err(TelemetryError::InvalidParameters(format!(
                "foreground width {}s must be shorter than baseline width {}s",
                foreground, baseline
            )));
        }
        if !self.threshold.is_finite() {
            return Err(TelemetryError::InvalidParameters(
                "threshold must be finite".to_string(),
            ));
        }
        if !self.gap_tolerance_s.is_finite() || self.gap_tolerance_s <= 0.0 {
            return Err(TelemetryError::InvalidParameters(format!(
                "gap tolerance must be positive, got {}",
                self.gap_tolerance_s
            )));
        }
        let gap_window = self.gap_window();
        if !gap_window.is_finite() || gap_window < 0.0 {
            return Err(TelemetryError::InvalidParameters(format!(
                "gap window must be non-negative, got {}",
                gap_window
            )));
        }
        Ok(())
    }
}

/// Full per-unit search: score, pick peaks, then drop detections whose
/// supporting window straddles a data gap.
pub fn detect_microbursts(
    stream: &SampleStream,
    params: &DetectionParams,
) -> Result<Vec<Detection>, TelemetryError> {
    params.validate()?;
    let scores = significance(stream, params.baseline_width_s, params.foreground_width_s)?;
    let peaks = find_peaks(&scores, params.threshold);
    let candidates = detections_at(stream.samples(), &scores, &peaks);
    let candidate_count = candidates.len();

    let radius = gap_radius(stream.resolution(), params.gap_window());
    let detections = remove_near_gaps(
        candidates,
        stream.samples(),
        radius,
        params.gap_tolerance_s,
    );

    debug!(
        "{} peaks above {} sigma, {} removed near data gaps (radius {} samples)",
        candidate_count,
        params.threshold,
        candidate_count - detections.len(),
        radius
    );
    Ok(detections)
}
