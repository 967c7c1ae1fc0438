use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::Pass;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassActivity {
    pub pass: Pass,
    pub microburst_count: usize,
    pub rate_per_minute: f64,
}

pub fn filter_by_quality(passes: &[Pass], max_flag: f64) -> Vec<Pass> {
    passes
        .iter()
        .filter(|p| p.max_quality_flag < max_flag)
        .copied()
        .collect()
}

/// Counts the microbursts falling in `(start_time, end_time]` of each pass.
/// `times` may come in any order.
pub fn annotate_passes(passes: &[Pass], times: &[NaiveDateTime]) -> Vec<PassActivity> {
    let mut sorted = times.to_vec();
    sorted.sort_unstable();

    passes
        .iter()
        .map(|pass| {
            let lo = sorted.partition_point(|t| *t <= pass.start_time);
            let hi = sorted.partition_point(|t| *t <= pass.end_time);
            let count = hi.saturating_sub(lo);
            let minutes = pass.duration_seconds / 60.0;
            let rate = if minutes > 0.0 { count as f64 / minutes } else { 0.0 };
            PassActivity {
                pass: *pass,
                microburst_count: count,
                rate_per_minute: rate,
            }
        })
        .collect()
}
