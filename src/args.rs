use crate::detect::DetectionParams;
use crate::passes::PassParams;
use crate::util::date_parser;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Microburst and radiation-belt pass catalogs from SAMPEX HILT telemetry.")]
pub struct Cli {
    /// KDL config file (defaults to the user config directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Root of the SAMPEX archive, overriding the config's data-dir.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Where catalogs are written (defaults to the user data directory).
    #[arg(long, global = true)]
    pub catalog_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search HILT count rates for microbursts.
    Detect {
        #[command(flatten)]
        range: DateRange,
        #[command(flatten)]
        detection: DetectionOverrides,
        /// Catalog file name; a versioned name is chosen when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Recompute every unit instead of reusing cached results.
        #[arg(long)]
        no_cache: bool,
    },
    /// Segment attitude data into passes through an L-shell range.
    Passes {
        #[command(flatten)]
        range: DateRange,
        #[command(flatten)]
        passes: PassOverrides,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Count microbursts per pass.
    Merge {
        #[arg(long)]
        passes: PathBuf,
        #[arg(long)]
        microbursts: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Keep only passes whose attitude flag stays below this value.
        #[arg(long)]
        max_flag: Option<f64>,
    },
    /// Write a synthetic HILT State-4 day file.
    Simulate {
        #[arg(long, value_parser = date_parser)]
        date: NaiveDate,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 5)]
        spikes: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// List previous runs.
    Runs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DateRange {
    /// First day to process (YYYY-MM-DD or YYYYDOY).
    #[arg(long, value_parser = date_parser)]
    pub start: Option<NaiveDate>,
    /// Last day to process, inclusive.
    #[arg(long, value_parser = date_parser)]
    pub end: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DetectionOverrides {
    #[arg(long)]
    pub baseline_width: Option<f64>,
    #[arg(long)]
    pub foreground_width: Option<f64>,
    #[arg(long)]
    pub threshold: Option<f64>,
    #[arg(long)]
    pub gap_tolerance: Option<f64>,
    #[arg(long)]
    pub gap_window: Option<f64>,
}

impl DetectionOverrides {
    pub fn apply(&self, params: DetectionParams) -> DetectionParams {
        DetectionParams {
            baseline_width_s: self.baseline_width.unwrap_or(params.baseline_width_s),
            foreground_width_s: self.foreground_width.unwrap_or(params.foreground_width_s),
            threshold: self.threshold.unwrap_or(params.threshold),
            gap_tolerance_s: self.gap_tolerance.unwrap_or(params.gap_tolerance_s),
            gap_window_s: self.gap_window.or(params.gap_window_s),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct PassOverrides {
    #[arg(long)]
    pub lo: Option<f64>,
    #[arg(long)]
    pub hi: Option<f64>,
    #[arg(long)]
    pub min_duration: Option<f64>,
    #[arg(long)]
    pub gap: Option<f64>,
}

impl PassOverrides {
    pub fn apply(&self, params: PassParams) -> PassParams {
        PassParams {
            lo: self.lo.unwrap_or(params.lo),
            hi: self.hi.unwrap_or(params.hi),
            min_duration_s: self.min_duration.unwrap_or(params.min_duration_s),
            gap_s: self.gap.unwrap_or(params.gap_s),
        }
    }
}
