pub mod args;
pub mod batch;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod detect;
pub mod error;
pub mod merge;
pub mod passes;
pub mod source;
pub mod synthetic;
pub mod types;
pub mod util;

pub use error::TelemetryError;
pub use types::{CoordinateSample, Detection, Pass, Sample, Score};
