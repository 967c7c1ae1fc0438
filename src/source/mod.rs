pub mod archive;
pub mod attitude;
pub mod hilt;

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::TelemetryError;
use crate::types::{CoordinateSample, CoordinateStream, Sample, SampleStream};

pub use archive::SampexArchive;

/// Supplies the telemetry of one processing unit (a calendar day).
///
/// Implementations must reject a unit whose timestamps decrease with
/// [`TelemetryError::OutOfOrder`] and report absent data with
/// [`TelemetryError::MissingInput`] rather than returning an empty stream.
pub trait UnitSource: Send + Sync {
    fn units(&self) -> Result<Vec<NaiveDate>, TelemetryError>;

    fn counts(&self, date: NaiveDate) -> Result<SampleStream, TelemetryError>;

    fn coordinates(&self, date: NaiveDate) -> Result<CoordinateStream, TelemetryError>;

    /// Identifies the count input behind `date`, so cached results can be
    /// tied to it. `None` means the input cannot be identified and results
    /// for it are never cached.
    fn counts_identity(&self, _date: NaiveDate) -> Result<Option<String>, TelemetryError> {
        Ok(None)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    counts: BTreeMap<NaiveDate, (Vec<Sample>, f64)>,
    coordinates: BTreeMap<NaiveDate, Vec<CoordinateSample>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(mut self, date: NaiveDate, samples: Vec<Sample>, resolution: f64) -> Self {
        self.counts.insert(date, (samples, resolution));
        self
    }

    pub fn with_coordinates(mut self, date: NaiveDate, samples: Vec<CoordinateSample>) -> Self {
        self.coordinates.insert(date, samples);
        self
    }
}

impl UnitSource for MemorySource {
    fn units(&self) -> Result<Vec<NaiveDate>, TelemetryError> {
        let dates: BTreeSet<NaiveDate> = self
            .counts
            .keys()
            .chain(self.coordinates.keys())
            .copied()
            .collect();
        Ok(dates.into_iter().collect())
    }

    fn counts(&self, date: NaiveDate) -> Result<SampleStream, TelemetryError> {
        let (samples, resolution) = self
            .counts
            .get(&date)
            .ok_or(TelemetryError::MissingInput { kind: "count-rate", date })?;
        SampleStream::new(samples.clone(), *resolution)
    }

    fn coordinates(&self, date: NaiveDate) -> Result<CoordinateStream, TelemetryError> {
        let samples = self
            .coordinates
            .get(&date)
            .ok_or(TelemetryError::MissingInput { kind: "coordinate", date })?;
        CoordinateStream::new(samples.clone())
    }
}
