pub mod csv;
pub mod db;

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

pub use db::{NewRun, RunLedger, RunRecord};

pub const DETECTION_STEM: &str = "microburst_catalog";
pub const PASS_STEM: &str = "sampex_passes";

pub fn next_catalog_path(dir: &Path, stem: &str) -> Result<PathBuf> {
    for n in 0..100 {
        let candidate = dir.join(format!("{}_{:02}.csv", stem, n));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    bail!("No free catalog name for {} in {}", stem, dir.display())
}
