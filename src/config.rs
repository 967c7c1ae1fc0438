use knuffel::Decode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::detect::DetectionParams;
use crate::passes::PassParams;

#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct MicroburstConfig {
    #[knuffel(child)]
    pub general: Option<GeneralConfig>,
    #[knuffel(child)]
    pub data_dir: Option<DataDir>,
    #[knuffel(child)]
    pub detection: Option<DetectionConfig>,
    #[knuffel(child)]
    pub passes: Option<PassConfig>,
    #[knuffel(children(name = "skip-year"))]
    pub skip_years: Vec<SkipYear>,
}

#[derive(Decode, Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Worker count; 0 uses every available core.
    #[knuffel(property)]
    pub threads: Option<i32>,
    #[knuffel(property)]
    pub log: Option<bool>,
}

#[derive(Decode, Debug, Clone, Serialize, Deserialize)]
pub struct DataDir {
    #[knuffel(argument)]
    pub path: String,
}

#[derive(Decode, Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[knuffel(property)]
    pub baseline_width: Option<f64>,
    #[knuffel(property)]
    pub foreground_width: Option<f64>,
    #[knuffel(property)]
    pub threshold: Option<f64>,
    #[knuffel(property)]
    pub gap_tolerance: Option<f64>,
    #[knuffel(property)]
    pub gap_window: Option<f64>,
}

#[derive(Decode, Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    #[knuffel(property)]
    pub lo: Option<f64>,
    #[knuffel(property)]
    pub hi: Option<f64>,
    #[knuffel(property)]
    pub min_duration: Option<f64>,
    #[knuffel(property)]
    pub gap: Option<f64>,
}

#[derive(Decode, Debug, Clone, Serialize, Deserialize)]
pub struct SkipYear {
    #[knuffel(argument)]
    pub year: i32,
}

impl MicroburstConfig {
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config = knuffel::parse("config.kdl", content)?;
        Ok(config)
    }

    pub fn threads(&self) -> usize {
        let threads = self.general.as_ref().and_then(|g| g.threads).unwrap_or(0);
        if threads > 0 {
            return threads as usize;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }

    pub fn log_enabled(&self) -> bool {
        self.general.as_ref().and_then(|g| g.log).unwrap_or(true)
    }

    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| PathBuf::from(&d.path))
    }

    pub fn skip_years(&self) -> Vec<i32> {
        self.skip_years.iter().map(|s| s.year).collect()
    }

    pub fn detection_params(&self) -> DetectionParams {
        let defaults = DetectionParams::default();
        let Some(d) = &self.detection else {
            return defaults;
        };
        DetectionParams {
            baseline_width_s: d.baseline_width.unwrap_or(defaults.baseline_width_s),
            foreground_width_s: d.foreground_width.unwrap_or(defaults.foreground_width_s),
            threshold: d.threshold.unwrap_or(defaults.threshold),
            gap_tolerance_s: d.gap_tolerance.unwrap_or(defaults.gap_tolerance_s),
            gap_window_s: d.gap_window.or(defaults.gap_window_s),
        }
    }

    pub fn pass_params(&self) -> PassParams {
        let defaults = PassParams::default();
        let Some(p) = &self.passes else {
            return defaults;
        };
        PassParams {
            lo: p.lo.unwrap_or(defaults.lo),
            hi: p.hi.unwrap_or(defaults.hi),
            min_duration_s: p.min_duration.unwrap_or(defaults.min_duration_s),
            gap_s: p.gap.unwrap_or(defaults.gap_s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let text = r#"
general threads=4 log=false
data-dir "/data/sampex"
detection baseline-width=20.0 threshold=6.5 gap-window=30.0
passes lo=3.5 min-duration=120.0
skip-year 1996
skip-year 2004
"#;
        let config = MicroburstConfig::parse(text).unwrap();
        assert_eq!(config.threads(), 4);
        assert!(!config.log_enabled());
        assert_eq!(config.data_dir(), Some(PathBuf::from("/data/sampex")));
        assert_eq!(config.skip_years(), vec![1996, 2004]);

        let detection = config.detection_params();
        assert_eq!(detection.baseline_width_s, 20.0);
        assert_eq!(detection.threshold, 6.5);
        assert_eq!(detection.gap_window_s, Some(30.0));
        assert_eq!(detection.foreground_width_s, DetectionParams::default().foreground_width_s);

        let passes = config.pass_params();
        assert_eq!(passes.lo, 3.5);
        assert_eq!(passes.hi, 8.0);
        assert_eq!(passes.min_duration_s, 120.0);
        assert_eq!(passes.gap_s, 300.0);
    }

    #[test]
    fn test_defaults() {
        let config = MicroburstConfig::parse("").unwrap();
        assert!(config.log_enabled());
        assert!(config.threads() >= 1);
        assert_eq!(config.data_dir(), None);
        assert_eq!(config.detection_params(), DetectionParams::default());
        assert_eq!(config.pass_params(), PassParams::default());
    }

    #[test]
    fn test_unknown_node_rejected() {
        assert!(MicroburstConfig::parse("plugin \"x\" enabled=true").is_err());
    }
}
