use std::path::Path;

use serde::Deserialize;

use crate::calibrate::CalibrationStrategy;
use crate::convert::TimeUnit;
use crate::error::Error;

pub const DEFAULT_LOOPS: u64 = 10_000_000;
pub const DEFAULT_WARMUP: u64 = 5;
pub const DEFAULT_HISTOGRAM_SIZE: usize = 1_000_000;
const MAX_HISTOGRAM_SIZE: usize = 100_000_000;

/// Parameters of one sampling run. Read-only once the run starts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Total iterations, warm-up included.
    pub loops: u64,
    pub warmup: u64,
    /// Stop once measured durations add up to this many time units
    /// instead of after `loops` iterations.
    pub duration: Option<f64>,
    pub unit: TimeUnit,
    pub window_wait: f64,
    pub window_trace: f64,
    /// Hz; 0 disables throttling.
    pub max_frequency: f64,
    pub cpu: usize,
    pub calibration: CalibrationStrategy,
    pub histogram_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            loops: DEFAULT_LOOPS,
            warmup: DEFAULT_WARMUP,
            duration: None,
            unit: TimeUnit::Micro,
            window_wait: 0.0,
            window_trace: 0.0,
            max_frequency: 0.0,
            cpu: 1,
            calibration: CalibrationStrategy::Cpuinfo,
            histogram_size: DEFAULT_HISTOGRAM_SIZE,
        }
    }
}

fn non_negative(v: f64) -> f64 {
    if v > 0.0 && v.is_finite() {
        v
    } else {
        0.0
    }
}

impl RunConfig {
    /// Clamp fields to valid ranges and link the two window lengths.
    pub fn validate(&mut self) {
        self.loops = self.loops.max(1);
        self.duration = self.duration.filter(|d| *d > 0.0 && d.is_finite());
        if self.duration.is_none() {
            self.warmup = self.warmup.min(self.loops - 1);
        }
        self.histogram_size = self.histogram_size.clamp(1, MAX_HISTOGRAM_SIZE);

        self.window_wait = non_negative(self.window_wait);
        self.window_trace = non_negative(self.window_trace);
        if self.window_wait == 0.0 {
            self.window_wait = self.window_trace;
        } else if self.window_trace == 0.0 {
            self.window_trace = self.window_wait;
        }
        self.max_frequency = non_negative(self.max_frequency);
    }
}

/// Real-time environment the run is executed in.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RtConfig {
    /// SCHED_FIFO priority.
    pub priority: i32,
    pub lock_memory: bool,
    pub disable_interrupts: bool,
}

impl Default for RtConfig {
    fn default() -> Self {
        Self {
            priority: 99,
            lock_memory: true,
            disable_interrupts: false,
        }
    }
}

impl RtConfig {
    pub fn validate(&mut self) {
        self.priority = self.priority.clamp(0, 99);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub rt: RtConfig,
}

/// Load configuration from a TOML file.
///
/// - If `explicit_path` is `Some` and the file is missing, returns an error.
/// - If `explicit_path` is `None`, tries `/etc/npt.toml`; if missing, returns defaults.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config, Error> {
    let path = match explicit_path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::InvalidArgs(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => {
            let default = Path::new("/etc/npt.toml");
            if !default.exists() {
                return Ok(Config::default());
            }
            default.to_path_buf()
        }
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidArgs(format!("failed to read config {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&contents).map_err(|e| {
        Error::InvalidArgs(format!("failed to parse config {}: {}", path.display(), e))
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.loops, 10_000_000);
        assert_eq!(cfg.warmup, 5);
        assert!(cfg.duration.is_none());
        assert_eq!(cfg.unit, TimeUnit::Micro);
        assert_eq!(cfg.window_wait, 0.0);
        assert_eq!(cfg.window_trace, 0.0);
        assert_eq!(cfg.max_frequency, 0.0);
        assert_eq!(cfg.cpu, 1);
        assert_eq!(cfg.calibration, CalibrationStrategy::Cpuinfo);
        assert_eq!(cfg.histogram_size, 1_000_000);

        let rt = RtConfig::default();
        assert_eq!(rt.priority, 99);
        assert!(rt.lock_memory);
        assert!(!rt.disable_interrupts);
    }

    #[test]
    fn test_window_mirroring() {
        let mut cfg = RunConfig {
            window_trace: 40.0,
            ..Default::default()
        };
        cfg.validate();
        assert_eq!(cfg.window_wait, 40.0);
        assert_eq!(cfg.window_trace, 40.0);

        let mut cfg = RunConfig {
            window_wait: 15.0,
            ..Default::default()
        };
        cfg.validate();
        assert_eq!(cfg.window_trace, 15.0);

        let mut cfg = RunConfig {
            window_wait: 100.0,
            window_trace: 50.0,
            ..Default::default()
        };
        cfg.validate();
        assert_eq!((cfg.window_wait, cfg.window_trace), (100.0, 50.0));
    }

    #[test]
    fn test_validate_clamps() {
        let mut cfg = RunConfig {
            loops: 0,
            warmup: 10,
            histogram_size: 0,
            window_wait: -3.0,
            window_trace: f64::NAN,
            max_frequency: -1.0,
            duration: Some(-5.0),
            ..Default::default()
        };
        cfg.validate();
        assert_eq!(cfg.loops, 1);
        assert_eq!(cfg.warmup, 0);
        assert_eq!(cfg.histogram_size, 1);
        assert_eq!(cfg.window_wait, 0.0);
        assert_eq!(cfg.window_trace, 0.0);
        assert_eq!(cfg.max_frequency, 0.0);
        assert!(cfg.duration.is_none());

        let mut rt = RtConfig {
            priority: 150,
            ..Default::default()
        };
        rt.validate();
        assert_eq!(rt.priority, 99);
    }

    #[test]
    fn test_invalid_duration_falls_back_to_loops() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut cfg = RunConfig {
                loops: 20,
                warmup: 50,
                duration: Some(bad),
                ..Default::default()
            };
            cfg.validate();
            assert!(cfg.duration.is_none(), "duration {} kept", bad);
            assert_eq!(cfg.warmup, 19, "warmup not clamped for duration {}", bad);
        }
    }

    #[test]
    fn test_warmup_kept_in_duration_mode() {
        let mut cfg = RunConfig {
            loops: 3,
            warmup: 10,
            duration: Some(1000.0),
            ..Default::default()
        };
        cfg.validate();
        assert_eq!(cfg.warmup, 10);
    }

    #[test]
    fn test_toml_parsing() {
        let dir = std::env::temp_dir();
        let path = dir.join("npt_test_config.toml");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            write!(
                f,
                r#"
[run]
loops = 20000
unit = "nano"
calibration = "evaluate"
window_wait = 250.0

[rt]
priority = 80
"#
            )
            .unwrap();
        }
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.run.loops, 20000);
        assert_eq!(config.run.unit, TimeUnit::Nano);
        assert_eq!(config.run.calibration, CalibrationStrategy::Evaluate);
        assert_eq!(config.run.window_wait, 250.0);
        assert_eq!(config.rt.priority, 80);
        // Unset fields should get defaults
        assert_eq!(config.run.warmup, 5);
        assert!(config.rt.lock_memory);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_explicit_config_errors() {
        let path = std::path::Path::new("/tmp/npt_nonexistent_config.toml");
        let result = load_config(Some(path));
        assert!(result.is_err());
    }
}
