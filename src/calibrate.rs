use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::config::RunConfig;
use crate::convert::{tick_delta, TimeUnit};
use crate::counter::{self, CycleCounter, WallClock};
use crate::error::Error;

const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Busy-spin length run before any frequency is taken, so that the core has
/// left any low-power state.
const STRESS_ITERATIONS: u64 = 100_000_000;

/// How the counter frequency is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationStrategy {
    /// Read the per-CPU "cpu MHz" value the kernel publishes.
    #[default]
    Cpuinfo,
    /// Time a busy-spin against `CLOCK_MONOTONIC_RAW`.
    Evaluate,
}

impl CalibrationStrategy {
    pub fn label(self) -> &'static str {
        match self {
            CalibrationStrategy::Cpuinfo => "/proc/cpuinfo",
            CalibrationStrategy::Evaluate => "evaluation",
        }
    }
}

/// Outcome of a successful calibration. `period > 0` always holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    pub ticks_per_sec: u64,
    /// Length of one tick in the run's time unit.
    pub period: f64,
    pub strategy: CalibrationStrategy,
}

impl CalibrationResult {
    pub fn new(
        ticks_per_sec: u64,
        unit: TimeUnit,
        strategy: CalibrationStrategy,
    ) -> Result<Self, Error> {
        if ticks_per_sec == 0 {
            return Err(Error::Calibration(format!(
                "{} reported a zero counter frequency",
                strategy.label()
            )));
        }
        Ok(Self {
            ticks_per_sec,
            period: unit.per_second() / ticks_per_sec as f64,
            strategy,
        })
    }

    pub fn mhz(&self) -> f64 {
        self.ticks_per_sec as f64 / 1.0e6
    }
}

/// Spins on a pure arithmetic loop. No memory is touched besides the
/// loop variable.
pub fn cpu_stress(iterations: u64) {
    let mut i: u64 = 0;
    while std::hint::black_box(i) < iterations {
        i += 1;
    }
}

/// Extracts the "cpu MHz" value of logical CPU `cpu` (the `cpu`-th such line).
pub fn parse_cpuinfo_mhz(contents: &str, cpu: usize) -> Result<f64, Error> {
    let line = contents
        .lines()
        .filter(|l| l.starts_with("cpu MHz"))
        .nth(cpu)
        .ok_or_else(|| Error::Calibration(format!("no \"cpu MHz\" entry for CPU {}", cpu)))?;

    let value = line
        .split_once(':')
        .map(|(_, v)| v.trim())
        .ok_or_else(|| Error::Calibration(format!("malformed cpuinfo line: {}", line)))?;

    value
        .parse::<f64>()
        .map_err(|e| Error::Calibration(format!("invalid cpu MHz value {:?}: {}", value, e)))
}

/// Runs one calibration strategy against a counter and a wall clock.
#[derive(Debug, Clone)]
pub struct Calibrator {
    pub cpuinfo_path: PathBuf,
    pub stress_iterations: u64,
    /// Fixed counter rate that takes precedence over /proc/cpuinfo.
    pub counter_frequency: Option<u64>,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self {
            cpuinfo_path: PathBuf::from(CPUINFO_PATH),
            stress_iterations: STRESS_ITERATIONS,
            counter_frequency: counter::counter_frequency(),
        }
    }
}

impl Calibrator {
    pub fn calibrate<C, W>(
        &self,
        config: &RunConfig,
        counter: &mut C,
        clock: &mut W,
    ) -> Result<CalibrationResult, Error>
    where
        C: CycleCounter,
        W: WallClock,
    {
        let ticks_per_sec = match config.calibration {
            CalibrationStrategy::Cpuinfo => self.lookup(config.cpu)?,
            CalibrationStrategy::Evaluate => self.measure(counter, clock)?,
        };

        let result = CalibrationResult::new(ticks_per_sec, config.unit, config.calibration)?;
        log::info!(
            "CPU frequency ({}): {:.2} MHz, period {:e} {}",
            result.strategy.label(),
            result.mhz(),
            result.period,
            config.unit.suffix(),
        );
        Ok(result)
    }

    fn lookup(&self, cpu: usize) -> Result<u64, Error> {
        if let Some(hz) = self.counter_frequency {
            log::debug!("counter advertises a fixed rate of {} Hz", hz);
            return Ok(hz);
        }
        cpu_stress(self.stress_iterations);

        let contents = fs::read_to_string(&self.cpuinfo_path).map_err(|e| {
            Error::Calibration(format!(
                "unable to read {}: {}",
                self.cpuinfo_path.display(),
                e
            ))
        })?;
        let mhz = parse_cpuinfo_mhz(&contents, cpu)?;
        log::debug!("cpuinfo reports {} MHz for CPU {}", mhz, cpu);

        if !(mhz > 0.0) {
            return Err(Error::Calibration(format!(
                "non-positive frequency {} MHz for CPU {}",
                mhz, cpu
            )));
        }
        Ok((mhz * 1.0e6) as u64)
    }

    fn measure<C: CycleCounter, W: WallClock>(
        &self,
        counter: &mut C,
        clock: &mut W,
    ) -> Result<u64, Error> {
        let ns0 = clock.now_ns();
        let t0 = counter.read();

        cpu_stress(self.stress_iterations);

        let t1 = counter.read();
        let ns1 = clock.now_ns();

        let wall_ns = ns1.saturating_sub(ns0);
        if wall_ns == 0 {
            return Err(Error::Calibration(
                "wall clock did not advance during evaluation".into(),
            ));
        }
        let ticks = tick_delta(t0, t1);
        log::debug!("evaluation: {} ticks in {} ns", ticks, wall_ns);

        let hz = ticks as f64 / wall_ns as f64 * 1.0e9;
        if !(hz >= 1.0) {
            return Err(Error::Calibration(format!(
                "evaluated frequency {} Hz is not usable",
                hz
            )));
        }
        Ok(hz as u64)
    }
}
