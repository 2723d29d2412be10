use crate::calibrate::CalibrationResult;
use crate::config::RunConfig;
use crate::convert::{tick_delta, TimeConverter, TimeUnit};
use crate::counter::CycleCounter;
use crate::error::Error;
use crate::gate::EmissionGate;
use crate::histogram::Histogram;
use crate::sink::TraceSink;
use crate::stats::{OnlineStatistics, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Warmup,
    Measuring,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Termination {
    Iterations(u64),
    /// Sum of measured durations, in time units.
    Duration(f64),
}

/// Everything the reporter needs once a run completed.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Iteration target (warm-up included) the run was configured with.
    pub loops: u64,
    pub iterations: u64,
    pub warmup: u64,
    /// Measured-time threshold, set when the run was bounded by duration.
    pub duration: Option<f64>,
    /// `None` when no iteration got past warm-up.
    pub statistics: Option<Snapshot>,
    pub histogram: Histogram,
    pub emitted: u64,
    /// Whether windowing or throttling was filtering emissions.
    pub gated: bool,
    pub calibration: CalibrationResult,
    pub unit: TimeUnit,
}

impl RunReport {
    pub fn measured(&self) -> u64 {
        self.statistics.map_or(0, |s| s.count)
    }
}

/// Drives one measurement run: INIT → WARMUP → MEASURING → DONE.
///
/// Everything the loop touches is allocated in `new`, so the iterations
/// themselves never allocate, block or yield.
pub struct CycleSampler<'a> {
    config: &'a RunConfig,
    calibration: CalibrationResult,
    converter: TimeConverter,
    termination: Termination,
    stats: OnlineStatistics,
    histogram: Histogram,
    gate: EmissionGate,
    phase: RunPhase,
    iteration: u64,
}

impl<'a> CycleSampler<'a> {
    pub fn new(config: &'a RunConfig, calibration: CalibrationResult) -> Self {
        let termination = match config.duration {
            Some(d) => Termination::Duration(d),
            None => Termination::Iterations(config.loops),
        };
        Self {
            config,
            calibration,
            converter: TimeConverter::new(calibration.period),
            termination,
            stats: OnlineStatistics::new(),
            histogram: Histogram::new(config.histogram_size),
            gate: EmissionGate::from_config(config),
            phase: RunPhase::Init,
            iteration: 0,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Runs to completion. The sink sees `start`/`stop` even if the run aborts.
    pub fn run<C, S>(&mut self, counter: &mut C, sink: &mut S) -> Result<(), Error>
    where
        C: CycleCounter,
        S: TraceSink,
    {
        log::debug!(
            "sampling: termination={:?} warmup={} histogram={} gate_active={}",
            self.termination,
            self.config.warmup,
            self.histogram.capacity(),
            self.gate.is_active(),
        );

        sink.start();
        let result = self.cycle(counter, sink);
        sink.stop();
        result?;

        log::debug!(
            "sampling finished in {:?}: {} iterations, {} measured, {} bucketed",
            self.phase,
            self.iteration,
            self.stats.count(),
            self.histogram.total(),
        );
        self.phase = RunPhase::Done;
        Ok(())
    }

    /// Hands the final accumulators over to the reporter.
    pub fn into_report(self) -> RunReport {
        RunReport {
            loops: self.config.loops,
            iterations: self.iteration,
            warmup: self.config.warmup,
            duration: self.config.duration,
            statistics: self.stats.snapshot(),
            histogram: self.histogram,
            emitted: self.gate.emitted(),
            gated: self.gate.is_active(),
            calibration: self.calibration,
            unit: self.config.unit,
        }
    }

    fn cycle<C, S>(&mut self, counter: &mut C, sink: &mut S) -> Result<(), Error>
    where
        C: CycleCounter,
        S: TraceSink,
    {
        let warmup = self.config.warmup;
        let mut previous = counter.read();
        self.phase = if warmup > 0 {
            RunPhase::Warmup
        } else {
            RunPhase::Measuring
        };

        loop {
            let current = counter.read();
            let duration = self.converter.duration(previous, current);

            if self.gate.should_emit(duration) {
                sink.emit(self.iteration, tick_delta(previous, current), duration);
            }
            previous = current;
            self.iteration += 1;

            if self.iteration > warmup {
                self.phase = RunPhase::Measuring;
                self.stats.update(duration);
                self.histogram.record(duration)?;
            }

            let done = match self.termination {
                Termination::Iterations(loops) => self.iteration >= loops,
                Termination::Duration(limit) => self.stats.sum() >= limit,
            };
            if done {
                return Ok(());
            }
        }
    }
}
