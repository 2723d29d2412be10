mod calibrate;
mod cli;
mod config;
mod convert;
mod counter;
mod error;
mod gate;
mod histogram;
mod logging;
mod report;
mod rt;
mod sampler;
mod sink;
mod stats;

use std::path::Path;
use std::process;

use clap::Parser;

use calibrate::{CalibrationStrategy, Calibrator};
use cli::{Cli, TraceBackend};
use config::Config;
use convert::TimeUnit;
use counter::{MonotonicRaw, Tsc};
use error::Error;
use rt::RtGuard;
use sampler::{CycleSampler, RunReport};
use sink::{LogSink, NullSink, TraceMarkerSink, TraceSink};

/// Build the run configuration by layering: defaults → TOML file → CLI overrides.
fn build_config(config_file: Option<&Path>, cli: &Cli) -> Result<Config, Error> {
    let mut cfg = config::load_config(config_file)?;

    // Apply CLI overrides (only if explicitly set)
    if let Some(v) = cli.affinity {
        cfg.run.cpu = v;
    }
    if cli.eval_cpu_speed {
        cfg.run.calibration = CalibrationStrategy::Evaluate;
    }
    if let Some(v) = cli.loops {
        cfg.run.loops = v;
    }
    if let Some(v) = cli.warmup {
        cfg.run.warmup = v;
    }
    if let Some(v) = cli.duration {
        cfg.run.duration = Some(v);
    }
    if cli.nanoseconds {
        cfg.run.unit = TimeUnit::Nano;
    } else if cli.picoseconds {
        cfg.run.unit = TimeUnit::Pico;
    }
    if let Some(v) = cli.window_wait {
        cfg.run.window_wait = v;
    }
    if let Some(v) = cli.window_trace {
        cfg.run.window_trace = v;
    }
    if let Some(v) = cli.max_frequency {
        cfg.run.max_frequency = v;
    }
    if let Some(v) = cli.histogram_size {
        cfg.run.histogram_size = v;
    }
    if let Some(v) = cli.priority {
        cfg.rt.priority = v;
    }
    if cli.disable_interrupts {
        cfg.rt.disable_interrupts = true;
    }
    if cli.no_mlock {
        cfg.rt.lock_memory = false;
    }

    if cfg.run.loops == 0 {
        return Err(Error::InvalidArgs("loops must be greater than 0".into()));
    }
    let cpus = rt::online_cpus();
    if cfg.run.cpu >= cpus {
        return Err(Error::InvalidArgs(format!(
            "affinity must be a CPU between 0 and {}",
            cpus - 1
        )));
    }

    cfg.run.validate();
    cfg.rt.validate();
    Ok(cfg)
}

/// Enters RT mode, calibrates on the pinned CPU, samples, leaves RT mode.
fn run_sampling<S: TraceSink>(cfg: &Config, sink: &mut S) -> Result<RunReport, Error> {
    let mut counter = Tsc::new()?;
    let guard = RtGuard::enter(cfg.run.cpu, &cfg.rt)?;

    let calibration = Calibrator::default().calibrate(&cfg.run, &mut counter, &mut MonotonicRaw)?;

    let mut sampler = CycleSampler::new(&cfg.run, calibration);
    let sampled = sampler.run(&mut counter, sink);
    let left = guard.leave();
    sampled?;
    left?;

    Ok(sampler.into_report())
}

fn run(cli: &Cli) -> Result<(), Error> {
    let cfg = build_config(cli.config_file.as_deref(), cli)?;
    rt::require_root()?;

    let report = match cli.trace {
        None => run_sampling(&cfg, &mut NullSink)?,
        Some(TraceBackend::Log) => run_sampling(&cfg, &mut LogSink)?,
        Some(TraceBackend::Kernel) => {
            let mut sink = TraceMarkerSink::open_default()?;
            run_sampling(&cfg, &mut sink)?
        }
    };

    log::info!(
        "{} iterations, {} measured, {} traced",
        report.iterations,
        report.measured(),
        report.emitted
    );
    report::write_report(&report, cli.output.as_deref())?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log, cli.trace == Some(TraceBackend::Log));

    if let Err(e) = run(&cli) {
        log::error!("{}", e);
        process::exit(1);
    }
}
