use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::logging::LogArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraceBackend {
    /// Emit samples through the logger at trace level
    Log,
    /// Write samples to the ftrace trace_marker file
    Kernel,
}

#[derive(Debug, Parser)]
#[command(
    name = "npt",
    version,
    about = "Non-preempt test: measure loop latency under real-time scheduling"
)]
pub struct Cli {
    /// Pin the process to this CPU (default: 1)
    #[arg(short = 'a', long)]
    pub affinity: Option<usize>,

    /// Evaluate the CPU speed instead of reading it from /proc/cpuinfo
    #[arg(short = 'e', long = "eval-cpu-speed")]
    pub eval_cpu_speed: bool,

    /// Number of loops to do, warm-up included (default: 10000000)
    #[arg(short = 'l', long)]
    pub loops: Option<u64>,

    /// Loops ignored at the start of the run (default: 5)
    #[arg(long)]
    pub warmup: Option<u64>,

    /// Stop once the measured cycles add up to this duration (time units)
    #[arg(short = 'd', long, conflicts_with = "loops")]
    pub duration: Option<f64>,

    /// Output file for storing the report and histogram
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Do the report and the histogram in nanoseconds
    #[arg(long, conflicts_with = "picoseconds")]
    pub nanoseconds: bool,

    /// Do the report and the histogram in picoseconds
    #[arg(long)]
    pub picoseconds: bool,

    /// SCHED_FIFO priority, 0-99 (default: 99)
    #[arg(short = 'p', long = "prio", value_parser = clap::value_parser!(i32).range(0..=99))]
    pub priority: Option<i32>,

    /// Trace backend receiving accepted samples
    #[arg(short = 't', long, value_enum)]
    pub trace: Option<TraceBackend>,

    /// Length of the non-traced span of the trace window (time units)
    #[arg(long)]
    pub window_wait: Option<f64>,

    /// Length of the traced span of the trace window (time units)
    #[arg(long)]
    pub window_trace: Option<f64>,

    /// Maximum number of traced samples per second (0 = unlimited)
    #[arg(short = 'f', long)]
    pub max_frequency: Option<f64>,

    /// Number of one-unit histogram buckets (default: 1000000)
    #[arg(long)]
    pub histogram_size: Option<usize>,

    /// Mask local interrupts while sampling (x86_64 only)
    #[arg(long)]
    pub disable_interrupts: bool,

    /// Do not lock memory with mlockall
    #[arg(long)]
    pub no_mlock: bool,

    /// Configuration file path (default: /etc/npt.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_options() {
        let cli = Cli::try_parse_from([
            "npt", "-a", "2", "-e", "-l", "5000", "--nanoseconds", "-t", "kernel", "-p", "80",
        ])
        .unwrap();
        assert_eq!(cli.affinity, Some(2));
        assert!(cli.eval_cpu_speed);
        assert_eq!(cli.loops, Some(5000));
        assert!(cli.nanoseconds);
        assert_eq!(cli.trace, Some(TraceBackend::Kernel));
        assert_eq!(cli.priority, Some(80));
    }

    #[test]
    fn test_units_conflict() {
        assert!(Cli::try_parse_from(["npt", "--nanoseconds", "--picoseconds"]).is_err());
    }

    #[test]
    fn test_duration_conflicts_with_loops() {
        assert!(Cli::try_parse_from(["npt", "-d", "1000", "-l", "50"]).is_err());
        let cli = Cli::try_parse_from(["npt", "-d", "1000", "--warmup", "3"]).unwrap();
        assert_eq!(cli.duration, Some(1000.0));
        assert_eq!(cli.loops, None);
    }

    #[test]
    fn test_priority_range() {
        assert!(Cli::try_parse_from(["npt", "-p", "100"]).is_err());
    }

    #[test]
    fn test_unknown_trace_backend() {
        assert!(Cli::try_parse_from(["npt", "--trace", "ust"]).is_err());
    }
}
