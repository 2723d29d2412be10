use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::{ArgAction, Args, ValueEnum};
use log::{Level, LevelFilter, Log, Metadata, Record};

type SyslogLogger = syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>;

const TRACE_TARGET: &str = "npt::trace";

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Log level (default: warn)
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Raise the log level (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Append log messages to a file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Send log messages to syslog
    #[arg(long)]
    pub syslog: bool,
}

impl LogArgs {
    fn level(&self) -> LevelFilter {
        if let Some(level) = self.log_level {
            return level.to_level_filter();
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

struct NptLogger {
    level: LevelFilter,
    /// Let trace-sink records through regardless of `level`.
    trace_samples: bool,
    log_file: Option<Mutex<File>>,
    syslog: Option<Mutex<SyslogLogger>>,
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "error",
        Level::Warn => "warning",
        Level::Info => "info",
        Level::Debug => "debug",
        Level::Trace => "trace",
    }
}

impl Log for NptLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if metadata.target() == TRACE_TARGET {
            return self.trace_samples;
        }
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let prefix = if record.target() == TRACE_TARGET {
            "npt trace"
        } else {
            "npt"
        };

        let msg = format!("[{}] {}: {}", prefix, level_tag(record.level()), record.args());

        // Always write to stderr
        let _ = writeln!(std::io::stderr().lock(), "{}", msg);

        if let Some(ref file) = self.log_file {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{}", msg);
            }
        }

        if let Some(ref logger) = self.syslog {
            if let Ok(mut l) = logger.lock() {
                let text = format!("{}", record.args());
                let _ = match record.level() {
                    Level::Error => l.err(&text),
                    Level::Warn => l.warning(&text),
                    Level::Info => l.info(&text),
                    Level::Debug | Level::Trace => l.debug(&text),
                };
            }
        }
    }

    fn flush(&self) {
        if let Some(ref file) = self.log_file {
            if let Ok(mut f) = file.lock() {
                let _ = f.flush();
            }
        }
    }
}

/// Installs the global logger. `trace_samples` enables the `log` trace backend.
pub fn init(args: &LogArgs, trace_samples: bool) {
    let level = args.level();

    let log_file = args.log_file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
            .map(Mutex::new)
    });

    let syslog = if args.syslog {
        syslog::unix(syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: "npt".into(),
            pid: std::process::id(),
        })
        .ok()
        .map(Mutex::new)
    } else {
        None
    };

    let logger = NptLogger {
        level,
        trace_samples,
        log_file,
        syslog,
    };

    let _ = log::set_boxed_logger(Box::new(logger));
    log::set_max_level(if trace_samples {
        LevelFilter::Trace
    } else {
        level
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(log_level: Option<LogLevel>, verbose: u8) -> LogArgs {
        LogArgs {
            log_level,
            verbose,
            log_file: None,
            syslog: false,
        }
    }

    fn logger(level: LevelFilter, trace_samples: bool) -> NptLogger {
        NptLogger {
            level,
            trace_samples,
            log_file: None,
            syslog: None,
        }
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(args(None, 0).level(), LevelFilter::Warn);
        assert_eq!(args(None, 1).level(), LevelFilter::Info);
        assert_eq!(args(None, 4).level(), LevelFilter::Debug);
        assert_eq!(args(Some(LogLevel::Error), 2).level(), LevelFilter::Error);
    }

    #[test]
    fn test_trace_target_filtering() {
        let sample = Metadata::builder()
            .level(Level::Trace)
            .target(TRACE_TARGET)
            .build();
        let debug = Metadata::builder().level(Level::Debug).target("npt").build();

        let l = logger(LevelFilter::Warn, true);
        assert!(l.enabled(&sample));
        assert!(!l.enabled(&debug));

        let l = logger(LevelFilter::Debug, false);
        assert!(!l.enabled(&sample));
        assert!(l.enabled(&debug));
    }
}
