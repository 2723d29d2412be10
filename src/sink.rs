use std::fs::{File, OpenOptions};
use std::io::{Cursor, Write};
use std::path::Path;

use crate::error::Error;

const TRACE_MARKER_PATHS: [&str; 2] = [
    "/sys/kernel/tracing/trace_marker",
    "/sys/kernel/debug/tracing/trace_marker",
];

/// Receiver of accepted samples. Emission is fire-and-forget: a sink must
/// not fail the run and should not allocate in `emit`.
pub trait TraceSink {
    fn start(&mut self) {}

    fn emit(&mut self, iteration: u64, ticks: u64, duration: f64);

    fn stop(&mut self) {}
}

impl<F: FnMut(u64, u64, f64)> TraceSink for F {
    fn emit(&mut self, iteration: u64, ticks: u64, duration: f64) {
        self(iteration, ticks, duration)
    }
}

/// Drops every sample.
#[derive(Debug, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    #[inline(always)]
    fn emit(&mut self, _iteration: u64, _ticks: u64, _duration: f64) {}
}

/// Forwards samples to the `log` facade at trace level.
#[derive(Debug, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn start(&mut self) {
        log::trace!(target: "npt::trace", "start");
    }

    fn emit(&mut self, iteration: u64, ticks: u64, duration: f64) {
        log::trace!(
            target: "npt::trace",
            "loop countloop={} ticks={} duration={:.6}",
            iteration, ticks, duration,
        );
    }

    fn stop(&mut self) {
        log::trace!(target: "npt::trace", "stop");
    }
}

/// Writes one line per event to the ftrace `trace_marker` file so samples
/// show up interleaved with kernel events.
#[derive(Debug)]
pub struct TraceMarkerSink {
    file: File,
    buf: [u8; 128],
}

impl TraceMarkerSink {
    /// Opens the first tracefs mount point that accepts writes.
    pub fn open_default() -> Result<Self, Error> {
        let mut last_err = None;
        for path in TRACE_MARKER_PATHS {
            match Self::open(Path::new(path)) {
                Ok(sink) => return Ok(sink),
                Err(e) => {
                    log::debug!("{} unavailable: {}", path, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::InvalidArgs("no trace_marker file found".into())))
    }

    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new().write(true).open(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("cannot open {} for writing: {}", path.display(), e),
            ))
        })?;
        Ok(Self {
            file,
            buf: [0u8; 128],
        })
    }

    fn mark(&mut self, args: std::fmt::Arguments<'_>) {
        let len = {
            let mut cursor = Cursor::new(&mut self.buf[..]);
            if cursor.write_fmt(args).is_err() {
                return;
            }
            cursor.position() as usize
        };
        let _ = self.file.write(&self.buf[..len]);
    }
}

impl TraceSink for TraceMarkerSink {
    fn start(&mut self) {
        self.mark(format_args!("npt:start\n"));
    }

    fn emit(&mut self, iteration: u64, ticks: u64, duration: f64) {
        self.mark(format_args!(
            "npt:loop countloop={} ticks={} duration={:.6}\n",
            iteration, ticks, duration
        ));
    }

    fn stop(&mut self) {
        self.mark(format_args!("npt:stop\n"));
    }
}
