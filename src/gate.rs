use crate::config::RunConfig;
use crate::convert::TimeUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    Waiting,
    Tracing,
}

/// Alternates between a waiting span and a tracing span, both measured in
/// accumulated sample time. Disabled when both spans are zero.
#[derive(Debug, Clone)]
pub struct WindowPolicy {
    wait: f64,
    trace: f64,
    enabled: bool,
    phase: WindowPhase,
    elapsed: f64,
}

impl WindowPolicy {
    pub fn new(wait: f64, trace: f64) -> Self {
        let enabled = wait > 0.0 || trace > 0.0;
        Self {
            wait,
            trace,
            enabled,
            phase: if enabled {
                WindowPhase::Waiting
            } else {
                WindowPhase::Tracing
            },
            elapsed: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[cfg(test)]
    pub fn phase(&self) -> WindowPhase {
        self.phase
    }

    /// Returns whether the sample falls in a tracing span, then charges its
    /// duration to the current span.
    #[inline]
    pub fn advance(&mut self, duration: f64) -> bool {
        if !self.enabled {
            return true;
        }
        let eligible = self.phase == WindowPhase::Tracing;

        self.elapsed += duration;
        let span = match self.phase {
            WindowPhase::Waiting => self.wait,
            WindowPhase::Tracing => self.trace,
        };
        if self.elapsed >= span {
            self.phase = match self.phase {
                WindowPhase::Waiting => WindowPhase::Tracing,
                WindowPhase::Tracing => WindowPhase::Waiting,
            };
            self.elapsed = 0.0;
        }
        eligible
    }
}

/// Caps the emission rate by requiring a minimum amount of sample time
/// between two accepted emissions.
#[derive(Debug, Clone)]
pub struct FrequencyPolicy {
    min_interval: Option<f64>,
    since_last: f64,
}

impl FrequencyPolicy {
    /// Disabled when `max_frequency` is zero or not below `loops`.
    pub fn new(max_frequency: f64, unit: TimeUnit, loops: u64) -> Self {
        let min_interval = if max_frequency > 0.0 && max_frequency < loops as f64 {
            Some(unit.per_second() / max_frequency)
        } else {
            None
        };
        Self {
            min_interval,
            since_last: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.min_interval.is_some()
    }

    #[inline]
    pub fn advance(&mut self, duration: f64) -> bool {
        match self.min_interval {
            None => true,
            Some(interval) => {
                self.since_last += duration;
                self.since_last > interval
            }
        }
    }

    #[inline]
    fn accepted(&mut self) {
        self.since_last = 0.0;
    }
}

/// Decides which samples reach the trace sink.
#[derive(Debug, Clone)]
pub struct EmissionGate {
    window: WindowPolicy,
    frequency: FrequencyPolicy,
    emitted: u64,
}

impl EmissionGate {
    pub fn new(window: WindowPolicy, frequency: FrequencyPolicy) -> Self {
        Self {
            window,
            frequency,
            emitted: 0,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            WindowPolicy::new(config.window_wait, config.window_trace),
            FrequencyPolicy::new(config.max_frequency, config.unit, config.loops),
        )
    }

    /// True when windowing or throttling can reject samples.
    pub fn is_active(&self) -> bool {
        self.window.is_enabled() || self.frequency.is_enabled()
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    #[inline]
    pub fn should_emit(&mut self, duration: f64) -> bool {
        // both policies advance on every call
        let in_window = self.window.advance(duration);
        let rate_ok = self.frequency.advance(duration);
        if in_window && rate_ok {
            self.frequency.accepted();
            self.emitted += 1;
            true
        } else {
            false
        }
    }
}
