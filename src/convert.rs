use serde::Deserialize;

/// Unit every duration, threshold and histogram bucket is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Micro,
    Nano,
    Pico,
}

impl TimeUnit {
    /// Number of units in one second.
    pub fn per_second(self) -> f64 {
        match self {
            TimeUnit::Micro => 1.0e6,
            TimeUnit::Nano => 1.0e9,
            TimeUnit::Pico => 1.0e12,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Micro => "us",
            TimeUnit::Nano => "ns",
            TimeUnit::Pico => "ps",
        }
    }
}

/// Number of ticks elapsed from `previous` to `current`, treating
/// `current < previous` as a single wrap past `u64::MAX`.
#[inline(always)]
pub fn tick_delta(previous: u64, current: u64) -> u64 {
    if current >= previous {
        current - previous
    } else {
        (u64::MAX - previous) + current + 1
    }
}

/// Turns counter pairs into durations using a calibrated period.
#[derive(Debug, Clone, Copy)]
pub struct TimeConverter {
    period: f64,
}

impl TimeConverter {
    /// `period` is the length of one tick in the run's time unit.
    pub fn new(period: f64) -> Self {
        Self { period }
    }

    /// Duration between two readings. Zero while the period is unset.
    #[inline(always)]
    pub fn duration(&self, previous: u64, current: u64) -> f64 {
        if !(self.period > 0.0) {
            return 0.0;
        }
        tick_delta(previous, current) as f64 * self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_second() {
        assert_eq!(TimeUnit::Micro.per_second(), 1.0e6);
        assert_eq!(TimeUnit::Nano.per_second(), 1.0e9);
        assert_eq!(TimeUnit::Pico.per_second(), 1.0e12);
    }

    #[test]
    fn test_suffix() {
        assert_eq!(TimeUnit::default().suffix(), "us");
        assert_eq!(TimeUnit::Nano.suffix(), "ns");
        assert_eq!(TimeUnit::Pico.suffix(), "ps");
    }

    #[test]
    fn test_forward_delta() {
        let conv = TimeConverter::new(0.5);
        assert_eq!(conv.duration(100, 140), 20.0);
        assert_eq!(conv.duration(7, 7), 0.0);
    }

    #[test]
    fn test_wraparound_delta() {
        // MAX - 1 -> MAX -> 0 -> 1 is three ticks
        assert_eq!(tick_delta(u64::MAX - 1, 1), 3);
        let conv = TimeConverter::new(0.001);
        let d = conv.duration(u64::MAX - 1, 1);
        assert!((d - 0.003).abs() < 1e-12, "got {}", d);
    }

    #[test]
    fn test_wrap_from_max_to_zero() {
        assert_eq!(tick_delta(u64::MAX, 0), 1);
    }

    #[test]
    fn test_unset_period_yields_zero() {
        let conv = TimeConverter::new(0.0);
        assert_eq!(conv.duration(0, 1_000_000), 0.0);
        let conv = TimeConverter::new(f64::NAN);
        assert_eq!(conv.duration(0, 1_000_000), 0.0);
    }

    #[test]
    fn test_duration_never_negative() {
        let conv = TimeConverter::new(1.0 / 3.0);
        let points = [0u64, 1, 2, 1 << 32, u64::MAX / 2, u64::MAX - 1, u64::MAX];
        for &a in &points {
            for &b in &points {
                let d = conv.duration(a, b);
                assert!(d >= 0.0, "duration({}, {}) = {}", a, b, d);
            }
        }
    }
}
