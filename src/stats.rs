/// Closed-form view of an `OnlineStatistics` accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
    /// Population variance (M2 / count).
    pub variance: f64,
    pub std_dev: f64,
}

/// Single-pass mean/variance/min/max/sum accumulator (Welford).
#[derive(Debug, Clone)]
pub struct OnlineStatistics {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    mean: f64,
    m2: f64,
}

impl Default for OnlineStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl OnlineStatistics {
    pub fn new() -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    #[inline]
    pub fn update(&mut self, duration: f64) {
        self.count += 1;
        if duration < self.min {
            self.min = duration;
        }
        if duration > self.max {
            self.max = duration;
        }
        self.sum += duration;

        let delta = duration - self.mean;
        self.mean += delta / self.count as f64;
        // second factor uses the updated mean
        self.m2 += delta * (duration - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// `None` until at least one sample was recorded.
    pub fn snapshot(&self) -> Option<Snapshot> {
        if self.count == 0 {
            return None;
        }
        let variance = self.m2 / self.count as f64;
        Some(Snapshot {
            count: self.count,
            min: self.min,
            max: self.max,
            sum: self.sum,
            mean: self.mean,
            variance,
            std_dev: variance.sqrt(),
        })
    }
}
