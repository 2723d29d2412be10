use crate::error::Error;

/// Fixed-capacity latency histogram. Bucket `i` counts durations in
/// `[i, i + 1)`; anything at or beyond capacity lands in `overflow`.
#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: Vec<u64>,
    overflow: u64,
}

impl Histogram {
    /// Allocates every bucket up front; `record` never allocates.
    pub fn new(capacity: usize) -> Self {
        Self {
            buckets: vec![0; capacity],
            overflow: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    #[inline]
    pub fn record(&mut self, duration: f64) -> Result<(), Error> {
        // NaN fails this test too
        if !(duration >= 0.0) {
            return Err(Error::Invariant(format!(
                "duration {} cannot be bucketed",
                duration
            )));
        }
        if duration < self.buckets.len() as f64 {
            self.buckets[duration as usize] += 1;
        } else {
            self.overflow += 1;
        }
        Ok(())
    }

    /// Non-empty buckets as `(index, count)`, ascending by index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(i, &count)| (i, count))
    }

    /// Samples recorded so far, overflow included.
    pub fn total(&self) -> u64 {
        self.buckets.iter().sum::<u64>() + self.overflow
    }
}
