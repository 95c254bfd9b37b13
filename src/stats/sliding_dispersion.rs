use super::{ResidualFilter, RingBuffer, SlidingWindowStat};

/// Sliding mean and (optionally one-sided) dispersion around it.
///
/// Used as a Sharpe-style performance cell: `mean / dispersion` of per-step
/// returns over the window.
#[derive(Debug, Clone)]
pub struct SlidingDispersion {
    buf: RingBuffer,
    cutoff: usize,
    unstable: usize,
    filter: ResidualFilter,
    sum: f64,
    mean: f64,
    dispersion: f64,
}

impl SlidingDispersion {
    pub fn new(cutoff: usize, unstable: usize, filter: ResidualFilter) -> Self {
        let cutoff = cutoff.max(1);
        Self {
            buf: RingBuffer::new(cutoff),
            cutoff,
            unstable: unstable.clamp(1, cutoff),
            filter,
            sum: 0.0,
            mean: 0.0,
            dispersion: 0.0,
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn dispersion(&self) -> f64 {
        self.dispersion
    }

    pub fn last(&self) -> f64 {
        self.buf.last()
    }

    /// `mean / dispersion`, zero when the dispersion vanishes.
    pub fn ratio(&self) -> f64 {
        if self.dispersion <= f64::EPSILON {
            0.0
        } else {
            self.mean / self.dispersion
        }
    }
}

impl SlidingWindowStat for SlidingDispersion {
    fn add(&mut self, v: f64) -> usize {
        let effective = (self.buf.len() + 1).min(self.cutoff);
        self.sum += v;
        if effective < self.unstable {
            return self.buf.add(v);
        }
        if self.buf.len() >= self.cutoff {
            self.sum -= self.buf.ago(self.cutoff - 1);
        }
        self.mean = self.sum / effective as f64;

        let mut sum_sq = 0.0;
        for age in 0..effective - 1 {
            let dev = self.buf.ago(age) - self.mean;
            if self.filter.admits(dev) {
                sum_sq += dev * dev;
            }
        }
        let dev = v - self.mean;
        if self.filter.admits(dev) {
            sum_sq += dev * dev;
        }
        self.dispersion = (sum_sq / effective as f64).sqrt();

        self.buf.add(v)
    }

    fn reset(&mut self) {
        self.buf.reset();
        self.sum = 0.0;
        self.mean = 0.0;
        self.dispersion = 0.0;
    }

    fn is_ready(&self) -> bool {
        self.buf.len() >= self.unstable
    }

    fn len(&self) -> usize {
        self.buf.len()
    }
}
