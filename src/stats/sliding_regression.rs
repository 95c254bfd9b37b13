use super::{ResidualFilter, RingBuffer, SlidingWindowStat};

const SINGULAR_EPS: f64 = 1e-12;

/// Simple linear regression `y ≈ a·x + b` over a sliding window, where `x` is
/// the insertion position of each sample.
///
/// The normal equations are kept as a 2×2 matrix and a 2-vector. Each
/// insertion adds the new sample's contribution and, once the cutoff window
/// is full, removes the contribution of the sample falling out. Index values
/// are never renumbered as samples age out.
#[derive(Debug, Clone)]
pub struct SlidingRegression {
    buf: RingBuffer,
    cutoff: usize,
    unstable: usize,
    filter: ResidualFilter,
    a: [[f64; 2]; 2],
    b: [f64; 2],
    slope: f64,
    intercept: f64,
    dispersion: f64,
}

impl SlidingRegression {
    /// `cutoff` is the window length, `unstable` the number of samples needed
    /// before coefficients are solved (clamped into `2..=cutoff`).
    pub fn new(cutoff: usize, unstable: usize, filter: ResidualFilter) -> Self {
        let cutoff = cutoff.max(2);
        Self {
            buf: RingBuffer::new(cutoff),
            cutoff,
            unstable: unstable.clamp(2, cutoff),
            filter,
            a: [[0.0; 2]; 2],
            b: [0.0; 2],
            slope: 0.0,
            intercept: 0.0,
            dispersion: 0.0,
        }
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Population dispersion of residuals over the current window.
    pub fn dispersion(&self) -> f64 {
        self.dispersion
    }

    pub fn last(&self) -> f64 {
        self.buf.last()
    }

    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    /// Fitted value at the index of the most recent sample.
    pub fn fitted_last(&self) -> f64 {
        self.slope * self.buf.position_ago(0) as f64 + self.intercept
    }

    /// Extrapolates the line to the next insertion index, `0.0` until ready.
    pub fn predict_next(&self) -> f64 {
        if !self.is_ready() {
            return 0.0;
        }
        self.slope * self.buf.position() as f64 + self.intercept
    }

    pub fn raw_sum(&self) -> f64 {
        self.buf.raw_sum()
    }

    fn accumulate(&mut self, x: f64, y: f64, sign: f64) {
        self.a[0][0] += sign * x * x;
        self.a[0][1] += sign * x;
        self.a[1][0] += sign * x;
        self.a[1][1] += sign;
        self.b[0] += sign * x * y;
        self.b[1] += sign * y;
    }

    /// Gaussian elimination with partial pivoting on a copy of the system.
    fn solve(&self) -> Option<(f64, f64)> {
        let mut m = self.a;
        let mut r = self.b;
        if m[1][0].abs() > m[0][0].abs() {
            m.swap(0, 1);
            r.swap(0, 1);
        }
        if m[0][0].abs() < SINGULAR_EPS {
            return None;
        }
        let f = m[1][0] / m[0][0];
        m[1][1] -= f * m[0][1];
        r[1] -= f * r[0];
        if m[1][1].abs() < SINGULAR_EPS {
            return None;
        }
        let b = r[1] / m[1][1];
        let a = (r[0] - m[0][1] * b) / m[0][0];
        Some((a, b))
    }
}

impl SlidingWindowStat for SlidingRegression {
    fn add(&mut self, v: f64) -> usize {
        let x = self.buf.position() as f64;
        let effective = (self.buf.len() + 1).min(self.cutoff);
        self.accumulate(x, v, 1.0);
        if effective < self.unstable {
            return self.buf.add(v);
        }

        if self.buf.len() >= self.cutoff {
            let age = self.cutoff - 1;
            let old_x = self.buf.position_ago(age) as f64;
            let old_y = self.buf.ago(age);
            self.accumulate(old_x, old_y, -1.0);
        }

        if let Some((a, b)) = self.solve() {
            self.slope = a;
            self.intercept = b;
        }

        let mut sum_sq = 0.0;
        for age in 0..effective - 1 {
            let xi = self.buf.position_ago(age) as f64;
            let res = self.buf.ago(age) - (self.slope * xi + self.intercept);
            if self.filter.admits(res) {
                sum_sq += res * res;
            }
        }
        let res = v - (self.slope * x + self.intercept);
        if self.filter.admits(res) {
            sum_sq += res * res;
        }
        self.dispersion = (sum_sq / effective as f64).sqrt();

        self.buf.add(v)
    }

    fn reset(&mut self) {
        self.buf.reset();
        self.a = [[0.0; 2]; 2];
        self.b = [0.0; 2];
        self.slope = 0.0;
        self.intercept = 0.0;
        self.dispersion = 0.0;
    }

    fn is_ready(&self) -> bool {
        self.buf.len() >= self.unstable
    }

    fn len(&self) -> usize {
        self.buf.len()
    }
}
