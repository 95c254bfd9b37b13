//! Sliding-window statistics with O(1) amortized updates.
//!
//! Every statistic keeps its samples in a [`RingBuffer`] and maintains running
//! accumulators that are updated from the window contents *before* the new
//! sample is physically stored.

pub mod ring_buffer;
pub mod sliding_dispersion;
pub mod sliding_regression;
pub mod sliding_sum;

use serde::Deserialize;

pub use ring_buffer::RingBuffer;
pub use sliding_dispersion::SlidingDispersion;
pub use sliding_regression::SlidingRegression;
pub use sliding_sum::SlidingSum;

/// Shared capability of the sliding statistics.
pub trait SlidingWindowStat {
    /// Adds a sample, returning the number of resident samples.
    fn add(&mut self, v: f64) -> usize;
    fn reset(&mut self);
    fn is_ready(&self) -> bool;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which deviations contribute to a dispersion estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualFilter {
    /// Every residual counts.
    All,
    /// Only residuals below the fitted line (or mean) count.
    #[default]
    Downside,
}

impl ResidualFilter {
    #[inline]
    pub(crate) fn admits(self, residual: f64) -> bool {
        match self {
            ResidualFilter::All => true,
            ResidualFilter::Downside => residual < 0.0,
        }
    }
}

impl std::str::FromStr for ResidualFilter {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" | "both" => Ok(ResidualFilter::All),
            "downside" | "one_sided" => Ok(ResidualFilter::Downside),
            other => Err(format!("unknown residual filter '{}'", other)),
        }
    }
}
