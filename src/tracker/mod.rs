//! Per-candidate scoring used to select or blend grid candidates.

pub mod performance;
pub mod usage;

use serde::Deserialize;

pub use performance::{OlsPerformance, PerformanceTracker, SharpePerformance};
pub use usage::UsageTracker;

/// What one candidate's virtual trading did during one ensemble tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateStep {
    /// Step return multiplier, `1.0` when flat.
    pub ret: f64,
    /// The candidate's virtual position closed on this step.
    pub closed: bool,
    /// The candidate held an open virtual position on this step.
    pub in_position: bool,
}

impl CandidateStep {
    pub fn flat() -> Self {
        Self {
            ret: 1.0,
            closed: false,
            in_position: false,
        }
    }
}

/// Shared contract of the trackers: one sample per candidate per tick, one
/// weight per candidate out.
pub trait CandidateScorer {
    fn add(&mut self, steps: &[CandidateStep]);
    fn is_ready(&self) -> bool;
    fn weights(&mut self) -> Vec<f64>;
    fn reset(&mut self);
    fn candidates(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    /// Usage weighting alone.
    #[default]
    Usage,
    /// Usage weighting combined with OLS equity-trend performance.
    Ols,
    /// Usage weighting combined with Sharpe-style performance.
    Sharpe,
}

impl std::str::FromStr for TrackerKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usage" => Ok(TrackerKind::Usage),
            "ols" => Ok(TrackerKind::Ols),
            "sharpe" => Ok(TrackerKind::Sharpe),
            other => Err(format!("unknown tracker kind '{}'", other)),
        }
    }
}

/// Number of trades weighting shared by both performance variants.
#[inline]
pub(crate) fn trade_factor(trades: f64) -> f64 {
    (1.0 + trades).ln()
}
