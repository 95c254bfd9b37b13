use log::debug;

use super::{trade_factor, CandidateScorer, CandidateStep};
use crate::stats::{
    ResidualFilter, SlidingDispersion, SlidingRegression, SlidingSum, SlidingWindowStat,
};

/// Scores candidates by the trend of their cumulative log equity.
///
/// `weight = ln(1 + trades) · slope / (1 + dispersion)`, zero for a
/// non-positive slope, no recent trades, or a last value that undershoots the
/// fitted trend by more than `inhibit_threshold`. With `kill_on_inhibit` an
/// inhibited candidate stays at zero until the next reset.
#[derive(Debug, Clone)]
pub struct OlsPerformance {
    equity: Vec<SlidingRegression>,
    trades: Vec<SlidingSum>,
    cumulative: Vec<f64>,
    killed: Vec<bool>,
    inhibit_threshold: f64,
    kill_on_inhibit: bool,
}

impl OlsPerformance {
    pub fn new(
        candidates: usize,
        window: usize,
        filter: ResidualFilter,
        inhibit_threshold: f64,
        kill_on_inhibit: bool,
    ) -> Self {
        Self {
            equity: (0..candidates)
                .map(|_| SlidingRegression::new(window, window, filter))
                .collect(),
            trades: (0..candidates).map(|_| SlidingSum::new(window)).collect(),
            cumulative: vec![0.0; candidates],
            killed: vec![false; candidates],
            inhibit_threshold,
            kill_on_inhibit,
        }
    }

    pub fn is_killed(&self, id: usize) -> bool {
        self.killed.get(id).copied().unwrap_or(false)
    }

    pub fn cumulative(&self, id: usize) -> f64 {
        self.cumulative.get(id).copied().unwrap_or(0.0)
    }

    fn score(&mut self, id: usize) -> f64 {
        if self.killed[id] {
            return 0.0;
        }
        let reg = &self.equity[id];
        let trades = self.trades[id].sum();
        let slope = reg.slope();
        if slope <= 0.0 || trades <= 0.0 {
            return 0.0;
        }
        let undershoot = reg.fitted_last() - reg.last();
        if undershoot > self.inhibit_threshold {
            if self.kill_on_inhibit {
                debug!(
                    "candidate {} killed: equity {:.6} below trend by {:.6}",
                    id,
                    reg.last(),
                    undershoot
                );
                self.killed[id] = true;
            }
            return 0.0;
        }
        trade_factor(trades) * slope / (1.0 + reg.dispersion())
    }
}

impl CandidateScorer for OlsPerformance {
    fn add(&mut self, steps: &[CandidateStep]) {
        for (i, step) in steps.iter().enumerate().take(self.cumulative.len()) {
            self.cumulative[i] += step.ret.max(f64::MIN_POSITIVE).ln();
            self.equity[i].add(self.cumulative[i]);
            self.trades[i].add(if step.closed { 1.0 } else { 0.0 });
        }
    }

    fn is_ready(&self) -> bool {
        self.equity.first().map_or(false, |r| r.is_ready())
    }

    fn weights(&mut self) -> Vec<f64> {
        (0..self.cumulative.len()).map(|i| self.score(i)).collect()
    }

    fn reset(&mut self) {
        self.equity.iter_mut().for_each(|r| r.reset());
        self.trades.iter_mut().for_each(|t| t.reset());
        self.cumulative.iter_mut().for_each(|c| *c = 0.0);
        self.killed.iter_mut().for_each(|k| *k = false);
    }

    fn candidates(&self) -> usize {
        self.cumulative.len()
    }
}

/// Scores candidates by `ln(1 + trades) · mean / dispersion` of per-step
/// returns.
#[derive(Debug, Clone)]
pub struct SharpePerformance {
    returns: Vec<SlidingDispersion>,
    trades: Vec<SlidingSum>,
}

impl SharpePerformance {
    pub fn new(candidates: usize, window: usize, filter: ResidualFilter) -> Self {
        Self {
            returns: (0..candidates)
                .map(|_| SlidingDispersion::new(window, window, filter))
                .collect(),
            trades: (0..candidates).map(|_| SlidingSum::new(window)).collect(),
        }
    }
}

impl CandidateScorer for SharpePerformance {
    fn add(&mut self, steps: &[CandidateStep]) {
        for (i, step) in steps.iter().enumerate().take(self.returns.len()) {
            self.returns[i].add(step.ret - 1.0);
            self.trades[i].add(if step.closed { 1.0 } else { 0.0 });
        }
    }

    fn is_ready(&self) -> bool {
        self.returns.first().map_or(false, |r| r.is_ready())
    }

    fn weights(&mut self) -> Vec<f64> {
        self.returns
            .iter()
            .zip(&self.trades)
            .map(|(r, t)| {
                let trades = t.sum();
                if r.mean() <= 0.0 || trades <= 0.0 {
                    0.0
                } else {
                    trade_factor(trades) * r.ratio()
                }
            })
            .collect()
    }

    fn reset(&mut self) {
        self.returns.iter_mut().for_each(|r| r.reset());
        self.trades.iter_mut().for_each(|t| t.reset());
    }

    fn candidates(&self) -> usize {
        self.returns.len()
    }
}

/// The performance variant an ensemble runs with.
#[derive(Debug, Clone)]
pub enum PerformanceTracker {
    Ols(OlsPerformance),
    Sharpe(SharpePerformance),
}

impl CandidateScorer for PerformanceTracker {
    fn add(&mut self, steps: &[CandidateStep]) {
        match self {
            PerformanceTracker::Ols(t) => t.add(steps),
            PerformanceTracker::Sharpe(t) => t.add(steps),
        }
    }

    fn is_ready(&self) -> bool {
        match self {
            PerformanceTracker::Ols(t) => t.is_ready(),
            PerformanceTracker::Sharpe(t) => t.is_ready(),
        }
    }

    fn weights(&mut self) -> Vec<f64> {
        match self {
            PerformanceTracker::Ols(t) => t.weights(),
            PerformanceTracker::Sharpe(t) => t.weights(),
        }
    }

    fn reset(&mut self) {
        match self {
            PerformanceTracker::Ols(t) => t.reset(),
            PerformanceTracker::Sharpe(t) => t.reset(),
        }
    }

    fn candidates(&self) -> usize {
        match self {
            PerformanceTracker::Ols(t) => t.candidates(),
            PerformanceTracker::Sharpe(t) => t.candidates(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(ret: f64, closed: bool) -> CandidateStep {
        CandidateStep {
            ret,
            closed,
            in_position: ret != 1.0 || closed,
        }
    }

    #[test]
    fn ols_prefers_steady_winner() {
        let mut t = OlsPerformance::new(3, 10, ResidualFilter::Downside, 0.05, false);
        for i in 0..10 {
            let closed = i % 3 == 2;
            t.add(&[
                step(1.01, closed),
                step(0.99, closed),
                step(1.0, false),
            ]);
        }
        assert!(t.is_ready());
        let w = t.weights();
        assert!(w[0] > 0.0);
        assert_eq!(w[1], 0.0, "losing candidate");
        assert_eq!(w[2], 0.0, "never traded");
    }

    #[test]
    fn ols_not_ready_before_window_fills() {
        let mut t = OlsPerformance::new(1, 5, ResidualFilter::All, 0.05, false);
        for _ in 0..4 {
            t.add(&[step(1.01, true)]);
        }
        assert!(!t.is_ready());
        t.add(&[step(1.01, true)]);
        assert!(t.is_ready());
    }

    #[test]
    fn ols_inhibits_and_optionally_kills_on_drawdown() {
        let run = |kill: bool| {
            let mut t = OlsPerformance::new(1, 8, ResidualFilter::All, 0.05, kill);
            for _ in 0..7 {
                t.add(&[step(1.05, true)]);
            }
            t.add(&[step(0.7, true)]);
            let inhibited = t.weights()[0];
            for _ in 0..8 {
                t.add(&[step(1.05, true)]);
            }
            (inhibited, t.weights()[0], t.is_killed(0))
        };
        let (inhibited, recovered, killed) = run(false);
        assert_eq!(inhibited, 0.0);
        assert!(recovered > 0.0);
        assert!(!killed);

        let (inhibited, recovered, killed) = run(true);
        assert_eq!(inhibited, 0.0);
        assert_eq!(recovered, 0.0);
        assert!(killed);
    }

    #[test]
    fn ols_reset_revives_killed_candidates() {
        let mut t = OlsPerformance::new(1, 8, ResidualFilter::All, 0.05, true);
        for _ in 0..7 {
            t.add(&[step(1.05, true)]);
        }
        t.add(&[step(0.7, true)]);
        t.weights();
        assert!(t.is_killed(0));
        t.reset();
        assert!(!t.is_killed(0));
        assert_eq!(t.cumulative(0), 0.0);
    }

    #[test]
    fn sharpe_scores_positive_mean_with_trades() {
        let mut t = SharpePerformance::new(2, 6, ResidualFilter::All);
        let rets = [1.02, 0.99, 1.03, 1.00, 1.01, 1.02];
        for (i, r) in rets.iter().enumerate() {
            t.add(&[step(*r, i == 2), step(2.0 - *r, i == 2)]);
        }
        assert!(t.is_ready());
        let w = t.weights();
        assert!(w[0] > 0.0);
        assert_eq!(w[1], 0.0);
    }

    #[test]
    fn sharpe_without_trades_is_zero() {
        let mut t = SharpePerformance::new(1, 3, ResidualFilter::All);
        for r in [1.02, 1.01, 1.03] {
            t.add(&[step(r, false)]);
        }
        assert_eq!(t.weights(), vec![0.0]);
    }

    #[test]
    fn enum_dispatch_forwards() {
        let mut t = PerformanceTracker::Sharpe(SharpePerformance::new(4, 2, ResidualFilter::All));
        assert_eq!(t.candidates(), 4);
        t.add(&[CandidateStep::flat(); 4]);
        assert!(!t.is_ready());
        t.add(&[CandidateStep::flat(); 4]);
        assert!(t.is_ready());
        assert_eq!(t.weights(), vec![0.0; 4]);
    }
}
