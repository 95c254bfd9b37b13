use super::{CandidateScorer, CandidateStep};
use crate::stats::{SlidingSum, SlidingWindowStat};

/// Weights candidates by how close their recent usage is to a target.
///
/// Usage is the share of the window, in percent, during which the candidate
/// held an open virtual position. The weight is a Gaussian bump around
/// `target_pct`, so both over- and under-trading are penalized.
#[derive(Debug, Clone)]
pub struct UsageTracker {
    in_position: Vec<SlidingSum>,
    target_pct: f64,
    width_pct: f64,
}

impl UsageTracker {
    pub fn new(candidates: usize, window: usize, target_pct: f64, width_pct: f64) -> Self {
        Self {
            in_position: (0..candidates).map(|_| SlidingSum::new(window)).collect(),
            target_pct,
            width_pct: width_pct.max(f64::EPSILON),
        }
    }

    pub fn usage_pct(&self, id: usize) -> f64 {
        let Some(cell) = self.in_position.get(id) else {
            return 0.0;
        };
        let n = cell.effective_len();
        if n == 0 {
            return 0.0;
        }
        100.0 * cell.sum() / n as f64
    }

    pub fn weight_for_usage(&self, usage_pct: f64) -> f64 {
        let z = (usage_pct - self.target_pct) / self.width_pct;
        (-0.5 * z * z).exp()
    }
}

impl CandidateScorer for UsageTracker {
    fn add(&mut self, steps: &[CandidateStep]) {
        for (cell, step) in self.in_position.iter_mut().zip(steps) {
            cell.add(if step.in_position { 1.0 } else { 0.0 });
        }
    }

    fn is_ready(&self) -> bool {
        self.in_position.first().map_or(false, |c| c.is_ready())
    }

    fn weights(&mut self) -> Vec<f64> {
        (0..self.in_position.len())
            .map(|i| self.weight_for_usage(self.usage_pct(i)))
            .collect()
    }

    fn reset(&mut self) {
        self.in_position.iter_mut().for_each(|c| c.reset());
    }

    fn candidates(&self) -> usize {
        self.in_position.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(in_position: bool) -> CandidateStep {
        CandidateStep {
            in_position,
            ..CandidateStep::flat()
        }
    }

    #[test]
    fn usage_is_share_of_window_in_position() {
        let mut t = UsageTracker::new(2, 4, 50.0, 10.0);
        for i in 0..4 {
            t.add(&[held(i % 2 == 0), held(true)]);
        }
        assert!(t.is_ready());
        assert!((t.usage_pct(0) - 50.0).abs() < 1e-12);
        assert!((t.usage_pct(1) - 100.0).abs() < 1e-12);
    }

    #[test]
    fn weight_peaks_at_target_and_penalizes_both_sides() {
        let mut t = UsageTracker::new(3, 4, 50.0, 25.0);
        for i in 0..4 {
            t.add(&[held(i < 2), held(false), held(true)]);
        }
        let w = t.weights();
        assert!((w[0] - 1.0).abs() < 1e-12);
        assert!(w[1] < w[0]);
        // 0% and 100% are equally far from a 50% target
        assert!((w[1] - w[2]).abs() < 1e-12);
        assert!((w[1] - (-2.0_f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn partial_window_uses_effective_length() {
        let mut t = UsageTracker::new(1, 10, 30.0, 10.0);
        t.add(&[held(true)]);
        t.add(&[held(false)]);
        assert!(!t.is_ready());
        assert!((t.usage_pct(0) - 50.0).abs() < 1e-12);
    }
}
