use log::debug;

use super::{
    log_grid, CandidatePool, EnsembleParams, KalmanParams, ModelError, PriceTransform, Selection,
    SpreadEstimator,
};

#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    pub ensemble: EnsembleParams,
    pub delta_min: f64,
    pub delta_max: f64,
    pub delta_steps: usize,
    pub ve_min: f64,
    pub ve_max: f64,
    pub ve_steps: usize,
}

/// Blends a `(delta, Ve)` grid of Kalman candidates by tracker weight.
///
/// Candidate `i_delta · ve_steps + i_ve` holds the `i_delta`-th delta and the
/// `i_ve`-th observation noise.
#[derive(Debug, Clone)]
pub struct KalmanGrid {
    pool: CandidatePool,
    selection: Selection,
    beta: f64,
    alpha: f64,
    sq: f64,
    valid: bool,
}

impl KalmanGrid {
    pub fn new(params: GridParams, transform: PriceTransform) -> Self {
        let deltas = log_grid(params.delta_min, params.delta_max, params.delta_steps);
        let ves = log_grid(params.ve_min, params.ve_max, params.ve_steps);
        let lookback = params.ensemble.lookback;
        let cells = deltas.iter().flat_map(|&delta| {
            ves.iter().map(move |&ve| KalmanParams {
                delta,
                ve,
                lookback,
            })
        });
        Self {
            pool: CandidatePool::new(params.ensemble, transform, cells),
            selection: Selection::Auto,
            beta: 0.0,
            alpha: 0.0,
            sq: 0.0,
            valid: false,
        }
    }

    pub fn pool(&self) -> &CandidatePool {
        &self.pool
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    fn publish(&mut self) {
        if let Selection::LockedTo(id) = self.selection {
            if let Some(m) = self.pool.model(id) {
                self.beta = m.beta();
                self.alpha = m.alpha();
                self.sq = m.sq();
                self.valid = m.is_valid();
            }
            return;
        }

        let weights = self.pool.weights();
        let total: f64 = weights.iter().sum();
        if weights.is_empty() || total <= 0.0 {
            self.valid = false;
            return;
        }
        let (mut beta, mut alpha, mut sq) = (0.0, 0.0, 0.0);
        for (w, m) in weights.iter().zip(self.pool.models()) {
            if *w > 0.0 {
                beta += w * m.beta();
                alpha += w * m.alpha();
                sq += w * m.sq();
            }
        }
        self.beta = beta / total;
        self.alpha = alpha / total;
        self.sq = sq / total;
        self.valid = true;
    }

    /// Candidate carrying the largest weight, first one on ties.
    fn dominant(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, w) in self.pool.weights().iter().enumerate() {
            if *w > 0.0 && best.map_or(true, |(_, bw)| *w > bw) {
                best = Some((i, *w));
            }
        }
        best.map(|(i, _)| i)
    }
}

impl SpreadEstimator for KalmanGrid {
    fn lookback(&self) -> usize {
        self.pool.lookback()
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn is_ready(&self) -> bool {
        self.pool.is_ready()
    }

    fn update(&mut self, price1: f64, price2: f64) -> bool {
        self.pool.tick(price1, price2);
        self.publish();
        self.is_ready()
    }

    fn beta(&self) -> f64 {
        self.beta
    }

    fn alpha(&self) -> f64 {
        self.alpha
    }

    fn sq(&self) -> f64 {
        self.sq
    }

    fn transform(&self) -> PriceTransform {
        self.pool.transform()
    }

    fn reset(&mut self) {
        self.pool.reset();
        self.selection = Selection::Auto;
        self.beta = 0.0;
        self.alpha = 0.0;
        self.sq = 0.0;
        self.valid = false;
    }

    fn candidates(&self) -> usize {
        self.pool.len()
    }

    fn model_id_used(&self) -> Option<usize> {
        match self.selection {
            Selection::LockedTo(id) => Some(id),
            Selection::Auto => self.dominant(),
        }
    }

    fn lock(&mut self, id: usize) -> Result<(), ModelError> {
        if id >= self.pool.len() {
            return Err(ModelError::UnknownModel {
                id,
                candidates: self.pool.len(),
            });
        }
        debug!("grid locked to candidate {}", id);
        self.selection = Selection::LockedTo(id);
        self.publish();
        Ok(())
    }

    fn unlock(&mut self) {
        debug!("grid unlocked");
        self.selection = Selection::Auto;
        self.publish();
    }

    fn is_locked(&self) -> bool {
        matches!(self.selection, Selection::LockedTo(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackerKind;

    fn params(kind: TrackerKind) -> GridParams {
        GridParams {
            ensemble: EnsembleParams {
                lookback: 5,
                tracking_window: 12,
                entry_threshold: 0.8,
                tracker_kind: kind,
                ..EnsembleParams::default()
            },
            delta_min: 1e-5,
            delta_max: 1e-2,
            delta_steps: 3,
            ve_min: 1e-3,
            ve_max: 1e-1,
            ve_steps: 2,
        }
    }

    fn prices(i: usize) -> (f64, f64) {
        let t = i as f64;
        let p1 = 30.0 + 0.1 * t + 2.0 * (t * 0.4).sin();
        let p2 = 5.0 + 0.8 * p1 + 0.6 * (t * 0.9).sin();
        (p1, p2)
    }

    #[test]
    fn grid_has_one_candidate_per_cell() {
        let g = KalmanGrid::new(params(TrackerKind::Usage), PriceTransform::None);
        assert_eq!(g.candidates(), 6);
        let first = g.pool().model(0).unwrap().params();
        let last = g.pool().model(5).unwrap().params();
        assert!((first.delta - 1e-5).abs() < 1e-15);
        assert!((first.ve - 1e-3).abs() < 1e-15);
        assert!((last.delta - 1e-2).abs() < 1e-12);
        assert!((last.ve - 1e-1).abs() < 1e-12);
    }

    #[test]
    fn readiness_never_regresses() {
        let mut g = KalmanGrid::new(params(TrackerKind::Ols), PriceTransform::None);
        let mut seen_ready = false;
        for i in 0..120 {
            let (p1, p2) = prices(i);
            let ready = g.update(p1, p2);
            assert_eq!(ready, g.is_ready());
            if seen_ready {
                assert!(ready, "readiness regressed at tick {}", i);
            }
            seen_ready |= ready;
        }
        assert!(seen_ready);
        assert_eq!(g.lookback(), 5 + 12 - 1);
    }

    #[test]
    fn usage_blend_is_weighted_average_of_candidates() {
        let mut g = KalmanGrid::new(params(TrackerKind::Usage), PriceTransform::None);
        for i in 0..60 {
            let (p1, p2) = prices(i);
            g.update(p1, p2);
        }
        assert!(g.is_valid());
        let betas: Vec<f64> = g.pool().models().map(|m| m.beta()).collect();
        let lo = betas.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = betas.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(g.beta() >= lo - 1e-12 && g.beta() <= hi + 1e-12);

        let w = g.pool().weights();
        let total: f64 = w.iter().sum();
        let expected: f64 = w.iter().zip(&betas).map(|(w, b)| w * b).sum::<f64>() / total;
        assert!((g.beta() - expected).abs() < 1e-12);
    }

    #[test]
    fn lock_pins_published_coefficients() {
        let mut g = KalmanGrid::new(params(TrackerKind::Sharpe), PriceTransform::None);
        for i in 0..40 {
            let (p1, p2) = prices(i);
            g.update(p1, p2);
        }
        g.lock(4).unwrap();
        for i in 40..60 {
            let (p1, p2) = prices(i);
            g.update(p1, p2);
            let m = g.pool().model(4).unwrap();
            assert_eq!(g.beta(), m.beta());
            assert_eq!(g.sq(), m.sq());
            assert_eq!(g.model_id_used(), Some(4));
        }
        assert!(g.lock(6).is_err());
        g.unlock();
        assert!(!g.is_locked());
    }

    #[test]
    fn invalid_before_trackers_are_ready() {
        let mut g = KalmanGrid::new(params(TrackerKind::Usage), PriceTransform::None);
        for i in 0..10 {
            let (p1, p2) = prices(i);
            g.update(p1, p2);
        }
        assert!(!g.is_valid());
        assert_eq!(g.evaluate(30.0, 29.0), 0.0);
        assert_eq!(g.model_id_used(), None);
    }

    #[test]
    fn ready_but_invalid_when_no_candidate_ever_trades() {
        for kind in [TrackerKind::Ols, TrackerKind::Sharpe] {
            let mut g = KalmanGrid::new(
                GridParams {
                    ensemble: EnsembleParams {
                        entry_threshold: 50.0,
                        ..params(kind).ensemble
                    },
                    ..params(kind)
                },
                PriceTransform::None,
            );
            for i in 0..40 {
                let (p1, p2) = prices(i);
                g.update(p1, p2);
            }
            assert!(g.is_ready(), "{:?}", kind);
            assert!(!g.is_valid(), "{:?}", kind);
            assert!(g.pool().weights().iter().all(|w| *w == 0.0));
            let (p1, p2) = prices(40);
            assert_eq!(g.evaluate(p1, p2), 0.0);
            assert_eq!(g.model_id_used(), None);
        }
    }
}
