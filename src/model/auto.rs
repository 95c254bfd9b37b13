use log::debug;

use super::{
    log_grid, CandidatePool, EnsembleParams, KalmanParams, ModelError, PriceTransform, Selection,
    SpreadEstimator,
};

#[derive(Debug, Clone, PartialEq)]
pub struct AutoParams {
    pub ensemble: EnsembleParams,
    pub delta_min: f64,
    pub delta_max: f64,
    pub delta_steps: usize,
    pub ve: f64,
}

/// Selects one candidate from a 1-D delta grid.
///
/// The target delta is the tracker-weighted average of the candidate deltas;
/// the published candidate is the first one whose delta is closest to it.
/// `lock` pins publication to one candidate while every candidate keeps
/// being updated and keeps paper-trading underneath.
#[derive(Debug, Clone)]
pub struct KalmanAuto {
    pool: CandidatePool,
    deltas: Vec<f64>,
    selection: Selection,
    selected: Option<usize>,
    target_delta: Option<f64>,
    beta: f64,
    alpha: f64,
    sq: f64,
    valid: bool,
}

impl KalmanAuto {
    pub fn new(params: AutoParams, transform: PriceTransform) -> Self {
        let deltas = log_grid(params.delta_min, params.delta_max, params.delta_steps);
        let lookback = params.ensemble.lookback;
        let ve = params.ve;
        let cells: Vec<KalmanParams> = deltas
            .iter()
            .map(|&delta| KalmanParams {
                delta,
                ve,
                lookback,
            })
            .collect();
        Self {
            pool: CandidatePool::new(params.ensemble, transform, cells),
            deltas,
            selection: Selection::Auto,
            selected: None,
            target_delta: None,
            beta: 0.0,
            alpha: 0.0,
            sq: 0.0,
            valid: false,
        }
    }

    pub fn pool(&self) -> &CandidatePool {
        &self.pool
    }

    pub fn deltas(&self) -> &[f64] {
        &self.deltas
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Weighted target delta from the last scored tick.
    pub fn target_delta(&self) -> Option<f64> {
        self.target_delta
    }

    fn refresh_selection(&mut self) {
        let weights = self.pool.weights();
        let total: f64 = weights.iter().sum();
        if weights.is_empty() || total <= 0.0 {
            self.target_delta = None;
            self.selected = None;
            return;
        }
        let target = weights
            .iter()
            .zip(&self.deltas)
            .map(|(w, d)| w * d)
            .sum::<f64>()
            / total;

        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, d) in self.deltas.iter().enumerate() {
            let dist = (d - target).abs();
            if dist < best_dist {
                best = i;
                best_dist = dist;
            }
        }
        if self.selected != Some(best) {
            debug!(
                "auto selection {:?} -> {} (target delta {:.3e})",
                self.selected, best, target
            );
        }
        self.target_delta = Some(target);
        self.selected = Some(best);
    }

    fn publish(&mut self) {
        let id = match self.selection {
            Selection::LockedTo(id) => Some(id),
            Selection::Auto => self.selected,
        };
        match id.and_then(|id| self.pool.model(id)) {
            Some(m) => {
                self.beta = m.beta();
                self.alpha = m.alpha();
                self.sq = m.sq();
                self.valid = m.is_valid();
            }
            None => self.valid = false,
        }
    }
}

impl SpreadEstimator for KalmanAuto {
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
        self.refresh_selection();
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
        self.selected = None;
        self.target_delta = None;
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
            Selection::Auto => self.selected,
        }
    }

    fn lock(&mut self, id: usize) -> Result<(), ModelError> {
        if id >= self.pool.len() {
            return Err(ModelError::UnknownModel {
                id,
                candidates: self.pool.len(),
            });
        }
        debug!("auto model locked to candidate {} (delta {:.3e})", id, self.deltas[id]);
        self.selection = Selection::LockedTo(id);
        self.publish();
        Ok(())
    }

    fn unlock(&mut self) {
        debug!("auto model unlocked");
        self.selection = Selection::Auto;
        self.refresh_selection();
        self.publish();
    }

    fn is_locked(&self) -> bool {
        matches!(self.selection, Selection::LockedTo(_))
    }
}
