//! Recursive estimate of the hedge relation `p2 ≈ beta·p1 + alpha`.
//!
//! State is `(beta, alpha)` with a 2×2 covariance. Each update:
//!
//! ```text
//! R = P + Vw,            Vw = I·delta/(1 − delta)
//! e = y − (beta·x + alpha)
//! q = h·R·hᵀ + Ve,       h = [x, 1]
//! K = R·hᵀ / q
//! θ ← θ + K·e,           P = R − K·h·R
//! ```
//!
//! The coefficients that produced `e` and `q` are published until the next
//! update, so a z-score evaluated after fitting uses the same coefficients
//! as the innovation variance it is scaled by.

use super::{ModelError, PriceTransform, SpreadEstimator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanParams {
    /// Process-noise rate in `(0, 1)`.
    pub delta: f64,
    /// Observation noise variance.
    pub ve: f64,
    /// Updates before the filter reports ready.
    pub lookback: usize,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            delta: 1e-4,
            ve: 1e-3,
            lookback: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KalmanModel {
    params: KalmanParams,
    transform: PriceTransform,
    vw: f64,
    theta: [f64; 2],
    cov: [[f64; 2]; 2],
    beta: f64,
    alpha: f64,
    sq: f64,
    updates: usize,
}

impl KalmanModel {
    pub fn new(params: KalmanParams, transform: PriceTransform) -> Self {
        let delta = params.delta.clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
        Self {
            params,
            transform,
            vw: delta / (1.0 - delta),
            theta: [0.0; 2],
            cov: [[0.0; 2]; 2],
            beta: 0.0,
            alpha: 0.0,
            sq: 0.0,
            updates: 0,
        }
    }

    pub fn params(&self) -> &KalmanParams {
        &self.params
    }

    pub fn delta(&self) -> f64 {
        self.params.delta
    }

    /// Posterior `(beta, alpha)` after the last update.
    pub fn posterior(&self) -> (f64, f64) {
        (self.theta[0], self.theta[1])
    }

    pub fn updates(&self) -> usize {
        self.updates
    }

    /// One filter step on already-transformed prices.
    pub(crate) fn step(&mut self, x: f64, y: f64) -> bool {
        let mut r = self.cov;
        r[0][0] += self.vw;
        r[1][1] += self.vw;

        let e = y - (self.theta[0] * x + self.theta[1]);
        let rh = [r[0][0] * x + r[0][1], r[1][0] * x + r[1][1]];
        let q = x * rh[0] + rh[1] + self.params.ve;
        let k = [rh[0] / q, rh[1] / q];

        self.beta = self.theta[0];
        self.alpha = self.theta[1];
        self.sq = q.sqrt();

        self.theta[0] += k[0] * e;
        self.theta[1] += k[1] * e;

        let hr = [x * r[0][0] + r[1][0], x * r[0][1] + r[1][1]];
        for (i, ki) in k.iter().enumerate() {
            for (j, hrj) in hr.iter().enumerate() {
                self.cov[i][j] = r[i][j] - ki * hrj;
            }
        }

        self.updates += 1;
        self.is_ready()
    }
}

impl SpreadEstimator for KalmanModel {
    fn lookback(&self) -> usize {
        self.params.lookback
    }

    fn is_valid(&self) -> bool {
        self.is_ready() && self.sq.is_finite() && self.sq > 0.0
    }

    fn is_ready(&self) -> bool {
        self.updates >= self.params.lookback
    }

    fn update(&mut self, price1: f64, price2: f64) -> bool {
        let (x, y) = self.transform.apply(price1, price2);
        self.step(x, y)
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
        self.transform
    }

    fn reset(&mut self) {
        *self = KalmanModel::new(self.params, self.transform);
    }

    fn candidates(&self) -> usize {
        1
    }

    fn model_id_used(&self) -> Option<usize> {
        Some(0)
    }

    fn lock(&mut self, id: usize) -> Result<(), ModelError> {
        if id == 0 {
            Ok(())
        } else {
            Err(ModelError::UnknownModel { id, candidates: 1 })
        }
    }

    fn unlock(&mut self) {}

    fn is_locked(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(lookback: usize) -> KalmanParams {
        KalmanParams {
            delta: 1e-4,
            ve: 1e-3,
            lookback,
        }
    }

    #[test]
    fn first_step_publishes_zero_coefficients() {
        let mut k = KalmanModel::new(params(1), PriceTransform::None);
        assert!(k.update(10.0, 20.0));
        assert_eq!(k.beta(), 0.0);
        assert_eq!(k.alpha(), 0.0);
        let vw: f64 = 1e-4 / (1.0 - 1e-4);
        let q = 100.0 * vw + vw + 1e-3;
        assert!((k.sq() - q.sqrt()).abs() < 1e-15);
        // z-score uses the pre-update coefficients: (0 − 20) / sq
        assert!((k.evaluate(10.0, 20.0) + 20.0 / q.sqrt()).abs() < 1e-9);
        let (b, a) = k.posterior();
        assert!(b > 0.0 && a > 0.0);
    }

    #[test]
    fn converges_to_linear_relation() {
        let mut k = KalmanModel::new(params(20), PriceTransform::None);
        // x swings through zero so the intercept is identified
        for i in 0..2000 {
            let x = 10.0 * (i as f64 * 0.05).sin();
            k.update(x, 1.5 * x + 3.0);
        }
        assert!((k.beta() - 1.5).abs() < 1e-6, "beta {}", k.beta());
        assert!((k.alpha() - 3.0).abs() < 1e-6, "alpha {}", k.alpha());
        assert!(k.evaluate(6.0, 12.0).abs() < 1e-3);
    }

    #[test]
    fn ready_and_valid_after_lookback() {
        let mut k = KalmanModel::new(params(3), PriceTransform::None);
        assert!(!k.update(1.0, 2.0));
        assert!(!k.update(1.1, 2.1));
        assert_eq!(k.evaluate(1.0, 2.0), 0.0);
        assert!(k.update(1.2, 2.2));
        assert!(k.is_valid());
        assert_eq!(k.updates(), 3);
    }

    #[test]
    fn transform_feeds_inverted_leg() {
        let t = PriceTransform::InvertLeg2 { a: 100.0, b: 0.0 };
        let mut direct = KalmanModel::new(params(1), PriceTransform::None);
        let mut inverted = KalmanModel::new(params(1), t);
        for i in 1..50 {
            let p1 = 10.0 + i as f64 * 0.1;
            let p2 = 100.0 / (2.0 * p1);
            direct.update(p1, 100.0 / p2);
            inverted.update(p1, p2);
        }
        assert!((direct.beta() - inverted.beta()).abs() < 1e-12);
        assert!((direct.sq() - inverted.sq()).abs() < 1e-12);
    }

    #[test]
    fn reset_is_complete() {
        let mut k = KalmanModel::new(params(2), PriceTransform::None);
        let fed = |k: &mut KalmanModel| {
            for i in 0..30 {
                k.update(10.0 + i as f64, 20.0 + 2.0 * i as f64);
            }
            (k.beta(), k.alpha(), k.sq())
        };
        let first = fed(&mut k);
        k.reset();
        assert_eq!(k.updates(), 0);
        let second = fed(&mut k);
        assert_eq!(first, second);
    }

    #[test]
    fn only_candidate_zero_can_be_locked() {
        let mut k = KalmanModel::new(params(1), PriceTransform::None);
        assert!(k.lock(0).is_ok());
        assert_eq!(
            k.lock(2),
            Err(ModelError::UnknownModel {
                id: 2,
                candidates: 1
            })
        );
    }
}
