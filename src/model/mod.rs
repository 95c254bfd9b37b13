//! Spread estimators: a single Kalman filter and two ensembles built from a
//! grid of them.

pub mod auto;
pub mod grid;
pub mod kalman;
pub mod pool;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::position::InversionMode;

pub use auto::KalmanAuto;
pub use grid::KalmanGrid;
pub use kalman::{KalmanModel, KalmanParams};
pub use pool::{CandidatePool, EnsembleParams};

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    NotConfigured,
    UnknownModel { id: usize, candidates: usize },
    LengthMismatch { series1: usize, series2: usize },
    InvalidConfig(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelError::NotConfigured => write!(f, "model queried before setup"),
            ModelError::UnknownModel { id, candidates } => write!(
                f,
                "model id {} out of range ({} candidates)",
                id, candidates
            ),
            ModelError::LengthMismatch { series1, series2 } => write!(
                f,
                "price series lengths differ: {} vs {}",
                series1, series2
            ),
            ModelError::InvalidConfig(e) => write!(f, "invalid model config: {}", e),
        }
    }
}

impl std::error::Error for ModelError {}

/// Replaces one leg's price `P` by `b + a / P` before it reaches the filter,
/// linearizing an inversely correlated pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PriceTransform {
    #[default]
    None,
    InvertLeg1 { a: f64, b: f64 },
    InvertLeg2 { a: f64, b: f64 },
}

impl PriceTransform {
    pub fn apply(self, price1: f64, price2: f64) -> (f64, f64) {
        match self {
            PriceTransform::None => (price1, price2),
            PriceTransform::InvertLeg1 { a, b } => (b + a / price1, price2),
            PriceTransform::InvertLeg2 { a, b } => (price1, b + a / price2),
        }
    }

    pub fn inversion(self) -> InversionMode {
        match self {
            PriceTransform::None => InversionMode::None,
            PriceTransform::InvertLeg1 { .. } => InversionMode::InvertLeg1,
            PriceTransform::InvertLeg2 { .. } => InversionMode::InvertLeg2,
        }
    }
}

/// Override switch for the published candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Auto,
    LockedTo(usize),
}

/// Opaque, persistable description of which candidate is driving the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelState {
    pub model_id: Option<usize>,
}

/// `beta·x + alpha − y`: predicted minus observed leg 2.
#[inline]
pub fn spread(beta: f64, alpha: f64, x: f64, y: f64) -> f64 {
    beta * x + alpha - y
}

#[inline]
pub fn z_score(beta: f64, alpha: f64, sq: f64, x: f64, y: f64) -> f64 {
    if !sq.is_finite() || sq <= 0.0 {
        return 0.0;
    }
    spread(beta, alpha, x, y) / sq
}

/// Capability shared by every estimator the execution layer can drive.
pub trait SpreadEstimator: Send {
    /// Ticks of history needed before the estimator can become ready.
    fn lookback(&self) -> usize;
    fn is_valid(&self) -> bool;
    fn is_ready(&self) -> bool;
    /// Feeds one price pair, returning readiness.
    fn update(&mut self, price1: f64, price2: f64) -> bool;
    fn beta(&self) -> f64;
    fn alpha(&self) -> f64;
    /// Standard deviation of the one-step innovation.
    fn sq(&self) -> f64;
    fn transform(&self) -> PriceTransform;
    fn reset(&mut self);

    fn candidates(&self) -> usize;
    fn model_id_used(&self) -> Option<usize>;
    fn lock(&mut self, id: usize) -> Result<(), ModelError>;
    fn unlock(&mut self);
    fn is_locked(&self) -> bool;

    /// Z-score of raw prices against the published coefficients.
    fn evaluate(&self, price1: f64, price2: f64) -> f64 {
        if !self.is_valid() {
            return 0.0;
        }
        let (x, y) = self.transform().apply(price1, price2);
        z_score(self.beta(), self.alpha(), self.sq(), x, y)
    }

    fn current_state(&self) -> ModelState {
        ModelState {
            model_id: self.model_id_used(),
        }
    }
}

/// Log-spaced grid of `steps` values from `min` to `max` inclusive.
pub(crate) fn log_grid(min: f64, max: f64, steps: usize) -> Vec<f64> {
    if steps <= 1 || min == max {
        return vec![min];
    }
    let (lo, hi) = (min.ln(), max.ln());
    (0..steps)
        .map(|i| (lo + (hi - lo) * i as f64 / (steps - 1) as f64).exp())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_replaces_inverted_leg() {
        let t = PriceTransform::InvertLeg2 { a: 100.0, b: 1.0 };
        assert_eq!(t.apply(10.0, 50.0), (10.0, 3.0));
        assert_eq!(t.inversion(), InversionMode::InvertLeg2);
        let t = PriceTransform::InvertLeg1 { a: 8.0, b: 0.0 };
        assert_eq!(t.apply(4.0, 50.0), (2.0, 50.0));
        assert_eq!(PriceTransform::None.apply(1.0, 2.0), (1.0, 2.0));
    }

    #[test]
    fn z_score_is_neutral_without_dispersion() {
        assert_eq!(z_score(1.0, 0.0, 0.0, 10.0, 5.0), 0.0);
        assert_eq!(z_score(1.0, 0.0, f64::NAN, 10.0, 5.0), 0.0);
        assert_eq!(z_score(1.0, 0.0, 2.5, 10.0, 5.0), 2.0);
    }

    #[test]
    fn log_grid_spans_bounds() {
        let g = log_grid(1e-4, 1e-2, 3);
        assert_eq!(g.len(), 3);
        assert!((g[0] - 1e-4).abs() < 1e-15);
        assert!((g[1] - 1e-3).abs() < 1e-12);
        assert!((g[2] - 1e-2).abs() < 1e-12);
        assert_eq!(log_grid(0.5, 0.9, 1), vec![0.5]);
    }

    #[test]
    fn model_state_round_trips_through_json() {
        let state = ModelState { model_id: Some(4) };
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"model_id":4}"#);
        let back: ModelState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
