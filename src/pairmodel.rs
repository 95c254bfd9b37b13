//! Execution-facing wrapper around one configured spread estimator.
//!
//! The execution layer serializes every call for a given pair: ticks,
//! signal queries and lock/unlock all go through the same `&mut PairModel`.

use log::{debug, warn};

use crate::config::{EntryMode, ModelConfig, ModelKind};
use crate::model::{KalmanAuto, KalmanGrid, KalmanModel, ModelError, ModelState, SpreadEstimator};
use crate::sizing::{leg_quantities, LegQuantities};
use crate::strategy::{Signal, SimpleStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZScoreMode {
    Current,
    Previous,
}

struct Setup {
    config: ModelConfig,
    strategy: SimpleStrategy,
    estimator: Box<dyn SpreadEstimator>,
}

pub fn build_estimator(config: &ModelConfig) -> Box<dyn SpreadEstimator> {
    match config.model_kind {
        ModelKind::Kalman => Box::new(KalmanModel::new(
            config.kalman_params(),
            config.price_transform,
        )),
        ModelKind::Grid => Box::new(KalmanGrid::new(
            config.grid_params(),
            config.price_transform,
        )),
        ModelKind::Auto => Box::new(KalmanAuto::new(
            config.auto_params(),
            config.price_transform,
        )),
    }
}

#[derive(Default)]
pub struct PairModel {
    setup: Option<Setup>,
    z: f64,
    prev_z: f64,
    last_prices: Option<(f64, f64)>,
}

impl PairModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let mut model = Self::new();
        model.setup_from_strategy(config)?;
        Ok(model)
    }

    /// Replaces any existing estimator with a fresh one built from `config`.
    pub fn setup_from_strategy(&mut self, config: &ModelConfig) -> Result<(), ModelError> {
        config.validate()?;
        let estimator = build_estimator(config);
        debug!(
            "model set up: kind={:?} candidates={} lookback={}",
            config.model_kind,
            estimator.candidates(),
            estimator.lookback()
        );
        self.setup = Some(Setup {
            config: config.clone(),
            strategy: config.strategy(),
            estimator,
        });
        self.clear_scores();
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.setup.is_some()
    }

    pub fn config(&self) -> Option<&ModelConfig> {
        self.setup.as_ref().map(|s| &s.config)
    }

    fn setup(&self) -> Result<&Setup, ModelError> {
        self.setup.as_ref().ok_or(ModelError::NotConfigured)
    }

    fn setup_mut(&mut self) -> Result<&mut Setup, ModelError> {
        self.setup.as_mut().ok_or(ModelError::NotConfigured)
    }

    fn clear_scores(&mut self) {
        self.z = 0.0;
        self.prev_z = 0.0;
        self.last_prices = None;
    }

    pub fn lookback(&self) -> Result<usize, ModelError> {
        Ok(self.setup()?.estimator.lookback())
    }

    pub fn candidates(&self) -> Result<usize, ModelError> {
        Ok(self.setup()?.estimator.candidates())
    }

    pub fn estimator(&self) -> Result<&dyn SpreadEstimator, ModelError> {
        Ok(self.setup()?.estimator.as_ref())
    }

    pub fn is_ready(&self) -> bool {
        self.setup
            .as_ref()
            .map_or(false, |s| s.estimator.is_ready())
    }

    pub fn is_valid(&self) -> bool {
        self.setup
            .as_ref()
            .map_or(false, |s| s.estimator.is_valid())
    }

    fn is_live(&self) -> bool {
        self.is_ready() && self.is_valid()
    }

    /// Rebuilds every buffer and candidate from two aligned histories.
    /// Replaying the same arrays always lands on the same published state.
    pub fn set_prices(&mut self, series1: &[f64], series2: &[f64]) -> Result<bool, ModelError> {
        if series1.len() != series2.len() {
            return Err(ModelError::LengthMismatch {
                series1: series1.len(),
                series2: series2.len(),
            });
        }
        self.setup_mut()?.estimator.reset();
        self.clear_scores();
        for (&p1, &p2) in series1.iter().zip(series2) {
            self.update(p1, p2)?;
        }
        let ready = self.is_ready();
        debug!("set_prices: {} ticks replayed, ready={}", series1.len(), ready);
        Ok(ready)
    }

    /// Feeds one tick and rescores it. Returns readiness.
    pub fn update(&mut self, price1: f64, price2: f64) -> Result<bool, ModelError> {
        let estimator = &mut self.setup_mut()?.estimator;
        let ready = estimator.update(price1, price2);
        let z = estimator.evaluate(price1, price2);
        self.prev_z = self.z;
        self.z = z;
        self.last_prices = Some((price1, price2));
        Ok(ready)
    }

    pub fn last_prices(&self) -> Option<(f64, f64)> {
        self.last_prices
    }

    pub fn z_score(&self, mode: ZScoreMode) -> f64 {
        if !self.is_live() {
            return 0.0;
        }
        match mode {
            ZScoreMode::Current => self.z,
            ZScoreMode::Previous => self.prev_z,
        }
    }

    pub fn entry_logic(&self) -> Signal {
        let Some(setup) = self.setup.as_ref() else {
            return Signal::None;
        };
        if !self.is_live() {
            return Signal::None;
        }
        let signal = setup.strategy.entry_logic(self.z);
        let confirmed = match setup.config.entry_mode {
            EntryMode::Simple => true,
            EntryMode::RequireUptick => self.z > self.prev_z,
            EntryMode::RequireDowntick => self.z < self.prev_z,
        };
        if confirmed {
            signal
        } else {
            Signal::None
        }
    }

    /// Whether a position held in `current` direction should be closed.
    pub fn exit_logic(&self, current: Signal) -> bool {
        let Some(setup) = self.setup.as_ref() else {
            return false;
        };
        if !self.is_live() {
            return false;
        }
        setup.strategy.exit_logic(current, self.z)
    }

    pub fn strategy(&self) -> Option<&SimpleStrategy> {
        self.setup.as_ref().map(|s| &s.strategy)
    }

    /// Expected dollar P&L of a reversion from the current z-score to the exit
    /// threshold, net of round-trip fees on both legs.
    ///
    /// The spread's standard deviation is in the filter's units, so it is
    /// scaled by the transformed leg-2 price the filter saw.
    pub fn profit_potential(&self, notional: f64, fee1: f64, fee2: f64) -> f64 {
        let (Some(setup), Some((price1, price2))) = (self.setup.as_ref(), self.last_prices) else {
            return 0.0;
        };
        if !self.is_live() {
            return 0.0;
        }
        let (_, y) = setup.estimator.transform().apply(price1, price2);
        if y.is_nan() || y <= 0.0 {
            return 0.0;
        }
        let distance = self.z.abs() - setup.strategy.exit_threshold;
        if distance <= 0.0 {
            return 0.0;
        }
        let sq = setup.estimator.sq();
        distance * sq * notional / y - 2.0 * notional * (fee1 + fee2)
    }

    pub fn calc_leg_qtys(
        &self,
        notional: f64,
        fee1: f64,
        fee2: f64,
        price1: f64,
        price2: f64,
    ) -> LegQuantities {
        let Some(setup) = self.setup.as_ref() else {
            return LegQuantities::default();
        };
        if !self.is_live() {
            return LegQuantities::default();
        }
        leg_quantities(
            setup.config.sizing_mode,
            notional,
            fee1,
            fee2,
            price1,
            price2,
            setup.estimator.beta(),
        )
    }

    pub fn current_state(&self) -> Result<ModelState, ModelError> {
        Ok(self.setup()?.estimator.current_state())
    }

    /// Pins the estimator to the candidate recorded in `state`. A state with no
    /// candidate releases any existing lock.
    pub fn lock_state(&mut self, state: &ModelState) -> Result<(), ModelError> {
        let estimator = &mut self.setup_mut()?.estimator;
        match state.model_id {
            Some(id) => estimator.lock(id).map_err(|e| {
                warn!("lock to model {} rejected: {}", id, e);
                e
            }),
            None => {
                estimator.unlock();
                Ok(())
            }
        }
    }

    pub fn unlock_state(&mut self) -> Result<(), ModelError> {
        self.setup_mut()?.estimator.unlock();
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.setup
            .as_ref()
            .map_or(false, |s| s.estimator.is_locked())
    }
}
