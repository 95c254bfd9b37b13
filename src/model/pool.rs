use super::{KalmanModel, KalmanParams, PriceTransform, SpreadEstimator};
use crate::position::{CloseReason, PairPosition};
use crate::stats::ResidualFilter;
use crate::strategy::{SimpleStrategy, SECONDS_PER_DAY};
use crate::tracker::{
    CandidateScorer, CandidateStep, OlsPerformance, PerformanceTracker, SharpePerformance,
    TrackerKind, UsageTracker,
};

/// Settings shared by the grid and auto ensembles.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleParams {
    pub lookback: usize,
    /// Ticks skipped after every candidate is ready, before virtual trading.
    pub warmup: usize,
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    pub allow_long: bool,
    pub allow_short: bool,
    pub holding_days: Option<u32>,
    /// Fee fraction charged to virtual positions.
    pub fee: f64,
    pub tracking_window: usize,
    pub usage_target_pct: f64,
    pub usage_width_pct: f64,
    pub tracker_kind: TrackerKind,
    pub residual_filter: ResidualFilter,
    pub inhibit_threshold: f64,
    pub kill_on_inhibit: bool,
}

impl Default for EnsembleParams {
    fn default() -> Self {
        Self {
            lookback: 10,
            warmup: 0,
            entry_threshold: 2.0,
            exit_threshold: 0.0,
            allow_long: true,
            allow_short: true,
            holding_days: Some(20),
            fee: 0.001,
            tracking_window: 40,
            usage_target_pct: 30.0,
            usage_width_pct: 15.0,
            tracker_kind: TrackerKind::Usage,
            residual_filter: ResidualFilter::Downside,
            inhibit_threshold: 0.05,
            kill_on_inhibit: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    model: KalmanModel,
    strategy: SimpleStrategy,
    position: Option<PairPosition>,
}

/// Kalman candidates that each paper-trade their own z-score and feed the
/// usage and performance trackers.
///
/// Virtual positions run on an internal clock advancing one day per scored
/// tick, independent of the feed's wall-clock time.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    params: EnsembleParams,
    transform: PriceTransform,
    candidates: Vec<Candidate>,
    usage: UsageTracker,
    performance: Option<PerformanceTracker>,
    ready_ticks: usize,
    clock: i64,
    scores: Vec<f64>,
    weights: Vec<f64>,
}

impl CandidatePool {
    pub fn new(
        params: EnsembleParams,
        transform: PriceTransform,
        kalman: impl IntoIterator<Item = KalmanParams>,
    ) -> Self {
        let candidates: Vec<Candidate> = kalman
            .into_iter()
            .enumerate()
            .map(|(id, kp)| Candidate {
                model: KalmanModel::new(kp, PriceTransform::None),
                strategy: SimpleStrategy {
                    model_id: id,
                    allow_long: params.allow_long,
                    allow_short: params.allow_short,
                    entry_threshold: params.entry_threshold,
                    exit_threshold: params.exit_threshold,
                    holding_days: params.holding_days,
                },
                position: None,
            })
            .collect();
        let n = candidates.len();
        let window = params.tracking_window.max(2);
        let performance = match params.tracker_kind {
            TrackerKind::Usage => None,
            TrackerKind::Ols => Some(PerformanceTracker::Ols(OlsPerformance::new(
                n,
                window,
                params.residual_filter,
                params.inhibit_threshold,
                params.kill_on_inhibit,
            ))),
            TrackerKind::Sharpe => Some(PerformanceTracker::Sharpe(SharpePerformance::new(
                n,
                window,
                params.residual_filter,
            ))),
        };
        Self {
            usage: UsageTracker::new(n, window, params.usage_target_pct, params.usage_width_pct),
            performance,
            transform,
            candidates,
            ready_ticks: 0,
            clock: 0,
            scores: vec![0.0; n],
            weights: Vec::new(),
            params,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn transform(&self) -> PriceTransform {
        self.transform
    }

    pub fn model(&self, id: usize) -> Option<&KalmanModel> {
        self.candidates.get(id).map(|c| &c.model)
    }

    pub fn models(&self) -> impl Iterator<Item = &KalmanModel> {
        self.candidates.iter().map(|c| &c.model)
    }

    pub fn position(&self, id: usize) -> Option<&PairPosition> {
        self.candidates.get(id).and_then(|c| c.position.as_ref())
    }

    /// Latest z-score of each candidate.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Weights from the last scored tick, empty until the trackers are ready.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn clock(&self) -> i64 {
        self.clock
    }

    /// Ticks until the pool can first report ready: the slowest candidate,
    /// then the warm-up, then a full tracking window.
    pub fn lookback(&self) -> usize {
        let candidates = self
            .candidates
            .iter()
            .map(|c| c.model.lookback())
            .max()
            .unwrap_or(self.params.lookback);
        candidates + self.params.warmup + self.params.tracking_window.max(2) - 1
    }

    pub fn candidates_ready(&self) -> bool {
        !self.candidates.is_empty() && self.candidates.iter().all(|c| c.model.is_ready())
    }

    pub fn trackers_ready(&self) -> bool {
        self.usage.is_ready() && self.performance.as_ref().map_or(true, |p| p.is_ready())
    }

    pub fn is_ready(&self) -> bool {
        self.candidates_ready() && self.ready_ticks > self.params.warmup && self.trackers_ready()
    }

    /// Runs one tick through every candidate. Returns whether the trackers
    /// were fed, i.e. every candidate was ready and the warm-up has passed.
    pub fn tick(&mut self, price1: f64, price2: f64) -> bool {
        let (x, y) = self.transform.apply(price1, price2);
        let mut all_ready = true;
        for c in self.candidates.iter_mut() {
            all_ready &= c.model.step(x, y);
        }
        if !all_ready || self.candidates.is_empty() {
            return false;
        }
        self.ready_ticks += 1;
        if self.ready_ticks <= self.params.warmup {
            return false;
        }
        self.clock += SECONDS_PER_DAY;

        let mut steps = Vec::with_capacity(self.candidates.len());
        for (i, c) in self.candidates.iter_mut().enumerate() {
            let score = c.model.evaluate(x, y);
            self.scores[i] = score;
            let step = match c.position.as_mut() {
                Some(pos) => {
                    let upd = pos.update(price1, price2, score, self.clock);
                    if !upd.active {
                        c.position = None;
                    }
                    CandidateStep {
                        ret: upd.ret,
                        closed: upd.reason != CloseReason::None,
                        in_position: true,
                    }
                }
                None => CandidateStep::flat(),
            };
            steps.push(step);
        }

        self.usage.add(&steps);
        if let Some(perf) = self.performance.as_mut() {
            perf.add(&steps);
        }

        let inversion = self.transform.inversion();
        for (i, c) in self.candidates.iter_mut().enumerate() {
            if c.position.is_some() {
                continue;
            }
            let signal = c.strategy.entry_logic(self.scores[i]);
            c.position = c.strategy.new_position(
                signal,
                price1,
                price2,
                self.clock,
                inversion,
                self.params.fee,
            );
        }

        if self.trackers_ready() {
            let mut weights = self.usage.weights();
            if let Some(perf) = self.performance.as_mut() {
                for (w, p) in weights.iter_mut().zip(perf.weights()) {
                    *w *= p;
                }
            }
            self.weights = weights;
        }
        true
    }

    pub fn reset(&mut self) {
        for c in self.candidates.iter_mut() {
            c.model.reset();
            c.position = None;
        }
        self.usage.reset();
        if let Some(perf) = self.performance.as_mut() {
            perf.reset();
        }
        self.ready_ticks = 0;
        self.clock = 0;
        self.scores.iter_mut().for_each(|s| *s = 0.0);
        self.weights.clear();
    }
}
