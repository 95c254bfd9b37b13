//! Drives a `PairModel` over a recorded or synthetic feed the way the
//! execution layer would: bulk init, then tick by tick with one real position
//! at a time and the model locked while it is open.

use anyhow::{Context, Result};
use log::{debug, info};
use std::env;
use std::time::Duration;

use crate::config::ModelConfig;
use crate::pairmodel::{PairModel, ZScoreMode};
use crate::ports::replay_feed::ReplayFeed;
use crate::position::{
    CloseReason, ExitComparison, PairPosition, PositionSpec, PositionTag,
};
use crate::strategy::{Signal, SECONDS_PER_DAY};
use crate::synthetic::SyntheticPair;

const DEFAULT_SYMBOL1: &str = "BTC";
const DEFAULT_SYMBOL2: &str = "ETH";
const DEFAULT_SYNTHETIC_TICKS: usize = 500;
const DEFAULT_NOTIONAL: f64 = 10_000.0;
const DEFAULT_FEE: f64 = 0.0005;

#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySettings {
    /// `.csv` or JSONL dump; a synthetic pair is generated when unset.
    pub file: Option<String>,
    pub symbol1: String,
    pub symbol2: String,
    pub synthetic_ticks: usize,
    pub seed: u64,
    /// Ticks handed to `set_prices`; defaults to the model lookback.
    pub history: Option<usize>,
    pub notional: f64,
    pub fee1: f64,
    pub fee2: f64,
    pub pace_ms: u64,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            file: None,
            symbol1: DEFAULT_SYMBOL1.to_string(),
            symbol2: DEFAULT_SYMBOL2.to_string(),
            synthetic_ticks: DEFAULT_SYNTHETIC_TICKS,
            seed: SyntheticPair::default().seed,
            history: None,
            notional: DEFAULT_NOTIONAL,
            fee1: DEFAULT_FEE,
            fee2: DEFAULT_FEE,
            pace_ms: 0,
        }
    }
}

impl ReplaySettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            file: env::var("REPLAY_FILE").ok().filter(|v| !v.trim().is_empty()),
            symbol1: env::var("REPLAY_SYMBOL1").unwrap_or(defaults.symbol1),
            symbol2: env::var("REPLAY_SYMBOL2").unwrap_or(defaults.symbol2),
            synthetic_ticks: env::var("REPLAY_SYNTHETIC_TICKS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.synthetic_ticks),
            seed: env::var("REPLAY_SEED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.seed),
            history: env::var("REPLAY_HISTORY").ok().and_then(|v| v.parse().ok()),
            notional: env::var("REPLAY_NOTIONAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.notional),
            fee1: env::var("REPLAY_FEE1")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fee1),
            fee2: env::var("REPLAY_FEE2")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fee2),
            pace_ms: env::var("REPLAY_PACE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pace_ms),
        }
    }

    pub fn load_feed(&self) -> Result<ReplayFeed> {
        match &self.file {
            Some(path) => ReplayFeed::from_path(path, &self.symbol1, &self.symbol2),
            None => {
                let generator = SyntheticPair {
                    seed: self.seed,
                    ..SyntheticPair::default()
                };
                ReplayFeed::from_ticks(generator.generate(self.synthetic_ticks))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    pub ticks: usize,
    pub trades: usize,
    pub wins: usize,
    pub timeouts: usize,
    /// Compounded equity multiplier over every closed and open trade.
    pub equity: f64,
}

struct OpenTrade {
    signal: Signal,
    position: PairPosition,
    model_id: Option<usize>,
}

pub async fn run(config: &ModelConfig, settings: &ReplaySettings) -> Result<ReplaySummary> {
    let mut feed = settings.load_feed()?;
    let mut model = PairModel::from_config(config).context("model setup failed")?;
    let history = settings.history.unwrap_or(model.lookback()?);
    let (series1, series2) = feed.take_history(history);
    let ready = model.set_prices(&series1, &series2)?;
    info!(
        "initialized from {} ticks (ready={}), {} left to replay",
        series1.len(),
        ready,
        feed.remaining()
    );

    let mut summary = ReplaySummary {
        equity: 1.0,
        ..ReplaySummary::default()
    };
    let mut open: Option<OpenTrade> = None;

    for tick in feed {
        model.update(tick.price1, tick.price2)?;
        summary.ticks += 1;
        let z = model.z_score(ZScoreMode::Current);

        if let Some(trade) = open.as_mut() {
            let upd = if model.exit_logic(trade.signal) {
                trade.position.update(tick.price1, tick.price2, z, tick.timestamp)
            } else {
                trade.position.update_at(tick.price1, tick.price2, tick.timestamp)
            };
            summary.equity *= upd.ret;
            if !upd.active {
                let pnl = trade.position.equity() - 1.0;
                summary.trades += 1;
                if pnl > 0.0 {
                    summary.wins += 1;
                }
                if upd.reason == CloseReason::Timeout {
                    summary.timeouts += 1;
                }
                info!(
                    "closed {:?} on model {:?}: reason={:?} z={:.3} pnl={:.4}",
                    trade.signal, trade.model_id, upd.reason, z, pnl
                );
                model.unlock_state()?;
                open = None;
            }
        } else {
            let signal = model.entry_logic();
            if let Some(direction) = signal.direction() {
                let qtys = model.calc_leg_qtys(
                    settings.notional,
                    settings.fee1,
                    settings.fee2,
                    tick.price1,
                    tick.price2,
                );
                let potential =
                    model.profit_potential(settings.notional, settings.fee1, settings.fee2);
                if qtys.is_empty() || potential <= 0.0 {
                    debug!(
                        "skipped {:?}: qtys={:?} potential={:.2}",
                        signal, qtys, potential
                    );
                } else {
                    let state = model.current_state()?;
                    model.lock_state(&state)?;
                    let exit = config.exit_z;
                    let (target_score, exit_when) = match signal {
                        Signal::Short => (exit, ExitComparison::AtOrBelow),
                        _ => (-exit, ExitComparison::AtOrAbove),
                    };
                    let expiry = config
                        .holding_limit()
                        .map_or(i64::MAX, |days| {
                            tick.timestamp.saturating_add(days as i64 * SECONDS_PER_DAY)
                        });
                    let position = PairPosition::open(PositionSpec {
                        tag: PositionTag {
                            pool_id: 0,
                            strategy_id: 0,
                            model_id: state.model_id.unwrap_or(0),
                        },
                        direction,
                        inversion: config.price_transform.inversion(),
                        expiry,
                        target_score,
                        exit_when,
                        fee: (settings.fee1 + settings.fee2) / 2.0,
                        open_price1: tick.price1,
                        open_price2: tick.price2,
                    });
                    info!(
                        "opened {:?} on model {:?}: z={:.3} qty1={} qty2={} potential={:.2}",
                        signal, state.model_id, z, qtys.qty1, qtys.qty2, potential
                    );
                    open = Some(OpenTrade {
                        signal,
                        position,
                        model_id: state.model_id,
                    });
                }
            }
        }

        if settings.pace_ms > 0 {
            tokio::time::sleep(Duration::from_millis(settings.pace_ms)).await;
        }
    }

    if let Some(trade) = open {
        info!(
            "replay ended with {:?} still open (equity {:.4})",
            trade.signal,
            trade.position.equity()
        );
    }
    info!(
        "replay done: ticks={} trades={} wins={} timeouts={} equity={:.4}",
        summary.ticks, summary.trades, summary.wins, summary.timeouts, summary.equity
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;

    #[tokio::test]
    async fn synthetic_replay_is_reproducible() {
        let config = ModelConfig {
            model_kind: ModelKind::Auto,
            lookback: 5,
            tracking_window: 20,
            delta_steps: 4,
            entry_z: 1.0,
            ..ModelConfig::default()
        };
        let settings = ReplaySettings {
            synthetic_ticks: 200,
            ..ReplaySettings::default()
        };
        let first = run(&config, &settings).await.unwrap();
        let second = run(&config, &settings).await.unwrap();
        assert_eq!(first, second);
        let lookback = PairModel::from_config(&config).unwrap().lookback().unwrap();
        assert_eq!(first.ticks, 200 - lookback);
        assert!(first.wins <= first.trades);
        assert!(first.equity.is_finite() && first.equity > 0.0);
    }

    #[tokio::test]
    async fn history_longer_than_feed_leaves_nothing_to_replay() {
        let settings = ReplaySettings {
            synthetic_ticks: 30,
            history: Some(100),
            ..ReplaySettings::default()
        };
        let summary = run(&ModelConfig::default(), &settings).await.unwrap();
        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.equity, 1.0);
    }
}
