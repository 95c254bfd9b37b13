use serde::{Deserialize, Serialize};

use crate::position::{
    ExitComparison, InversionMode, PairPosition, PositionDirection, PositionSpec, PositionTag,
};

pub const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    None,
    Long,
    Short,
}

impl Signal {
    pub fn direction(self) -> Option<PositionDirection> {
        match self {
            Signal::None => None,
            Signal::Long => Some(PositionDirection::Long),
            Signal::Short => Some(PositionDirection::Short),
        }
    }
}

/// Threshold entry and exit logic, owned by one grid candidate or by the
/// facade for the real position.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleStrategy {
    pub model_id: usize,
    pub allow_long: bool,
    pub allow_short: bool,
    pub entry_threshold: f64,
    /// Band used by `exit_logic`. Positions built by `new_position` exit at
    /// the opposite entry threshold and ignore it.
    pub exit_threshold: f64,
    /// Holding limit in days, `None` for no limit.
    pub holding_days: Option<u32>,
}

impl SimpleStrategy {
    pub fn entry_logic(&self, score: f64) -> Signal {
        if self.allow_short && score >= self.entry_threshold {
            Signal::Short
        } else if self.allow_long && score <= -self.entry_threshold {
            Signal::Long
        } else {
            Signal::None
        }
    }

    /// Whether a position held in `current` direction should be closed at
    /// `score`.
    pub fn exit_logic(&self, current: Signal, score: f64) -> bool {
        match current {
            Signal::None => false,
            Signal::Long => score >= -self.exit_threshold,
            Signal::Short => score <= self.exit_threshold,
        }
    }

    /// Builds the position for `signal`. Every call opens a fresh position, so
    /// callers must track which strategies already hold one.
    pub fn new_position(
        &self,
        signal: Signal,
        price1: f64,
        price2: f64,
        ts: i64,
        inversion: InversionMode,
        fee: f64,
    ) -> Option<PairPosition> {
        let direction = signal.direction()?;
        let (target_score, exit_when) = match direction {
            PositionDirection::Short => (-self.entry_threshold, ExitComparison::AtOrBelow),
            PositionDirection::Long => (self.entry_threshold, ExitComparison::AtOrAbove),
        };
        let expiry = match self.holding_days {
            Some(days) => ts.saturating_add(days as i64 * SECONDS_PER_DAY),
            None => i64::MAX,
        };
        Some(PairPosition::open(PositionSpec {
            tag: PositionTag {
                pool_id: 0,
                strategy_id: self.model_id,
                model_id: self.model_id,
            },
            direction,
            inversion,
            expiry,
            target_score,
            exit_when,
            fee,
            open_price1: price1,
            open_price2: price2,
        }))
    }
}
