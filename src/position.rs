use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionDirection {
    Long,
    Short,
}

/// Which leg, if any, was fed to the model through an inverse transform.
///
/// An inverted leg is hedged on the same side as the other leg, so its sign
/// is flipped relative to the plain long-leg-1 / short-leg-2 layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InversionMode {
    #[default]
    None,
    InvertLeg1,
    InvertLeg2,
}

/// Exit when the score is at or beyond the target in the given direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitComparison {
    AtOrAbove,
    AtOrBelow,
}

impl ExitComparison {
    fn is_met(self, score: f64, target: f64) -> bool {
        match self {
            ExitComparison::AtOrAbove => score >= target,
            ExitComparison::AtOrBelow => score <= target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    None,
    Timeout,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionUpdate {
    pub active: bool,
    pub reason: CloseReason,
    /// Step return multiplier for compounding an equity curve.
    pub ret: f64,
}

impl PositionUpdate {
    fn idle() -> Self {
        Self {
            active: false,
            reason: CloseReason::None,
            ret: 1.0,
        }
    }
}

/// Who owns a position: pool, strategy and grid candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionTag {
    pub pool_id: usize,
    pub strategy_id: usize,
    pub model_id: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSpec {
    pub tag: PositionTag,
    pub direction: PositionDirection,
    pub inversion: InversionMode,
    /// Absolute expiry timestamp in seconds.
    pub expiry: i64,
    pub target_score: f64,
    pub exit_when: ExitComparison,
    /// Fee fraction charged on entry and again on the closing step.
    pub fee: f64,
    pub open_price1: f64,
    pub open_price2: f64,
}

/// Mark-to-market simulation of a dollar-neutral pair position.
///
/// The same value type backs live positions held by the execution layer and
/// the virtual positions every grid candidate trades internally. Each leg is
/// sized at `0.5 / open_price`, so the position is dollar-neutral only at
/// entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairPosition {
    spec: PositionSpec,
    qty1: f64,
    qty2: f64,
    prev_equity: f64,
    active: bool,
}

impl PairPosition {
    pub fn open(spec: PositionSpec) -> Self {
        let (sign1, sign2) = leg_signs(spec.direction, spec.inversion);
        Self {
            qty1: sign1 * 0.5 / spec.open_price1,
            qty2: sign2 * 0.5 / spec.open_price2,
            prev_equity: 1.0,
            active: true,
            spec,
        }
    }

    pub fn spec(&self) -> &PositionSpec {
        &self.spec
    }

    pub fn tag(&self) -> PositionTag {
        self.spec.tag
    }

    pub fn direction(&self) -> PositionDirection {
        self.spec.direction
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Equity multiplier as of the last update.
    pub fn equity(&self) -> f64 {
        self.prev_equity
    }

    /// Unrealized P&L per unit of gross notional, before fees.
    pub fn nav(&self, price1: f64, price2: f64) -> f64 {
        self.qty1 * (price1 - self.spec.open_price1) + self.qty2 * (price2 - self.spec.open_price2)
    }

    /// Marks the position and applies both exit rules.
    pub fn update(&mut self, price1: f64, price2: f64, score: f64, ts: i64) -> PositionUpdate {
        if !self.active {
            return PositionUpdate::idle();
        }
        let reason = if ts > self.spec.expiry {
            CloseReason::Timeout
        } else if self.spec.exit_when.is_met(score, self.spec.target_score) {
            CloseReason::Closed
        } else {
            CloseReason::None
        };
        self.mark(price1, price2, reason)
    }

    /// Marks the position applying only the expiry rule.
    pub fn update_at(&mut self, price1: f64, price2: f64, ts: i64) -> PositionUpdate {
        if !self.active {
            return PositionUpdate::idle();
        }
        let reason = if ts > self.spec.expiry {
            CloseReason::Timeout
        } else {
            CloseReason::None
        };
        self.mark(price1, price2, reason)
    }

    fn mark(&mut self, price1: f64, price2: f64, reason: CloseReason) -> PositionUpdate {
        let closing = reason != CloseReason::None;
        let exit_fee = if closing { self.spec.fee } else { 0.0 };
        let equity = 1.0 + self.nav(price1, price2) - self.spec.fee - exit_fee;
        let ret = equity / self.prev_equity;
        self.prev_equity = equity;
        if closing {
            self.active = false;
        }
        PositionUpdate {
            active: self.active,
            reason,
            ret,
        }
    }
}

fn leg_signs(direction: PositionDirection, inversion: InversionMode) -> (f64, f64) {
    let (mut s1, mut s2) = match direction {
        PositionDirection::Long => (1.0, -1.0),
        PositionDirection::Short => (-1.0, 1.0),
    };
    match inversion {
        InversionMode::None => {}
        InversionMode::InvertLeg1 => s1 = -s1,
        InversionMode::InvertLeg2 => s2 = -s2,
    }
    (s1, s2)
}
