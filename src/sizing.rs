use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::SizingMode;

/// Whole-share quantities for both legs, always non-negative. Direction is
/// applied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LegQuantities {
    pub qty1: i64,
    pub qty2: i64,
}

impl LegQuantities {
    pub fn is_empty(&self) -> bool {
        self.qty1 <= 0 || self.qty2 <= 0
    }
}

/// Rounds `size` down to a multiple of `step`. A non-positive step leaves the
/// size untouched.
pub fn quantize_down(size: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return size;
    }
    if size <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    match size.checked_div(step) {
        Some(multiples) => multiples.floor() * step,
        None => Decimal::ZERO,
    }
}

/// Shares of one leg affordable with `notional` after paying `fee` on it.
pub fn shares_for_notional(notional: f64, price: f64, fee: f64) -> Decimal {
    let (Some(notional), Some(price), Some(fee)) = (
        Decimal::from_f64(notional),
        Decimal::from_f64(price),
        Decimal::from_f64(fee),
    ) else {
        return Decimal::ZERO;
    };
    if notional <= Decimal::ZERO || price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let cost = match price.checked_mul(Decimal::ONE + fee.max(Decimal::ZERO)) {
        Some(c) => c,
        None => return Decimal::ZERO,
    };
    notional
        .checked_div(cost)
        .map(|size| quantize_down(size, Decimal::ONE))
        .unwrap_or(Decimal::ZERO)
}

pub fn leg_quantities(
    mode: SizingMode,
    notional: f64,
    fee1: f64,
    fee2: f64,
    price1: f64,
    price2: f64,
    beta: f64,
) -> LegQuantities {
    let qty2 = shares_for_notional(notional, price2, fee2);
    let qty1 = match mode {
        SizingMode::DollarNeutral => shares_for_notional(notional, price1, fee1),
        SizingMode::BetaNeutral => Decimal::from_f64(beta.abs())
            .and_then(|b| qty2.checked_mul(b))
            .map(|q| quantize_down(q, Decimal::ONE))
            .unwrap_or(Decimal::ZERO),
    };
    LegQuantities {
        qty1: qty1.to_i64().unwrap_or(0),
        qty2: qty2.to_i64().unwrap_or(0),
    }
}
