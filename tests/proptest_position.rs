//! Property-based tests for the position simulator and leg sizing.

use kalmanpair::config::SizingMode;
use kalmanpair::position::{
    CloseReason, ExitComparison, InversionMode, PairPosition, PositionDirection, PositionSpec,
    PositionTag,
};
use kalmanpair::sizing::leg_quantities;
use proptest::prelude::*;

fn spec(direction: PositionDirection, p1: f64, p2: f64, fee: f64, expiry: i64) -> PositionSpec {
    PositionSpec {
        tag: PositionTag::default(),
        direction,
        inversion: InversionMode::None,
        expiry,
        target_score: 0.0,
        exit_when: ExitComparison::AtOrAbove,
        fee,
        open_price1: p1,
        open_price2: p2,
    }
}

proptest! {
    /// Whatever the path, a position reports exactly one closing step and is
    /// inert afterwards.
    #[test]
    fn prop_position_closes_once(
        long in any::<bool>(),
        p1 in 1.0f64..500.0,
        p2 in 1.0f64..500.0,
        fee in 0.0f64..0.01,
        path in prop::collection::vec((0.5f64..1.5, 0.5f64..1.5, -3.0f64..3.0), 1..60),
    ) {
        let direction = if long { PositionDirection::Long } else { PositionDirection::Short };
        let mut pos = PairPosition::open(spec(direction, p1, p2, fee, 20));
        let mut closes = 0;
        let mut compounded = 1.0;
        for (ts, (m1, m2, score)) in path.iter().enumerate() {
            let was_active = pos.is_active();
            let upd = pos.update(p1 * m1, p2 * m2, *score, ts as i64);
            if was_active {
                compounded *= upd.ret;
                if upd.reason != CloseReason::None {
                    closes += 1;
                    prop_assert!(!upd.active);
                }
            } else {
                prop_assert_eq!(upd.ret, 1.0);
                prop_assert_eq!(upd.reason, CloseReason::None);
                prop_assert!(!upd.active);
            }
        }
        prop_assert!(closes <= 1);
        // compounded step returns reproduce the final equity
        prop_assert!((compounded - pos.equity()).abs() < 1e-9 * pos.equity().abs().max(1.0));
    }

    /// Marking at the opening prices costs exactly the entry fee.
    #[test]
    fn prop_flat_mark_costs_entry_fee(
        long in any::<bool>(),
        p1 in 1.0f64..500.0,
        p2 in 1.0f64..500.0,
        fee in 0.0f64..0.01,
    ) {
        let direction = if long { PositionDirection::Long } else { PositionDirection::Short };
        let mut pos = PairPosition::open(spec(direction, p1, p2, fee, i64::MAX));
        let upd = pos.update_at(p1, p2, 0);
        prop_assert!(upd.active);
        prop_assert!((upd.ret - (1.0 - fee)).abs() < 1e-12);
        prop_assert!(pos.nav(p1, p2).abs() < 1e-12);
    }

    /// Quantities never cost more than the notional they were sized from.
    #[test]
    fn prop_dollar_neutral_legs_fit_notional(
        notional in 100.0f64..1_000_000.0,
        p1 in 0.5f64..2_000.0,
        p2 in 0.5f64..2_000.0,
        fee in 0.0f64..0.01,
    ) {
        let q = leg_quantities(SizingMode::DollarNeutral, notional, fee, fee, p1, p2, 1.0);
        prop_assert!(q.qty1 >= 0 && q.qty2 >= 0);
        prop_assert!(q.qty1 as f64 * p1 * (1.0 + fee) <= notional * (1.0 + 1e-9));
        prop_assert!(q.qty2 as f64 * p2 * (1.0 + fee) <= notional * (1.0 + 1e-9));
        prop_assert!((q.qty1 + 1) as f64 * p1 * (1.0 + fee) > notional * (1.0 - 1e-9));
    }
}
