//! Allocation Engine: a pure function of equity and static config.

use rust_decimal::Decimal;

use crate::config::AllocationConfig;
use crate::domain::allocation::{AllocationResult, AllocationVector, EquityTier};

fn tier_for(equity: Decimal, cfg: &AllocationConfig) -> EquityTier {
    if equity < cfg.tier_thresholds[0] {
        EquityTier::Micro
    } else if equity < cfg.tier_thresholds[1] {
        EquityTier::Small
    } else if equity < cfg.tier_thresholds[2] {
        EquityTier::Medium
    } else if equity < cfg.tier_thresholds[3] {
        EquityTier::Large
    } else {
        EquityTier::Institutional
    }
}

fn max_leverage_for(tier: EquityTier, cfg: &AllocationConfig) -> f64 {
    match tier {
        EquityTier::Micro => cfg.leverage_caps[0],
        EquityTier::Small => cfg.leverage_caps[1],
        EquityTier::Medium => cfg.leverage_caps[2],
        EquityTier::Large => cfg.leverage_caps[3],
        EquityTier::Institutional => cfg.leverage_caps[4],
    }
}

/// Linear ramp of `frac` from 0 to 1 as `equity` moves from `start` to `full`.
fn ramp(equity: f64, start: f64, full: f64) -> f64 {
    if full <= start {
        return if equity >= full { 1.0 } else { 0.0 };
    }
    ((equity - start) / (full - start)).clamp(0.0, 1.0)
}

/// `allocation(equity) -> {w1, w2, w3, tier, maxLeverage}`.
pub fn allocate(equity: Decimal, cfg: &AllocationConfig) -> AllocationResult {
    if is_degenerate(equity) {
        let tier = tier_for(Decimal::ZERO, cfg);
        return AllocationResult {
            vector: AllocationVector::single_phase1(),
            tier,
            max_leverage: max_leverage_for(tier, cfg),
            degraded: true,
            equity: Decimal::ZERO,
        };
    }

    let equity_f = equity.to_string().parse::<f64>().unwrap_or(0.0);
    let start_p2 = cfg.start_p2.to_string().parse::<f64>().unwrap_or(0.0);
    let full_p2 = cfg.full_p2.to_string().parse::<f64>().unwrap_or(0.0);
    let start_p3 = cfg.start_p3.to_string().parse::<f64>().unwrap_or(0.0);
    let full_p3 = cfg.full_p3.to_string().parse::<f64>().unwrap_or(0.0);

    // w23 is the whole slice pulled out of phase1 as equity ramps through
    // the P2 band; P3 then redistributes a fraction of that same slice
    // rather than adding a second, independent share on top of it.
    let p2_ramp = ramp(equity_f, start_p2, full_p2);
    let w23 = p2_ramp * cfg.p2_full_share;

    let p3_ramp = if equity_f >= start_p3 {
        ramp(equity_f, start_p3, full_p3)
    } else {
        0.0
    };
    let p3_shift = p3_ramp * cfg.p3_full_share;

    let w1 = 1.0 - w23;
    let w3 = w23 * p3_shift;
    let w2 = w23 * (1.0 - p3_shift);
    let mut vector = AllocationVector { w1, w2, w3 };
    normalize(&mut vector);

    let tier = tier_for(equity, cfg);
    AllocationResult {
        vector,
        tier,
        max_leverage: max_leverage_for(tier, cfg),
        degraded: false,
        equity,
    }
}

fn is_degenerate(equity: Decimal) -> bool {
    // `Decimal` has no NaN/Inf, but a caller parsing external input can
    // still hand us a negative sentinel for "unknown equity".
    equity.is_sign_negative()
}

/// Final normalization step: distribute rounding residual into w1.
fn normalize(v: &mut AllocationVector) {
    let sum = v.w1 + v.w2 + v.w3;
    let residual = 1.0 - sum;
    v.w1 += residual;
    if v.w1 < 0.0 {
        // Residual correction should never push w1 negative given the
        // ramps are each bounded in [0,1], but guard the invariant anyway.
        v.w1 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cfg() -> AllocationConfig {
        AllocationConfig::default()
    }

    #[test]
    fn below_tier2_is_all_phase1() {
        let result = allocate(dec!(1000), &cfg());
        assert_eq!(result.vector.w1, 1.0);
        assert_eq!(result.vector.w2, 0.0);
        assert_eq!(result.vector.w3, 0.0);
        assert!(!result.degraded);
    }

    #[test]
    fn weights_always_sum_to_one() {
        for equity in [0, 100, 1500, 3250, 5000, 10_000, 50_000, 1_000_000] {
            let result = allocate(Decimal::new(equity, 0), &cfg());
            assert!(
                (result.vector.w1 + result.vector.w2 + result.vector.w3 - 1.0).abs() < 1e-9,
                "equity {equity} produced non-normalized weights {:?}",
                result.vector
            );
            assert!(result.vector.w1 >= 0.0);
            assert!(result.vector.w2 >= 0.0);
            assert!(result.vector.w3 >= 0.0);
        }
    }

    #[test]
    fn ramp_midpoint_splits_evenly() {
        // midpoint between startP2=1500 and fullP2=5000
        let result = allocate(dec!(3250), &cfg());
        assert!((result.vector.w1 - 0.5).abs() < 1e-6);
        assert!((result.vector.w2 - 0.5).abs() < 1e-6);
        assert_eq!(result.vector.w3, 0.0);
    }

    #[test]
    fn full_p3_ramp_redistributes_within_w23_instead_of_adding_to_it() {
        let result = allocate(dec!(50_000), &cfg());
        assert_eq!(result.vector.w1, 0.0);
        assert!((result.vector.w2 - 0.66).abs() < 1e-6);
        assert!((result.vector.w3 - 0.34).abs() < 1e-6);
    }

    #[test]
    fn negative_equity_is_degraded() {
        let result = allocate(dec!(-500), &cfg());
        assert!(result.degraded);
        assert_eq!(result.equity, Decimal::ZERO);
        assert_eq!(result.vector.w1, 1.0);
    }
}
