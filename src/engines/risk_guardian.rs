//! Risk Guardian: sequential per-signal guardrail checks.
//!
//! A sequence of named checks each pushing a flag into `guardrail_flags`:
//! hard-reject checks short-circuit, soft checks shrink the candidate size
//! instead of rejecting it. Correlation/beta snapshot refresh uses
//! `statrs::statistics::Statistics` (`mean`/`std_dev`) over sorted history.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::config::RiskConfig;
use crate::domain::{IntentSignal, PhaseId, PositionManager, Side};
use crate::engines::governance::DefconLevel;

#[derive(Debug, Clone)]
pub struct RiskVerdict {
    pub approved: bool,
    pub authorized_base_size: Decimal,
    pub reason: String,
    pub guardrail_flags: Vec<String>,
}

/// Background-refreshed correlation/beta snapshot, held behind a
/// `parking_lot::RwLock` by the orchestrator and consumed read-only here.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    /// Average absolute correlation of each symbol with the rest of the book.
    pub correlations: HashMap<String, f64>,
    /// Portfolio beta to the reference market after hypothetically admitting a symbol.
    pub betas: HashMap<String, f64>,
    pub atr: HashMap<String, Decimal>,
}

impl MarketSnapshot {
    /// Refreshes `correlations`/`betas` from parallel return series using
    /// `statrs`'s summary statistics, mirroring `risk.rs`'s VaR computation
    /// over sorted historical P&L.
    pub fn refresh_from_returns(&mut self, returns: &HashMap<String, Vec<f64>>, market_returns: &[f64]) {
        use statrs::statistics::Statistics;

        if market_returns.len() < 2 {
            return;
        }
        let market_mean = market_returns.to_vec().mean();
        let market_var = market_returns.to_vec().variance();

        for (symbol, series) in returns {
            if series.len() < 2 {
                continue;
            }
            let n = series.len().min(market_returns.len());
            let s = &series[series.len() - n..];
            let m = &market_returns[market_returns.len() - n..];

            let sym_mean = s.to_vec().mean();
            let cov: f64 = s
                .iter()
                .zip(m.iter())
                .map(|(a, b)| (a - sym_mean) * (b - market_mean))
                .sum::<f64>()
                / n as f64;
            let sym_std = s.to_vec().std_dev();
            let market_std = market_var.sqrt();

            let correlation = if sym_std > 0.0 && market_std > 0.0 {
                (cov / (sym_std * market_std)).abs()
            } else {
                0.0
            };
            let beta = if market_var > 0.0 { cov / market_var } else { 0.0 };

            self.correlations.insert(symbol.clone(), correlation);
            self.betas.insert(symbol.clone(), beta);
        }
    }
}

pub struct RiskGuardian {
    cfg: RiskConfig,
}

impl RiskGuardian {
    pub fn new(cfg: RiskConfig) -> Self {
        Self { cfg }
    }

    /// `evaluate(signal, currentPositions, allocation, defcon) -> RiskVerdict`.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        signal: &IntentSignal,
        positions: &PositionManager,
        candidate_size: Decimal,
        equity: Decimal,
        weight_for_phase: f64,
        tier_cap: f64,
        defcon: DefconLevel,
        market: &MarketSnapshot,
    ) -> RiskVerdict {
        let mut flags = Vec::new();

        // 1. Leverage cap: hard reject.
        let phase_notional = positions.phase_notional(signal.phase_id) + candidate_size * signal.entry_price.unwrap_or(Decimal::ONE);
        let leverage_budget = equity
            * Decimal::from_f64_retain(weight_for_phase).unwrap_or(Decimal::ZERO)
            * Decimal::from_f64_retain(tier_cap).unwrap_or(Decimal::ZERO)
            * Decimal::from_f64_retain(defcon.leverage_multiplier()).unwrap_or(Decimal::ZERO);
        if phase_notional > leverage_budget {
            flags.push("leverage_cap".to_string());
            return RiskVerdict {
                approved: false,
                authorized_base_size: Decimal::ZERO,
                reason: "leverage_cap".to_string(),
                guardrail_flags: flags,
            };
        }

        // 2. Net delta: hard reject.
        let existing_net = positions.net_signed_size(&signal.symbol);
        let candidate_signed = candidate_size * Decimal::from(signal.side.sign() as i32);
        let projected_net = (existing_net + candidate_signed).abs();
        if projected_net > self.cfg.per_symbol_net_cap {
            flags.push("net_delta_cap".to_string());
            return RiskVerdict {
                approved: false,
                authorized_base_size: Decimal::ZERO,
                reason: "net_delta_cap".to_string(),
                guardrail_flags: flags,
            };
        }

        let mut size = candidate_size;

        // 3. Correlation cap: soft, shrinks size.
        let correlation = market.correlations.get(&signal.symbol).copied().unwrap_or(0.0);
        if correlation > self.cfg.max_correlation {
            flags.push("correlation_penalty".to_string());
            size *= Decimal::from_f64_retain(self.cfg.correlation_penalty).unwrap_or(Decimal::ONE);
        }

        // 4. Portfolio beta: soft, shrinks size to the policy band edge.
        let beta = market.betas.get(&signal.symbol).copied().unwrap_or(0.0);
        if beta.abs() > self.cfg.max_portfolio_beta && beta.abs() > 0.0 {
            flags.push("beta_band_shrink".to_string());
            let shrink_ratio = self.cfg.max_portfolio_beta / beta.abs();
            size *= Decimal::from_f64_retain(shrink_ratio).unwrap_or(Decimal::ONE);
        }

        // 5. Stop distance: hard reject when an advisory stop accompanies the signal.
        if let (Some(entry), Some(stop)) = (signal.entry_price, signal.stop_price) {
            let atr = market.atr.get(&signal.symbol).copied().unwrap_or(Decimal::ZERO);
            if atr > Decimal::ZERO {
                let min_distance =
                    atr * Decimal::from_f64_retain(self.cfg.min_stop_distance_multiplier).unwrap_or(Decimal::ONE);
                if (entry - stop).abs() < min_distance {
                    flags.push("stop_too_tight".to_string());
                    return RiskVerdict {
                        approved: false,
                        authorized_base_size: Decimal::ZERO,
                        reason: "stop_too_tight".to_string(),
                        guardrail_flags: flags,
                    };
                }
            }
        }

        RiskVerdict {
            approved: true,
            authorized_base_size: size,
            reason: "approved".to_string(),
            guardrail_flags: flags,
        }
    }
}
