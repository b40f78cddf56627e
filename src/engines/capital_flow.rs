//! Capital Flow Manager: scheduled sweep of surplus futures-wallet
//! capital into spot once above a high-watermark trigger.
//!
//! Scheduling follows a `tokio::time::interval`-driven background-task
//! shape; retry backoff follows an exponential-backoff-with-retry-budget
//! shape.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::CapitalFlowConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    NotDue,
    Swept { amount: Decimal, run_id: String },
    Failed { run_id: String, attempts: u32 },
}

#[derive(Debug, Clone)]
struct InFlightRetry {
    run_id: String,
    attempts: u32,
}

/// Monotonic high-watermark plus a sweep scheduler with bounded retries.
pub struct CapitalFlowManager {
    cfg: CapitalFlowConfig,
    high_watermark: Decimal,
    completed_run_ids: Vec<String>,
    in_flight: Option<InFlightRetry>,
}

impl CapitalFlowManager {
    pub fn new(cfg: CapitalFlowConfig, high_watermark: Decimal) -> Self {
        Self {
            cfg,
            high_watermark,
            completed_run_ids: Vec::new(),
            in_flight: None,
        }
    }

    pub fn high_watermark(&self) -> Decimal {
        self.high_watermark
    }

    fn is_due(&self, futures_wallet: Decimal) -> bool {
        if self.high_watermark <= Decimal::ZERO {
            return false;
        }
        let threshold = self.high_watermark * Decimal::from_f64_retain(self.cfg.sweep_threshold).unwrap_or(Decimal::ONE);
        futures_wallet >= threshold
    }

    /// Evaluates whether a sweep is due and, if a transfer function is
    /// supplied, attempts it with bounded exponential backoff, returning the
    /// outcome. `transfer` returns `Ok(())` on success.
    pub fn evaluate<F>(&mut self, futures_wallet: Decimal, mut transfer: F) -> SweepOutcome
    where
        F: FnMut(Decimal) -> Result<(), String>,
    {
        if !self.is_due(futures_wallet) {
            return SweepOutcome::NotDue;
        }

        let surplus = futures_wallet - self.cfg.reserve_limit;
        if surplus <= Decimal::ZERO {
            return SweepOutcome::NotDue;
        }

        let run_id = self
            .in_flight
            .as_ref()
            .map(|r| r.run_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if self.completed_run_ids.contains(&run_id) {
            return SweepOutcome::Swept {
                amount: surplus,
                run_id,
            };
        }

        let mut attempts = self.in_flight.as_ref().map(|r| r.attempts).unwrap_or(0);
        loop {
            attempts += 1;
            match transfer(surplus) {
                Ok(()) => {
                    self.completed_run_ids.push(run_id.clone());
                    self.high_watermark = self.high_watermark.max(futures_wallet);
                    self.in_flight = None;
                    return SweepOutcome::Swept {
                        amount: surplus,
                        run_id,
                    };
                }
                Err(_) if attempts < self.cfg.max_retries => {
                    continue;
                }
                Err(_) => {
                    self.in_flight = Some(InFlightRetry {
                        run_id: run_id.clone(),
                        attempts,
                    });
                    return SweepOutcome::Failed { run_id, attempts };
                }
            }
        }
    }

    /// Backoff delay for the given attempt number, exponential with a fixed base.
    pub fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        self.cfg.retry_base_delay_ms.saturating_mul(1u64 << attempt.min(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn not_due_below_threshold() {
        let mut manager = CapitalFlowManager::new(CapitalFlowConfig::default(), dec!(1000));
        let outcome = manager.evaluate(dec!(500), |_| Ok(()));
        assert_eq!(outcome, SweepOutcome::NotDue);
    }

    #[test]
    fn sweeps_surplus_above_reserve() {
        let cfg = CapitalFlowConfig {
            sweep_threshold: 1.0,
            reserve_limit: dec!(100),
            ..CapitalFlowConfig::default()
        };
        let mut manager = CapitalFlowManager::new(cfg, dec!(1000));
        let outcome = manager.evaluate(dec!(1200), |_| Ok(()));
        match outcome {
            SweepOutcome::Swept { amount, .. } => assert_eq!(amount, dec!(1100)),
            other => panic!("expected Swept, got {other:?}"),
        }
    }

    #[test]
    fn retries_then_fails_after_budget() {
        let cfg = CapitalFlowConfig {
            sweep_threshold: 1.0,
            reserve_limit: dec!(100),
            max_retries: 3,
            ..CapitalFlowConfig::default()
        };
        let mut manager = CapitalFlowManager::new(cfg, dec!(1000));
        let outcome = manager.evaluate(dec!(1200), |_| Err("timeout".to_string()));
        match outcome {
            SweepOutcome::Failed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn high_watermark_updates_monotonically_on_success() {
        let cfg = CapitalFlowConfig {
            sweep_threshold: 1.0,
            reserve_limit: dec!(100),
            ..CapitalFlowConfig::default()
        };
        let mut manager = CapitalFlowManager::new(cfg, dec!(1000));
        manager.evaluate(dec!(2000), |_| Ok(()));
        assert_eq!(manager.high_watermark(), dec!(2000));
    }
}
