//! Circuit Breaker: daily-drawdown / min-equity / consecutive-loss
//! state machine with an operator-reset-or-cooldown recovery path.
//!
//! Equity/peak/throttle bookkeeping generalized from a boolean throttle
//! to three named states with an explicit `CircuitState` enum + dispatch
//! shape.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Tripped,
    Cooldown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub active: bool,
    pub state: CircuitState,
    pub equity_level: Decimal,
    pub daily_start_equity: Decimal,
    pub consecutive_losses: u32,
    pub loss_timestamps: VecDeque<DateTime<Utc>>,
    pub tripped_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_trip_reason: Option<String>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            active: false,
            state: CircuitState::Closed,
            equity_level: Decimal::ZERO,
            daily_start_equity: Decimal::ZERO,
            consecutive_losses: 0,
            loss_timestamps: VecDeque::new(),
            tripped_at: None,
            cooldown_until: None,
            last_trip_reason: None,
        }
    }
}

pub struct CircuitBreaker {
    cfg: BreakerConfig,
    state: CircuitBreakerState,
}

impl CircuitBreaker {
    pub fn new(cfg: BreakerConfig, daily_start_equity: Decimal) -> Self {
        Self {
            cfg,
            state: CircuitBreakerState {
                daily_start_equity,
                equity_level: daily_start_equity,
                ..Default::default()
            },
        }
    }

    pub fn restore(cfg: BreakerConfig, state: CircuitBreakerState) -> Self {
        Self { cfg, state }
    }

    pub fn state(&self) -> &CircuitBreakerState {
        &self.state
    }

    fn drawdown_ratio(&self) -> f64 {
        if self.state.daily_start_equity <= Decimal::ZERO {
            return 0.0;
        }
        let dd = (self.state.daily_start_equity - self.state.equity_level) / self.state.daily_start_equity;
        dd.to_string().parse::<f64>().unwrap_or(0.0)
    }

    fn tripping_condition_cleared(&self) -> bool {
        self.drawdown_ratio() < self.cfg.max_daily_drawdown
            && self.state.equity_level > self.cfg.min_equity
            && self.state.consecutive_losses < self.cfg.consecutive_loss_limit
    }

    /// Folds a fresh equity reading into the state machine. Returns
    /// `Some(reason)` the moment CLOSED -> TRIPPED happens on this call.
    pub fn record_equity(&mut self, equity: Decimal, now: DateTime<Utc>) -> Option<String> {
        self.state.equity_level = equity;
        self.maybe_auto_recover(now);

        if self.state.state != CircuitState::Closed {
            return None;
        }

        let reason = if self.drawdown_ratio() >= self.cfg.max_daily_drawdown {
            Some("daily_drawdown".to_string())
        } else if equity <= self.cfg.min_equity {
            Some("min_equity".to_string())
        } else if self.state.consecutive_losses >= self.cfg.consecutive_loss_limit {
            Some("consecutive_losses".to_string())
        } else {
            None
        };

        if let Some(reason) = reason {
            self.trip(reason.clone(), now);
            return Some(reason);
        }
        None
    }

    /// `record_trade_loss`/`record_trade_win` feed the consecutive-loss window.
    pub fn record_trade_loss(&mut self, now: DateTime<Utc>) {
        self.prune_loss_window(now);
        self.state.loss_timestamps.push_back(now);
        self.state.consecutive_losses = self.state.loss_timestamps.len() as u32;
    }

    pub fn record_trade_win(&mut self) {
        self.state.consecutive_losses = 0;
        self.state.loss_timestamps.clear();
    }

    fn prune_loss_window(&mut self, now: DateTime<Utc>) {
        let window = Duration::seconds(self.cfg.consecutive_loss_window_secs);
        while let Some(front) = self.state.loss_timestamps.front() {
            if now - *front > window {
                self.state.loss_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn trip(&mut self, reason: String, now: DateTime<Utc>) {
        self.state.active = true;
        self.state.state = CircuitState::Tripped;
        self.state.tripped_at = Some(now);
        self.state.last_trip_reason = Some(reason);
        self.state.cooldown_until = None;
    }

    fn maybe_auto_recover(&mut self, now: DateTime<Utc>) {
        if self.state.state == CircuitState::Tripped {
            if let Some(tripped_at) = self.state.tripped_at {
                let cooldown_elapsed = now - tripped_at >= Duration::minutes(self.cfg.cooldown_minutes);
                if cooldown_elapsed && self.tripping_condition_cleared() {
                    self.state.state = CircuitState::Cooldown;
                    self.state.cooldown_until = Some(now);
                }
            }
        }
        if self.state.state == CircuitState::Cooldown && self.tripping_condition_cleared() {
            self.close();
        }
    }

    fn close(&mut self) {
        self.state.active = false;
        self.state.state = CircuitState::Closed;
        self.state.tripped_at = None;
        self.state.cooldown_until = None;
        self.state.last_trip_reason = None;
    }

    /// Operator-initiated reset. Always succeeds regardless of cooldown status.
    pub fn reset(&mut self, _operator_id: &str) {
        self.close();
        self.state.consecutive_losses = 0;
        self.state.loss_timestamps.clear();
    }

    /// `true` while in TRIPPED; any signal must be rejected
    /// `"circuit_breaker:<reason>"` during this window.
    pub fn is_tripped(&self) -> bool {
        self.state.state == CircuitState::Tripped
    }

    pub fn rejection_reason(&self) -> Option<String> {
        self.state
            .last_trip_reason
            .as_ref()
            .map(|r| format!("circuit_breaker:{r}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn trips_on_daily_drawdown() {
        let mut breaker = CircuitBreaker::new(BreakerConfig::default(), dec!(1000));
        let reason = breaker.record_equity(dec!(849), Utc::now());
        assert_eq!(reason, Some("daily_drawdown".to_string()));
        assert!(breaker.is_tripped());
        assert_eq!(breaker.rejection_reason().unwrap(), "circuit_breaker:daily_drawdown");
    }

    #[test]
    fn stays_tripped_until_reset_or_cooldown() {
        let mut breaker = CircuitBreaker::new(BreakerConfig::default(), dec!(1000));
        breaker.record_equity(dec!(800), Utc::now());
        assert!(breaker.is_tripped());
        breaker.record_equity(dec!(1000), Utc::now());
        assert!(breaker.is_tripped(), "must not recover before cooldown elapses");
    }

    #[test]
    fn operator_reset_closes_immediately() {
        let mut breaker = CircuitBreaker::new(BreakerConfig::default(), dec!(1000));
        breaker.record_equity(dec!(800), Utc::now());
        assert!(breaker.is_tripped());
        breaker.reset("operator-1");
        assert!(!breaker.is_tripped());
    }

    #[test]
    fn auto_recovers_after_cooldown_when_condition_cleared() {
        let mut breaker = CircuitBreaker::new(BreakerConfig::default(), dec!(1000));
        let t0 = Utc::now();
        breaker.record_equity(dec!(800), t0);
        assert!(breaker.is_tripped());

        let after_cooldown = t0 + Duration::minutes(31);
        breaker.record_equity(dec!(1000), after_cooldown);
        assert!(!breaker.is_tripped());
    }

    #[test]
    fn trips_on_consecutive_losses() {
        let cfg = BreakerConfig {
            consecutive_loss_limit: 3,
            ..BreakerConfig::default()
        };
        let mut breaker = CircuitBreaker::new(cfg, dec!(1000));
        let now = Utc::now();
        breaker.record_trade_loss(now);
        breaker.record_trade_loss(now);
        breaker.record_trade_loss(now);
        let reason = breaker.record_equity(dec!(1000), now);
        assert_eq!(reason, Some("consecutive_losses".to_string()));
    }
}
