//! Performance Tracker: rolling per-phase P&L window emitting a
//! modifier in [0.5, 1.2] applied to authorized size.
//!
//! Uses a bounded-`VecDeque`-history shape with write-through persistence:
//! recording a trade mutates state in place and the caller persists it.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::Clock;
use crate::config::PerformanceConfig;
use crate::domain::PhaseId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub pnl: f64,
    pub symbol: String,
    pub side: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasePerformance {
    pub phase_id: PhaseId,
    pub modifier: f64,
    pub trade_count: u32,
    pub window_pnl: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PhaseWindow {
    trades: VecDeque<TradeRecord>,
}

/// Per-phase rolling P&L window and the derived size modifier.
pub struct PerformanceTracker {
    cfg: PerformanceConfig,
    windows: HashMap<PhaseId, PhaseWindow>,
}

impl PerformanceTracker {
    pub fn new(cfg: PerformanceConfig) -> Self {
        let mut windows = HashMap::new();
        for phase in PhaseId::all() {
            windows.insert(phase, PhaseWindow::default());
        }
        Self { cfg, windows }
    }

    /// Rebuilds a tracker from a persisted `snapshot_json` payload, falling
    /// back to empty windows on missing/malformed input.
    pub fn restore(cfg: PerformanceConfig, raw: Option<&str>) -> Self {
        let mut tracker = Self::new(cfg);
        if let Some(raw) = raw {
            if let Ok(pairs) = serde_json::from_str::<Vec<(PhaseId, PhaseWindow)>>(raw) {
                for (phase, window) in pairs {
                    tracker.windows.insert(phase, window);
                }
            }
        }
        tracker
    }

    fn capacity(&self) -> usize {
        (self.cfg.window_days as usize) * (self.cfg.avg_trades_per_day as usize)
    }

    /// `record(phaseId, pnl, symbol, side)`.
    pub fn record(&mut self, phase: PhaseId, pnl: f64, symbol: &str, side: &str, clock: &dyn Clock) {
        let cap = self.capacity().max(1);
        let window = self.windows.entry(phase).or_default();
        if window.trades.len() >= cap {
            window.trades.pop_front();
        }
        window.trades.push_back(TradeRecord {
            pnl,
            symbol: symbol.to_string(),
            side: side.to_string(),
            at: clock.now(),
        });
    }

    /// `modifier(phaseId) -> m`.
    pub fn modifier(&self, phase: PhaseId) -> f64 {
        self.snapshot(phase).modifier
    }

    pub fn snapshot(&self, phase: PhaseId) -> PhasePerformance {
        let window = self.windows.get(&phase);
        let (trade_count, window_pnl, mean) = match window {
            Some(w) if !w.trades.is_empty() => {
                let count = w.trades.len() as u32;
                let sum: f64 = w.trades.iter().map(|t| t.pnl).sum();
                (count, sum, sum / count as f64)
            }
            _ => (0, 0.0, 0.0),
        };

        let modifier = if trade_count < self.cfg.min_trade_count {
            1.0
        } else if mean <= self.cfg.malus_threshold {
            (1.0 + mean * self.cfg.malus_multiplier).max(0.5)
        } else if mean >= self.cfg.bonus_threshold {
            self.cfg.bonus_multiplier.min(1.2)
        } else {
            1.0
        };

        PhasePerformance {
            phase_id: phase,
            modifier,
            trade_count,
            window_pnl,
        }
    }

    pub fn all_snapshots(&self) -> Vec<PhasePerformance> {
        PhaseId::all().iter().map(|p| self.snapshot(*p)).collect()
    }

    /// Serializes every window for write-through persistence; callers
    /// mirror this into the KV store on every `record`.
    pub fn snapshot_json(&self) -> String {
        let pairs: Vec<(PhaseId, &PhaseWindow)> = self.windows.iter().map(|(k, v)| (*k, v)).collect();
        serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SystemClock;

    #[test]
    fn neutral_modifier_below_min_trade_count() {
        let mut tracker = PerformanceTracker::new(PerformanceConfig::default());
        tracker.record(PhaseId::P1, -50.0, "BTC", "BUY", &SystemClock);
        assert_eq!(tracker.modifier(PhaseId::P1), 1.0);
    }

    #[test]
    fn malus_applies_on_negative_mean() {
        let cfg = PerformanceConfig {
            min_trade_count: 2,
            ..PerformanceConfig::default()
        };
        let mut tracker = PerformanceTracker::new(cfg);
        for _ in 0..5 {
            tracker.record(PhaseId::P1, -10.0, "BTC", "BUY", &SystemClock);
        }
        let m = tracker.modifier(PhaseId::P1);
        assert!(m < 1.0);
        assert!(m >= 0.5);
    }

    #[test]
    fn bonus_caps_at_1_2() {
        let cfg = PerformanceConfig {
            min_trade_count: 2,
            bonus_threshold: 1.0,
            bonus_multiplier: 1.2,
            ..PerformanceConfig::default()
        };
        let mut tracker = PerformanceTracker::new(cfg);
        for _ in 0..5 {
            tracker.record(PhaseId::P1, 50.0, "BTC", "BUY", &SystemClock);
        }
        assert_eq!(tracker.modifier(PhaseId::P1), 1.2);
    }

    #[test]
    fn window_is_bounded() {
        let cfg = PerformanceConfig {
            window_days: 1,
            avg_trades_per_day: 3,
            min_trade_count: 1,
            ..PerformanceConfig::default()
        };
        let mut tracker = PerformanceTracker::new(cfg);
        for i in 0..10 {
            tracker.record(PhaseId::P1, i as f64, "BTC", "BUY", &SystemClock);
        }
        assert_eq!(tracker.snapshot(PhaseId::P1).trade_count, 3);
    }

    #[test]
    fn restore_round_trips_snapshot_json() {
        let cfg = PerformanceConfig {
            min_trade_count: 1,
            ..PerformanceConfig::default()
        };
        let mut tracker = PerformanceTracker::new(cfg.clone());
        tracker.record(PhaseId::P2, -5.0, "ETH", "SELL", &SystemClock);
        let raw = tracker.snapshot_json();

        let restored = PerformanceTracker::restore(cfg, Some(&raw));
        assert_eq!(restored.snapshot(PhaseId::P2).trade_count, 1);
        assert_eq!(restored.snapshot(PhaseId::P1).trade_count, 0);
    }

    #[test]
    fn restore_falls_back_to_empty_on_malformed_input() {
        let restored = PerformanceTracker::restore(PerformanceConfig::default(), Some("not json"));
        assert_eq!(restored.snapshot(PhaseId::P1).trade_count, 0);
    }
}
