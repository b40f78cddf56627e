//! Positions and the in-memory `PositionManager` the signal processor
//! exclusively mutates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::signal::PhaseId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: f64,
    pub phase_id: PhaseId,
    pub exchange: String,
}

impl Position {
    pub fn signed_size(&self) -> Decimal {
        match self.side {
            PositionSide::Long => self.size,
            PositionSide::Short => -self.size,
        }
    }

    fn key(symbol: &str, phase: PhaseId, exchange: &str) -> String {
        format!("{symbol}|{}|{exchange}", phase.as_str())
    }
}

/// Owned exclusively by the SignalProcessor loop (or an event-replay loop
/// under the same lock).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PositionManager {
    positions: HashMap<String, Position>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_fill(
        &mut self,
        symbol: &str,
        phase: PhaseId,
        exchange: &str,
        side: PositionSide,
        fill_size: Decimal,
        fill_price: Decimal,
        leverage: f64,
    ) {
        let key = Position::key(symbol, phase, exchange);
        match self.positions.get_mut(&key) {
            Some(existing) if existing.side == side => {
                let total = existing.size + fill_size;
                if total > Decimal::ZERO {
                    existing.entry_price = (existing.entry_price * existing.size
                        + fill_price * fill_size)
                        / total;
                }
                existing.size = total;
                existing.leverage = leverage;
            }
            Some(existing) => {
                // Opposing fill: reduce, and flip side if it overshoots.
                if fill_size >= existing.size {
                    let remainder = fill_size - existing.size;
                    if remainder > Decimal::ZERO {
                        existing.side = side;
                        existing.size = remainder;
                        existing.entry_price = fill_price;
                    } else {
                        self.positions.remove(&key);
                    }
                } else {
                    existing.size -= fill_size;
                }
            }
            None => {
                self.positions.insert(
                    key,
                    Position {
                        symbol: symbol.to_string(),
                        side,
                        size: fill_size,
                        entry_price: fill_price,
                        unrealized_pnl: Decimal::ZERO,
                        leverage,
                        phase_id: phase,
                        exchange: exchange.to_string(),
                    },
                );
            }
        }
        // Closed positions (size -> 0) are pruned.
        self.positions.retain(|_, p| p.size > Decimal::ZERO);
    }

    pub fn mark(&mut self, symbol: &str, phase: PhaseId, exchange: &str, mark_price: Decimal) {
        let key = Position::key(symbol, phase, exchange);
        if let Some(pos) = self.positions.get_mut(&key) {
            let delta = mark_price - pos.entry_price;
            pos.unrealized_pnl = match pos.side {
                PositionSide::Long => delta * pos.size,
                PositionSide::Short => -delta * pos.size,
            };
        }
    }

    pub fn get(&self, symbol: &str, phase: PhaseId, exchange: &str) -> Option<&Position> {
        self.positions.get(&Position::key(symbol, phase, exchange))
    }

    pub fn all(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn for_symbol(&self, symbol: &str) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(move |p| p.symbol == symbol)
    }

    pub fn phase_notional(&self, phase: PhaseId) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.phase_id == phase)
            .map(|p| p.size * p.entry_price)
            .sum()
    }

    pub fn net_signed_size(&self, symbol: &str) -> Decimal {
        self.for_symbol(symbol).map(|p| p.signed_size()).sum()
    }

    pub fn remove_if_zero(&mut self) {
        self.positions.retain(|_, p| p.size > Decimal::ZERO);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn opening_and_closing_a_position_round_trips() {
        let mut pm = PositionManager::new();
        pm.apply_fill(
            "BTC",
            PhaseId::P1,
            "binance",
            PositionSide::Long,
            dec!(1),
            dec!(100),
            1.0,
        );
        assert_eq!(pm.get("BTC", PhaseId::P1, "binance").unwrap().size, dec!(1));

        pm.apply_fill(
            "BTC",
            PhaseId::P1,
            "binance",
            PositionSide::Short,
            dec!(1),
            dec!(110),
            1.0,
        );
        assert!(pm.get("BTC", PhaseId::P1, "binance").is_none());
    }

    #[test]
    fn net_signed_size_sums_across_phases() {
        let mut pm = PositionManager::new();
        pm.apply_fill("BTC", PhaseId::P1, "binance", PositionSide::Long, dec!(5), dec!(100), 1.0);
        pm.apply_fill("BTC", PhaseId::P2, "binance", PositionSide::Short, dec!(2), dec!(100), 1.0);
        assert_eq!(pm.net_signed_size("BTC"), dec!(3));
    }
}
