//! Governance (DEFCON): a single global hysteresis-gated level that
//! scales leverage and can block new positions outright.
//!
//! A trigger/release threshold flip generalized from a boolean to four
//! ordered levels, with a monotone-promotion, sustained-recovery-only-demotion
//! helper governing transitions.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DefconLevel {
    Normal,
    Elevated,
    High,
    Critical,
}

impl DefconLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefconLevel::Normal => "NORMAL",
            DefconLevel::Elevated => "ELEVATED",
            DefconLevel::High => "HIGH",
            DefconLevel::Critical => "CRITICAL",
        }
    }

    pub fn leverage_multiplier(&self) -> f64 {
        match self {
            DefconLevel::Normal => 1.0,
            DefconLevel::Elevated => 0.75,
            DefconLevel::High => 0.5,
            DefconLevel::Critical => 0.0,
        }
    }

    pub fn can_open_new_position(&self) -> bool {
        !matches!(self, DefconLevel::Critical)
    }

    fn more_severe(&self, other: &DefconLevel) -> bool {
        self > other
    }
}

#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    pub elevated_error_rate: f64,
    pub high_error_rate: f64,
    pub critical_error_rate: f64,
    pub elevated_confidence: f64,
    pub critical_confidence: f64,
    pub elevated_drawdown: f64,
    pub high_drawdown: f64,
    pub critical_drawdown: f64,
    /// Consecutive clean health reads required before demotion by one level.
    pub recovery_streak: u32,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            elevated_error_rate: 0.05,
            high_error_rate: 0.15,
            critical_error_rate: 0.35,
            elevated_confidence: 0.8,
            critical_confidence: 0.5,
            elevated_drawdown: 0.05,
            high_drawdown: 0.1,
            critical_drawdown: 0.15,
            recovery_streak: 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealthSignals {
    pub error_rate: f64,
    pub min_truth_confidence: f64,
    pub recent_drawdown: f64,
}

#[derive(Debug, Clone, Copy)]
struct ManualOverride {
    level: DefconLevel,
    expires_at: DateTime<Utc>,
}

/// Global DEFCON state machine: monotone promotion on threshold crossing,
/// demotion only after a sustained recovery streak.
pub struct Governance {
    cfg: GovernanceConfig,
    level: DefconLevel,
    recovery_count: u32,
    override_: Option<ManualOverride>,
}

impl Governance {
    pub fn new(cfg: GovernanceConfig) -> Self {
        Self {
            cfg,
            level: DefconLevel::Normal,
            recovery_count: 0,
            override_: None,
        }
    }

    fn natural_level(&self, signals: HealthSignals) -> DefconLevel {
        if signals.error_rate >= self.cfg.critical_error_rate
            || signals.min_truth_confidence < self.cfg.critical_confidence
            || signals.recent_drawdown >= self.cfg.critical_drawdown
        {
            DefconLevel::Critical
        } else if signals.error_rate >= self.cfg.high_error_rate
            || signals.recent_drawdown >= self.cfg.high_drawdown
        {
            DefconLevel::High
        } else if signals.error_rate >= self.cfg.elevated_error_rate
            || signals.min_truth_confidence < self.cfg.elevated_confidence
            || signals.recent_drawdown >= self.cfg.elevated_drawdown
        {
            DefconLevel::Elevated
        } else {
            DefconLevel::Normal
        }
    }

    /// Folds a fresh health reading into the state machine and returns the
    /// effective level (override, if one is active and unexpired, wins).
    pub fn update(&mut self, signals: HealthSignals, now: DateTime<Utc>) -> DefconLevel {
        if let Some(ov) = self.override_ {
            if ov.expires_at > now {
                return ov.level;
            }
            self.override_ = None;
        }

        let natural = self.natural_level(signals);
        if natural.more_severe(&self.level) {
            self.level = natural;
            self.recovery_count = 0;
        } else if natural < self.level {
            self.recovery_count += 1;
            if self.recovery_count >= self.cfg.recovery_streak {
                self.level = demote(self.level);
                self.recovery_count = 0;
            }
        } else {
            self.recovery_count = 0;
        }
        self.level
    }

    /// Pins the level until `expires_at`, bypassing the natural computation.
    /// Callers are responsible for logging this as an event the moment it's applied.
    pub fn set_override(&mut self, level: DefconLevel, expires_at: DateTime<Utc>) {
        self.override_ = Some(ManualOverride { level, expires_at });
    }

    pub fn clear_override(&mut self) {
        self.override_ = None;
    }

    pub fn current(&self) -> DefconLevel {
        self.override_.map(|o| o.level).unwrap_or(self.level)
    }
}

fn demote(level: DefconLevel) -> DefconLevel {
    match level {
        DefconLevel::Critical => DefconLevel::High,
        DefconLevel::High => DefconLevel::Elevated,
        DefconLevel::Elevated => DefconLevel::Normal,
        DefconLevel::Normal => DefconLevel::Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean() -> HealthSignals {
        HealthSignals {
            error_rate: 0.0,
            min_truth_confidence: 1.0,
            recent_drawdown: 0.0,
        }
    }

    #[test]
    fn starts_normal() {
        let gov = Governance::new(GovernanceConfig::default());
        assert_eq!(gov.current(), DefconLevel::Normal);
    }

    #[test]
    fn promotes_immediately_on_critical_signal() {
        let mut gov = Governance::new(GovernanceConfig::default());
        let signals = HealthSignals {
            error_rate: 0.9,
            ..clean()
        };
        let level = gov.update(signals, Utc::now());
        assert_eq!(level, DefconLevel::Critical);
        assert_eq!(level.leverage_multiplier(), 0.0);
        assert!(!level.can_open_new_position());
    }

    #[test]
    fn demotion_requires_sustained_recovery() {
        let cfg = GovernanceConfig {
            recovery_streak: 2,
            ..GovernanceConfig::default()
        };
        let mut gov = Governance::new(cfg);
        gov.update(HealthSignals { error_rate: 0.9, ..clean() }, Utc::now());
        assert_eq!(gov.current(), DefconLevel::Critical);

        // One clean read isn't enough to demote yet.
        gov.update(clean(), Utc::now());
        assert_eq!(gov.current(), DefconLevel::Critical);

        // Second consecutive clean read demotes by exactly one level.
        gov.update(clean(), Utc::now());
        assert_eq!(gov.current(), DefconLevel::High);
    }

    #[test]
    fn override_wins_until_expiry() {
        let mut gov = Governance::new(GovernanceConfig::default());
        let expires = Utc::now() + chrono::Duration::minutes(5);
        gov.set_override(DefconLevel::High, expires);
        let level = gov.update(clean(), Utc::now());
        assert_eq!(level, DefconLevel::High);
    }
}
