//! `BrainConfig` — environment-derived configuration: every field reads
//! an env var, falls back to a documented default, and parses defensively.

use rust_decimal::Decimal;
use std::str::FromStr;

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|v| Decimal::from_str(&v).ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone)]
pub struct AllocationConfig {
    pub start_p2: Decimal,
    pub full_p2: Decimal,
    pub start_p3: Decimal,
    pub full_p3: Decimal,
    /// Fraction of w1 that migrates out to the w2/w3 pool once the P2 ramp completes.
    pub p2_full_share: f64,
    /// Fraction of that pool that shifts from w2 into w3 once the P3 ramp completes.
    pub p3_full_share: f64,
    /// Leverage cap by equity tier: MICRO, SMALL, MEDIUM, LARGE, INSTITUTIONAL.
    pub leverage_caps: [f64; 5],
    pub tier_thresholds: [Decimal; 4],
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            start_p2: Decimal::new(1500, 0),
            full_p2: Decimal::new(5000, 0),
            start_p3: Decimal::new(10_000, 0),
            full_p3: Decimal::new(50_000, 0),
            p2_full_share: 1.0,
            p3_full_share: 0.34,
            leverage_caps: [2.0, 3.0, 5.0, 8.0, 10.0],
            tier_thresholds: [
                Decimal::new(1_000, 0),
                Decimal::new(10_000, 0),
                Decimal::new(100_000, 0),
                Decimal::new(1_000_000, 0),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceConfig {
    pub window_days: u32,
    pub min_trade_count: u32,
    pub malus_multiplier: f64,
    pub bonus_multiplier: f64,
    pub malus_threshold: f64,
    pub bonus_threshold: f64,
    pub avg_trades_per_day: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            min_trade_count: 10,
            malus_multiplier: 0.5,
            bonus_multiplier: 1.2,
            malus_threshold: 0.0,
            bonus_threshold: 2.0,
            avg_trades_per_day: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub max_correlation: f64,
    pub correlation_penalty: f64,
    pub beta_update_interval_secs: u64,
    pub correlation_update_interval_secs: u64,
    pub min_stop_distance_multiplier: f64,
    pub max_portfolio_beta: f64,
    pub per_symbol_net_cap: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_correlation: 0.75,
            correlation_penalty: 0.5,
            beta_update_interval_secs: 60,
            correlation_update_interval_secs: 60,
            min_stop_distance_multiplier: 1.5,
            max_portfolio_beta: 2.0,
            per_symbol_net_cap: Decimal::new(1_000_000, 0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub max_daily_drawdown: f64,
    pub min_equity: Decimal,
    pub consecutive_loss_limit: u32,
    pub consecutive_loss_window_secs: i64,
    pub cooldown_minutes: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_daily_drawdown: 0.15,
            min_equity: Decimal::new(100, 0),
            consecutive_loss_limit: 5,
            consecutive_loss_window_secs: 3600,
            cooldown_minutes: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapitalFlowConfig {
    pub sweep_threshold: f64,
    pub reserve_limit: Decimal,
    pub sweep_schedule_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for CapitalFlowConfig {
    fn default() -> Self {
        Self {
            sweep_threshold: 1.2,
            reserve_limit: Decimal::new(10_000, 0),
            sweep_schedule_secs: 300,
            max_retries: 5,
            retry_base_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrainRuntimeConfig {
    pub signal_timeout_ms: u64,
    pub metric_update_interval_secs: u64,
    pub dashboard_cache_ttl_secs: u64,
    pub max_queue_size: usize,
    pub idempotency_ttl_secs: i64,
}

impl Default for BrainRuntimeConfig {
    fn default() -> Self {
        Self {
            signal_timeout_ms: 100,
            metric_update_interval_secs: 15,
            dashboard_cache_ttl_secs: 5,
            max_queue_size: 10_000,
            idempotency_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub interval_ms: u64,
    pub exchanges: Vec<String>,
    pub auto_resolve: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            exchanges: vec!["binance".to_string()],
            auto_resolve: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrainConfig {
    pub database_path: String,
    pub initial_equity: Decimal,
    pub redis_url: Option<String>,
    pub redis_disabled: bool,
    pub nats_url: Option<String>,
    pub ws_port: u16,
    pub webhook_secret: String,
    pub log_level: String,

    pub allocation: AllocationConfig,
    pub performance: PerformanceConfig,
    pub risk: RiskConfig,
    pub breaker: BreakerConfig,
    pub capital_flow: CapitalFlowConfig,
    pub brain: BrainRuntimeConfig,
    pub reconciliation: ReconciliationConfig,
}

impl BrainConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path = env_string("DB_PATH", "./brain.db");
        let initial_equity = env_decimal("INITIAL_EQUITY", Decimal::new(1_000, 0));
        let redis_disabled = std::env::var("REDIS_DISABLED")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE"))
            .unwrap_or(true);
        let redis_url = std::env::var("REDIS_URL").ok();
        let nats_url = std::env::var("NATS_URL").ok();
        let ws_port = env_parse("WS_PORT", 8080u16);
        let webhook_secret = env_string("WEBHOOK_SECRET", "");
        let log_level = env_string("LOG_LEVEL", "info");

        Ok(Self {
            database_path,
            initial_equity,
            redis_url,
            redis_disabled,
            nats_url,
            ws_port,
            webhook_secret,
            log_level,
            allocation: AllocationConfig::default(),
            performance: PerformanceConfig::default(),
            risk: RiskConfig::default(),
            breaker: BreakerConfig::default(),
            capital_flow: CapitalFlowConfig::default(),
            brain: BrainRuntimeConfig::default(),
            reconciliation: ReconciliationConfig::default(),
        })
    }
}
