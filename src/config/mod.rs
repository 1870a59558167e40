//! Configuration for the arbitrage engine.
//!
//! Values load from environment variables (a `.env` file is honored), can be
//! overridden through the flat dotted-key surface (`trading.min_profit_usd`,
//! `venue.binance.reconnect_initial_ms`, ...), and propagate to running
//! components through a watch channel for hot reload.

use crate::domain::errors::EngineError;
use crate::domain::execution::SizingStrategy;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use tokio::sync::watch;

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Detection and validation thresholds.
#[derive(Debug, Clone)]
pub struct TradingConfig {
    pub min_profit_usd: Decimal,
    /// Minimum percentage spread, in percent (0.05 means 0.05%).
    pub min_profit_pct: f64,
    pub min_confidence: f64,
    pub min_liquidity: f64,
    pub max_position_usd: Decimal,
    pub max_correlation: f64,
    pub min_opportunity_duration_ms: u64,
    pub max_data_age_ms: u64,
    /// Funding-rate strategy trigger; differences at or below are ignored.
    pub min_funding_diff: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            min_profit_usd: Decimal::TEN,
            min_profit_pct: 0.05,
            min_confidence: 0.7,
            min_liquidity: 0.5,
            max_position_usd: Decimal::from(10_000),
            max_correlation: 0.8,
            min_opportunity_duration_ms: 5_000,
            max_data_age_ms: 5_000,
            min_funding_diff: 0.0001,
        }
    }
}

/// Risk monitor limits and cadence.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub max_portfolio_var: f64,
    pub max_leverage: f64,
    pub max_concentration: f64,
    pub liquidity_threshold: f64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub var_confidence: f64,
    pub var_simulations: usize,
    pub monitor_interval_ms: u64,
    pub alert_ttl_minutes: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_portfolio_var: 0.02,
            max_leverage: 3.0,
            max_concentration: 0.25,
            liquidity_threshold: 0.3,
            warning_threshold: 0.8,
            critical_threshold: 0.95,
            var_confidence: 0.95,
            var_simulations: 10_000,
            monitor_interval_ms: 5_000,
            alert_ttl_minutes: 30,
        }
    }
}

/// Execution planner sizing and timing parameters.
#[derive(Debug, Clone)]
pub struct SizingConfig {
    pub method: SizingStrategy,
    pub kelly_fraction: f64,
    pub target_volatility: f64,
    pub max_drawdown_limit: f64,
    pub fixed_percent: f64,
    pub min_position_size: Decimal,
    pub max_position_size: Decimal,
    pub max_single_trade_capital: Decimal,
    pub max_total_capital_utilization: f64,
    pub slippage_tolerance: f64,
    pub stop_loss_threshold: f64,
    pub leg_stagger_ms: u64,
    pub inter_plan_delay_ms: u64,
    pub max_execution_window_ms: u64,
    /// Mirror of `risk.max_portfolio_var` used by risk-parity sizing.
    pub max_portfolio_var: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingStrategy::Kelly,
            kelly_fraction: 0.25,
            target_volatility: 0.15,
            max_drawdown_limit: 0.1,
            fixed_percent: 0.02,
            min_position_size: Decimal::from(100),
            max_position_size: Decimal::from(10_000),
            max_single_trade_capital: Decimal::from(50_000),
            max_total_capital_utilization: 0.8,
            slippage_tolerance: 0.001,
            stop_loss_threshold: 0.05,
            leg_stagger_ms: 100,
            inter_plan_delay_ms: 1_000,
            max_execution_window_ms: 5_000,
            max_portfolio_var: 0.02,
        }
    }
}

/// Fair-value model constants.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Funding settlements per day (8-hour cycle on the major venues).
    pub funding_periods_per_day: f64,
    /// Damping constant applied to the annualized funding rate when deriving
    /// the synthetic perp. The 0.01 default is inherited from the reference
    /// data and deliberately configurable.
    pub funding_damping: f64,
    pub risk_free_rate: f64,
    /// Tenor assumed for `-FUT` instruments without an explicit expiry.
    pub future_tenor_days: f64,
    /// Assumed correlation between the legs of a multi-leg trade when no
    /// estimate is available.
    pub default_leg_correlation: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            funding_periods_per_day: 3.0,
            funding_damping: 0.01,
            risk_free_rate: 0.05,
            future_tenor_days: 90.0,
            default_leg_correlation: 0.6,
        }
    }
}

/// Ranker weights; the five sub-scores must stay normalized.
#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub profit_weight: f64,
    pub risk_weight: f64,
    pub sharpe_weight: f64,
    pub capital_efficiency_weight: f64,
    pub liquidity_weight: f64,
    pub risk_free_rate: f64,
    /// Surface non-executable candidates instead of dropping them.
    pub keep_rejected: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            profit_weight: 0.30,
            risk_weight: 0.25,
            sharpe_weight: 0.20,
            capital_efficiency_weight: 0.15,
            liquidity_weight: 0.10,
            risk_free_rate: 0.05,
            keep_rejected: false,
        }
    }
}

/// Detection loop cadence and cache staleness.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub interval_ms: u64,
    pub staleness_window_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            staleness_window_ms: 5_000,
        }
    }
}

/// P&L tracker cadence and retention.
#[derive(Debug, Clone)]
pub struct PnlConfig {
    pub snapshot_interval_minutes: i64,
    pub retention_days: i64,
}

impl Default for PnlConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_minutes: 5,
            retention_days: 30,
        }
    }
}

/// Per-venue connection parameters.
#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub reconnect_backoff: f64,
    pub reconnect_max_attempts: u32,
    pub ws_url: String,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 30_000,
            reconnect_backoff: 2.0,
            reconnect_max_attempts: 5,
            ws_url: String::new(),
        }
    }
}

/// Aggregated engine configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub sizing: SizingConfig,
    pub pricing: PricingConfig,
    pub ranking: RankingConfig,
    pub detection: DetectionConfig,
    pub pnl: PnlConfig,
    pub venues: HashMap<String, VenueConfig>,
    pub initial_capital: Decimal,
    pub symbols: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Config {
            trading: TradingConfig {
                min_profit_usd: env_parse("TRADING_MIN_PROFIT_USD", Decimal::TEN),
                min_profit_pct: env_parse("TRADING_MIN_PROFIT_PCT", 0.05),
                min_confidence: env_parse("TRADING_MIN_CONFIDENCE", 0.7),
                min_liquidity: env_parse("TRADING_MIN_LIQUIDITY", 0.5),
                max_position_usd: env_parse("TRADING_MAX_POSITION_USD", Decimal::from(10_000)),
                max_correlation: env_parse("TRADING_MAX_CORRELATION", 0.8),
                min_opportunity_duration_ms: env_parse("TRADING_MIN_OPPORTUNITY_DURATION_MS", 5_000),
                max_data_age_ms: env_parse("TRADING_MAX_DATA_AGE_MS", 5_000),
                min_funding_diff: env_parse("TRADING_MIN_FUNDING_DIFF", 0.0001),
            },
            risk: RiskConfig {
                max_portfolio_var: env_parse("RISK_MAX_PORTFOLIO_VAR", 0.02),
                max_leverage: env_parse("RISK_MAX_LEVERAGE", 3.0),
                max_concentration: env_parse("RISK_MAX_CONCENTRATION", 0.25),
                liquidity_threshold: env_parse("RISK_LIQUIDITY_THRESHOLD", 0.3),
                warning_threshold: env_parse("RISK_WARNING_THRESHOLD", 0.8),
                critical_threshold: env_parse("RISK_CRITICAL_THRESHOLD", 0.95),
                var_confidence: env_parse("RISK_VAR_CONFIDENCE", 0.95),
                var_simulations: env_parse("RISK_VAR_SIMULATIONS", 10_000),
                monitor_interval_ms: env_parse("RISK_MONITOR_INTERVAL_MS", 5_000),
                alert_ttl_minutes: env_parse("RISK_ALERT_TTL_MINUTES", 30),
            },
            sizing: SizingConfig {
                method: env::var("SIZING_METHOD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_default(),
                kelly_fraction: env_parse("SIZING_KELLY_FRACTION", 0.25),
                target_volatility: env_parse("SIZING_TARGET_VOL", 0.15),
                max_drawdown_limit: env_parse("SIZING_MAX_DRAWDOWN_LIMIT", 0.1),
                ..SizingConfig::default()
            },
            detection: DetectionConfig {
                interval_ms: env_parse("DETECTION_INTERVAL_MS", 100),
                staleness_window_ms: env_parse("DETECTION_STALENESS_WINDOW_MS", 5_000),
            },
            initial_capital: env_parse("INITIAL_CAPITAL", Decimal::from(100_000)),
            symbols: env::var("SYMBOLS")
                .map(|s| {
                    s.split(',')
                        .map(|x| x.trim().to_string())
                        .filter(|x| !x.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| vec!["BTC-USDT".to_string(), "ETH-USDT".to_string()]),
            ..Config::default()
        };

        // One venue is always present so reconnect parameters have a home.
        config
            .venues
            .entry("binance".to_string())
            .or_insert_with(|| VenueConfig {
                ws_url: env::var("BINANCE_WS_URL")
                    .unwrap_or_else(|_| "wss://stream.binance.com:9443".to_string()),
                ..VenueConfig::default()
            });

        config
    }

    /// Applies one flat dotted-key override, e.g. `trading.min_profit_usd`.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), EngineError> {
        let invalid = |reason: &str| EngineError::ConfigInvalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        fn set<T: FromStr>(value: &str) -> Option<T> {
            value.parse::<T>().ok()
        }

        match key {
            "trading.min_profit_usd" => {
                self.trading.min_profit_usd = set(value).ok_or_else(|| invalid("expected decimal"))?
            }
            "trading.min_profit_pct" => {
                self.trading.min_profit_pct = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "trading.min_confidence" => {
                self.trading.min_confidence = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "trading.min_liquidity" => {
                self.trading.min_liquidity = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "trading.max_position_usd" => {
                self.trading.max_position_usd = set(value).ok_or_else(|| invalid("expected decimal"))?
            }
            "trading.max_correlation" => {
                self.trading.max_correlation = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "trading.min_opportunity_duration_ms" => {
                self.trading.min_opportunity_duration_ms =
                    set(value).ok_or_else(|| invalid("expected integer"))?
            }
            "trading.max_data_age_ms" => {
                self.trading.max_data_age_ms = set(value).ok_or_else(|| invalid("expected integer"))?
            }
            "risk.max_portfolio_var" => {
                self.risk.max_portfolio_var = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "risk.max_leverage" => {
                self.risk.max_leverage = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "risk.max_concentration" => {
                let v: f64 = set(value).ok_or_else(|| invalid("expected float"))?;
                if !(0.0..=1.0).contains(&v) {
                    return Err(invalid("must be within [0, 1]"));
                }
                self.risk.max_concentration = v;
            }
            "risk.liquidity_threshold" => {
                self.risk.liquidity_threshold = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "risk.warning_threshold" => {
                self.risk.warning_threshold = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "risk.critical_threshold" => {
                self.risk.critical_threshold = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "sizing.method" => {
                self.sizing.method = value
                    .parse()
                    .map_err(|_| invalid("unknown sizing method"))?
            }
            "sizing.kelly_fraction" => {
                self.sizing.kelly_fraction = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "sizing.target_vol" => {
                self.sizing.target_volatility = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "sizing.max_drawdown_limit" => {
                self.sizing.max_drawdown_limit = set(value).ok_or_else(|| invalid("expected float"))?
            }
            "detection.interval_ms" => {
                self.detection.interval_ms = set(value).ok_or_else(|| invalid("expected integer"))?
            }
            "detection.staleness_window_ms" => {
                self.detection.staleness_window_ms =
                    set(value).ok_or_else(|| invalid("expected integer"))?
            }
            "pricing.funding_damping" => {
                self.pricing.funding_damping = set(value).ok_or_else(|| invalid("expected float"))?
            }
            _ => {
                // venue.<name>.<param>
                if let Some(rest) = key.strip_prefix("venue.") {
                    let (name, param) = rest
                        .split_once('.')
                        .ok_or_else(|| invalid("expected venue.<name>.<param>"))?;
                    let venue = self.venues.entry(name.to_string()).or_default();
                    match param {
                        "reconnect_initial_ms" => {
                            venue.reconnect_initial_ms =
                                set(value).ok_or_else(|| invalid("expected integer"))?
                        }
                        "reconnect_max_ms" => {
                            venue.reconnect_max_ms =
                                set(value).ok_or_else(|| invalid("expected integer"))?
                        }
                        "reconnect_backoff" | "backoff" => {
                            venue.reconnect_backoff =
                                set(value).ok_or_else(|| invalid("expected float"))?
                        }
                        "reconnect_max_attempts" | "max_attempts" => {
                            venue.reconnect_max_attempts =
                                set(value).ok_or_else(|| invalid("expected integer"))?
                        }
                        "ws_url" => venue.ws_url = value.to_string(),
                        _ => return Err(invalid("unknown venue parameter")),
                    }
                } else {
                    return Err(invalid("unknown configuration key"));
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let check = |cond: bool, key: &str, value: String, reason: &str| {
            if cond {
                Ok(())
            } else {
                Err(EngineError::ConfigInvalid {
                    key: key.to_string(),
                    value,
                    reason: reason.to_string(),
                })
            }
        };

        check(
            (0.0..=1.0).contains(&self.trading.min_confidence),
            "trading.min_confidence",
            self.trading.min_confidence.to_string(),
            "must be within [0, 1]",
        )?;
        check(
            self.trading.max_position_usd > Decimal::ZERO,
            "trading.max_position_usd",
            self.trading.max_position_usd.to_string(),
            "must be positive",
        )?;
        check(
            self.risk.warning_threshold < self.risk.critical_threshold,
            "risk.warning_threshold",
            self.risk.warning_threshold.to_string(),
            "must be below critical_threshold",
        )?;
        check(
            self.detection.interval_ms > 0,
            "detection.interval_ms",
            self.detection.interval_ms.to_string(),
            "must be positive",
        )?;
        let weight_sum = self.ranking.profit_weight
            + self.ranking.risk_weight
            + self.ranking.sharpe_weight
            + self.ranking.capital_efficiency_weight
            + self.ranking.liquidity_weight;
        check(
            (weight_sum - 1.0).abs() < 1e-6,
            "ranking.weights",
            weight_sum.to_string(),
            "composite weights must sum to 1",
        )?;
        Ok(())
    }
}

/// Shared, hot-reloadable configuration. Components hold the receiver and
/// re-read on notification; updates are applied atomically through the sender.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: watch::Sender<Config>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> (Self, watch::Receiver<Config>) {
        let (tx, rx) = watch::channel(config);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Config {
        self.tx.borrow().clone()
    }

    /// Applies a dotted-key override and notifies all subscribers.
    pub fn apply(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let mut next = self.tx.borrow().clone();
        next.apply(key, value)?;
        next.validate()?;
        self.tx.send_replace(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_apply_dotted_keys() {
        let mut config = Config::default();
        config.apply("trading.min_profit_usd", "25").unwrap();
        config.apply("risk.max_leverage", "5.0").unwrap();
        config.apply("sizing.method", "risk_parity").unwrap();
        config
            .apply("venue.okx.reconnect_initial_ms", "500")
            .unwrap();

        assert_eq!(config.trading.min_profit_usd, dec!(25));
        assert_eq!(config.risk.max_leverage, 5.0);
        assert_eq!(config.sizing.method, SizingStrategy::RiskParity);
        assert_eq!(config.venues["okx"].reconnect_initial_ms, 500);
    }

    #[test]
    fn test_apply_rejects_unknown_key() {
        let mut config = Config::default();
        let err = config.apply("trading.unknown", "1").unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_apply_rejects_bad_value() {
        let mut config = Config::default();
        assert!(config.apply("risk.max_concentration", "1.5").is_err());
        assert!(config.apply("trading.min_profit_usd", "abc").is_err());
    }

    #[test]
    fn test_handle_notifies_subscribers() {
        let (handle, rx) = ConfigHandle::new(Config::default());
        handle.apply("detection.interval_ms", "250").unwrap();
        assert_eq!(rx.borrow().detection.interval_ms, 250);
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.risk.warning_threshold = 0.99;
        config.risk.critical_threshold = 0.5;
        assert!(config.validate().is_err());
    }
}
