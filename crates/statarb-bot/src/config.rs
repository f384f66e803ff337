//! Application configuration.
//!
//! Typed sections with serde defaults, loaded from TOML. Runtime-mutable
//! fields (`scale_interval`, thresholds, risk percentages, feature flags)
//! are applied through `Engine` methods rather than by reloading the file.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use statarb_broker::BarTimeframe;
use statarb_executor::{RebalancerConfig, UnifiedConfig};
use statarb_risk::RiskConfig;
use statarb_signal::SignalConfig;

/// The traded pair and its strategy tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSection {
    pub primary_symbol: String,
    pub secondary_symbol: String,
    /// Magic number stamped on every order.
    #[serde(default = "default_magic")]
    pub magic: u32,
}

fn default_magic() -> u32 {
    234000
}

/// Entry/exit/grid parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradingSection {
    #[serde(default = "default_entry_threshold")]
    pub entry_threshold: f64,
    #[serde(default = "default_exit_threshold")]
    pub exit_threshold: f64,
    #[serde(default = "default_scale_interval")]
    pub scale_interval: f64,
    /// No fills beyond this |z|.
    #[serde(default = "default_stop_loss_zscore")]
    pub stop_loss_zscore: f64,
    #[serde(default = "default_initial_fraction")]
    pub initial_fraction: f64,
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
}

fn default_entry_threshold() -> f64 {
    2.0
}

fn default_exit_threshold() -> f64 {
    0.5
}

fn default_scale_interval() -> f64 {
    0.5
}

fn default_stop_loss_zscore() -> f64 {
    3.5
}

fn default_initial_fraction() -> f64 {
    0.33
}

fn default_max_entries() -> u32 {
    10
}

impl Default for TradingSection {
    fn default() -> Self {
        Self {
            entry_threshold: default_entry_threshold(),
            exit_threshold: default_exit_threshold(),
            scale_interval: default_scale_interval(),
            stop_loss_zscore: default_stop_loss_zscore(),
            initial_fraction: default_initial_fraction(),
            max_entries: default_max_entries(),
        }
    }
}

/// Rolling-window model parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelSection {
    /// Rolling window length in bars.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// History requested at bootstrap, in calendar days.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default = "default_bar_timeframe")]
    pub bar_timeframe: BarTimeframe,
    /// Seconds between collector iterations.
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: f64,
}

fn default_window_size() -> usize {
    240
}

fn default_window_days() -> u32 {
    30
}

fn default_bar_timeframe() -> BarTimeframe {
    BarTimeframe::H1
}

fn default_update_interval_secs() -> f64 {
    5.0
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            window_days: default_window_days(),
            bar_timeframe: default_bar_timeframe(),
            update_interval_secs: default_update_interval_secs(),
        }
    }
}

/// Three-layer loss limits and session times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSection {
    #[serde(default = "default_per_setup_pct")]
    pub max_loss_per_setup_pct: f64,
    #[serde(default = "default_portfolio_pct")]
    pub max_total_unrealized_loss_pct: f64,
    #[serde(default = "default_daily_pct")]
    pub daily_loss_limit_pct: f64,
    /// "HH:MM", daily counters reset here.
    #[serde(default = "default_session_start")]
    pub session_start: String,
    #[serde(default = "default_session_end")]
    pub session_end: String,
}

fn default_per_setup_pct() -> f64 {
    2.0
}

fn default_portfolio_pct() -> f64 {
    5.0
}

fn default_daily_pct() -> f64 {
    10.0
}

fn default_session_start() -> String {
    String::from("00:00")
}

fn default_session_end() -> String {
    String::from("23:59")
}

impl Default for RiskSection {
    fn default() -> Self {
        Self {
            max_loss_per_setup_pct: default_per_setup_pct(),
            max_total_unrealized_loss_pct: default_portfolio_pct(),
            daily_loss_limit_pct: default_daily_pct(),
            session_start: default_session_start(),
            session_end: default_session_end(),
        }
    }
}

/// Volume rebalancer tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RebalancerSection {
    #[serde(default = "default_imbalance_threshold")]
    pub volume_imbalance_threshold: f64,
    #[serde(default = "default_adjustment_interval")]
    pub min_adjustment_interval_secs: i64,
}

fn default_imbalance_threshold() -> f64 {
    0.10
}

fn default_adjustment_interval() -> i64 {
    3600
}

impl Default for RebalancerSection {
    fn default() -> Self {
        Self {
            volume_imbalance_threshold: default_imbalance_threshold(),
            min_adjustment_interval_secs: default_adjustment_interval(),
        }
    }
}

/// Feature switches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureSection {
    #[serde(default = "default_true")]
    pub volume_rebalancing: bool,
    /// Forced exit when attribution says the spread went directional.
    /// Off by default.
    #[serde(default)]
    pub attribution_kill_switch: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FeatureSection {
    fn default() -> Self {
        Self {
            volume_rebalancing: true,
            attribution_kill_switch: false,
        }
    }
}

/// Worker cadences and storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_risk_interval_secs")]
    pub risk_interval_secs: f64,
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: f64,
    #[serde(default = "default_attribution_interval_secs")]
    pub attribution_interval_secs: f64,
    #[serde(default = "default_snapshot_queue_capacity")]
    pub snapshot_queue_capacity: usize,
    #[serde(default = "default_action_queue_capacity")]
    pub action_queue_capacity: usize,
}

fn default_data_dir() -> String {
    String::from("data")
}

fn default_risk_interval_secs() -> f64 {
    5.0
}

fn default_monitor_interval_secs() -> f64 {
    10.0
}

fn default_attribution_interval_secs() -> f64 {
    60.0
}

fn default_snapshot_queue_capacity() -> usize {
    16
}

fn default_action_queue_capacity() -> usize {
    16
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            risk_interval_secs: default_risk_interval_secs(),
            monitor_interval_secs: default_monitor_interval_secs(),
            attribution_interval_secs: default_attribution_interval_secs(),
            snapshot_queue_capacity: default_snapshot_queue_capacity(),
            action_queue_capacity: default_action_queue_capacity(),
        }
    }
}

/// Cost model inputs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostSection {
    /// Round-turn commission estimate, per lot per side.
    #[serde(default = "default_commission_per_lot")]
    pub commission_per_lot: f64,
}

fn default_commission_per_lot() -> f64 {
    3.5
}

impl Default for CostSection {
    fn default() -> Self {
        Self {
            commission_per_lot: default_commission_per_lot(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub pair: PairSection,
    #[serde(default)]
    pub trading: TradingSection,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub risk: RiskSection,
    #[serde(default)]
    pub rebalancer: RebalancerSection,
    #[serde(default)]
    pub features: FeatureSection,
    #[serde(default)]
    pub system: SystemSection,
    #[serde(default)]
    pub costs: CostSection,
}

impl AppConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.signal_config()?.validate()?;
        self.risk_config()?.validate()?;
        if self.trading.initial_fraction <= 0.0 || self.trading.initial_fraction > 1.0 {
            return Err(AppError::Config(format!(
                "initial_fraction must be in (0, 1], got {}",
                self.trading.initial_fraction
            )));
        }
        if self.model.window_size < 2 {
            return Err(AppError::Config(format!(
                "window_size must be at least 2, got {}",
                self.model.window_size
            )));
        }
        Ok(())
    }

    pub fn signal_config(&self) -> AppResult<SignalConfig> {
        Ok(SignalConfig {
            entry_threshold: self.trading.entry_threshold,
            exit_threshold: self.trading.exit_threshold,
        })
    }

    pub fn risk_config(&self) -> AppResult<RiskConfig> {
        Ok(RiskConfig {
            max_loss_per_setup_pct: self.risk.max_loss_per_setup_pct,
            max_total_unrealized_loss_pct: self.risk.max_total_unrealized_loss_pct,
            daily_loss_limit_pct: self.risk.daily_loss_limit_pct,
            session_start: statarb_core::parse_session_time(&self.risk.session_start)
                .map_err(|e| AppError::Config(e.to_string()))?,
            session_end: statarb_core::parse_session_time(&self.risk.session_end)
                .map_err(|e| AppError::Config(e.to_string()))?,
        })
    }

    #[must_use]
    pub fn unified_config(&self) -> UnifiedConfig {
        UnifiedConfig {
            entry_threshold: self.trading.entry_threshold,
            scale_interval: self.trading.scale_interval,
            max_zscore: self.trading.stop_loss_zscore,
            initial_fraction: self.trading.initial_fraction,
            max_entries: self.trading.max_entries,
        }
    }

    #[must_use]
    pub fn rebalancer_config(&self) -> RebalancerConfig {
        RebalancerConfig {
            volume_imbalance_threshold: self.rebalancer.volume_imbalance_threshold,
            min_adjustment_interval_secs: self.rebalancer.min_adjustment_interval_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            [pair]
            primary_symbol = "XAUUSD"
            secondary_symbol = "XAGUSD"
        "#
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.pair.magic, 234000);
        assert_eq!(config.trading.entry_threshold, 2.0);
        assert_eq!(config.trading.scale_interval, 0.5);
        assert_eq!(config.model.window_size, 240);
        assert_eq!(config.risk.daily_loss_limit_pct, 10.0);
        assert!(config.features.volume_rebalancing);
        assert!(!config.features.attribution_kill_switch);
    }

    #[test]
    fn test_overrides_parse() {
        let config: AppConfig = toml::from_str(
            r#"
            [pair]
            primary_symbol = "XAUUSD"
            secondary_symbol = "XAGUSD"
            magic = 777001

            [trading]
            entry_threshold = 2.5
            scale_interval = 0.7

            [risk]
            daily_loss_limit_pct = 5.0
            session_start = "09:30"

            [features]
            attribution_kill_switch = true
        "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.pair.magic, 777001);
        assert_eq!(config.trading.entry_threshold, 2.5);
        assert_eq!(config.trading.scale_interval, 0.7);
        assert_eq!(config.risk.daily_loss_limit_pct, 5.0);
        assert!(config.features.attribution_kill_switch);

        let risk = config.risk_config().unwrap();
        assert_eq!(
            risk.session_start,
            chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let config: AppConfig = toml::from_str(
            r#"
            [pair]
            primary_symbol = "XAUUSD"
            secondary_symbol = "XAGUSD"

            [trading]
            entry_threshold = 0.4
            exit_threshold = 0.5
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_session_time_rejected() {
        let config: AppConfig = toml::from_str(
            r#"
            [pair]
            primary_symbol = "XAUUSD"
            secondary_symbol = "XAGUSD"

            [risk]
            session_start = "9h30"
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
