//! Configuration loading and validation for the risk engine.
//!
//! Limits and engine tuning load from a YAML file. A candidate configuration
//! is always validated in full before it is handed to the limit registry, so
//! a bad reload can never partially apply.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rust_decimal::Decimal;

use crate::coordinator::SplitPolicy;
use crate::models::LimitSet;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reservation time-to-live in seconds.
    pub reservation_ttl_secs: u64,
    /// Width of the cross-strategy coordination window in milliseconds.
    pub epoch_window_ms: u64,
    /// Smallest order quantity worth submitting after adjustment.
    pub min_viable_quantity: Decimal,
    /// Minimum return samples before soft-limit statistics are trusted.
    pub min_metric_samples: usize,
    /// Daily risk-free rate used in Sharpe computation.
    pub risk_free_daily: Decimal,
    /// Annualized target volatility for volatility scaling.
    pub target_volatility: Decimal,
    /// Sizing factor applied when metrics are unavailable.
    pub fallback_soft_factor: Decimal,
    /// How contested symbol capacity is split across strategies.
    pub split_policy: SplitPolicy,
    /// Weight substituted for non-positive Sharpe in performance splits.
    pub sharpe_floor_weight: Decimal,
    /// Strategy drawdown that forces a strategy halt.
    pub strategy_halt_drawdown: Decimal,
    /// Account drawdown that forces the account-emergency mode.
    pub account_emergency_drawdown: Decimal,
    /// Starting account equity.
    pub initial_equity: Decimal,
    /// Event bus channel capacity.
    pub event_capacity: usize,
    /// Hard, soft, and phase limits.
    pub limits: LimitSet,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: 30,
            epoch_window_ms: 50,
            min_viable_quantity: Decimal::ONE,
            min_metric_samples: 20,
            risk_free_daily: Decimal::new(2, 4),
            target_volatility: Decimal::new(40, 2),
            fallback_soft_factor: Decimal::new(5, 1),
            split_policy: SplitPolicy::Proportional,
            sharpe_floor_weight: Decimal::new(1, 1),
            strategy_halt_drawdown: Decimal::new(20, 2),
            account_emergency_drawdown: Decimal::new(25, 2),
            initial_equity: Decimal::new(100_000, 0),
            event_capacity: 256,
            limits: LimitSet::default(),
        }
    }
}

impl EngineConfig {
    /// Validate the whole configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reservation_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "reservation_ttl_secs must be positive".to_string(),
            ));
        }
        if self.min_viable_quantity <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "min_viable_quantity must be positive".to_string(),
            ));
        }
        if self.min_metric_samples == 0 {
            return Err(ConfigError::ValidationError(
                "min_metric_samples must be positive".to_string(),
            ));
        }
        if self.target_volatility <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "target_volatility must be positive".to_string(),
            ));
        }
        if !(Decimal::ZERO..=Decimal::ONE).contains(&self.fallback_soft_factor) {
            return Err(ConfigError::ValidationError(
                "fallback_soft_factor must be within [0, 1]".to_string(),
            ));
        }
        if self.sharpe_floor_weight <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "sharpe_floor_weight must be positive".to_string(),
            ));
        }
        if self.strategy_halt_drawdown <= Decimal::ZERO
            || self.account_emergency_drawdown <= Decimal::ZERO
        {
            return Err(ConfigError::ValidationError(
                "drawdown triggers must be positive".to_string(),
            ));
        }
        if self.strategy_halt_drawdown >= self.account_emergency_drawdown {
            return Err(ConfigError::ValidationError(
                "strategy_halt_drawdown must be below account_emergency_drawdown".to_string(),
            ));
        }
        if self.initial_equity <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "initial_equity must be positive".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "event_capacity must be positive".to_string(),
            ));
        }
        self.limits
            .validate()
            .map_err(ConfigError::ValidationError)?;
        Ok(())
    }
}

/// Load and validate configuration from a YAML file.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the file cannot be read, parsed, or fails
/// validation.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, ConfigError> {
    let path = path.unwrap_or("risk.yaml");
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_string(),
        source,
    })?;
    parse_config(&contents)
}

/// Parse and validate configuration from a YAML string.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the YAML is malformed or fails validation.
pub fn parse_config(contents: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = serde_yaml_bw::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reservation_ttl_secs, 30);
        assert_eq!(config.fallback_soft_factor, dec!(0.5));
    }

    #[test]
    fn test_parse_partial_yaml_uses_defaults() {
        let config = parse_config("reservation_ttl_secs: 10\nepoch_window_ms: 25\n").unwrap();
        assert_eq!(config.reservation_ttl_secs, 10);
        assert_eq!(config.epoch_window_ms, 25);
        assert_eq!(config.min_metric_samples, 20);
    }

    #[test]
    fn test_parse_limits_section() {
        let yaml = r"
limits:
  phase: PHASE_3
  hard:
    max_position_notional: '75000'
";
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.limits.hard.max_position_notional, dec!(75000));
    }

    #[test]
    fn test_invalid_soft_ordering_rejected() {
        let yaml = r"
limits:
  soft:
    drawdown:
      warning: '0.30'
      reduction: '0.15'
      halt: '0.20'
";
        let err = parse_config(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_drawdown_trigger_ordering_enforced() {
        let mut config = EngineConfig::default();
        config.strategy_halt_drawdown = dec!(0.30);
        assert!(config.validate().is_err());
    }
}
