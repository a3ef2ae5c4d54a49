use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

pub const COMMISSION_RATE_KEY: &str = "BACKTEST_COMMISSION_RATE";
pub const INITIAL_BALANCE_KEY: &str = "BACKTEST_INITIAL_BALANCE";
pub const SHOW_PROGRESS_KEY: &str = "BACKTEST_SHOW_PROGRESS";

/// Runtime settings for a backtest run
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    /// Fraction charged on each leg of a trade, e.g. 0.0005
    pub commission_rate: Decimal,
    pub initial_balance: Decimal,
    pub show_progress: bool,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(5, 4),
            initial_balance: Decimal::new(10_000, 0),
            show_progress: true,
        }
    }
}

impl BacktestSettings {
    /// Build settings from a key/value map, falling back to defaults for absent keys
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        let commission_rate = optional_setting_decimal(
            settings,
            COMMISSION_RATE_KEY,
            defaults.commission_rate,
            Some(Decimal::ZERO),
        )?;
        if commission_rate >= Decimal::ONE {
            return Err(anyhow!(
                "Setting {} must be < 1 (value: {})",
                COMMISSION_RATE_KEY,
                commission_rate
            ));
        }
        let initial_balance = optional_setting_decimal(
            settings,
            INITIAL_BALANCE_KEY,
            defaults.initial_balance,
            None,
        )?;
        if initial_balance <= Decimal::ZERO {
            return Err(anyhow!(
                "Setting {} must be positive (value: {})",
                INITIAL_BALANCE_KEY,
                initial_balance
            ));
        }
        let show_progress =
            optional_setting_bool(settings, SHOW_PROGRESS_KEY, defaults.show_progress)?;

        Ok(Self {
            commission_rate,
            initial_balance,
            show_progress,
        })
    }

    /// Read the `BACKTEST_*` keys from the process environment
    pub fn from_env() -> Result<Self> {
        let settings: HashMap<String, String> = env::vars()
            .filter(|(key, _)| key.starts_with("BACKTEST_"))
            .collect();
        Self::from_settings_map(&settings)
    }
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn optional_setting_decimal(
    settings: &HashMap<String, String>,
    key: &str,
    default: Decimal,
    min: Option<Decimal>,
) -> Result<Decimal> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(default);
    };
    let value = Decimal::from_str(raw)
        .map_err(|_| anyhow!("Setting {} must be a decimal number (value: {})", key, raw))?;
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    Ok(value)
}

fn optional_setting_bool(
    settings: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("Setting {} must be a boolean (value: {})", key, raw)),
    }
}
