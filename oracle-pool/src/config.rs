//! Pool configuration

use crate::{Error, Result};
use ledger_core::Amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Simulated pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Oracles spawned at startup
    pub oracles: usize,

    /// Share of oracles that always report LATE_AIRLINE
    pub late_fraction: f64,

    /// Fee each oracle pays when registering
    pub registration_fee: Amount,

    /// Seed for the random reporters; entropy when absent
    pub seed: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            oracles: 20,
            late_fraction: 0.25,
            registration_fee: Decimal::ONE,
            seed: None,
        }
    }
}

impl PoolConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = PoolConfig::default();

        if let Ok(count) = std::env::var("SURETY_POOL_ORACLES") {
            config.oracles = parse_var("SURETY_POOL_ORACLES", &count)?;
        }

        if let Ok(fraction) = std::env::var("SURETY_POOL_LATE_FRACTION") {
            config.late_fraction = parse_var("SURETY_POOL_LATE_FRACTION", &fraction)?;
        }

        if let Ok(fee) = std::env::var("SURETY_POOL_FEE") {
            config.registration_fee = Decimal::from_str(&fee)
                .map_err(|e| Error::Config(format!("Invalid amount in SURETY_POOL_FEE: {}", e)))?;
        }

        if let Ok(seed) = std::env::var("SURETY_POOL_SEED") {
            config.seed = Some(parse_var("SURETY_POOL_SEED", &seed)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.oracles == 0 {
            return Err(Error::Config("pool needs at least one oracle".to_string()));
        }
        if !(0.0..=1.0).contains(&self.late_fraction) {
            return Err(Error::Config(format!(
                "late_fraction {} is outside [0, 1]",
                self.late_fraction
            )));
        }
        if self.registration_fee.is_sign_negative() {
            return Err(Error::Config("registration fee must not be negative".to_string()));
        }
        Ok(())
    }

    /// How many oracles always report LATE_AIRLINE
    pub fn late_reporters(&self) -> usize {
        let late = (self.oracles as f64 * self.late_fraction).round() as usize;
        late.min(self.oracles)
    }
}

fn parse_var<T: FromStr>(var: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::Config(format!("Invalid value in {}: {}", var, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.oracles, 20);
        assert_eq!(config.late_reporters(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_fraction() {
        let config = PoolConfig {
            late_fraction: 1.5,
            ..PoolConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_empty_pool() {
        let config = PoolConfig {
            oracles: 0,
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_late_reporters_bounds() {
        let all = PoolConfig {
            oracles: 7,
            late_fraction: 1.0,
            ..PoolConfig::default()
        };
        assert_eq!(all.late_reporters(), 7);

        let none = PoolConfig {
            late_fraction: 0.0,
            ..all
        };
        assert_eq!(none.late_reporters(), 0);
    }
}
