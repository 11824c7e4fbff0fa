//! Configuration for the ledger

use crate::types::{Address, Amount, Ratio};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Deploying identity (owner, airline #1, first authorized caller)
    pub owner: Address,

    /// Funds seeded into custody at deployment
    pub initial_funds: Amount,

    /// Initial policy values
    pub policy: PolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "ledger-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            owner: Address::new("0x0000000000000000000000000000000000000001"),
            initial_funds: Decimal::from(10),
            policy: PolicyConfig::default(),
        }
    }
}

/// Policy values, mutable at runtime by the owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Fee an airline pays to become a voter
    pub registration_fee: Amount,

    /// Maximum premium per insurance
    pub insurance_cap: Amount,

    /// Consensus numerator
    pub consensus_numerator: u32,

    /// Consensus denominator
    pub consensus_denominator: u32,

    /// Payout numerator
    pub premium_numerator: u32,

    /// Payout denominator
    pub premium_denominator: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            registration_fee: Decimal::from(10),
            insurance_cap: Decimal::ONE,
            consensus_numerator: 1,     // half of the voters
            consensus_denominator: 2,
            premium_numerator: 3,       // 1.5x refund
            premium_denominator: 2,
        }
    }
}

impl PolicyConfig {
    /// Consensus multiplier
    pub fn consensus(&self) -> Ratio {
        Ratio::new(self.consensus_numerator, self.consensus_denominator)
    }

    /// Insurance premium multiplier
    pub fn premium(&self) -> Ratio {
        Ratio::new(self.premium_numerator, self.premium_denominator)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(owner) = std::env::var("SURETY_OWNER") {
            config.owner = Address::new(owner);
        }

        if let Ok(funds) = std::env::var("SURETY_INITIAL_FUNDS") {
            config.initial_funds = parse_amount("SURETY_INITIAL_FUNDS", &funds)?;
        }

        if let Ok(fee) = std::env::var("SURETY_REGISTRATION_FEE") {
            config.policy.registration_fee = parse_amount("SURETY_REGISTRATION_FEE", &fee)?;
        }

        if let Ok(cap) = std::env::var("SURETY_INSURANCE_CAP") {
            config.policy.insurance_cap = parse_amount("SURETY_INSURANCE_CAP", &cap)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the ledger cannot operate with
    pub fn validate(&self) -> crate::Result<()> {
        let policy = &self.policy;

        if policy.consensus_numerator == 0 || policy.consensus_denominator == 0 {
            return Err(crate::Error::Config(
                "consensus multipliers must be non-zero".to_string(),
            ));
        }
        if policy.consensus().exceeds_one() {
            return Err(crate::Error::Config(format!(
                "consensus multipliers {} imply more than 100% consensus",
                policy.consensus()
            )));
        }
        if policy.premium_denominator == 0 {
            return Err(crate::Error::Config(
                "premium denominator must be non-zero".to_string(),
            ));
        }
        if self.initial_funds.is_sign_negative()
            || policy.registration_fee.is_sign_negative()
            || policy.insurance_cap.is_sign_negative()
        {
            return Err(crate::Error::Config(
                "amounts must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_amount(var: &str, value: &str) -> crate::Result<Amount> {
    Decimal::from_str(value)
        .map_err(|e| crate::Error::Config(format!("Invalid amount in {}: {}", var, e)))
}
