//! Configuration for the surety engine

use crate::{Error, Result};
use ledger_core::{Address, Amount};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Identity the engine uses when calling into the ledger
    pub engine_address: Address,

    /// Below this many airlines, registration needs no vote
    pub bootstrap_airline_threshold: u64,

    /// Ledger configuration
    pub ledger: ledger_core::Config,

    /// Oracle quorum settings
    pub oracle: OracleConfig,

    /// Actor settings
    pub actor: ActorConfig,

    /// Expiry sweep settings
    pub scheduler: SchedulerConfig,

    /// Notification channel capacity
    pub bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "surety-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            engine_address: Address::new("0x00000000000000000000000000000000005e7e7e"),
            bootstrap_airline_threshold: 4,
            ledger: ledger_core::Config::default(),
            oracle: OracleConfig::default(),
            actor: ActorConfig::default(),
            scheduler: SchedulerConfig::default(),
            bus_capacity: message_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Oracle quorum settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Indexes are drawn from `[0, index_range)`
    pub index_range: u8,

    /// Matching responses needed to resolve a round
    pub min_responses: usize,

    /// Fee an oracle pays to register
    pub registration_fee: Amount,

    /// Open rounds older than this expire
    pub round_ttl_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            index_range: 10,
            min_responses: 3,
            registration_fee: Decimal::ONE,
            round_ttl_secs: 3600,
        }
    }
}

/// Actor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Bounded mailbox size
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

/// Round expiry sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between sweeps
    pub sweep_interval_secs: u64,

    /// Run the sweep at all
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            enabled: true,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config {
            ledger: ledger_core::Config::from_env()?,
            ..Config::default()
        };

        if let Ok(address) = std::env::var("SURETY_ENGINE_ADDRESS") {
            config.engine_address = Address::new(address);
        }

        if let Ok(threshold) = std::env::var("SURETY_BOOTSTRAP_AIRLINES") {
            config.bootstrap_airline_threshold = parse_var("SURETY_BOOTSTRAP_AIRLINES", &threshold)?;
        }

        if let Ok(range) = std::env::var("SURETY_ORACLE_INDEX_RANGE") {
            config.oracle.index_range = parse_var("SURETY_ORACLE_INDEX_RANGE", &range)?;
        }

        if let Ok(min) = std::env::var("SURETY_ORACLE_MIN_RESPONSES") {
            config.oracle.min_responses = parse_var("SURETY_ORACLE_MIN_RESPONSES", &min)?;
        }

        if let Ok(fee) = std::env::var("SURETY_ORACLE_FEE") {
            config.oracle.registration_fee = Decimal::from_str(&fee)
                .map_err(|e| Error::Config(format!("Invalid amount in SURETY_ORACLE_FEE: {}", e)))?;
        }

        if let Ok(ttl) = std::env::var("SURETY_ROUND_TTL_SECS") {
            config.oracle.round_ttl_secs = parse_var("SURETY_ROUND_TTL_SECS", &ttl)?;
        }

        if let Ok(interval) = std::env::var("SURETY_SWEEP_INTERVAL_SECS") {
            config.scheduler.sweep_interval_secs = parse_var("SURETY_SWEEP_INTERVAL_SECS", &interval)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot operate with
    pub fn validate(&self) -> Result<()> {
        self.ledger.validate()?;

        if self.oracle.index_range < 3 {
            return Err(Error::Config(format!(
                "index_range {} cannot hold three distinct indexes",
                self.oracle.index_range
            )));
        }
        if self.oracle.min_responses == 0 {
            return Err(Error::Config("min_responses must be at least 1".to_string()));
        }
        if self.oracle.registration_fee.is_sign_negative() {
            return Err(Error::Config("oracle registration fee must not be negative".to_string()));
        }
        if self.actor.mailbox_capacity == 0 || self.bus_capacity == 0 {
            return Err(Error::Config("channel capacities must be non-zero".to_string()));
        }
        if self.scheduler.enabled && self.scheduler.sweep_interval_secs == 0 {
            return Err(Error::Config("sweep_interval_secs must be non-zero".to_string()));
        }
        if self.engine_address == self.ledger.owner {
            return Err(Error::Config(
                "engine_address must differ from the ledger owner".to_string(),
            ));
        }

        Ok(())
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
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bootstrap_airline_threshold, 4);
        assert_eq!(config.oracle.min_responses, 3);
        assert_eq!(config.actor.mailbox_capacity, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_index_range() {
        let mut config = Config::default();
        config.oracle.index_range = 2;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_zero_quorum() {
        let mut config = Config::default();
        config.oracle.min_responses = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
service_name = "surety-test"
service_version = "0.0.1"
engine_address = "0xengine"
bootstrap_airline_threshold = 2
bus_capacity = 64

[ledger]
service_name = "ledger-test"
service_version = "0.0.1"
owner = "0xowner"
initial_funds = "10"

[ledger.policy]
registration_fee = "10"
insurance_cap = "1"
consensus_numerator = 1
consensus_denominator = 2
premium_numerator = 3
premium_denominator = 2

[oracle]
index_range = 5
min_responses = 2
registration_fee = "1"
round_ttl_secs = 60

[actor]
mailbox_capacity = 16

[scheduler]
sweep_interval_secs = 5
enabled = false
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.engine_address, Address::new("0xengine"));
        assert_eq!(config.oracle.index_range, 5);
        assert_eq!(config.ledger.owner, Address::new("0xowner"));
        assert!(!config.scheduler.enabled);
    }
}
