//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_airlines_registered_total` - Airlines created
//! - `ledger_flights_registered_total` - Flights created
//! - `ledger_insurances_purchased_total` - Insurances bought
//! - `ledger_insurances_credited_total` - Insurances paid out
//! - `ledger_withdrawals_total` - Credit withdrawals
//! - `ledger_funds_held` - Funds currently in custody
//! - `ledger_outstanding_credit` - Sum of withdrawable balances

use crate::types::Amount;
use prometheus::{Gauge, IntCounter, Registry};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

/// Metrics collector
///
/// Collectors live in a private registry, so several ledgers can coexist
/// in one process (tests spin up many).
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Airlines created
    pub airlines_registered: IntCounter,

    /// Flights created
    pub flights_registered: IntCounter,

    /// Insurances bought
    pub insurances_purchased: IntCounter,

    /// Insurances credited
    pub insurances_credited: IntCounter,

    /// Withdrawals executed
    pub withdrawals: IntCounter,

    /// Funds held in custody
    pub funds_held: Gauge,

    /// Outstanding credit
    pub outstanding_credit: Gauge,

    registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let airlines_registered = IntCounter::new(
            "ledger_airlines_registered_total",
            "Total number of airlines registered",
        )?;
        registry.register(Box::new(airlines_registered.clone()))?;

        let flights_registered = IntCounter::new(
            "ledger_flights_registered_total",
            "Total number of flights registered",
        )?;
        registry.register(Box::new(flights_registered.clone()))?;

        let insurances_purchased = IntCounter::new(
            "ledger_insurances_purchased_total",
            "Total number of insurances purchased",
        )?;
        registry.register(Box::new(insurances_purchased.clone()))?;

        let insurances_credited = IntCounter::new(
            "ledger_insurances_credited_total",
            "Total number of insurances credited",
        )?;
        registry.register(Box::new(insurances_credited.clone()))?;

        let withdrawals = IntCounter::new(
            "ledger_withdrawals_total",
            "Total number of credit withdrawals",
        )?;
        registry.register(Box::new(withdrawals.clone()))?;

        let funds_held = Gauge::new("ledger_funds_held", "Funds currently held in custody")?;
        registry.register(Box::new(funds_held.clone()))?;

        let outstanding_credit = Gauge::new(
            "ledger_outstanding_credit",
            "Sum of withdrawable credit balances",
        )?;
        registry.register(Box::new(outstanding_credit.clone()))?;

        Ok(Self {
            airlines_registered,
            flights_registered,
            insurances_purchased,
            insurances_credited,
            withdrawals,
            funds_held,
            outstanding_credit,
            registry,
        })
    }

    /// Update custody gauges
    pub fn update_funds(&self, held: Amount, outstanding: Amount) {
        self.funds_held.set(held.to_f64().unwrap_or_default());
        self.outstanding_credit
            .set(outstanding.to_f64().unwrap_or_default());
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.airlines_registered.get(), 0);
        assert_eq!(metrics.registry().gather().len(), 7);
    }

    #[test]
    fn test_independent_registries() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.flights_registered.inc();
        assert_eq!(first.flights_registered.get(), 1);
        assert_eq!(second.flights_registered.get(), 0);
    }

    #[test]
    fn test_update_funds() {
        let metrics = Metrics::new().unwrap();
        metrics.update_funds(dec!(10.5), dec!(0.75));
        assert_eq!(metrics.funds_held.get(), 10.5);
        assert_eq!(metrics.outstanding_credit.get(), 0.75);
    }
}
