use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rates::RateTable;

/// Balances per currency. Currencies never deposited to hold zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BankState {
    balances: BTreeMap<String, f64>,
}

impl BankState {
    /// Balance held in `currency`.
    #[must_use]
    pub fn balance(&self, currency: &str) -> f64 {
        self.balances.get(currency).copied().unwrap_or_default()
    }

    /// Balances of every currency deposited to, sorted by currency.
    pub fn balances(&self) -> impl Iterator<Item = (&str, f64)> {
        self.balances
            .iter()
            .map(|(currency, amount)| (currency.as_str(), *amount))
    }

    /// Returns the state with `amount` added to `currency`.
    #[must_use]
    pub fn deposit(&self, currency: &str, amount: f64) -> Self {
        let mut next = self.clone();
        *next.balances.entry(currency.to_string()).or_default() += amount;
        next
    }

    /// Returns the state with `percent` interest applied to `currency`.
    #[must_use]
    pub fn add_interest(&self, currency: &str, percent: f64) -> Self {
        let mut next = self.clone();
        if let Some(balance) = next.balances.get_mut(currency) {
            *balance += *balance * percent / 100.0;
        }
        next
    }

    /// Returns the state with `percent` interest applied to every currency.
    #[must_use]
    pub fn add_interest_all(&self, percent: f64) -> Self {
        let mut next = self.clone();
        for balance in next.balances.values_mut() {
            *balance += *balance * percent / 100.0;
        }
        next
    }

    /// Sum of all balances converted into `currency`.
    pub fn total_in(&self, currency: &str, rates: &RateTable) -> Result<f64> {
        self.balances
            .iter()
            .try_fold(0.0, |total, (held, amount)| -> Result<f64> {
                Ok(total + rates.convert(*amount, held, currency)?)
            })
    }
}
