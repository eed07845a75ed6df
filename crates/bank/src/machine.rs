use std::sync::Arc;

use ledger_replication::{CommandClassifier, CommandKind, StateMachine};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::rates::RateTable;
use crate::state::BankState;

/// The bank as a replicated state machine.
///
/// Every replica must be built with the same rate table.
#[derive(Clone, Debug, Default)]
pub struct BankMachine {
    rates: Arc<RateTable>,
}

impl BankMachine {
    /// Creates a machine using `rates` for conversions and currency checks.
    pub fn new(rates: RateTable) -> Self {
        Self {
            rates: Arc::new(rates),
        }
    }

    /// The rate table.
    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    fn known(&self, currency: &str) -> Result<()> {
        if self.rates.contains(currency) {
            Ok(())
        } else {
            Err(Error::UnknownCurrency(currency.to_string()))
        }
    }
}

impl CommandClassifier for BankMachine {
    fn classify(&self, command: &str) -> CommandKind {
        Command::kind_of(command)
    }
}

impl StateMachine for BankMachine {
    type State = BankState;
    type Error = Error;

    fn apply(&self, command: &str, state: &BankState) -> Result<BankState> {
        match command.parse::<Command>()? {
            Command::Deposit { currency, amount } => {
                self.known(&currency)?;
                Ok(state.deposit(&currency, amount))
            }
            Command::AddInterest {
                currency: Some(currency),
                percent,
            } => {
                self.known(&currency)?;
                Ok(state.add_interest(&currency, percent))
            }
            Command::AddInterest {
                currency: None,
                percent,
            } => Ok(state.add_interest_all(percent)),
            Command::QuickBalance { .. } | Command::SyncedBalance { .. } => {
                Err(Error::WrongKind(command.to_string()))
            }
        }
    }

    fn query(&self, command: &str, state: &BankState) -> Result<String> {
        match command.parse::<Command>()? {
            Command::QuickBalance { currency } | Command::SyncedBalance { currency } => {
                let total = state.total_in(&currency, &self.rates)?;
                Ok(format!("Balance for {currency} is {total:.2}"))
            }
            Command::Deposit { .. } | Command::AddInterest { .. } => {
                Err(Error::WrongKind(command.to_string()))
            }
        }
    }
}
