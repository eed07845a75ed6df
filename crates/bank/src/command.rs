use std::str::FromStr;

use ledger_replication::CommandKind;

use crate::error::{Error, Result};

/// A parsed bank command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// `deposit <currency> <amount>`
    Deposit {
        /// Currency deposited to
        currency: String,
        /// Amount, may be negative for a withdrawal
        amount: f64,
    },

    /// `addInterest [<currency>] <percent>`
    AddInterest {
        /// Currency, or every currency when absent
        currency: Option<String>,
        /// Interest in percent
        percent: f64,
    },

    /// `getQuickBalance <currency>`, answered from local state.
    QuickBalance {
        /// Currency to report in
        currency: String,
    },

    /// `getSyncedBalance <currency>`, answered once everything ordered before it is applied.
    SyncedBalance {
        /// Currency to report in
        currency: String,
    },
}

impl Command {
    /// Classifies a command line by its name alone.
    ///
    /// Lines that are not queries are mutations, even malformed ones; those fail
    /// identically on every replica when applied.
    #[must_use]
    pub fn kind_of(line: &str) -> CommandKind {
        match line.split_whitespace().next().map(str::to_ascii_lowercase).as_deref() {
            Some("getquickbalance") => CommandKind::LocalQuery,
            Some("getsyncedbalance") => CommandKind::SyncedQuery,
            _ => CommandKind::Mutation,
        }
    }

    /// The kind of this command.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Deposit { .. } | Self::AddInterest { .. } => CommandKind::Mutation,
            Self::QuickBalance { .. } => CommandKind::LocalQuery,
            Self::SyncedBalance { .. } => CommandKind::SyncedQuery,
        }
    }
}

fn number(value: &str) -> Result<f64> {
    let number: f64 = value.parse().map_err(|source| Error::InvalidNumber {
        value: value.to_string(),
        source,
    })?;

    if number.is_finite() {
        Ok(number)
    } else {
        Err(Error::Usage("amounts must be finite"))
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((name, args)) = tokens.split_first() else {
            return Err(Error::EmptyCommand);
        };

        match (name.to_ascii_lowercase().as_str(), args) {
            ("deposit", [currency, amount]) => Ok(Self::Deposit {
                currency: (*currency).to_string(),
                amount: number(amount)?,
            }),
            ("deposit", _) => Err(Error::Usage("deposit <currency> <amount>")),
            ("addinterest", [currency, percent]) => Ok(Self::AddInterest {
                currency: Some((*currency).to_string()),
                percent: number(percent)?,
            }),
            ("addinterest", [percent]) => Ok(Self::AddInterest {
                currency: None,
                percent: number(percent)?,
            }),
            ("addinterest", _) => Err(Error::Usage("addInterest [<currency>] <percent>")),
            ("getquickbalance", [currency]) => Ok(Self::QuickBalance {
                currency: (*currency).to_string(),
            }),
            ("getquickbalance", _) => Err(Error::Usage("getQuickBalance <currency>")),
            ("getsyncedbalance", [currency]) => Ok(Self::SyncedBalance {
                currency: (*currency).to_string(),
            }),
            ("getsyncedbalance", _) => Err(Error::Usage("getSyncedBalance <currency>")),
            _ => Err(Error::UnknownCommand((*name).to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_parse_commands_case_insensitively() {
        assert_eq!(
            "deposit USD 100".parse::<Command>().unwrap(),
            Command::Deposit {
                currency: "USD".to_string(),
                amount: 100.0
            }
        );
        assert_eq!(
            "ADDINTEREST EUR 2.5".parse::<Command>().unwrap(),
            Command::AddInterest {
                currency: Some("EUR".to_string()),
                percent: 2.5
            }
        );
        assert_eq!(
            "addInterest 3".parse::<Command>().unwrap(),
            Command::AddInterest {
                currency: None,
                percent: 3.0
            }
        );
        assert_eq!(
            "getSyncedBalance NOK".parse::<Command>().unwrap().kind(),
            CommandKind::SyncedQuery
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!("".parse::<Command>(), Err(Error::EmptyCommand));
        assert_matches!("withdraw USD 1".parse::<Command>(), Err(Error::UnknownCommand(name)) if name == "withdraw");
        assert_matches!("deposit USD".parse::<Command>(), Err(Error::Usage(_)));
        assert_matches!("deposit USD lots".parse::<Command>(), Err(Error::InvalidNumber { value, .. }) if value == "lots");
        assert_matches!("deposit USD inf".parse::<Command>(), Err(Error::Usage(_)));
    }

    #[test]
    fn test_kind_of_looks_at_the_name_only() {
        assert_eq!(Command::kind_of("getQuickBalance"), CommandKind::LocalQuery);
        assert_eq!(Command::kind_of("getsyncedbalance USD"), CommandKind::SyncedQuery);
        assert_eq!(Command::kind_of("deposit"), CommandKind::Mutation);
        assert_eq!(Command::kind_of("nonsense"), CommandKind::Mutation);
    }
}
