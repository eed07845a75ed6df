//! Multi-currency bank account replicated as a deterministic state machine.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod command;
mod error;
mod machine;
mod rates;
mod state;

pub use command::Command;
pub use error::{Error, Result};
pub use machine::BankMachine;
pub use rates::{BASE_CURRENCY, RateTable};
pub use state::BankState;
