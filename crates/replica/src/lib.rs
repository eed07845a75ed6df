//! Replica side of the replicated ledger: the apply engine and the command source.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod engine;
mod error;
mod node;
mod outstanding;

pub use config::ReplicaConfig;
pub use engine::{QueryAnswer, Replica, TxStatus};
pub use error::{Error, Result};
pub use node::{Reply, ReplicaNode};
pub use outstanding::Outstanding;
