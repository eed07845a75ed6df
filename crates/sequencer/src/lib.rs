//! Central sequencer for a replicated ledger.
//!
//! This crate provides:
//! - A membership registry per group, with a cached snapshot for late joiners
//! - A total-order assigner that appends each operation id to the view at most once
//! - A broadcast coordinator with bounded per-member retry and eviction
//! - Cohort rendezvous so a batch of joiners can start together
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Fan-out of the view to every member.
pub mod broadcast;

/// Countdown barrier for joining cohorts.
pub mod cohort;

/// Configuration types.
pub mod config;

/// Per-group coordination.
pub mod coordinator;

/// Membership registry.
pub mod group;

/// Total-order assigner.
pub mod log;

/// Multi-group sequencer service.
pub mod service;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use cohort::CohortBarrier;
pub use config::{BroadcastConfig, SequencerConfig};
pub use coordinator::GroupCoordinator;
pub use group::{Group, MemberRecord, SnapshotOffer};
pub use log::{Submission, TransactionLog};
pub use service::Sequencer;
