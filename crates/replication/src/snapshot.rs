use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Bounds required of replicated state.
///
/// `PartialEq` is needed so the sequencer can detect two snapshots that claim the
/// same cursor but disagree on state.
pub trait ReplicatedState: Clone + Debug + Default + PartialEq + Send + Sync + 'static {}

impl<T> ReplicatedState for T where T: Clone + Debug + Default + PartialEq + Send + Sync + 'static {}

/// Replicated state together with the number of view positions applied to produce it.
///
/// A snapshot for position `N` is only meaningful to a replica that resumes at `N`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    state: S,
    applied: u64,
}

impl<S> Snapshot<S> {
    /// Creates a snapshot of `state` after `applied` view positions.
    pub const fn new(state: S, applied: u64) -> Self {
        Self { state, applied }
    }

    /// The replicated state.
    pub const fn state(&self) -> &S {
        &self.state
    }

    /// Number of view positions reflected in the state.
    pub const fn applied(&self) -> u64 {
        self.applied
    }

    /// Splits the snapshot into state and applied count.
    pub fn into_parts(self) -> (S, u64) {
        (self.state, self.applied)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_snapshot_round_trips_state_and_cursor() {
        let mut balances = BTreeMap::new();
        balances.insert("USD".to_string(), 100.0_f64);
        let snapshot = Snapshot::new(balances, 3);

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: Snapshot<BTreeMap<String, f64>> = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.applied(), 3);
    }

    #[test]
    fn test_default_snapshot_is_empty() {
        let snapshot = Snapshot::<Vec<u8>>::default();

        assert_eq!(snapshot.applied(), 0);
        assert!(snapshot.state().is_empty());
    }
}
