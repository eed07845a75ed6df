use ledger_replication::ReplicaId;
use serde::{Deserialize, Serialize};

/// Configuration for a replica node.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReplicaConfig {
    /// Id the replica binds its handle under. Also the prefix of its operation ids.
    pub id: ReplicaId,

    /// Group to join.
    pub group: String,

    /// Number of queued operations that triggers an automatic flush.
    ///
    /// Zero disables automatic flushing; operations are then only sent by an
    /// explicit flush.
    pub batch_size: usize,
}

impl ReplicaConfig {
    /// Creates a config for `id` joining `group`, flushing after every queued command.
    pub fn new(id: impl Into<ReplicaId>, group: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            batch_size: 1,
        }
    }
}
