//! In-memory replica directory for running a sequencer and its replicas in one process.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ledger_replication::{
    DirectoryError, ReplicaDirectory, ReplicaHandle, ReplicaId, ReplicatedState,
};
use tracing::{debug, info};

/// In-memory directory of replica handles.
///
/// Clones share the same bindings.
pub struct MemoryDirectory<S>
where
    S: ReplicatedState,
{
    bindings: Arc<DashMap<ReplicaId, ReplicaHandle<S>>>,
}

impl<S> MemoryDirectory<S>
where
    S: ReplicatedState,
{
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: Arc::new(DashMap::new()),
        }
    }

    /// Number of bound handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no handles are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<S> Clone for MemoryDirectory<S>
where
    S: ReplicatedState,
{
    fn clone(&self) -> Self {
        Self {
            bindings: self.bindings.clone(),
        }
    }
}

impl<S> Default for MemoryDirectory<S>
where
    S: ReplicatedState,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Debug for MemoryDirectory<S>
where
    S: ReplicatedState,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDirectory")
            .field("bound", &self.bindings.len())
            .finish()
    }
}

#[async_trait]
impl<S> ReplicaDirectory<S> for MemoryDirectory<S>
where
    S: ReplicatedState,
{
    async fn bind(&self, handle: ReplicaHandle<S>) {
        let id = handle.id().clone();

        if self.bindings.insert(id.clone(), handle).is_some() {
            debug!("Rebound replica {}", id);
        } else {
            info!("Bound replica {}", id);
        }
    }

    async fn unbind(&self, id: &ReplicaId) {
        if self.bindings.remove(id).is_some() {
            info!("Unbound replica {}", id);
        }
    }

    async fn lookup(&self, id: &ReplicaId) -> Result<ReplicaHandle<S>, DirectoryError> {
        self.bindings
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DirectoryError::NotBound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use ledger_replication::{RemoteError, ReplicaService, Snapshot, View};

    #[derive(Debug)]
    struct StubReplica {
        id: ReplicaId,
        applied: u64,
    }

    #[async_trait]
    impl ReplicaService<u64> for StubReplica {
        fn id(&self) -> &ReplicaId {
            &self.id
        }

        async fn deliver_ordered_batch(&self, _view: View) -> Result<bool, RemoteError> {
            Ok(true)
        }

        async fn snapshot(&self) -> Result<Snapshot<u64>, RemoteError> {
            Ok(Snapshot::new(0, self.applied))
        }
    }

    fn stub(id: &str, applied: u64) -> ReplicaHandle<u64> {
        Arc::new(StubReplica {
            id: ReplicaId::from(id),
            applied,
        })
    }

    #[tokio::test]
    async fn test_bind_and_lookup() {
        let _ = tracing_subscriber::fmt::try_init();

        let directory = MemoryDirectory::new();
        directory.bind(stub("bank-R1", 0)).await;

        let handle = directory.lookup(&ReplicaId::from("bank-R1")).await.unwrap();
        assert_eq!(handle.id().as_str(), "bank-R1");
        assert_eq!(directory.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_unbound_fails() {
        let directory = MemoryDirectory::<u64>::new();

        let result = directory.lookup(&ReplicaId::from("ghost")).await;
        assert_matches!(result, Err(DirectoryError::NotBound(id)) if id.as_str() == "ghost");
    }

    #[tokio::test]
    async fn test_rebind_replaces_handle() {
        let directory = MemoryDirectory::new();
        directory.bind(stub("bank-R1", 1)).await;
        directory.bind(stub("bank-R1", 2)).await;

        let handle = directory.lookup(&ReplicaId::from("bank-R1")).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().applied(), 2);
        assert_eq!(directory.len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_bindings() {
        let directory = MemoryDirectory::new();
        let other = directory.clone();
        directory.bind(stub("bank-R1", 0)).await;

        assert!(other.lookup(&ReplicaId::from("bank-R1")).await.is_ok());

        other.unbind(&ReplicaId::from("bank-R1")).await;
        assert!(directory.is_empty());
    }
}
