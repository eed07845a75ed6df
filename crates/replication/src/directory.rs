use async_trait::async_trait;

use crate::error::DirectoryError;
use crate::replica::{ReplicaHandle, ReplicaId};
use crate::snapshot::ReplicatedState;

/// Resolves replica ids to remote handles.
#[async_trait]
pub trait ReplicaDirectory<S>: Send + Sync + 'static
where
    S: ReplicatedState,
{
    /// Binds `handle` under its id, replacing any previous binding.
    async fn bind(&self, handle: ReplicaHandle<S>);

    /// Removes the binding for `id`, if any.
    async fn unbind(&self, id: &ReplicaId);

    /// Looks up the handle bound under `id`.
    async fn lookup(&self, id: &ReplicaId) -> Result<ReplicaHandle<S>, DirectoryError>;
}
