use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::snapshot::{ReplicatedState, Snapshot};
use crate::view::View;

/// Identifies a replica within a group; also the name its handle is bound under.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReplicaId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ReplicaId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Remote capability a replica exposes to the sequencer.
#[async_trait]
pub trait ReplicaService<S>: Debug + Send + Sync + 'static
where
    S: ReplicatedState,
{
    /// The id this replica is bound under.
    fn id(&self) -> &ReplicaId;

    /// Hands the replica the current ordered view.
    ///
    /// `Ok(true)` acknowledges that the view was accepted for application. It does
    /// not promise the view has been applied yet.
    async fn deliver_ordered_batch(&self, view: View) -> Result<bool, RemoteError>;

    /// Returns the snapshot published by the most recent completed application pass.
    ///
    /// Waits for any pass that is queued or running when the call is made.
    async fn snapshot(&self) -> Result<Snapshot<S>, RemoteError>;
}

/// Shared handle to a replica, as held by the sequencer's membership registry.
pub type ReplicaHandle<S> = Arc<dyn ReplicaService<S>>;
