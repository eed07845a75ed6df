//! Membership registry for one replication group

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ledger_replication::{ReplicaHandle, ReplicaId, ReplicatedState, Snapshot};
use parking_lot::RwLock;
use tracing::{debug, error, info};

/// A live member of a group.
pub struct MemberRecord<S>
where
    S: ReplicatedState,
{
    /// Id the member joined under
    pub id: ReplicaId,
    /// Handle used to reach the member
    pub handle: ReplicaHandle<S>,
    /// Distinguishes successive joins under the same id
    pub incarnation: u64,
}

impl<S> Clone for MemberRecord<S>
where
    S: ReplicatedState,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            handle: self.handle.clone(),
            incarnation: self.incarnation,
        }
    }
}

impl<S> Debug for MemberRecord<S>
where
    S: ReplicatedState,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberRecord")
            .field("id", &self.id)
            .field("incarnation", &self.incarnation)
            .finish_non_exhaustive()
    }
}

/// Result of offering a member's snapshot to the group's cache.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SnapshotOffer {
    /// The offered snapshot replaced the cache.
    Refreshed,
    /// The cache already holds this applied count.
    Unchanged,
    /// The cache is ahead of the offered snapshot.
    Stale,
    /// Same applied count as the cache but different state.
    Conflict,
}

/// Live members of a group plus the last snapshot known to be committed.
pub struct Group<S>
where
    S: ReplicatedState,
{
    name: String,
    members: DashMap<ReplicaId, MemberRecord<S>>,
    next_incarnation: AtomicU64,
    snapshot: RwLock<Option<Snapshot<S>>>,
}

impl<S> Group<S>
where
    S: ReplicatedState,
{
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: DashMap::new(),
            next_incarnation: AtomicU64::new(1),
            snapshot: RwLock::new(None),
        }
    }

    /// The group's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `handle` under its id, replacing any earlier record for that id.
    ///
    /// Returns the incarnation assigned to this join.
    pub fn join(&self, handle: ReplicaHandle<S>) -> u64 {
        let id = handle.id().clone();
        let incarnation = self.next_incarnation.fetch_add(1, Ordering::Relaxed);

        let previous = self.members.insert(
            id.clone(),
            MemberRecord {
                id: id.clone(),
                handle,
                incarnation,
            },
        );

        if previous.is_some() {
            info!("Replica {} rejoined group {} (incarnation {})", id, self.name, incarnation);
        } else {
            info!("Replica {} joined group {} (incarnation {})", id, self.name, incarnation);
        }

        incarnation
    }

    /// Removes `id` unconditionally. Returns whether it was a member.
    pub fn leave(&self, id: &ReplicaId) -> bool {
        let removed = self.members.remove(id).is_some();
        if removed {
            info!("Replica {} left group {}", id, self.name);
        }
        removed
    }

    /// Removes `id` only if it is still the incarnation that failed.
    ///
    /// A member that rejoined while an older delivery loop was failing keeps its
    /// newer record.
    pub fn evict(&self, id: &ReplicaId, incarnation: u64) -> bool {
        let removed = self
            .members
            .remove_if(id, |_, record| record.incarnation == incarnation)
            .is_some();

        if !removed {
            debug!(
                "Skipped eviction of replica {} from group {}: incarnation {} no longer current",
                id, self.name, incarnation
            );
        }
        removed
    }

    /// Copies of the current member records.
    pub fn members(&self) -> Vec<MemberRecord<S>> {
        self.members
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Ids of the current members, sorted.
    pub fn member_names(&self) -> Vec<ReplicaId> {
        let mut names: Vec<ReplicaId> = self.members.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Whether `id` is currently a member.
    pub fn contains(&self, id: &ReplicaId) -> bool {
        self.members.contains_key(id)
    }

    /// Number of live members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The snapshot handed to new joiners, if any has been committed.
    pub fn cached_snapshot(&self) -> Option<Snapshot<S>> {
        self.snapshot.read().clone()
    }

    /// Offers a member's snapshot to the cache.
    ///
    /// The cache only moves forward: a snapshot replaces it when its applied count
    /// is strictly greater. Equal applied counts are compared by state, and a
    /// mismatch is reported as a consistency violation.
    pub fn offer_snapshot(&self, from: &ReplicaId, candidate: Snapshot<S>) -> SnapshotOffer {
        let mut cached = self.snapshot.write();

        let offer = match cached.as_ref() {
            None => SnapshotOffer::Refreshed,
            Some(current) if candidate.applied() > current.applied() => SnapshotOffer::Refreshed,
            Some(current) if candidate.applied() < current.applied() => SnapshotOffer::Stale,
            Some(current) if candidate.state() == current.state() => SnapshotOffer::Unchanged,
            Some(current) => {
                error!(
                    "Consistency violation in group {}: replica {} reports state {:?} at cursor {}, cached state is {:?}",
                    self.name,
                    from,
                    candidate.state(),
                    candidate.applied(),
                    current.state()
                );
                SnapshotOffer::Conflict
            }
        };

        if offer == SnapshotOffer::Refreshed {
            debug!(
                "Group {} snapshot refreshed from replica {} at cursor {}",
                self.name,
                from,
                candidate.applied()
            );
            *cached = Some(candidate);
        }

        offer
    }
}

impl<S> Debug for Group<S>
where
    S: ReplicatedState,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("members", &self.member_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use ledger_replication::{RemoteError, ReplicaService, View};

    use super::*;

    #[derive(Debug)]
    struct Idle(ReplicaId);

    #[async_trait]
    impl ReplicaService<u64> for Idle {
        fn id(&self) -> &ReplicaId {
            &self.0
        }

        async fn deliver_ordered_batch(&self, _view: View) -> Result<bool, RemoteError> {
            Ok(true)
        }

        async fn snapshot(&self) -> Result<Snapshot<u64>, RemoteError> {
            Ok(Snapshot::default())
        }
    }

    fn idle(id: &str) -> ReplicaHandle<u64> {
        Arc::new(Idle(ReplicaId::from(id)))
    }

    #[test]
    fn test_join_and_leave() {
        let group = Group::new("group3");
        group.join(idle("B"));
        group.join(idle("A"));

        assert_eq!(group.len(), 2);
        assert_eq!(
            group.member_names(),
            vec![ReplicaId::from("A"), ReplicaId::from("B")]
        );

        assert!(group.leave(&ReplicaId::from("A")));
        assert!(!group.leave(&ReplicaId::from("A")));
        assert_eq!(group.member_names(), vec![ReplicaId::from("B")]);
    }

    #[test]
    fn test_evict_ignores_stale_incarnation() {
        let group = Group::new("group3");
        let first = group.join(idle("A"));
        let second = group.join(idle("A"));

        assert_ne!(first, second);
        assert!(!group.evict(&ReplicaId::from("A"), first));
        assert!(group.contains(&ReplicaId::from("A")));

        assert!(group.evict(&ReplicaId::from("A"), second));
        assert!(group.is_empty());
    }

    #[test]
    fn test_snapshot_cache_only_moves_forward() {
        let group = Group::<u64>::new("group3");
        let from = ReplicaId::from("A");
        assert!(group.cached_snapshot().is_none());

        assert_eq!(group.offer_snapshot(&from, Snapshot::new(10, 1)), SnapshotOffer::Refreshed);
        assert_eq!(group.offer_snapshot(&from, Snapshot::new(30, 3)), SnapshotOffer::Refreshed);
        assert_eq!(group.offer_snapshot(&from, Snapshot::new(20, 2)), SnapshotOffer::Stale);
        assert_eq!(group.offer_snapshot(&from, Snapshot::new(30, 3)), SnapshotOffer::Unchanged);

        assert_eq!(group.cached_snapshot(), Some(Snapshot::new(30, 3)));
    }

    #[test]
    fn test_snapshot_conflict_keeps_cache() {
        let group = Group::<u64>::new("group3");
        let from = ReplicaId::from("A");
        group.offer_snapshot(&from, Snapshot::new(30, 3));

        assert_eq!(
            group.offer_snapshot(&ReplicaId::from("B"), Snapshot::new(31, 3)),
            SnapshotOffer::Conflict
        );
        assert_eq!(group.cached_snapshot(), Some(Snapshot::new(30, 3)));
    }
}
