use std::ops::Deref;
use std::sync::Arc;

use crate::operation::Operation;

/// A cheaply clonable, immutable copy of the ordered log.
///
/// Each broadcast round hands the same `View` to every member, so cloning only
/// bumps a reference count.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct View {
    entries: Arc<[Operation]>,
}

impl View {
    /// Number of entries in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the view has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries starting at `position`, or an empty slice past the end.
    #[must_use]
    pub fn entries_from(&self, position: usize) -> &[Operation] {
        self.entries.get(position..).unwrap_or_default()
    }
}

impl Deref for View {
    type Target = [Operation];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl From<Vec<Operation>> for View {
    fn from(entries: Vec<Operation>) -> Self {
        Self {
            entries: entries.into(),
        }
    }
}

impl FromIterator<Operation> for View {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
