use std::fmt;

use serde::{Deserialize, Serialize};

use crate::replica::ReplicaId;

/// Globally unique operation id, conventionally `<originating-replica>:<local-sequence>`.
///
/// Identity of an [`Operation`] is its id alone. Ids that do not follow the
/// structured form are still valid; they just carry no provenance.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Builds a structured id from the issuing replica and its local counter.
    #[must_use]
    pub fn new(origin: &ReplicaId, sequence: u64) -> Self {
        Self(format!("{origin}:{sequence}"))
    }

    /// The replica that issued the operation, if the id is structured.
    #[must_use]
    pub fn origin(&self) -> Option<ReplicaId> {
        self.split().map(|(origin, _)| ReplicaId::from(origin))
    }

    /// The issuing replica's local sequence number, if the id is structured.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.split().map(|(_, sequence)| sequence)
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> Option<(&str, u64)> {
        let (origin, sequence) = self.0.rsplit_once(':')?;
        if origin.is_empty() {
            return None;
        }
        sequence.parse().ok().map(|sequence| (origin, sequence))
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OperationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An immutable command paired with its unique id.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    command: String,
    id: OperationId,
}

impl Operation {
    /// Creates a new operation.
    pub fn new(command: impl Into<String>, id: impl Into<OperationId>) -> Self {
        Self {
            command: command.into(),
            id: id.into(),
        }
    }

    /// The opaque command string.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The operation's unique id.
    #[must_use]
    pub const fn id(&self) -> &OperationId {
        &self.id
    }

    /// Whether this operation was issued by `replica`.
    #[must_use]
    pub fn originated_at(&self, replica: &ReplicaId) -> bool {
        self.id.origin().as_ref() == Some(replica)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_id_exposes_provenance() {
        let id = OperationId::new(&ReplicaId::from("bank-R1"), 7);

        assert_eq!(id.as_str(), "bank-R1:7");
        assert_eq!(id.origin(), Some(ReplicaId::from("bank-R1")));
        assert_eq!(id.sequence(), Some(7));
    }

    #[test]
    fn test_origin_may_contain_colons() {
        let id = OperationId::from("host:bank:12");

        assert_eq!(id.origin(), Some(ReplicaId::from("host:bank")));
        assert_eq!(id.sequence(), Some(12));
    }

    #[test]
    fn test_unstructured_id_has_no_provenance() {
        let id = OperationId::from("5f1c0a4e");

        assert_eq!(id.origin(), None);
        assert_eq!(id.sequence(), None);
        assert_eq!(OperationId::from(":3").origin(), None);
    }

    #[test]
    fn test_identity_is_by_id_not_payload() {
        let a = Operation::new("deposit USD 100", "A:1");
        let b = Operation::new("deposit USD 999", "A:1");

        assert_eq!(a.id(), b.id());
        assert!(a.originated_at(&ReplicaId::from("A")));
        assert!(!a.originated_at(&ReplicaId::from("B")));
    }

    #[test]
    fn test_operation_wire_shape() {
        let op = Operation::new("deposit USD 100", "A:1");
        let json = serde_json::to_string(&op).unwrap();

        assert_eq!(json, r#"{"command":"deposit USD 100","id":"A:1"}"#);
        assert_eq!(serde_json::from_str::<Operation>(&json).unwrap(), op);
    }
}
