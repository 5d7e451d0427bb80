use serde::{Deserialize, Serialize};

use super::contact::Contact;
use super::ids::Id;

/// A typed, directed relationship between two contacts (vCard `RELATED`).
///
/// Edges are records, not references: merging rewrites ids through a remap
/// table instead of fixing up a pointer graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub source: Id<Contact>,
    pub target: Id<Contact>,
    pub kind: String,
}

impl RelationshipEdge {
    pub fn create(source: Id<Contact>, target: Id<Contact>, kind: impl Into<String>) -> Self {
        Self {
            source,
            target,
            kind: kind.into(),
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}
