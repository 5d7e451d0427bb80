pub mod ids;
pub mod raw;
pub mod contact;
pub mod relationship;
pub mod decision;

// Re-exports for convenience
pub use ids::Id;
pub use raw::{PropertyValue, RawContact, RawProperty};
pub use contact::{
    Address, Contact, ContactKind, Email, ExtraProperty, Name, NormalizedValue, Phone, SourceRef,
};
pub use relationship::RelationshipEdge;
pub use decision::{
    ClusterConfidence, ClusterId, ConflictPolicy, ConflictValue, Corroboration, DuplicateCluster,
    FieldConflict, FieldResolution, MergeDecision, MergeOutcome, PhoneMatch, Resolution,
    Retirement, SimilarityDecision, Signals, SingleField,
};
