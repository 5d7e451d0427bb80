use serde::{Deserialize, Serialize};
use std::fmt;

use super::contact::Contact;
use super::ids::Id;

/// How two phone sets matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneMatch {
    /// Both numbers parsed and share an E.164 value.
    Canonical,
    /// At least one side could not be parsed; matched on raw digits.
    Raw,
}

/// Weaker signals that can corroborate a fuzzy name match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corroboration {
    Organization,
    Address,
    Birthday,
}

impl fmt::Display for Corroboration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Corroboration::Organization => "organization",
            Corroboration::Address => "address",
            Corroboration::Birthday => "birthday",
        };
        f.write_str(s)
    }
}

/// Independent signal breakdown for one pair. Absent data on either side
/// leaves a signal at its neutral value (`false` / `None`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub email_exact: bool,
    pub phone_exact: Option<PhoneMatch>,
    pub uid_exact: bool,
    /// `None` when either side has no name.
    pub name_score: Option<f64>,
    pub corroborations: Vec<Corroboration>,
}

impl Signals {
    pub fn has_exact(&self) -> bool {
        self.email_exact || self.phone_exact.is_some() || self.uid_exact
    }
}

/// The scored comparison of an unordered pair, stored once with
/// `first < second`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityDecision {
    pub first: Id<Contact>,
    pub second: Id<Contact>,
    /// Composite score in [0, 1], for reporting and cluster confidence.
    pub score: f64,
    pub signals: Signals,
    pub is_candidate: bool,
}

/// Sequential cluster index, assigned in order of each cluster's earliest
/// member so ids are stable across reruns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub usize);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster-{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfidence {
    pub edges: usize,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub email_edges: usize,
    pub phone_edges: usize,
    pub uid_edges: usize,
    pub name_edges: usize,
}

/// A connected component of candidate pairs. Singletons mean "no duplicate
/// found". Members are listed in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCluster {
    pub id: ClusterId,
    pub members: Vec<Id<Contact>>,
    pub confidence: ClusterConfidence,
}

impl DuplicateCluster {
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    pub fn contains(&self, id: Id<Contact>) -> bool {
        self.members.contains(&id)
    }
}

/// Single-valued fields that can conflict during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleField {
    Organization,
    Title,
    Birthday,
    Kind,
}

impl SingleField {
    pub const ALL: [SingleField; 4] = [
        SingleField::Organization,
        SingleField::Title,
        SingleField::Birthday,
        SingleField::Kind,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SingleField::Organization => "organization",
            SingleField::Title => "title",
            SingleField::Birthday => "birthday",
            SingleField::Kind => "kind",
        }
    }
}

impl fmt::Display for SingleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictValue {
    pub contact: Id<Contact>,
    pub value: String,
}

/// Two or more members disagree on a single-valued field. The first value
/// always belongs to the base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: SingleField,
    pub values: Vec<ConflictValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Automatic mode: the base keeps its value and the conflict is logged.
    BaseWins,
    /// A decision provider picked a value.
    Chosen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// The base's value was kept; nobody disagreed.
    Kept { value: String },
    /// The base had nothing; the value came from another member.
    Adopted { value: String, from: Id<Contact> },
    /// Multi-valued union; `added` lists values the base did not have.
    Unioned { added: Vec<String> },
    Conflict {
        conflict: FieldConflict,
        chosen: String,
        policy: ConflictPolicy,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldResolution {
    pub field: String,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retirement {
    pub retired: Id<Contact>,
    pub survivor: Id<Contact>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged,
    Skipped,
}

/// Record of how one multi-member cluster was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDecision {
    pub cluster: ClusterId,
    pub outcome: MergeOutcome,
    pub base: Option<Id<Contact>>,
    pub resolutions: Vec<FieldResolution>,
    pub retired: Vec<Retirement>,
}

impl MergeDecision {
    pub fn conflicts(&self) -> impl Iterator<Item = &FieldResolution> {
        self.resolutions
            .iter()
            .filter(|r| matches!(r.resolution, Resolution::Conflict { .. }))
    }
}
