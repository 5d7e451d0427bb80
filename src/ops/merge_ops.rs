use chrono::NaiveDate;
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{DedupeError, DedupeResult};
use crate::model::*;

/// What a decision provider wants done with a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseChoice {
    Base(Id<Contact>),
    /// Leave every member as a separate contact. Also used for a cancelled
    /// prompt.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Index into `FieldConflict::values`.
    Value(usize),
    /// Abandon the whole cluster; it ends `Skipped` with nothing changed.
    Cancel,
}

/// Source of merge decisions. The resolver's state machine is the same
/// whether the answers come from a person or from a fixed policy.
pub trait DecisionProvider {
    fn choose_base(&mut self, cluster: &DuplicateCluster, members: &[&Contact]) -> BaseChoice;

    fn resolve_conflict(
        &mut self,
        cluster: &DuplicateCluster,
        members: &[&Contact],
        conflict: &FieldConflict,
    ) -> ConflictChoice;

    /// How conflicts settled by this provider are recorded.
    fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy::Chosen
    }
}

/// Deterministic, non-interactive decisions: the most complete member is
/// the base (earliest member on ties) and the base wins every conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutomaticPolicy;

impl DecisionProvider for AutomaticPolicy {
    fn choose_base(&mut self, _cluster: &DuplicateCluster, members: &[&Contact]) -> BaseChoice {
        match most_complete(members) {
            Some(id) => BaseChoice::Base(id),
            None => BaseChoice::Skip,
        }
    }

    fn resolve_conflict(
        &mut self,
        cluster: &DuplicateCluster,
        _members: &[&Contact],
        conflict: &FieldConflict,
    ) -> ConflictChoice {
        warn!(
            "{}: conflicting {} values {:?}; keeping '{}'",
            cluster.id,
            conflict.field,
            conflict.values.iter().map(|v| &v.value).collect::<Vec<_>>(),
            conflict.values.first().map(|v| v.value.as_str()).unwrap_or_default()
        );
        ConflictChoice::Value(0)
    }

    fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy::BaseWins
    }
}

/// The member with the most populated fields; ties go to the earliest.
pub fn most_complete(members: &[&Contact]) -> Option<Id<Contact>> {
    let mut best: Option<&Contact> = None;
    for member in members {
        if best.map_or(true, |b| member.populated_fields() > b.populated_fields()) {
            best = Some(member);
        }
    }
    best.map(|c| c.id)
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeState {
    AwaitingDecision,
    BaseSelected { base: Id<Contact> },
    FieldsUnioned { merged: Box<Contact> },
    Skipped,
}

impl MergeState {
    pub fn name(&self) -> &'static str {
        match self {
            MergeState::AwaitingDecision => "AwaitingDecision",
            MergeState::BaseSelected { .. } => "BaseSelected",
            MergeState::FieldsUnioned { .. } => "FieldsUnioned",
            MergeState::Skipped => "Skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MergeState::FieldsUnioned { .. } | MergeState::Skipped)
    }
}

/// Final result of resolving one cluster.
#[derive(Debug, Clone)]
pub enum MergeResult {
    Merged {
        contact: Contact,
        decision: MergeDecision,
        also_known_as: Vec<String>,
    },
    Skipped { decision: MergeDecision },
}

impl MergeResult {
    pub fn decision(&self) -> &MergeDecision {
        match self {
            MergeResult::Merged { decision, .. } => decision,
            MergeResult::Skipped { decision } => decision,
        }
    }
}

/// Merge state machine for one multi-member cluster.
///
/// `AwaitingDecision -> BaseSelected -> FieldsUnioned`, or `Skipped` from
/// either non-terminal state. Member contacts are only read; the merged
/// contact is a new value.
#[derive(Debug)]
pub struct ClusterMerge<'a> {
    cluster: &'a DuplicateCluster,
    members: Vec<&'a Contact>,
    state: MergeState,
    resolutions: Vec<FieldResolution>,
    also_known_as: Vec<String>,
}

impl<'a> ClusterMerge<'a> {
    /// `members` must be exactly the cluster's contacts, in cluster order.
    pub fn new(cluster: &'a DuplicateCluster, members: Vec<&'a Contact>) -> DedupeResult<Self> {
        let ids: Vec<Id<Contact>> = members.iter().map(|c| c.id).collect();
        if ids != cluster.members {
            return Err(DedupeError::ClusterIntegrity(format!(
                "{} members do not match the contacts supplied for merging",
                cluster.id
            )));
        }
        if members.len() < 2 {
            return Err(DedupeError::Config(format!(
                "{} has a single member; nothing to merge",
                cluster.id
            )));
        }
        Ok(Self {
            cluster,
            members,
            state: MergeState::AwaitingDecision,
            resolutions: Vec::new(),
            also_known_as: Vec::new(),
        })
    }

    pub fn state(&self) -> &MergeState {
        &self.state
    }

    pub fn members(&self) -> &[&'a Contact] {
        &self.members
    }

    pub fn select_base(&mut self, base: Id<Contact>) -> DedupeResult<()> {
        if self.state != MergeState::AwaitingDecision {
            return Err(self.invalid("select_base"));
        }
        if !self.cluster.contains(base) {
            return Err(DedupeError::NotFound {
                entity_type: format!("Member of {}", self.cluster.id),
                id: base.to_string(),
            });
        }
        self.state = MergeState::BaseSelected { base };
        Ok(())
    }

    pub fn skip(&mut self) -> DedupeResult<()> {
        if self.state.is_terminal() {
            return Err(self.invalid("skip"));
        }
        self.resolutions.clear();
        self.also_known_as.clear();
        self.state = MergeState::Skipped;
        Ok(())
    }

    /// Unions every member into the base. A cancelled conflict prompt
    /// moves the cluster to `Skipped` instead.
    pub fn union_fields(&mut self, provider: &mut dyn DecisionProvider) -> DedupeResult<()> {
        let base_id = match self.state {
            MergeState::BaseSelected { base } => base,
            _ => return Err(self.invalid("union_fields")),
        };

        match self.build_merged(base_id, provider)? {
            Some(merged) => {
                self.state = MergeState::FieldsUnioned {
                    merged: Box::new(merged),
                };
            }
            None => {
                info!("{}: conflict resolution cancelled, skipping", self.cluster.id);
                self.skip()?;
            }
        }
        Ok(())
    }

    pub fn into_outcome(self) -> DedupeResult<MergeResult> {
        match self.state {
            MergeState::FieldsUnioned { merged } => {
                let retired = self
                    .members
                    .iter()
                    .filter(|m| m.id != merged.id)
                    .map(|m| Retirement {
                        retired: m.id,
                        survivor: merged.id,
                    })
                    .collect();
                let decision = MergeDecision {
                    cluster: self.cluster.id,
                    outcome: MergeOutcome::Merged,
                    base: Some(merged.id),
                    resolutions: self.resolutions,
                    retired,
                };
                Ok(MergeResult::Merged {
                    contact: *merged,
                    decision,
                    also_known_as: self.also_known_as,
                })
            }
            MergeState::Skipped => Ok(MergeResult::Skipped {
                decision: MergeDecision {
                    cluster: self.cluster.id,
                    outcome: MergeOutcome::Skipped,
                    base: None,
                    resolutions: Vec::new(),
                    retired: Vec::new(),
                },
            }),
            pending => Err(DedupeError::InvalidTransition {
                state: pending.name(),
                action: "into_outcome",
            }),
        }
    }

    fn invalid(&self, action: &'static str) -> DedupeError {
        DedupeError::InvalidTransition {
            state: self.state.name(),
            action,
        }
    }

    /// Base first, then the other members in cluster order.
    fn ordered(&self, base_id: Id<Contact>) -> Vec<&'a Contact> {
        let mut ordered: Vec<&'a Contact> =
            self.members.iter().copied().filter(|m| m.id == base_id).collect();
        ordered.extend(self.members.iter().copied().filter(|m| m.id != base_id));
        ordered
    }

    fn build_merged(
        &mut self,
        base_id: Id<Contact>,
        provider: &mut dyn DecisionProvider,
    ) -> DedupeResult<Option<Contact>> {
        let ordered = self.ordered(base_id);
        let base = ordered[0];
        let mut merged = base.clone();
        let mut resolutions: Vec<FieldResolution> = Vec::new();

        // Multi-valued fields: union, exact duplicates removed.
        let emails = union_by(&ordered, |c| &c.emails, |a, b| a.address == b.address);
        record_union(&mut resolutions, "emails", &base.emails, &emails, |e| e.address.clone());
        merged.emails = emails;

        let phones = union_by(&ordered, |c| &c.phones, |a, b| a.number.canonical == b.number.canonical);
        record_union(&mut resolutions, "phones", &base.phones, &phones, |p| {
            p.number.canonical.clone()
        });
        merged.phones = phones;

        let addresses = union_by(&ordered, |c| &c.addresses, |a, b| a.components() == b.components());
        record_union(&mut resolutions, "addresses", &base.addresses, &addresses, |a| a.to_string());
        merged.addresses = addresses;

        let categories = union_by(&ordered, |c| &c.categories, |a, b| a == b);
        record_union(&mut resolutions, "categories", &base.categories, &categories, |c| c.clone());
        merged.categories = categories;

        let extra = union_by(&ordered, |c| &c.extra, |a, b| a == b);
        record_union(&mut resolutions, "other", &base.extra, &extra, |e| {
            format!("{}: {}", e.name, e.value)
        });
        merged.extra = extra;

        // Edges from retired members now start at the survivor.
        let mut relationships: Vec<RelationshipEdge> = Vec::new();
        for edge in ordered.iter().flat_map(|c| &c.relationships) {
            let target = if edge.is_self_loop() { base_id } else { edge.target };
            let rehomed = RelationshipEdge::create(base_id, target, edge.kind.clone());
            // Edges between cluster members vanish with the merge.
            if rehomed.is_self_loop() && !edge.is_self_loop() {
                continue;
            }
            if !relationships.contains(&rehomed) {
                relationships.push(rehomed);
            }
        }
        record_union(&mut resolutions, "relationships", &base.relationships, &relationships, |r| {
            format!("{} -> {}", r.kind, r.target)
        });
        merged.relationships = relationships;

        merged.sources = union_by(&ordered, |c| &c.sources, |a, b| a == b);
        merged.revision = ordered.iter().filter_map(|c| c.revision).max();

        if merged.name.is_empty() {
            if let Some(donor) = ordered.iter().find(|c| !c.name.is_empty()) {
                merged.name = donor.name.clone();
                resolutions.push(FieldResolution {
                    field: "name".to_string(),
                    resolution: Resolution::Adopted {
                        value: donor.label(),
                        from: donor.id,
                    },
                });
            }
        }
        if merged.uid.is_none() {
            merged.uid = ordered.iter().find_map(|c| c.uid.clone());
        }

        // Single-valued fields: base value, else first non-empty, with
        // disagreements surfaced as conflicts.
        for field in SingleField::ALL {
            let outcome = match field {
                SingleField::Organization => self
                    .resolve_single(field, &ordered, |c| c.organization.clone(), String::clone, provider)?
                    .map(|(v, r)| {
                        merged.organization = v;
                        r
                    }),
                SingleField::Title => self
                    .resolve_single(field, &ordered, |c| c.title.clone(), String::clone, provider)?
                    .map(|(v, r)| {
                        merged.title = v;
                        r
                    }),
                SingleField::Birthday => self
                    .resolve_single(
                        field,
                        &ordered,
                        |c| c.birthday,
                        |v: &NaiveDate| v.format("%Y-%m-%d").to_string(),
                        provider,
                    )?
                    .map(|(v, r)| {
                        merged.birthday = v;
                        r
                    }),
                SingleField::Kind => self
                    .resolve_single(field, &ordered, |c| c.kind, ContactKind::to_string, provider)?
                    .map(|(v, r)| {
                        merged.kind = v;
                        r
                    }),
            };
            match outcome {
                Some(Some(resolution)) => resolutions.push(resolution),
                Some(None) => {}
                None => return Ok(None),
            }
        }

        let display = merged.name.display();
        let mut also_known_as: Vec<String> = Vec::new();
        for member in &ordered[1..] {
            if let Some(name) = member.name.display() {
                if Some(&name) != display.as_ref() && !also_known_as.contains(&name) {
                    also_known_as.push(name);
                }
            }
        }

        info!(
            "{}: merged {} contacts into {} ({})",
            self.cluster.id,
            ordered.len(),
            merged.label(),
            merged.id
        );
        self.resolutions = resolutions;
        self.also_known_as = also_known_as;
        Ok(Some(merged))
    }

    /// Resolves one single-valued field. `None` means the provider
    /// cancelled; otherwise the chosen value and its resolution record.
    fn resolve_single<T: Clone + PartialEq>(
        &self,
        field: SingleField,
        ordered: &[&Contact],
        get: impl Fn(&Contact) -> Option<T>,
        render: impl Fn(&T) -> String,
        provider: &mut dyn DecisionProvider,
    ) -> DedupeResult<Option<(Option<T>, Option<FieldResolution>)>> {
        let mut distinct: Vec<(Id<Contact>, T)> = Vec::new();
        for contact in ordered {
            if let Some(value) = get(contact) {
                if !distinct.iter().any(|(_, v)| *v == value) {
                    distinct.push((contact.id, value));
                }
            }
        }
        let base_id = ordered[0].id;
        let name = field.as_str().to_string();

        match distinct.len() {
            0 => Ok(Some((None, None))),
            1 => {
                let (from, value) = distinct.remove(0);
                let resolution = if from == base_id {
                    Resolution::Kept {
                        value: render(&value),
                    }
                } else {
                    Resolution::Adopted {
                        value: render(&value),
                        from,
                    }
                };
                Ok(Some((
                    Some(value),
                    Some(FieldResolution {
                        field: name,
                        resolution,
                    }),
                )))
            }
            _ => {
                let conflict = FieldConflict {
                    field,
                    values: distinct
                        .iter()
                        .map(|(contact, value)| ConflictValue {
                            contact: *contact,
                            value: render(value),
                        })
                        .collect(),
                };
                let index = match provider.resolve_conflict(self.cluster, &self.members, &conflict) {
                    ConflictChoice::Value(index) => index,
                    ConflictChoice::Cancel => return Ok(None),
                };
                let (_, value) = distinct.get(index).cloned().ok_or_else(|| DedupeError::NotFound {
                    entity_type: format!("Value for {}", field),
                    id: index.to_string(),
                })?;
                let chosen = render(&value);
                Ok(Some((
                    Some(value),
                    Some(FieldResolution {
                        field: name,
                        resolution: Resolution::Conflict {
                            conflict,
                            chosen,
                            policy: provider.conflict_policy(),
                        },
                    }),
                )))
            }
        }
    }
}

/// Union of a multi-valued field across `ordered`, first occurrence kept.
fn union_by<T: Clone>(
    ordered: &[&Contact],
    field: impl Fn(&Contact) -> &Vec<T>,
    same: impl Fn(&T, &T) -> bool,
) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for contact in ordered {
        for value in field(contact) {
            if !out.iter().any(|existing| same(existing, value)) {
                out.push(value.clone());
            }
        }
    }
    out
}

fn record_union<T>(
    resolutions: &mut Vec<FieldResolution>,
    field: &str,
    before: &[T],
    after: &[T],
    render: impl Fn(&T) -> String,
) {
    let existing: BTreeSet<String> = before.iter().map(&render).collect();
    let added: Vec<String> = after
        .iter()
        .map(&render)
        .filter(|value| !existing.contains(value))
        .collect();
    if !added.is_empty() {
        resolutions.push(FieldResolution {
            field: field.to_string(),
            resolution: Resolution::Unioned { added },
        });
    }
}

/// Drives one cluster through the state machine with `provider`.
pub fn resolve_cluster(
    cluster: &DuplicateCluster,
    members: &[&Contact],
    provider: &mut dyn DecisionProvider,
) -> DedupeResult<MergeResult> {
    let mut merge = ClusterMerge::new(cluster, members.to_vec())?;
    match provider.choose_base(cluster, merge.members()) {
        BaseChoice::Base(base) => {
            merge.select_base(base)?;
            merge.union_fields(provider)?;
        }
        BaseChoice::Skip => {
            info!("{}: skipped, members left unchanged", cluster.id);
            merge.skip()?;
        }
    }
    merge.into_outcome()
}

/// Rewrites every relationship edge through the retired-to-survivor table.
/// Edges that a merge turned into self-loops are dropped, and duplicates
/// left by the rewrite are collapsed. Fails if a retired id is still
/// referenced afterwards.
pub fn remap_relationships(
    contacts: &[Contact],
    remap: &BTreeMap<Id<Contact>, Id<Contact>>,
) -> DedupeResult<Vec<Contact>> {
    let resolve = |id: Id<Contact>| remap.get(&id).copied().unwrap_or(id);

    let remapped: Vec<Contact> = contacts
        .iter()
        .map(|contact| {
            let mut relationships: Vec<RelationshipEdge> = Vec::new();
            for edge in &contact.relationships {
                let rewritten = RelationshipEdge::create(
                    resolve(edge.source),
                    resolve(edge.target),
                    edge.kind.clone(),
                );
                if rewritten.is_self_loop() && !edge.is_self_loop() {
                    continue;
                }
                if !relationships.contains(&rewritten) {
                    relationships.push(rewritten);
                }
            }
            Contact {
                relationships,
                ..contact.clone()
            }
        })
        .collect();

    verify_no_retired(&remapped, remap)?;
    Ok(remapped)
}

/// Fails if any contact or edge still names a retired id.
pub fn verify_no_retired(
    contacts: &[Contact],
    remap: &BTreeMap<Id<Contact>, Id<Contact>>,
) -> DedupeResult<()> {
    let retired: BTreeSet<&Id<Contact>> = remap.keys().collect();
    for contact in contacts {
        if retired.contains(&contact.id) {
            return Err(DedupeError::ClusterIntegrity(format!(
                "retired contact {} is still in the output",
                contact.id
            )));
        }
        if let Some(edge) = contact
            .relationships
            .iter()
            .find(|e| retired.contains(&e.source) || retired.contains(&e.target))
        {
            return Err(DedupeError::ClusterIntegrity(format!(
                "relationship {} -> {} on {} references a retired contact",
                edge.source, edge.target, contact.id
            )));
        }
    }
    Ok(())
}
