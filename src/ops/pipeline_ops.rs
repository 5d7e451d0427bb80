//! One sequential batch: normalize, canonicalize phones, classify, score,
//! cluster, merge, remap relationships and assemble the change report.

use log::info;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{Settings, StripRules};
use crate::error::{DedupeError, DedupeResult};
use crate::model::*;
use crate::ops::classify_ops::with_kind;
use crate::ops::cluster_ops::{build_clusters, verify_partition};
use crate::ops::merge_ops::{remap_relationships, resolve_cluster, DecisionProvider, MergeResult};
use crate::ops::normalize_ops::normalize_record;
use crate::ops::phone_ops::canonicalize_phones;
use crate::ops::similarity_ops::find_candidates;
use crate::report::{diff_contacts, ChangeReport, ContactChanges, RunSummary};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Final contacts in input order; a merged contact takes the position
    /// of its earliest member.
    pub contacts: Vec<Contact>,
    pub report: ChangeReport,
}

/// Runs the whole engine over `records`. Decisions for multi-member
/// clusters come from `provider`. Integrity violations abort the run and
/// no output is returned.
pub fn run(
    records: &[RawContact],
    settings: &Settings,
    provider: &mut dyn DecisionProvider,
) -> DedupeResult<PipelineOutput> {
    settings.validate()?;
    let rules = StripRules::compile(&settings.strip)?;
    let phone_settings = settings.phone();

    let mut seen: BTreeSet<Id<Contact>> = BTreeSet::new();
    if let Some(dup) = records.iter().find(|r| !seen.insert(r.id)) {
        return Err(DedupeError::ClusterIntegrity(format!(
            "record id {} appears more than once in the input",
            dup.id
        )));
    }

    info!("Normalizing {} records", records.len());
    let mut ancestors: BTreeMap<Id<Contact>, Contact> = BTreeMap::new();
    let mut contacts: Vec<Contact> = Vec::with_capacity(records.len());
    let mut stripped = Vec::new();
    for raw in records {
        let normalized = normalize_record(raw, &rules);
        let (mut contact, collapsed) = canonicalize_phones(&normalized.contact, &phone_settings);
        if settings.classify_kinds && contact.kind.is_none() {
            contact = with_kind(&contact);
        }
        ancestors.insert(raw.id, normalized.ancestor);
        stripped.extend(normalized.stripped);
        stripped.extend(collapsed);
        contacts.push(contact);
    }
    info!("Stripped {} properties", stripped.len());

    let decisions = find_candidates(&contacts, &settings.similarity);
    let clusters = build_clusters(&contacts, &decisions)?;
    verify_partition(&clusters, &contacts)?;

    let by_id: BTreeMap<Id<Contact>, &Contact> = contacts.iter().map(|c| (c.id, c)).collect();
    let mut survivors: BTreeMap<Id<Contact>, Contact> = BTreeMap::new();
    let mut remap: BTreeMap<Id<Contact>, Id<Contact>> = BTreeMap::new();
    let mut also_known_as: BTreeMap<Id<Contact>, Vec<String>> = BTreeMap::new();
    let mut merges: Vec<MergeDecision> = Vec::new();

    for cluster in clusters.iter().filter(|c| !c.is_singleton()) {
        let members = cluster
            .members
            .iter()
            .map(|id| {
                by_id.get(id).copied().ok_or_else(|| DedupeError::NotFound {
                    entity_type: "Contact".to_string(),
                    id: id.to_string(),
                })
            })
            .collect::<DedupeResult<Vec<&Contact>>>()?;

        match resolve_cluster(cluster, &members, provider)? {
            MergeResult::Merged {
                contact,
                decision,
                also_known_as: names,
            } => {
                for retirement in &decision.retired {
                    if remap.insert(retirement.retired, retirement.survivor).is_some() {
                        return Err(DedupeError::ClusterIntegrity(format!(
                            "contact {} retired twice",
                            retirement.retired
                        )));
                    }
                }
                if !names.is_empty() {
                    also_known_as.insert(contact.id, names);
                }
                survivors.insert(contact.id, contact);
                merges.push(decision);
            }
            MergeResult::Skipped { decision } => merges.push(decision),
        }
    }

    // Input order, one slot per surviving identity.
    let mut placed: BTreeSet<Id<Contact>> = BTreeSet::new();
    let mut ordered: Vec<Contact> = Vec::with_capacity(contacts.len());
    for contact in &contacts {
        let key = remap.get(&contact.id).copied().unwrap_or(contact.id);
        if !placed.insert(key) {
            continue;
        }
        match survivors.get(&key) {
            Some(merged) => ordered.push(merged.clone()),
            None => ordered.push(contact.clone()),
        }
    }
    let output = remap_relationships(&ordered, &remap)?;

    let mut entries: Vec<ContactChanges> = Vec::new();
    for contact in &output {
        let changes = match ancestors.get(&contact.id) {
            Some(ancestor) => diff_contacts(ancestor, contact),
            None => Vec::new(),
        };
        let names = also_known_as.remove(&contact.id).unwrap_or_default();
        if changes.is_empty() && names.is_empty() {
            continue;
        }
        entries.push(ContactChanges {
            contact: contact.id,
            label: contact.label(),
            sources: contact.sources.iter().map(|s| s.label.clone()).collect(),
            changes,
            also_known_as: names,
        });
    }

    let multi: Vec<&DuplicateCluster> = clusters.iter().filter(|c| !c.is_singleton()).collect();
    let cross_source = multi
        .iter()
        .filter(|cluster| {
            let labels: BTreeSet<&str> = cluster
                .members
                .iter()
                .filter_map(|id| by_id.get(id))
                .flat_map(|c| c.sources.iter().map(|s| s.label.as_str()))
                .collect();
            labels.len() > 1
        })
        .count();

    let summary = RunSummary {
        input_records: records.len(),
        self_contacts: contacts.iter().filter(|c| c.is_self()).count(),
        output_contacts: output.len(),
        duplicate_clusters: multi.len(),
        cross_source_clusters: cross_source,
        merged_away: remap.len(),
        skipped_clusters: merges
            .iter()
            .filter(|m| m.outcome == MergeOutcome::Skipped)
            .count(),
        conflicts: merges.iter().map(|m| m.conflicts().count()).sum(),
        stripped_properties: stripped.len(),
        invalid_phones: output
            .iter()
            .flat_map(|c| &c.phones)
            .filter(|p| !p.number.valid)
            .count(),
    };
    info!(
        "Run complete: {} records in, {} contacts out, {} merged away, {} clusters skipped",
        summary.input_records, summary.output_contacts, summary.merged_away, summary.skipped_clusters
    );

    Ok(PipelineOutput {
        contacts: output,
        report: ChangeReport {
            summary,
            contacts: entries,
            stripped,
            merges,
        },
    })
}
