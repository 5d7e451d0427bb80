//! The change report handed to the reporting/export collaborator.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::model::{Contact, Id, MergeDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StripReason {
    /// Matched a configured vendor pattern.
    Vendor,
    /// An `X-` property no pattern claimed.
    UnknownExtension,
    /// Photo, logo, sound or any other inline binary payload.
    Binary,
    /// `VERSION` / `PRODID`; regenerated by the exporter.
    Envelope,
    /// The value could not be interpreted.
    Malformed,
    /// A second occurrence of a single-valued property; the first is kept.
    Repeated,
}

/// One property removed by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrippedItem {
    pub contact: Id<Contact>,
    pub property: String,
    pub reason: StripReason,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub previous: Vec<String>,
    pub new: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactChanges {
    pub contact: Id<Contact>,
    pub label: String,
    pub sources: Vec<String>,
    pub changes: Vec<FieldChange>,
    /// Display names of merged-away members that differ from the survivor's.
    pub also_known_as: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub input_records: usize,
    pub self_contacts: usize,
    pub output_contacts: usize,
    pub duplicate_clusters: usize,
    pub cross_source_clusters: usize,
    pub merged_away: usize,
    pub skipped_clusters: usize,
    pub conflicts: usize,
    pub stripped_properties: usize,
    pub invalid_phones: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub summary: RunSummary,
    pub contacts: Vec<ContactChanges>,
    pub stripped: Vec<StrippedItem>,
    pub merges: Vec<MergeDecision>,
}

impl ChangeReport {
    /// True when the run changed nothing: no field changes, nothing
    /// stripped, nothing merged.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.stripped.is_empty() && self.merges.is_empty()
    }

    /// Plain-text changelog, one block per modified contact.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let s = &self.summary;
        let _ = writeln!(out, "Contacts read in: {}", s.input_records);
        let _ = writeln!(out, "Contacts written out: {}", s.output_contacts);
        let _ = writeln!(
            out,
            "Duplicate clusters: {} ({} cross-source, {} skipped)",
            s.duplicate_clusters, s.cross_source_clusters, s.skipped_clusters
        );
        let _ = writeln!(out, "Duplicates merged away: {}", s.merged_away);
        let _ = writeln!(out, "Conflicts: {}", s.conflicts);
        let _ = writeln!(out, "Properties stripped: {}", s.stripped_properties);
        let _ = writeln!(out, "Unparseable phones kept as-is: {}", s.invalid_phones);
        let _ = writeln!(out);

        for entry in &self.contacts {
            let sources = if entry.sources.is_empty() {
                String::new()
            } else {
                format!("  (sources: {})", entry.sources.join(", "))
            };
            let _ = writeln!(out, "{}:{}", entry.label, sources);
            for change in &entry.changes {
                let _ = writeln!(
                    out,
                    "  - {}: [{}] -> [{}]",
                    change.field,
                    change.previous.join(", "),
                    change.new.join(", ")
                );
            }
            if !entry.also_known_as.is_empty() {
                let _ = writeln!(out, "  - also seen as: {}", entry.also_known_as.join(", "));
            }
            let _ = writeln!(out);
        }

        if !self.stripped.is_empty() {
            let _ = writeln!(out, "Stripped properties:");
            for item in &self.stripped {
                let detail = item
                    .detail
                    .as_deref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "  - {} {} [{:?}]{}",
                    item.contact, item.property, item.reason, detail
                );
            }
        }
        out
    }
}

/// Field-by-field difference between a contact and its nearest pre-merge
/// ancestor. Each field is compared as an ordered list of rendered values.
pub fn diff_contacts(before: &Contact, after: &Contact) -> Vec<FieldChange> {
    let fields: [(&str, fn(&Contact) -> Vec<String>); 15] = [
        ("formatted name", |c| c.name.formatted.iter().cloned().collect()),
        ("structured name", |c| {
            if c.name.has_structured() {
                vec![c
                    .name
                    .structured()
                    .iter()
                    .map(|p| (*p).clone().unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(";")]
            } else {
                Vec::new()
            }
        }),
        ("emails", |c| c.emails.iter().map(|e| e.address.clone()).collect()),
        ("phones", |c| {
            c.phones
                .iter()
                .map(|p| p.number.canonical.clone())
                .collect()
        }),
        ("addresses", |c| c.addresses.iter().map(|a| a.to_string()).collect()),
        ("organization", |c| c.organization.iter().cloned().collect()),
        ("title", |c| c.title.iter().cloned().collect()),
        ("birthday", |c| {
            c.birthday
                .iter()
                .map(|b| b.format("%Y-%m-%d").to_string())
                .collect()
        }),
        ("uid", |c| c.uid.iter().cloned().collect()),
        ("revision", |c| {
            c.revision
                .iter()
                .map(|r| r.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                .collect()
        }),
        ("kind", |c| c.kind.iter().map(|k| k.to_string()).collect()),
        ("categories", |c| c.categories.clone()),
        ("relationships", |c| {
            c.relationships
                .iter()
                .map(|r| format!("{} -> {}", r.kind, r.target))
                .collect()
        }),
        ("other", |c| {
            c.extra
                .iter()
                .map(|e| format!("{}: {}", e.name, e.value))
                .collect()
        }),
        ("sources", |c| c.sources.iter().map(|s| s.label.clone()).collect()),
    ];

    fields
        .iter()
        .filter_map(|(field, render)| {
            let previous = render(before);
            let new = render(after);
            if previous == new {
                None
            } else {
                Some(FieldChange {
                    field: field.to_string(),
                    previous,
                    new,
                })
            }
        })
        .collect()
}
