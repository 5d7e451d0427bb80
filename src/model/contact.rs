use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::Id;
use super::relationship::RelationshipEdge;

/// A structured postal address. Every component is optional because
/// address books routinely export half-filled `ADR` values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub po_box: Option<String>,
    pub extended: Option<String>,
    pub street: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub label: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.components().iter().all(|c| c.is_none())
    }

    /// Components in vCard `ADR` order.
    pub fn components(&self) -> [&Option<String>; 7] {
        [
            &self.po_box,
            &self.extended,
            &self.street,
            &self.locality,
            &self.region,
            &self.postal_code,
            &self.country,
        ]
    }

    /// Comparison key used as a corroborating signal: street, locality and
    /// postal code, case-folded. `None` when there is not enough to compare.
    pub fn match_key(&self) -> Option<String> {
        let street = self.street.as_deref().map(str::to_lowercase);
        let postal = self
            .postal_code
            .as_deref()
            .map(|p| p.replace(' ', "").to_lowercase());
        let locality = self.locality.as_deref().map(str::to_lowercase);
        match (street, postal, locality) {
            (Some(s), Some(p), _) => Some(format!("{}|{}", s, p)),
            (Some(s), None, Some(l)) => Some(format!("{}|{}", s, l)),
            _ => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self
            .components()
            .iter()
            .filter_map(|c| c.as_deref())
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// A (raw, canonical, validity) triple. `valid` distinguishes a value that
/// parsed from one that was kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedValue {
    pub raw: String,
    pub canonical: String,
    pub valid: bool,
}

impl NormalizedValue {
    pub fn parsed(raw: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            canonical: canonical.into(),
            valid: true,
        }
    }

    /// A value that could not be interpreted; canonical mirrors the raw text.
    pub fn unparsed(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            canonical: raw.clone(),
            raw,
            valid: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub address: String,
    pub label: Option<String>,
}

impl Email {
    pub fn new(address: impl Into<String>, label: Option<String>) -> Self {
        Self {
            address: address.into(),
            label,
        }
    }

    /// Case-insensitive comparison key.
    pub fn match_key(&self) -> String {
        self.address.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phone {
    pub number: NormalizedValue,
    pub label: Option<String>,
}

impl Phone {
    /// A phone as ingested, before canonicalization.
    pub fn raw(number: impl Into<String>, label: Option<String>) -> Self {
        Self {
            number: NormalizedValue::unparsed(number),
            label,
        }
    }
}

/// vCard 4.0 `KIND`, plus the owner's own card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Individual,
    #[serde(rename = "org")]
    Organization,
    #[serde(rename = "self")]
    SelfCard,
}

impl ContactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactKind::Individual => "individual",
            ContactKind::Organization => "org",
            ContactKind::SelfCard => "self",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "individual" => Some(ContactKind::Individual),
            "org" | "organization" => Some(ContactKind::Organization),
            "self" => Some(ContactKind::SelfCard),
            _ => None,
        }
    }
}

impl fmt::Display for ContactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name components as found in `FN` and `N`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub formatted: Option<String>,
    pub family: Option<String>,
    pub given: Option<String>,
    pub additional: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl Name {
    pub fn is_empty(&self) -> bool {
        self.formatted.is_none() && self.structured().iter().all(|c| c.is_none())
    }

    /// Structured components in vCard `N` order.
    pub fn structured(&self) -> [&Option<String>; 5] {
        [
            &self.family,
            &self.given,
            &self.additional,
            &self.prefix,
            &self.suffix,
        ]
    }

    pub fn has_structured(&self) -> bool {
        self.structured().iter().any(|c| c.is_some())
    }

    /// The display name: `FN` if present, else given/additional/family.
    pub fn display(&self) -> Option<String> {
        if let Some(formatted) = &self.formatted {
            return Some(formatted.clone());
        }
        let parts: Vec<&str> = [&self.given, &self.additional, &self.family]
            .iter()
            .filter_map(|c| c.as_deref())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Where a record came from: the source label (e.g. `icloud`) and the
/// original file, when ingestion knows it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRef {
    pub label: String,
    pub origin: Option<String>,
}

/// A standard property this crate has no dedicated field for (`NOTE`,
/// `URL`, `NICKNAME`, ...). Kept verbatim so nothing is lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraProperty {
    pub name: String,
    pub value: String,
}

/// A normalized contact. Values of this type are never mutated once a
/// pipeline stage hands them on; later stages build new values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Id<Contact>,
    pub name: Name,
    pub emails: Vec<Email>,
    pub phones: Vec<Phone>,
    pub addresses: Vec<Address>,
    pub organization: Option<String>,
    pub title: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub uid: Option<String>,
    pub categories: Vec<String>,
    pub kind: Option<ContactKind>,
    pub relationships: Vec<RelationshipEdge>,
    pub extra: Vec<ExtraProperty>,
    pub sources: Vec<SourceRef>,
    pub revision: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn create(id: Id<Contact>, source: SourceRef) -> Self {
        Self {
            id,
            name: Name::default(),
            emails: Vec::new(),
            phones: Vec::new(),
            addresses: Vec::new(),
            organization: None,
            title: None,
            birthday: None,
            uid: None,
            categories: Vec::new(),
            kind: None,
            relationships: Vec::new(),
            extra: Vec::new(),
            sources: vec![source],
            revision: None,
        }
    }

    pub fn is_self(&self) -> bool {
        self.kind == Some(ContactKind::SelfCard)
    }

    /// Human label for prompts and reports.
    pub fn label(&self) -> String {
        self.name
            .display()
            .or_else(|| self.organization.clone())
            .or_else(|| self.emails.first().map(|e| e.address.clone()))
            .unwrap_or_else(|| "Unnamed".to_string())
    }

    /// Number of populated fields; multi-valued fields count per value.
    /// Drives the completeness heuristic for base selection.
    pub fn populated_fields(&self) -> usize {
        let singles = [
            self.name.display().is_some(),
            self.organization.is_some(),
            self.title.is_some(),
            self.birthday.is_some(),
            self.uid.is_some(),
            self.kind.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        singles
            + self.emails.len()
            + self.phones.len()
            + self.addresses.len()
            + self.categories.len()
            + self.relationships.len()
            + self.extra.len()
    }
}
