use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::contact::Contact;
use super::ids::Id;

/// The value of an already-parsed property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    /// Semicolon-separated components (`N`, `ADR`, `ORG`) or comma lists.
    Structured(Vec<String>),
    Binary(Vec<u8>),
}

/// One property of an ingested record, e.g. `TEL;TYPE=cell:07980 220 220`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProperty {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub value: PropertyValue,
}

impl RawProperty {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
            value: PropertyValue::Text(value.into()),
        }
    }

    pub fn structured<S: Into<String>>(name: impl Into<String>, parts: Vec<S>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
            value: PropertyValue::Structured(parts.into_iter().map(Into::into).collect()),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into().to_uppercase(), value.into());
        self
    }

    /// Parameter lookup, case-insensitive on the key.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The `TYPE` parameter, used as the label of emails, phones, addresses.
    pub fn label(&self) -> Option<String> {
        self.param("TYPE")
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
    }

    /// True when the property carries an inline binary payload, whatever
    /// its name.
    pub fn is_binary(&self) -> bool {
        matches!(self.value, PropertyValue::Binary(_))
            || self
                .param("ENCODING")
                .map(|e| e.eq_ignore_ascii_case("b") || e.eq_ignore_ascii_case("base64"))
                .unwrap_or(false)
    }
}

/// A record as handed over by ingestion: already parsed into properties,
/// tagged with its source label and original file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawContact {
    pub id: Id<Contact>,
    pub source: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub properties: Vec<RawProperty>,
}

impl RawContact {
    pub fn new(id: Id<Contact>, source: impl Into<String>) -> Self {
        Self {
            id,
            source: source.into(),
            origin: None,
            properties: Vec::new(),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn property(mut self, property: RawProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn text(self, name: &str, value: &str) -> Self {
        self.property(RawProperty::text(name, value))
    }

    pub fn labeled(self, name: &str, value: &str, label: &str) -> Self {
        self.property(RawProperty::text(name, value).with_param("TYPE", label))
    }

    pub fn structured(self, name: &str, parts: &[&str]) -> Self {
        self.property(RawProperty::structured(name, parts.to_vec()))
    }

    pub fn binary(self, name: &str, bytes: Vec<u8>) -> Self {
        self.property(RawProperty {
            name: name.to_string(),
            params: BTreeMap::new(),
            value: PropertyValue::Binary(bytes),
        })
    }

    /// Re-emits a normalized contact as a raw record. Feeding the result back
    /// through the pipeline is a no-op for contacts that need no merging.
    pub fn from_contact(contact: &Contact) -> Self {
        let (source, origin) = contact
            .sources
            .first()
            .map(|s| (s.label.clone(), s.origin.clone()))
            .unwrap_or_default();
        let mut raw = RawContact {
            id: contact.id,
            source,
            origin,
            properties: Vec::new(),
        };

        if let Some(formatted) = &contact.name.formatted {
            raw = raw.text("FN", formatted);
        }
        if contact.name.has_structured() {
            let parts: Vec<String> = contact
                .name
                .structured()
                .iter()
                .map(|c| (*c).clone().unwrap_or_default())
                .collect();
            raw = raw.property(RawProperty::structured("N", parts));
        }
        for email in &contact.emails {
            raw = raw.property(with_label(RawProperty::text("EMAIL", &email.address), &email.label));
        }
        for phone in &contact.phones {
            raw = raw.property(with_label(
                RawProperty::text("TEL", &phone.number.canonical),
                &phone.label,
            ));
        }
        for address in &contact.addresses {
            let parts: Vec<String> = address
                .components()
                .iter()
                .map(|c| (*c).clone().unwrap_or_default())
                .collect();
            raw = raw.property(with_label(RawProperty::structured("ADR", parts), &address.label));
        }
        if let Some(org) = &contact.organization {
            raw = raw.text("ORG", org);
        }
        if let Some(title) = &contact.title {
            raw = raw.text("TITLE", title);
        }
        if let Some(birthday) = contact.birthday {
            raw = raw.text("BDAY", &birthday.format("%Y-%m-%d").to_string());
        }
        if let Some(uid) = &contact.uid {
            raw = raw.text("UID", uid);
        }
        if let Some(kind) = contact.kind {
            raw = raw.text("KIND", kind.as_str());
        }
        if !contact.categories.is_empty() {
            raw = raw.property(RawProperty::structured("CATEGORIES", contact.categories.clone()));
        }
        for edge in &contact.relationships {
            raw = raw.property(
                RawProperty::text("RELATED", format!("urn:uuid:{}", edge.target))
                    .with_param("TYPE", &edge.kind),
            );
        }
        for extra in &contact.extra {
            raw = raw.text(&extra.name, &extra.value);
        }
        if let Some(revision) = contact.revision {
            raw = raw.text("REV", &revision.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        }
        raw
    }
}

fn with_label(property: RawProperty, label: &Option<String>) -> RawProperty {
    match label {
        Some(l) => property.with_param("TYPE", l),
        None => property,
    }
}
