use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::debug;

use crate::config::StripRules;
use crate::error::MalformedProperty;
use crate::model::*;
use crate::report::{StripReason, StrippedItem};
use crate::text::{canonical_case, clean_component, clean_optional, collapse_whitespace, normalize_email};

/// Property names that always carry binary media.
const MEDIA_PROPS: [&str; 3] = ["PHOTO", "LOGO", "SOUND"];

/// Properties describing the serialization, not the person.
const ENVELOPE_PROPS: [&str; 2] = ["VERSION", "PRODID"];

/// Output of the field normalizer for one record.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    /// The record interpreted literally, before any canonicalization. The
    /// change report diffs against this.
    pub ancestor: Contact,
    pub contact: Contact,
    pub stripped: Vec<StrippedItem>,
}

/// Interprets a raw record, strips vendor and binary properties and
/// canonicalizes text fields. Every removed property is listed in
/// `stripped`.
pub fn normalize_record(raw: &RawContact, rules: &StripRules) -> NormalizedRecord {
    let source = SourceRef {
        label: raw.source.clone(),
        origin: raw.origin.clone(),
    };
    let mut ancestor = Contact::create(raw.id, source);
    let mut stripped = Vec::new();

    for property in &raw.properties {
        let name = property.name.trim().to_uppercase();
        let strip = |reason: StripReason, detail: Option<String>| StrippedItem {
            contact: raw.id,
            property: property.name.clone(),
            reason,
            detail,
        };

        if MEDIA_PROPS.contains(&name.as_str()) || property.is_binary() {
            stripped.push(strip(StripReason::Binary, None));
            continue;
        }
        if let Some(reason) = rules.verdict(&name) {
            stripped.push(strip(reason, None));
            continue;
        }
        if ENVELOPE_PROPS.contains(&name.as_str()) {
            stripped.push(strip(StripReason::Envelope, None));
            continue;
        }
        if is_occupied(&ancestor, &name) {
            debug!("Record {}: repeated {}", raw.id, name);
            stripped.push(strip(StripReason::Repeated, Some(joined(property, ";"))));
            continue;
        }
        if let Err(e) = interpret(&mut ancestor, &name, property) {
            debug!("Record {}: {}", raw.id, e);
            stripped.push(strip(StripReason::Malformed, Some(e.reason)));
        }
    }

    if !stripped.is_empty() {
        debug!("Record {}: stripped {} propert(ies)", raw.id, stripped.len());
    }

    let contact = canonicalize(&ancestor);
    NormalizedRecord {
        ancestor,
        contact,
        stripped,
    }
}

fn interpret(
    contact: &mut Contact,
    name: &str,
    property: &RawProperty,
) -> Result<(), MalformedProperty> {
    match name {
        "FN" => {
            contact.name.formatted = non_blank(name, joined(property, " "))?.into();
        }
        "N" => {
            let parts = components(property);
            if parts.len() > 5 {
                return Err(MalformedProperty::new(name, "more than 5 name components"));
            }
            let mut parts = parts.into_iter().map(|p| Some(p).filter(|p| !p.is_empty()));
            contact.name.family = parts.next().flatten();
            contact.name.given = parts.next().flatten();
            contact.name.additional = parts.next().flatten();
            contact.name.prefix = parts.next().flatten();
            contact.name.suffix = parts.next().flatten();
        }
        "EMAIL" => {
            let address = non_blank(name, joined(property, ""))?;
            if !address.contains('@') {
                return Err(MalformedProperty::new(name, format!("'{}' has no '@'", address)));
            }
            contact.emails.push(Email::new(address, property.label()));
        }
        "TEL" => {
            let number = non_blank(name, joined(property, ""))?;
            contact.phones.push(Phone::raw(number, property.label()));
        }
        "ADR" => {
            let parts = components(property);
            if parts.len() > 7 {
                return Err(MalformedProperty::new(name, "more than 7 address components"));
            }
            let mut parts = parts.into_iter().map(|p| Some(p).filter(|p| !p.is_empty()));
            let address = Address {
                po_box: parts.next().flatten(),
                extended: parts.next().flatten(),
                street: parts.next().flatten(),
                locality: parts.next().flatten(),
                region: parts.next().flatten(),
                postal_code: parts.next().flatten(),
                country: parts.next().flatten(),
                label: property.label(),
            };
            if address.is_empty() {
                return Err(MalformedProperty::new(name, "no address components"));
            }
            contact.addresses.push(address);
        }
        "ORG" => {
            let parts: Vec<String> = components(property)
                .into_iter()
                .filter(|p| !p.trim().is_empty())
                .collect();
            contact.organization = non_blank(name, parts.join(" "))?.into();
        }
        "TITLE" => {
            contact.title = non_blank(name, joined(property, " "))?.into();
        }
        "BDAY" => {
            let value = non_blank(name, joined(property, ""))?;
            contact.birthday = Some(parse_birthday(value.trim()).ok_or_else(|| {
                MalformedProperty::new(name, format!("unrecognised date '{}'", value))
            })?);
        }
        "UID" => {
            contact.uid = non_blank(name, joined(property, ""))?.into();
        }
        "REV" => {
            let value = non_blank(name, joined(property, ""))?;
            contact.revision = Some(parse_revision(value.trim()).ok_or_else(|| {
                MalformedProperty::new(name, format!("unrecognised timestamp '{}'", value))
            })?);
        }
        "KIND" => {
            let value = non_blank(name, joined(property, ""))?;
            contact.kind = Some(ContactKind::parse(&value).ok_or_else(|| {
                MalformedProperty::new(name, format!("unsupported kind '{}'", value))
            })?);
        }
        "CATEGORIES" => {
            let values: Vec<String> = match &property.value {
                PropertyValue::Text(s) => s.split(',').map(str::to_string).collect(),
                _ => components(property),
            };
            contact
                .categories
                .extend(values.into_iter().filter(|c| !c.trim().is_empty()));
        }
        "RELATED" => {
            let value = non_blank(name, joined(property, ""))?;
            let target = Id::<Contact>::parse(&value).map_err(|_| {
                MalformedProperty::new(name, format!("'{}' is not a contact reference", value))
            })?;
            let kind = property.label().unwrap_or_else(|| "related".to_string());
            contact
                .relationships
                .push(RelationshipEdge::create(contact.id, target, kind));
        }
        _ => {
            let value = non_blank(name, joined(property, ";"))?;
            contact.extra.push(ExtraProperty {
                name: name.to_string(),
                value,
            });
        }
    }
    Ok(())
}

/// Whether a single-valued property already holds a value.
fn is_occupied(contact: &Contact, name: &str) -> bool {
    match name {
        "FN" => contact.name.formatted.is_some(),
        "N" => contact.name.has_structured(),
        "ORG" => contact.organization.is_some(),
        "TITLE" => contact.title.is_some(),
        "BDAY" => contact.birthday.is_some(),
        "UID" => contact.uid.is_some(),
        "REV" => contact.revision.is_some(),
        "KIND" => contact.kind.is_some(),
        _ => false,
    }
}

fn components(property: &RawProperty) -> Vec<String> {
    match &property.value {
        PropertyValue::Text(s) => s.split(';').map(str::to_string).collect(),
        PropertyValue::Structured(parts) => parts.clone(),
        PropertyValue::Binary(_) => Vec::new(),
    }
}

fn joined(property: &RawProperty, separator: &str) -> String {
    match &property.value {
        PropertyValue::Text(s) => s.clone(),
        PropertyValue::Structured(parts) => parts.join(separator),
        PropertyValue::Binary(_) => String::new(),
    }
}

fn non_blank(property: &str, value: String) -> Result<String, MalformedProperty> {
    if value.trim().is_empty() {
        Err(MalformedProperty::new(property, "empty value"))
    } else {
        Ok(value)
    }
}

fn parse_birthday(value: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

fn parse_revision(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Canonical text form of a literally-interpreted contact.
pub fn canonicalize(literal: &Contact) -> Contact {
    let name = Name {
        formatted: clean_optional(literal.name.formatted.as_deref()),
        family: clean_component(literal.name.family.as_deref()),
        given: clean_component(literal.name.given.as_deref()),
        additional: clean_component(literal.name.additional.as_deref()),
        prefix: clean_component(literal.name.prefix.as_deref()),
        suffix: clean_component(literal.name.suffix.as_deref()),
    };

    let mut emails: Vec<Email> = Vec::new();
    for email in &literal.emails {
        let address = normalize_email(&email.address);
        if !emails.iter().any(|e| e.address == address) {
            emails.push(Email::new(address, email.label.clone()));
        }
    }

    let phones = literal
        .phones
        .iter()
        .map(|p| Phone::raw(p.number.raw.trim(), p.label.clone()))
        .collect();

    let mut addresses: Vec<Address> = Vec::new();
    for address in &literal.addresses {
        let canonical = canonical_address(address);
        if !addresses.contains(&canonical) {
            addresses.push(canonical);
        }
    }

    let mut categories: Vec<String> = Vec::new();
    for category in &literal.categories {
        let cleaned = collapse_whitespace(category);
        if !cleaned.is_empty() && !categories.contains(&cleaned) {
            categories.push(cleaned);
        }
    }

    let extra = literal
        .extra
        .iter()
        .map(|e| ExtraProperty {
            name: e.name.clone(),
            value: e.value.trim().to_string(),
        })
        .collect();

    Contact {
        name,
        emails,
        phones,
        addresses,
        organization: clean_optional(literal.organization.as_deref()),
        title: clean_optional(literal.title.as_deref()),
        uid: clean_optional(literal.uid.as_deref()),
        categories,
        extra,
        ..literal.clone()
    }
}

fn canonical_address(address: &Address) -> Address {
    let short_upper = |value: Option<&str>| {
        clean_optional(value).map(|v| {
            if v.chars().count() <= 3 {
                v.to_uppercase()
            } else {
                canonical_case(&v)
            }
        })
    };
    Address {
        po_box: clean_optional(address.po_box.as_deref()),
        extended: clean_component(address.extended.as_deref()),
        street: clean_component(address.street.as_deref()),
        locality: clean_component(address.locality.as_deref()),
        region: short_upper(address.region.as_deref()),
        postal_code: clean_optional(address.postal_code.as_deref()).map(|p| p.to_uppercase()),
        country: short_upper(address.country.as_deref()),
        label: address.label.clone(),
    }
}
