use log::debug;
use phonenumber::{country, Mode};

use crate::config::PhoneSettings;
use crate::error::{DedupeError, DedupeResult, PhoneParseError};
use crate::model::{Address, Contact, NormalizedValue, Phone};
use crate::report::{StripReason, StrippedItem};

/// Country names seen in the wild in `ADR` country fields, mapped to ISO2.
const COUNTRY_NAMES: [(&str, &str); 20] = [
    ("united kingdom", "GB"),
    ("uk", "GB"),
    ("great britain", "GB"),
    ("england", "GB"),
    ("scotland", "GB"),
    ("wales", "GB"),
    ("northern ireland", "GB"),
    ("united states", "US"),
    ("united states of america", "US"),
    ("usa", "US"),
    ("australia", "AU"),
    ("canada", "CA"),
    ("ireland", "IE"),
    ("germany", "DE"),
    ("france", "FR"),
    ("spain", "ES"),
    ("italy", "IT"),
    ("netherlands", "NL"),
    ("new zealand", "NZ"),
    ("deutschland", "DE"),
];

/// Resolves an ISO2 region code against the phone metadata.
pub fn region_id(code: &str) -> DedupeResult<country::Id> {
    code.trim()
        .to_uppercase()
        .parse::<country::Id>()
        .map_err(|_| DedupeError::UnknownRegion(code.to_string()))
}

/// Region hint from the first address that names a recognisable country.
pub fn infer_region(addresses: &[Address]) -> Option<String> {
    addresses
        .iter()
        .filter_map(|a| a.country.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .find_map(|c| {
            if c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()) {
                let code = c.to_uppercase();
                if region_id(&code).is_ok() {
                    return Some(code);
                }
            }
            let lower = c.to_lowercase();
            COUNTRY_NAMES
                .iter()
                .find(|(name, _)| *name == lower)
                .map(|(_, code)| code.to_string())
        })
}

/// Separator between the E.164 number and an extension in canonical values.
const EXTENSION_SEPARATOR: &str = ";ext=";

/// Parses `raw` as E.164, trying in order: the region encoded in a leading
/// `+`, the contact's inferred region, the default region. An extension is
/// kept as an `;ext=` suffix.
pub fn parse_e164(
    raw: &str,
    inferred_region: Option<&str>,
    default_region: &str,
) -> Result<String, PhoneParseError> {
    let (trimmed, own_extension) = match raw.trim().split_once(EXTENSION_SEPARATOR) {
        Some((number, extension)) => (number.trim(), Some(extension.trim())),
        None => (raw.trim(), None),
    };
    let mut attempts: Vec<Option<&str>> = Vec::new();
    if trimmed.starts_with('+') {
        attempts.push(None);
    }
    if let Some(region) = inferred_region {
        attempts.push(Some(region));
    }
    if inferred_region.map(|r| !r.eq_ignore_ascii_case(default_region)).unwrap_or(true) {
        attempts.push(Some(default_region));
    }

    for attempt in &attempts {
        let region = match attempt {
            Some(code) => match region_id(code) {
                Ok(id) => Some(id),
                Err(_) => continue,
            },
            None => None,
        };
        if let Ok(number) = phonenumber::parse(region, trimmed) {
            if phonenumber::is_valid(&number) {
                let e164 = number.format().mode(Mode::E164).to_string();
                let extension = own_extension
                    .or_else(|| number.extension().map(|e| &**e))
                    .filter(|e| !e.is_empty());
                return Ok(match extension {
                    Some(extension) => format!("{}{}{}", e164, EXTENSION_SEPARATOR, extension),
                    None => e164,
                });
            }
        }
    }

    Err(PhoneParseError {
        raw: raw.to_string(),
        tried: attempts
            .iter()
            .map(|a| a.unwrap_or("+"))
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Canonicalizes one raw number. Never discards: an unparseable number is
/// kept verbatim and flagged invalid.
pub fn canonicalize_phone(
    raw: &str,
    inferred_region: Option<&str>,
    default_region: &str,
) -> NormalizedValue {
    match parse_e164(raw, inferred_region, default_region) {
        Ok(e164) => NormalizedValue::parsed(raw, e164),
        Err(e) => {
            debug!("{}", e);
            NormalizedValue::unparsed(raw)
        }
    }
}

/// Returns a copy of `contact` with every phone canonicalized. Numbers that
/// collapse to the same canonical value are kept once, first label wins.
pub fn canonicalize_contact(contact: &Contact, settings: &PhoneSettings) -> Contact {
    canonicalize_phones(contact, settings).0
}

/// Like [`canonicalize_contact`], also listing every number dropped because
/// an earlier one had the same canonical value.
pub fn canonicalize_phones(
    contact: &Contact,
    settings: &PhoneSettings,
) -> (Contact, Vec<StrippedItem>) {
    let inferred = if settings.infer_region_from_address {
        infer_region(&contact.addresses)
    } else {
        None
    };

    let mut phones: Vec<Phone> = Vec::with_capacity(contact.phones.len());
    let mut collapsed = Vec::new();
    for phone in &contact.phones {
        let number = canonicalize_phone(
            &phone.number.raw,
            inferred.as_deref(),
            &settings.default_region,
        );
        if phones.iter().any(|p| p.number.canonical == number.canonical) {
            debug!("Contact {}: '{}' repeats {}", contact.id, number.raw, number.canonical);
            let label = phone
                .label
                .as_deref()
                .map(|l| format!(" ({})", l))
                .unwrap_or_default();
            collapsed.push(StrippedItem {
                contact: contact.id,
                property: "TEL".to_string(),
                reason: StripReason::Repeated,
                detail: Some(format!("'{}'{} is the same number as {}", number.raw, label, number.canonical)),
            });
            continue;
        }
        phones.push(Phone {
            number,
            label: phone.label.clone(),
        });
    }

    let contact = Contact {
        phones,
        ..contact.clone()
    };
    (contact, collapsed)
}
