use crate::model::{Contact, ContactKind};

/// Tokens that mark an organization name as a company.
const COMPANY_SUFFIXES: [&str; 10] = [
    " ltd", " limited", " llc", " gmbh", " inc", " plc", " co.", " company", " s.r.o", " oy",
];

/// Guesses the kind of a record that did not declare one.
///
/// A record is an organization when its organization or display name carries
/// a company suffix, or when it has an organization and no personal name.
pub fn classify_kind(contact: &Contact) -> ContactKind {
    if let Some(kind) = contact.kind {
        return kind;
    }

    let has_suffix = |value: &str| {
        let padded = format!(" {}", value.to_lowercase());
        COMPANY_SUFFIXES
            .iter()
            .any(|s| padded.ends_with(s) || padded.contains(&format!("{} ", s)))
    };

    let display = contact.name.display();
    let org_like = match (&contact.organization, &display) {
        (Some(org), None) => !org.is_empty(),
        (Some(org), Some(name)) => has_suffix(org) || has_suffix(name),
        (None, Some(name)) => has_suffix(name),
        (None, None) => false,
    };

    if org_like {
        ContactKind::Organization
    } else {
        ContactKind::Individual
    }
}

/// Returns a copy with `kind` filled in.
pub fn with_kind(contact: &Contact) -> Contact {
    Contact {
        kind: Some(classify_kind(contact)),
        ..contact.clone()
    }
}
