//! Text canonicalization shared by the normalizer.

/// Trims and collapses internal whitespace to single spaces.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses whitespace, returning None if blank.
pub fn clean_optional(value: Option<&str>) -> Option<String> {
    value
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
}

/// Consistent capitalization for a structured name or address component.
///
/// Only single-case input (`jon smith`, `JON SMITH`) is rewritten to title
/// case. Mixed case already carries intent (`McDonald`, `van der Berg`) and
/// is left alone, which also makes the function idempotent.
pub fn canonical_case(value: &str) -> String {
    let letters = value.chars().filter(|c| c.is_alphabetic());
    let mut has_lower = false;
    let mut has_upper = false;
    for c in letters {
        has_lower |= c.is_lowercase();
        has_upper |= c.is_uppercase();
    }
    if has_lower && has_upper {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut start_of_word = true;
    for c in value.chars() {
        if c.is_alphabetic() {
            if start_of_word {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = matches!(c, ' ' | '-' | '\'' | '.');
        }
    }
    out
}

/// Collapse, then apply `canonical_case`; None if blank.
pub fn clean_component(value: Option<&str>) -> Option<String> {
    clean_optional(value).map(|s| canonical_case(&s))
}

/// Trims and lowercases the domain. The local part keeps its case because
/// some mail hosts treat it as significant.
pub fn normalize_email(value: &str) -> String {
    let trimmed: String = value.trim().chars().filter(|c| !c.is_whitespace()).collect();
    let trimmed = match trimmed.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => trimmed[7..].to_string(),
        _ => trimmed,
    };
    match trimmed.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => trimmed,
    }
}

/// Lowercased alphanumeric tokens, for name comparison.
pub fn tokens(value: &str) -> Vec<String> {
    value
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
