use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::SimilaritySettings;
use crate::model::*;
use crate::text::tokens;

const EMAIL_WEIGHT: f64 = 0.6;
const PHONE_WEIGHT: f64 = 0.4;
const RAW_PHONE_WEIGHT: f64 = 0.25;
const NAME_WEIGHT: f64 = 0.4;
const CORROBORATION_WEIGHT: f64 = 0.1;

/// Token-sort similarity in [0, 1] between two display names.
///
/// Tokens are lowercased and sorted before comparison, so "Smith, Jon" and
/// "Jon Smith" score 1.0. The two sorted strings are put in a fixed order
/// before measuring, which makes the score exactly symmetric.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let sorted = |s: &str| {
        let mut t = tokens(s);
        t.sort();
        t.join(" ")
    };
    let sa = sorted(a);
    let sb = sorted(b);
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let (x, y) = if sa <= sb { (sa, sb) } else { (sb, sa) };
    strsim::normalized_levenshtein(&x, &y)
}

fn raw_phone_key(phone: &Phone) -> String {
    phone
        .number
        .raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

fn email_exact(a: &Contact, b: &Contact) -> bool {
    let keys: BTreeSet<String> = a.emails.iter().map(Email::match_key).collect();
    b.emails.iter().any(|e| keys.contains(&e.match_key()))
}

fn phone_exact(a: &Contact, b: &Contact) -> Option<PhoneMatch> {
    let mut best = None;
    for pa in &a.phones {
        for pb in &b.phones {
            if pa.number.valid && pb.number.valid {
                if pa.number.canonical == pb.number.canonical {
                    return Some(PhoneMatch::Canonical);
                }
            } else if raw_phone_key(pa) == raw_phone_key(pb) {
                best = Some(PhoneMatch::Raw);
            }
        }
    }
    best
}

fn corroborations(a: &Contact, b: &Contact) -> Vec<Corroboration> {
    let mut found = Vec::new();
    if let (Some(oa), Some(ob)) = (&a.organization, &b.organization) {
        if oa.to_lowercase() == ob.to_lowercase() {
            found.push(Corroboration::Organization);
        }
    }
    let keys: BTreeSet<String> = a.addresses.iter().filter_map(Address::match_key).collect();
    if b
        .addresses
        .iter()
        .filter_map(Address::match_key)
        .any(|k| keys.contains(&k))
    {
        found.push(Corroboration::Address);
    }
    if a.birthday.is_some() && a.birthday == b.birthday {
        found.push(Corroboration::Birthday);
    }
    found
}

/// Scores one pair. Each signal is computed independently; a field missing
/// on either side leaves its signal neutral.
pub fn score_pair(a: &Contact, b: &Contact, settings: &SimilaritySettings) -> SimilarityDecision {
    let (a, b) = if a.id <= b.id { (a, b) } else { (b, a) };

    let signals = Signals {
        email_exact: email_exact(a, b),
        phone_exact: phone_exact(a, b),
        uid_exact: settings.use_uid && a.uid.is_some() && a.uid == b.uid,
        name_score: match (a.name.display(), b.name.display()) {
            (Some(na), Some(nb)) => Some(name_similarity(&na, &nb)),
            _ => None,
        },
        corroborations: corroborations(a, b),
    };

    let corroborated = signals.corroborations.iter().any(|c| settings.accepts(*c));
    let fuzzy_match = signals
        .name_score
        .map(|s| s >= settings.name_threshold)
        .unwrap_or(false);
    let is_candidate = signals.has_exact() || (fuzzy_match && corroborated);

    let mut score = 0.0;
    if signals.uid_exact {
        score += 1.0;
    }
    if signals.email_exact {
        score += EMAIL_WEIGHT;
    }
    score += match signals.phone_exact {
        Some(PhoneMatch::Canonical) => PHONE_WEIGHT,
        Some(PhoneMatch::Raw) => RAW_PHONE_WEIGHT,
        None => 0.0,
    };
    score += NAME_WEIGHT * signals.name_score.unwrap_or(0.0);
    score += CORROBORATION_WEIGHT * signals.corroborations.len() as f64;

    SimilarityDecision {
        first: a.id,
        second: b.id,
        score: score.min(1.0),
        signals,
        is_candidate,
    }
}

/// Blocking keys for one contact. Two contacts can only become a candidate
/// pair if they share at least one key: every exact signal and every
/// configured corroborator contributes one, so pruning never drops a pair
/// that could qualify.
fn blocking_keys(contact: &Contact, settings: &SimilaritySettings) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for email in &contact.emails {
        keys.insert(format!("email:{}", email.match_key()));
    }
    for phone in &contact.phones {
        if phone.number.valid {
            keys.insert(format!("tel:{}", phone.number.canonical));
        }
        keys.insert(format!("rawtel:{}", raw_phone_key(phone)));
    }
    if settings.use_uid {
        if let Some(uid) = &contact.uid {
            keys.insert(format!("uid:{}", uid));
        }
    }
    if settings.accepts(Corroboration::Organization) {
        if let Some(org) = &contact.organization {
            keys.insert(format!("org:{}", org.to_lowercase()));
        }
    }
    if settings.accepts(Corroboration::Address) {
        for key in contact.addresses.iter().filter_map(Address::match_key) {
            keys.insert(format!("addr:{}", key));
        }
    }
    if settings.accepts(Corroboration::Birthday) {
        if let Some(birthday) = contact.birthday {
            keys.insert(format!("bday:{}", birthday));
        }
    }
    keys
}

/// Scores every pair worth comparing among the non-self contacts. Decisions
/// come back ordered by the pair's input positions.
pub fn find_candidates(
    contacts: &[Contact],
    settings: &SimilaritySettings,
) -> Vec<SimilarityDecision> {
    let eligible: Vec<(usize, &Contact)> = contacts
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_self())
        .collect();

    let mut blocks: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, contact) in &eligible {
        for key in blocking_keys(contact, settings) {
            blocks.entry(key).or_default().push(*index);
        }
    }

    let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
    for members in blocks.values() {
        for (n, &i) in members.iter().enumerate() {
            for &j in &members[n + 1..] {
                pairs.insert((i.min(j), i.max(j)));
            }
        }
    }
    debug!(
        "Blocking produced {} pairs from {} keys over {} contacts",
        pairs.len(),
        blocks.len(),
        eligible.len()
    );

    let decisions: Vec<SimilarityDecision> = pairs
        .into_iter()
        .map(|(i, j)| score_pair(&contacts[i], &contacts[j], settings))
        .collect();

    info!(
        "Scored {} pairs, {} duplicate candidates",
        decisions.len(),
        decisions.iter().filter(|d| d.is_candidate).count()
    );
    decisions
}
