//! Address normalization and fuzzy matching.
//!
//! Parses free-text UK addresses into BS7666 components and scores the
//! similarity between two structured addresses. Full UPRN resolution needs
//! the licensed OS AddressBase product; this is best-effort matching good
//! enough to attach Land Registry sales to known properties.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::StructuredAddress;

/// Default minimum similarity for `best_match` to accept a candidate.
pub const MATCH_THRESHOLD: f64 = 0.7;

const W_POSTCODE: f64 = 0.35;
const W_PAON: f64 = 0.25;
const W_STREET: f64 = 0.25;
const W_SAON: f64 = 0.10;
const W_TOWN: f64 = 0.05;

fn postcode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)([A-Z]{1,2}[0-9][0-9A-Z]?\s?[0-9][A-Z]{2})").expect("valid postcode regex")
    })
}

fn flat_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:flat|apt|apartment|unit)\s*(\d+[a-z]?)").expect("valid flat regex")
    })
}

fn house_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+[A-Z]?(?:-\d+[A-Z]?)?)\s*,?\s*(\S.*)$").expect("valid house number regex")
    })
}

/// Common UK street-type abbreviations, expanded before comparison.
const STREET_TYPES: &[(&str, &str)] = &[
    ("RD", "ROAD"),
    ("ST", "STREET"),
    ("AVE", "AVENUE"),
    ("LN", "LANE"),
    ("DR", "DRIVE"),
    ("CL", "CLOSE"),
    ("WY", "WAY"),
    ("PL", "PLACE"),
    ("CT", "COURT"),
    ("GDNS", "GARDENS"),
    ("GR", "GROVE"),
    ("TER", "TERRACE"),
    ("CRES", "CRESCENT"),
    ("PK", "PARK"),
    ("SQ", "SQUARE"),
];

const NOISE_WORDS: &[&str] = &["THE", "AND", "&"];

/// Parses a raw address string into BS7666 components.
///
/// Fails closed: unparseable input yields a `StructuredAddress` with only
/// the fields that were successfully extracted.
pub fn parse(raw: &str) -> StructuredAddress {
    let mut components = StructuredAddress::default();
    let text = collapse_ws(&raw.trim().to_uppercase());
    if text.is_empty() {
        return components;
    }

    // Postcode first, it is the most reliable anchor.
    let mut remainder = text.as_str();
    if let Some(m) = postcode_re().find(&text) {
        components.postcode = Some(normalize_postcode(m.as_str()));
        remainder = &text[..m.start()];
    }

    let mut segments: Vec<String> = remainder
        .split(',')
        .map(collapse_ws)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return components;
    }
    let segment_count = segments.len();

    // Sub-unit token (SAON) lives in the first segment when present.
    if let Some(caps) = flat_re().captures(&segments[0]) {
        components.saon = Some(format!("FLAT {}", &caps[1]));
        segments[0] = collapse_ws(&flat_re().replace(&segments[0], ""));
        if segments[0].is_empty() {
            segments.remove(0);
        }
    }

    if let Some(first) = segments.first() {
        if let Some(caps) = house_number_re().captures(first) {
            components.paon = Some(caps[1].to_string());
            components.street = Some(collapse_ws(&caps[2]));
        } else if segments.len() > 1 {
            // No clean numeric leader: treat as building name + street.
            components.paon = Some(first.clone());
            components.street = Some(segments[1].clone());
        } else {
            components.street = Some(first.clone());
        }
    }

    // Town is the last segment when the address had three or more.
    if segment_count > 2 {
        components.town = segments.last().cloned();
    }

    components
}

/// Scores the similarity of two addresses in `[0, 1]` as a weighted sum
/// over independently compared fields. Missing data on either side scores
/// zero for that field, except that two addresses which both lack a
/// sub-unit agree on "not a flat" and take the full SAON weight.
pub fn similarity(a: &StructuredAddress, b: &StructuredAddress) -> f64 {
    let mut score = 0.0;

    if let (Some(p1), Some(p2)) = (&a.postcode, &b.postcode) {
        if p1 == p2 {
            score += W_POSTCODE;
        } else if same_sector(p1, p2) {
            score += W_POSTCODE * 0.5;
        }
    }

    if let (Some(p1), Some(p2)) = (&a.paon, &b.paon) {
        if normalize_paon(p1) == normalize_paon(p2) {
            score += W_PAON;
        }
    }

    if let (Some(s1), Some(s2)) = (&a.street, &b.street) {
        score += W_STREET * street_similarity(s1, s2);
    }

    match (&a.saon, &b.saon) {
        (Some(s1), Some(s2)) if normalize_saon(s1) == normalize_saon(s2) => score += W_SAON,
        (None, None) => score += W_SAON,
        _ => {}
    }

    if let (Some(t1), Some(t2)) = (&a.town, &b.town) {
        if normalize_town(t1) == normalize_town(t2) {
            score += W_TOWN;
        }
    }

    score.clamp(0.0, 1.0)
}

/// Finds the best-scoring candidate at or above `threshold`.
///
/// Returns the candidate's index and its score. Ties break in favour of
/// the first maximal-scoring candidate encountered (strictly-greater scan).
pub fn best_match(
    target: &StructuredAddress,
    candidates: &[StructuredAddress],
    threshold: f64,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let score = similarity(target, candidate);
        if score >= threshold && best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best
}

/// Normalizes a postcode to uppercase with a single space before the final
/// 3-character inward segment, e.g. `"sw156ej"` -> `"SW15 6EJ"`.
///
/// Characters outside the postcode alphabet are discarded so that
/// arbitrary upstream text cannot land in the stored key.
pub fn normalize_postcode(raw: &str) -> String {
    let pc: String = raw
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if pc.len() >= 5 {
        format!("{} {}", &pc[..pc.len() - 3], &pc[pc.len() - 3..])
    } else {
        pc
    }
}

/// Extracts the postcode sector: outward code plus the first inward
/// character, e.g. `"SW15 6EJ"` -> `"SW15 6"`.
pub fn postcode_sector(postcode: &str) -> Option<String> {
    let upper = postcode.trim().to_uppercase();
    let parts: Vec<&str> = upper.split_whitespace().collect();
    if parts.len() == 2 && !parts[1].is_empty() {
        let inward_first = parts[1].chars().next()?;
        Some(format!("{} {}", parts[0], inward_first))
    } else {
        None
    }
}

fn same_sector(pc1: &str, pc2: &str) -> bool {
    match (postcode_sector(pc1), postcode_sector(pc2)) {
        (Some(s1), Some(s2)) => s1 == s2,
        _ => false,
    }
}

fn normalize_paon(paon: &str) -> String {
    paon.to_uppercase().chars().filter(|c| !c.is_whitespace()).collect()
}

fn normalize_saon(saon: &str) -> String {
    saon.to_uppercase().chars().filter(|c| !c.is_whitespace()).collect()
}

fn normalize_town(town: &str) -> String {
    town.trim().to_uppercase()
}

/// Token-set Jaccard similarity over normalized street names.
fn street_similarity(street1: &str, street2: &str) -> f64 {
    let t1 = street_tokens(street1);
    let t2 = street_tokens(street2);

    if t1.is_empty() || t2.is_empty() {
        return 0.0;
    }
    if t1 == t2 {
        return 1.0;
    }

    let intersection = t1.intersection(&t2).count();
    let union = t1.union(&t2).count();
    if union > 0 {
        intersection as f64 / union as f64
    } else {
        0.0
    }
}

fn street_tokens(street: &str) -> HashSet<String> {
    street
        .to_uppercase()
        .split_whitespace()
        .map(expand_street_type)
        .filter(|t| !NOISE_WORDS.contains(&t.as_str()))
        .collect()
}

fn expand_street_type(token: &str) -> String {
    for (abbr, full) in STREET_TYPES {
        if token == *abbr {
            return (*full).to_string();
        }
    }
    token.to_string()
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
