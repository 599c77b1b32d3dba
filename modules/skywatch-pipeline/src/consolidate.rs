//! Multi-source consolidation: merge a group of candidate rows describing
//! the same event into one record and recompute its evidence score.
//!
//! Pure functions throughout — no I/O, no clock. Ties are broken by
//! source_url ascending so repeated runs produce identical output.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use skywatch_common::{
    CandidateIncident, CandidateSource, EvidenceScore, Fingerprint, OFFICIAL_QUOTE_PATTERN,
};

/// The evidence-score law:
/// 4 (OFFICIAL)    — any official-type source or trust_weight 4.
/// 3 (VERIFIED)    — otherwise, 2+ media sources (trust >= 2) AND the
///                   narrative carries an official-attribution quote.
/// 2 (REPORTED)    — otherwise, any source with trust_weight >= 2.
/// 1 (UNCONFIRMED) — everything else.
pub fn evidence_score(sources: &[CandidateSource], narrative: &str) -> EvidenceScore {
    if sources.is_empty() {
        return EvidenceScore::Unconfirmed;
    }

    let has_official = sources
        .iter()
        .any(|s| s.trust_weight == 4 || s.source_type.is_official());
    if has_official {
        return EvidenceScore::Official;
    }

    let media_count = sources
        .iter()
        .filter(|s| s.source_type.is_media() && s.trust_weight >= 2)
        .count();
    if media_count >= 2 && has_official_quote(narrative) {
        return EvidenceScore::Verified;
    }

    let max_trust = sources.iter().map(|s| s.trust_weight).max().unwrap_or(0);
    if max_trust >= 2 {
        return EvidenceScore::Reported;
    }

    EvidenceScore::Unconfirmed
}

fn official_quote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(OFFICIAL_QUOTE_PATTERN).expect("official quote regex"))
}

/// Does the narrative attribute anything to an official body?
pub fn has_official_quote(narrative: &str) -> bool {
    official_quote_re().is_match(narrative)
}

/// Merge a non-empty group into one record. Time range spans every input,
/// the most substantial title/narrative win, sources union by exact URL.
pub fn merge(mut group: Vec<CandidateIncident>) -> Option<CandidateIncident> {
    if group.is_empty() {
        return None;
    }

    // Deterministic processing order: earliest event first, URL as
    // tie-break.
    group.sort_by(|a, b| {
        a.occurred_at
            .cmp(&b.occurred_at)
            .then_with(|| primary_url(a).cmp(&primary_url(b)))
    });

    let occurred_at = group.iter().map(|c| c.occurred_at).min()?;
    let first_seen_at = group.iter().map(|c| c.first_seen_at).min()?;
    let last_seen_at = group.iter().map(|c| c.last_seen_at).max()?;

    let title = group
        .iter()
        .map(|c| c.title.as_str())
        .filter(|t| !t.is_empty())
        .max_by_key(|t| t.split_whitespace().count())
        .unwrap_or_default()
        .to_string();

    let narrative = group
        .iter()
        .map(|c| c.narrative.as_str())
        .max_by_key(|n| n.chars().count())
        .unwrap_or_default()
        .to_string();

    let mut seen_urls = std::collections::HashSet::new();
    let mut sources = Vec::new();
    for candidate in &group {
        for source in &candidate.sources {
            if seen_urls.insert(source.source_url.clone()) {
                sources.push(source.clone());
            }
        }
    }

    let mut base = group.into_iter().next()?;
    base.occurred_at = occurred_at;
    base.first_seen_at = first_seen_at;
    base.last_seen_at = last_seen_at;
    base.title = title;
    base.narrative = narrative;
    base.sources = sources;
    Some(base)
}

fn primary_url(candidate: &CandidateIncident) -> String {
    candidate
        .sources
        .iter()
        .map(|s| s.source_url.clone())
        .min()
        .unwrap_or_default()
}

/// Batch consolidation: cluster candidates by dedup fingerprint and merge
/// each cluster. Low-precision (city-fallback) candidates never cluster —
/// unrelated events would otherwise collapse onto the default point.
pub fn consolidate(candidates: Vec<CandidateIncident>) -> Vec<CandidateIncident> {
    let mut clusters: HashMap<Fingerprint, Vec<CandidateIncident>> = HashMap::new();
    let mut singletons = Vec::new();

    for candidate in candidates {
        if candidate.low_precision_location {
            singletons.push(candidate);
        } else {
            clusters
                .entry(candidate.fingerprint())
                .or_default()
                .push(candidate);
        }
    }

    // Deterministic output order: by fingerprint string.
    let mut keyed: Vec<(String, Vec<CandidateIncident>)> = clusters
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out: Vec<CandidateIncident> = keyed
        .into_iter()
        .filter_map(|(_, group)| merge(group))
        .collect();
    out.extend(singletons);
    out
}
