//! Tier resolution: the pure decision function for the deduplication
//! pipeline. The write path gathers evidence (URL hit, recent rows, ANN
//! neighbors, LLM verdict); this module turns it into Merge-or-Create.

use uuid::Uuid;

use skywatch_common::{CandidateIncident, IncidentSummary};

use crate::adjudicator::DuplicateVerdict;
use crate::embedding::{tier2_band, Tier2Band};
use crate::fuzzy;

/// Tier-1 fuzzy matching only considers rows this close to the candidate.
pub const TIER1_RADIUS_M: f64 = 1000.0;

/// How a merge target was found, for logs and response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    SourceUrl,
    Fuzzy,
    Spatial,
    Embedding,
    Llm,
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchTier::SourceUrl => write!(f, "source_url"),
            MatchTier::Fuzzy => write!(f, "fuzzy"),
            MatchTier::Spatial => write!(f, "spatial"),
            MatchTier::Embedding => write!(f, "embedding"),
            MatchTier::Llm => write!(f, "llm"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DedupOutcome {
    Merge {
        target: Uuid,
        tier: MatchTier,
        score: f64,
    },
    Create,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tier1Match {
    pub target: Uuid,
    pub tier: MatchTier,
    pub score: f64,
}

/// Tier-1: match the candidate against recent rows (the caller restricts
/// the set to a ±48 h window).
///
/// Two ways in:
/// - a fuzzy title match against a row within 1 km, or
/// - the same-facility spatial fallback: a row of the same asset type
///   within the asset-type radius (airports are one facility even when
///   headlines share no words).
///
/// Low-precision candidate coordinates disable the spatial path.
pub fn tier1_match(candidate: &CandidateIncident, rows: &[IncidentSummary]) -> Option<Tier1Match> {
    let mut best_fuzzy: Option<(f64, &IncidentSummary)> = None;
    for row in rows {
        if candidate.distance_m_to(row.lat, row.lon) > TIER1_RADIUS_M {
            continue;
        }
        let sim = fuzzy::similarity(&candidate.title, &row.title);
        if sim >= fuzzy::FUZZY_MATCH_THRESHOLD
            && best_fuzzy.map_or(true, |(best, _)| sim > best)
        {
            best_fuzzy = Some((sim, row));
        }
    }
    if let Some((score, row)) = best_fuzzy {
        return Some(Tier1Match {
            target: row.id,
            tier: MatchTier::Fuzzy,
            score,
        });
    }

    if candidate.low_precision_location {
        return None;
    }
    let radius = candidate.asset_type.search_radius_m();
    rows.iter()
        .filter(|row| {
            row.asset_type == candidate.asset_type
                && candidate.distance_m_to(row.lat, row.lon) <= radius
        })
        // Rows arrive ordered by occurred_at ascending; the earliest event
        // at the facility is the canonical merge target.
        .min_by_key(|row| row.occurred_at)
        .map(|row| Tier1Match {
            target: row.id,
            tier: MatchTier::Spatial,
            score: fuzzy::similarity(&candidate.title, &row.title),
        })
}

/// Combine per-tier evidence into the final outcome. Tier order is strict:
/// a URL hit wins outright, Tier-1 skips the vector search, and the LLM is
/// consulted only for the Tier-2 borderline band.
pub fn resolve(
    url_match: Option<Uuid>,
    tier1: Option<Tier1Match>,
    tier2: Option<(Uuid, f64)>,
    tier3: Option<&DuplicateVerdict>,
    tier3_confidence_threshold: f64,
) -> DedupOutcome {
    if let Some(target) = url_match {
        return DedupOutcome::Merge {
            target,
            tier: MatchTier::SourceUrl,
            score: 1.0,
        };
    }

    if let Some(m) = tier1 {
        return DedupOutcome::Merge {
            target: m.target,
            tier: m.tier,
            score: m.score,
        };
    }

    let (target, similarity) = match tier2 {
        Some(hit) => hit,
        None => return DedupOutcome::Create,
    };

    match tier2_band(similarity) {
        Tier2Band::High => DedupOutcome::Merge {
            target,
            tier: MatchTier::Embedding,
            score: similarity,
        },
        Tier2Band::None => DedupOutcome::Create,
        Tier2Band::Borderline => match tier3 {
            Some(v) if v.confidence >= tier3_confidence_threshold => {
                if v.is_duplicate {
                    DedupOutcome::Merge {
                        target,
                        tier: MatchTier::Llm,
                        score: v.confidence,
                    }
                } else {
                    DedupOutcome::Create
                }
            }
            // Low-confidence verdict or LLM unavailable: the borderline
            // band resolves to not-a-duplicate.
            _ => DedupOutcome::Create,
        },
    }
}
