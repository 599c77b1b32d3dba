//! Tier-2 semantic deduplication support: the labeled embedding text, the
//! similarity thresholds, and cosine similarity. Vector storage and the ANN
//! query live in the store crate.

use skywatch_common::{AssetType, CandidateIncident};

/// Embedding dimensionality. Tied to the provider model; changing it means
/// recreating `incident_embeddings` and back-filling.
pub const EMBEDDING_DIM: usize = 768;

/// At or above this cosine similarity, merge without consulting the LLM.
pub const TIER2_HIGH_CONFIDENCE: f64 = 0.92;
/// Below this, the candidate is not a duplicate.
pub const TIER2_LOW_CONFIDENCE: f64 = 0.80;

/// Neighbor search envelope.
pub const NEIGHBOR_TIME_WINDOW_HOURS: i64 = 48;
pub const NEIGHBOR_RADIUS_KM: f64 = 50.0;
pub const NEIGHBOR_LIMIT: i64 = 5;

/// Tier-2 decision band for a neighbor similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier2Band {
    /// >= τ_high: auto-merge.
    High,
    /// [τ_low, τ_high): delegate to Tier-3.
    Borderline,
    /// < τ_low: distinct incident.
    None,
}

pub fn tier2_band(similarity: f64) -> Tier2Band {
    if similarity >= TIER2_HIGH_CONFIDENCE {
        Tier2Band::High
    } else if similarity >= TIER2_LOW_CONFIDENCE {
        Tier2Band::Borderline
    } else {
        Tier2Band::None
    }
}

/// Expanded asset-type synonyms pull semantically equivalent phrasings
/// ("airfield", "aerodrome") closer together in embedding space.
fn asset_type_expanded(asset_type: AssetType) -> &'static str {
    match asset_type {
        AssetType::Airport => "airport aerodrome airfield",
        AssetType::Military => "military base defense installation",
        AssetType::Harbor => "harbor port dock",
        AssetType::Powerplant => "power plant energy facility",
        AssetType::Bridge => "bridge crossing",
        AssetType::Other => "infrastructure site",
    }
}

/// Pipe-joined labeled fields. Labels anchor each span so the model doesn't
/// blend the title into the narrative.
pub fn embedding_text(candidate: &CandidateIncident) -> String {
    let location = candidate
        .location_name
        .as_deref()
        .unwrap_or(&candidate.country);
    let date = candidate.occurred_at.format("%Y-%m-%d");

    let mut details: String = candidate.narrative.chars().take(200).collect();
    if candidate.narrative.chars().count() > 200 {
        details.push('…');
    }

    format!(
        "Event: {} | Location: {} | Type: {} | Date: {} | Details: {}",
        candidate.title,
        location,
        asset_type_expanded(candidate.asset_type),
        date,
        details
    )
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
