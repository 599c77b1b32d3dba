//! AI adjudication: borderline classification re-checks and Tier-3
//! duplicate reasoning over a remote chat model.
//!
//! The adjudicator is strictly optional. Every failure path — missing key,
//! rate limits, malformed output, timeout — degrades to the deterministic
//! verdict the pipeline already holds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use llm_client::{ChatCall, ChatModel};
use skywatch_common::{CandidateIncident, IncidentCategory, IncidentSummary};

/// Free-tier models tried in order. All calls are temperature 0.
const FREE_MODELS: &[&str] = &[
    "meta-llama/llama-3.3-70b-instruct:free",
    "google/gemini-2.0-flash-exp:free",
    "mistralai/mistral-7b-instruct:free",
];

/// Tier-3 per-attempt latency budget.
const TIER3_TIMEOUT: Duration = Duration::from_millis(600);

/// Confidence is never reported as absolute certainty.
const CONFIDENCE_CAP: f64 = 0.95;

/// Distance/time gates for the anti-hallucination override: a DUPLICATE
/// verdict contradicting both is discarded.
const OVERRIDE_DISTANCE_M: f64 = 500.0;
const OVERRIDE_TIME_DIFF_HOURS: i64 = 3;

/// Hedging tokens that mark model output as unusable free text.
const HEDGING_TOKENS: &[&str] = &["probably", "i think", "as an ai", "i believe", "i'm not sure"];

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateVerdict {
    pub is_duplicate: bool,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationVerdict {
    pub is_incident: bool,
    pub confidence: f64,
    pub category: IncidentCategory,
    pub reasoning: String,
}

pub struct AiAdjudicator {
    chat: Arc<dyn ChatModel>,
    models: Vec<String>,
    /// Minimum confidence to accept a Tier-3 verdict over the Tier-2 band.
    pub confidence_threshold: f64,
    /// Responses keyed by a hash of both incident payloads, so retries and
    /// redeploys don't re-spend tokens. In-memory; a Redis backing would
    /// slot in behind the same key scheme.
    cache: Mutex<HashMap<String, DuplicateVerdict>>,
}

impl AiAdjudicator {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self {
            chat,
            models: FREE_MODELS.iter().map(|m| m.to_string()).collect(),
            confidence_threshold: 0.80,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Tier-3: adjudicate a borderline Tier-2 pair. Returns `None` when
    /// every model is unavailable — the caller falls back to the Tier-2
    /// decision.
    pub async fn adjudicate_duplicate(
        &self,
        new: &CandidateIncident,
        existing: &IncidentSummary,
        tier2_score: f64,
    ) -> Option<DuplicateVerdict> {
        let key = cache_key(&candidate_payload(new), &existing_payload(existing));
        if let Some(hit) = self.cache.lock().ok()?.get(&key).cloned() {
            debug!("Tier-3 cache hit");
            return Some(hit);
        }

        let prompt = duplicate_prompt(new, existing, tier2_score);
        let response = self.try_models(&prompt, Some(TIER3_TIMEOUT)).await?;

        let mut verdict = parse_duplicate_response(&response);

        // Anti-hallucination: a claimed match that contradicts the
        // precomputed geometry is discarded.
        let distance_m = existing.distance_m_to(new.lat, new.lon);
        let time_diff_hours = (new.occurred_at - existing.occurred_at).num_hours().abs();
        if verdict.is_duplicate
            && distance_m > OVERRIDE_DISTANCE_M
            && time_diff_hours > OVERRIDE_TIME_DIFF_HOURS
        {
            info!(
                distance_m,
                time_diff_hours, "Overriding DUPLICATE verdict that contradicts geometry"
            );
            verdict = DuplicateVerdict {
                is_duplicate: false,
                confidence: verdict.confidence,
                reasoning: format!(
                    "overridden: {distance_m:.0}m apart and {time_diff_hours}h apart"
                ),
            };
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, verdict.clone());
        }
        Some(verdict)
    }

    /// Re-examine a low-confidence classification. Returns `None` on any
    /// failure; the pipeline continues with the rule-based verdict and the
    /// `ai_unavailable` flag.
    pub async fn adjudicate_classification(
        &self,
        title: &str,
        narrative: &str,
    ) -> Option<ClassificationVerdict> {
        let prompt = classification_prompt(title, narrative);
        let response = self.try_models(&prompt, None).await?;
        Some(parse_classification_response(&response))
    }

    /// Round-robin over the model list. Retryable failures (429, 5xx,
    /// timeouts) rotate to the next model; the list exhausting returns
    /// `None`.
    async fn try_models(&self, prompt: &str, budget: Option<Duration>) -> Option<String> {
        for model in &self.models {
            let call = ChatCall::deterministic(model.clone(), prompt.to_string());
            let attempt = self.chat.complete(&call);
            let result = match budget {
                Some(d) => match tokio::time::timeout(d, attempt).await {
                    Ok(r) => r,
                    Err(_) => {
                        warn!(model = %model, "adjudicator attempt timed out");
                        continue;
                    }
                },
                None => attempt.await,
            };
            match result {
                Ok(text) => return Some(text),
                Err(e) if e.is_retryable() => {
                    warn!(model = %model, error = %e, "adjudicator model unavailable, rotating");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "adjudicator request rejected");
                    return None;
                }
            }
        }
        info!("all adjudicator models unavailable");
        None
    }
}

// --- Prompts ---

fn candidate_payload(c: &CandidateIncident) -> String {
    format!(
        "Title: {}\nDate: {}\nLocation: {} ({:.4}, {:.4})\nAsset type: {}\nCountry: {}\nSources: {}\nDetails: {}",
        c.title,
        c.occurred_at.format("%Y-%m-%d %H:%M UTC"),
        c.location_name.as_deref().unwrap_or("unknown"),
        c.lat,
        c.lon,
        c.asset_type,
        c.country,
        c.sources.len(),
        truncate(&c.narrative, 300),
    )
}

fn existing_payload(e: &IncidentSummary) -> String {
    format!(
        "Title: {}\nDate: {}\nLocation: {} ({:.4}, {:.4})\nAsset type: {}\nCountry: {}\nSources: {}\nDetails: {}",
        e.title,
        e.occurred_at.format("%Y-%m-%d %H:%M UTC"),
        e.location_name.as_deref().unwrap_or("unknown"),
        e.lat,
        e.lon,
        e.asset_type,
        e.country,
        e.source_count,
        truncate(&e.narrative, 300),
    )
}

fn duplicate_prompt(new: &CandidateIncident, existing: &IncidentSummary, tier2_score: f64) -> String {
    format!(
        "You are deduplicating drone incident reports. Two reports follow. \
Decide whether they describe the SAME real-world event (different outlets \
often cover one event) or two separate events.\n\n\
NEW REPORT:\n{}\n\nEXISTING INCIDENT:\n{}\n\n\
Embedding similarity: {:.2}\n\n\
Answer in exactly three lines:\n\
VERDICT: [DUPLICATE or UNIQUE]\n\
CONFIDENCE: [0.0-1.0]\n\
REASONING: [one concise sentence naming the deciding factors]",
        candidate_payload(new),
        existing_payload(existing),
        tier2_score,
    )
}

fn classification_prompt(title: &str, narrative: &str) -> String {
    format!(
        "You are screening news reports for a drone-incident tracker. Decide \
whether the text describes a REAL drone incident (sighting, airspace \
intrusion, closure) as opposed to policy news, a defense deployment, an \
exercise, satire, or general discussion.\n\n\
TITLE: {}\nTEXT: {}\n\n\
Answer in exactly four lines:\n\
VERDICT: [INCIDENT or NOT_INCIDENT]\n\
CATEGORY: [incident, policy, defense, simulation, discussion, foreign, not_drone]\n\
CONFIDENCE: [0.0-1.0]\n\
REASONING: [one concise sentence]",
        title,
        truncate(narrative, 500),
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect::<String>() + "…"
    }
}

// --- Response parsing ---

fn verdict_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*verdict\s*:\s*([a-z_]+)").expect("verdict regex"))
}

fn confidence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*confidence\s*:\s*([0-9]*\.?[0-9]+)").expect("confidence regex"))
}

fn reasoning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*reasoning\s*:\s*(.+)$").expect("reasoning regex"))
}

fn category_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*category\s*:\s*([a-z_]+)").expect("category regex"))
}

fn is_hedged(text: &str) -> bool {
    let lower = text.to_lowercase();
    HEDGING_TOKENS.iter().any(|t| lower.contains(t))
}

fn parse_common(response: &str) -> (Option<String>, f64, String) {
    let verdict = verdict_re()
        .captures(response)
        .map(|c| c[1].to_lowercase());
    let confidence = confidence_re()
        .captures(response)
        .and_then(|c| c[1].parse::<f64>().ok())
        .unwrap_or(0.5)
        .clamp(0.0, CONFIDENCE_CAP);
    let mut reasoning = reasoning_re()
        .captures(response)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();
    if is_hedged(&reasoning) {
        reasoning = "model reasoning discarded (hedging language)".to_string();
    }
    (verdict, confidence, reasoning)
}

/// Tolerant three-line parser. Lowercase accepted; missing fields default
/// to {is_duplicate: false, confidence: 0.5}.
pub fn parse_duplicate_response(response: &str) -> DuplicateVerdict {
    let (verdict, confidence, reasoning) = parse_common(response);
    DuplicateVerdict {
        is_duplicate: verdict.as_deref() == Some("duplicate"),
        confidence,
        reasoning,
    }
}

pub fn parse_classification_response(response: &str) -> ClassificationVerdict {
    let (verdict, confidence, reasoning) = parse_common(response);
    let category = category_re()
        .captures(response)
        .and_then(|c| match c[1].to_lowercase().as_str() {
            "incident" => Some(IncidentCategory::Incident),
            "policy" => Some(IncidentCategory::Policy),
            "defense" => Some(IncidentCategory::Defense),
            "simulation" => Some(IncidentCategory::Simulation),
            "discussion" => Some(IncidentCategory::Discussion),
            "foreign" => Some(IncidentCategory::Foreign),
            "not_drone" => Some(IncidentCategory::NotDrone),
            _ => None,
        });
    let is_incident = verdict.as_deref() == Some("incident");
    ClassificationVerdict {
        is_incident,
        confidence,
        category: category.unwrap_or(if is_incident {
            IncidentCategory::Incident
        } else {
            IncidentCategory::Discussion
        }),
        reasoning,
    }
}

fn cache_key(payload_a: &str, payload_b: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload_a.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(payload_b.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use llm_client::LlmError;
    use skywatch_common::{AssetType, IncidentStatus, VerificationStatus};
    use uuid::Uuid;

    // --- parsing ---

    #[test]
    fn parses_well_formed_duplicate_response() {
        let v = parse_duplicate_response(
            "VERDICT: DUPLICATE\nCONFIDENCE: 0.95\nREASONING: Same Kastrup closure, different outlets.",
        );
        assert!(v.is_duplicate);
        assert!((v.confidence - 0.95).abs() < 1e-9);
        assert!(v.reasoning.contains("Kastrup"));
    }

    #[test]
    fn parses_unique_verdict() {
        let v = parse_duplicate_response("VERDICT: UNIQUE\nCONFIDENCE: 0.90\nREASONING: Different airports.");
        assert!(!v.is_duplicate);
    }

    #[test]
    fn parses_lowercase_response() {
        let v = parse_duplicate_response("verdict: duplicate\nconfidence: 0.8\nreasoning: same event");
        assert!(v.is_duplicate);
        assert!((v.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn missing_fields_default_conservatively() {
        let v = parse_duplicate_response("The two reports look similar to me.");
        assert!(!v.is_duplicate);
        assert!((v.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_capped() {
        let v = parse_duplicate_response("VERDICT: DUPLICATE\nCONFIDENCE: 1.0\nREASONING: certain");
        assert!((v.confidence - 0.95).abs() < 1e-9, "absolute certainty is never reported");
    }

    #[test]
    fn garbage_confidence_defaults() {
        let v = parse_duplicate_response("VERDICT: DUPLICATE\nCONFIDENCE: very high\nREASONING: x");
        assert!((v.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn hedged_reasoning_is_discarded() {
        let v = parse_duplicate_response(
            "VERDICT: DUPLICATE\nCONFIDENCE: 0.9\nREASONING: As an AI, I think these are probably the same.",
        );
        assert!(v.is_duplicate);
        assert_eq!(v.reasoning, "model reasoning discarded (hedging language)");
    }

    #[test]
    fn parses_classification_response() {
        let v = parse_classification_response(
            "VERDICT: NOT_INCIDENT\nCATEGORY: policy\nCONFIDENCE: 0.85\nREASONING: Regulation announcement.",
        );
        assert!(!v.is_incident);
        assert_eq!(v.category, IncidentCategory::Policy);
    }

    #[test]
    fn classification_incident_verdict() {
        let v = parse_classification_response(
            "VERDICT: INCIDENT\nCATEGORY: incident\nCONFIDENCE: 0.9\nREASONING: Actual sighting with closure.",
        );
        assert!(v.is_incident);
        assert_eq!(v.category, IncidentCategory::Incident);
    }

    #[test]
    fn classification_missing_category_defaults() {
        let v = parse_classification_response("VERDICT: INCIDENT\nCONFIDENCE: 0.9\nREASONING: x");
        assert_eq!(v.category, IncidentCategory::Incident);
        let v = parse_classification_response("VERDICT: NOT_INCIDENT\nCONFIDENCE: 0.9\nREASONING: x");
        assert_eq!(v.category, IncidentCategory::Discussion);
    }

    // --- adjudicator behavior with mock chat models ---

    struct ScriptedChat {
        responses: Mutex<Vec<Result<String, LlmError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedChat {
        fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for ScriptedChat {
        async fn complete(&self, _call: &ChatCall) -> Result<String, LlmError> {
            *self.calls.lock().unwrap() += 1;
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(LlmError::RateLimited)
            } else {
                responses.remove(0)
            }
        }
    }

    fn new_candidate(lat: f64, lon: f64, hours_offset: i64) -> CandidateIncident {
        let t = Utc.with_ymd_and_hms(2025, 10, 2, 14, 30, 0).unwrap() + ChronoDuration::hours(hours_offset);
        CandidateIncident {
            title: "Drone sighting closes Copenhagen Airport".to_string(),
            narrative: "Airspace closed after drone spotted near runway.".to_string(),
            occurred_at: t,
            first_seen_at: t,
            last_seen_at: t,
            lat,
            lon,
            asset_type: AssetType::Airport,
            status: IncidentStatus::Active,
            verification_status: VerificationStatus::Pending,
            country: "DK".to_string(),
            location_name: Some("Copenhagen Airport".to_string()),
            low_precision_location: false,
            sources: vec![],
        }
    }

    fn existing_at(lat: f64, lon: f64) -> IncidentSummary {
        IncidentSummary {
            id: Uuid::new_v4(),
            title: "Copenhagen Airport shut down due to drone".to_string(),
            narrative: "Operations suspended at Kastrup.".to_string(),
            occurred_at: Utc.with_ymd_and_hms(2025, 10, 2, 14, 25, 0).unwrap(),
            lat,
            lon,
            asset_type: AssetType::Airport,
            country: "DK".to_string(),
            evidence_score: skywatch_common::EvidenceScore::Verified,
            source_count: 2,
            location_name: Some("Kastrup".to_string()),
        }
    }

    #[tokio::test]
    async fn accepts_duplicate_verdict() {
        let chat = Arc::new(ScriptedChat::new(vec![Ok(
            "VERDICT: DUPLICATE\nCONFIDENCE: 0.95\nREASONING: Same closure.".to_string(),
        )]));
        let adj = AiAdjudicator::new(chat);
        let v = adj
            .adjudicate_duplicate(&new_candidate(55.6181, 12.6508, 0), &existing_at(55.6181, 12.6508), 0.88)
            .await
            .unwrap();
        assert!(v.is_duplicate);
    }

    #[tokio::test]
    async fn rotates_models_on_rate_limit() {
        let chat = Arc::new(ScriptedChat::new(vec![
            Err(LlmError::RateLimited),
            Ok("VERDICT: UNIQUE\nCONFIDENCE: 0.90\nREASONING: Different days.".to_string()),
        ]));
        let adj = AiAdjudicator::new(chat.clone());
        let v = adj
            .adjudicate_duplicate(&new_candidate(55.6181, 12.6508, 0), &existing_at(55.6181, 12.6508), 0.85)
            .await
            .unwrap();
        assert!(!v.is_duplicate);
        assert_eq!(*chat.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn exhausted_models_return_none() {
        let chat = Arc::new(ScriptedChat::new(vec![
            Err(LlmError::RateLimited),
            Err(LlmError::Server { status: 503 }),
            Err(LlmError::RateLimited),
        ]));
        let adj = AiAdjudicator::new(chat);
        let v = adj
            .adjudicate_duplicate(&new_candidate(55.6181, 12.6508, 0), &existing_at(55.6181, 12.6508), 0.85)
            .await;
        assert!(v.is_none(), "graceful degradation: None when the model list is exhausted");
    }

    #[tokio::test]
    async fn geometry_override_discards_contradicted_match() {
        // 2km and 5 hours apart, but the model says DUPLICATE
        let chat = Arc::new(ScriptedChat::new(vec![Ok(
            "VERDICT: DUPLICATE\nCONFIDENCE: 0.9\nREASONING: Looks the same.".to_string(),
        )]));
        let adj = AiAdjudicator::new(chat);
        let v = adj
            .adjudicate_duplicate(&new_candidate(55.6181, 12.6508, 5), &existing_at(55.6361, 12.6508), 0.85)
            .await
            .unwrap();
        assert!(!v.is_duplicate);
        assert!(v.reasoning.starts_with("overridden"));
    }

    #[tokio::test]
    async fn close_pair_not_overridden() {
        // Same coordinate, 5 hours apart: time alone must not trigger the override
        let chat = Arc::new(ScriptedChat::new(vec![Ok(
            "VERDICT: DUPLICATE\nCONFIDENCE: 0.9\nREASONING: Same facility.".to_string(),
        )]));
        let adj = AiAdjudicator::new(chat);
        let v = adj
            .adjudicate_duplicate(&new_candidate(55.6181, 12.6508, 5), &existing_at(55.6181, 12.6508), 0.85)
            .await
            .unwrap();
        assert!(v.is_duplicate);
    }

    #[tokio::test]
    async fn responses_are_cached_by_payload_hash() {
        let chat = Arc::new(ScriptedChat::new(vec![Ok(
            "VERDICT: DUPLICATE\nCONFIDENCE: 0.9\nREASONING: Same event.".to_string(),
        )]));
        let adj = AiAdjudicator::new(chat.clone());
        let new = new_candidate(55.6181, 12.6508, 0);
        let existing = existing_at(55.6181, 12.6508);
        let first = adj.adjudicate_duplicate(&new, &existing, 0.88).await.unwrap();
        let second = adj.adjudicate_duplicate(&new, &existing, 0.88).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(*chat.calls.lock().unwrap(), 1, "second call must hit the cache");
    }

    #[tokio::test]
    async fn classification_recheck_parses() {
        let chat = Arc::new(ScriptedChat::new(vec![Ok(
            "VERDICT: INCIDENT\nCATEGORY: incident\nCONFIDENCE: 0.9\nREASONING: Real sighting.".to_string(),
        )]));
        let adj = AiAdjudicator::new(chat);
        let v = adj
            .adjudicate_classification("Drone over Kastrup", "Several witnesses reported a drone.")
            .await
            .unwrap();
        assert!(v.is_incident);
    }
}
