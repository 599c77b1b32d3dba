//! The ingest write path: validation layers, tiered deduplication, and the
//! concurrency-safe merge-or-create decision, all inside one request.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use skywatch_common::{
    AssetType, CandidateIncident, CandidateSource, IncidentCategory, IncidentStatus,
    IncidentSummary, SkywatchError, SourceType, VerificationStatus, MAX_QUOTE_LEN,
};
use skywatch_pipeline::embedding::{
    NEIGHBOR_LIMIT, NEIGHBOR_RADIUS_KM, NEIGHBOR_TIME_WINDOW_HOURS, TIER2_LOW_CONFIDENCE,
};
use skywatch_pipeline::gazetteer::LocationPrecision;
use skywatch_pipeline::{
    check_temporal, classify, consolidate, dedup, embedding_text, quotes, satire_match,
    validate_narrative, validate_title, DedupOutcome, Tier1Match,
};

use crate::rate_limit::{check_rate_limit, prune_empty_entries};
use crate::{auth, AppState};

/// Whole-request deadline. On expiry the transaction is dropped and rolled
/// back — no partial merges.
const REQUEST_DEADLINE: Duration = Duration::from_secs(15);

/// Tier-1 candidate rows are fetched from a ±48 h window.
const TIER1_WINDOW_HOURS: i64 = 48;

/// 768-dimensional embedding model served through OpenRouter.
pub const EMBEDDING_MODEL: &str = "google/text-embedding-004";

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub title: Option<String>,
    pub narrative: Option<String>,
    pub occurred_at: Option<String>,
    pub first_seen_at: Option<String>,
    pub last_seen_at: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub asset_type: Option<String>,
    pub status: Option<String>,
    pub country: Option<String>,
    pub verification_status: Option<String>,
    pub location_name: Option<String>,
    /// Accepted for wire compatibility; the stored score is always
    /// recomputed from the attached sources.
    #[serde(default)]
    pub evidence_score: Option<i16>,
    #[serde(default)]
    pub sources: Vec<IngestSource>,
}

#[derive(Debug, Deserialize)]
pub struct IngestSource {
    pub source_url: Option<String>,
    pub source_type: Option<String>,
    pub source_name: Option<String>,
    pub source_quote: Option<String>,
    pub trust_weight: Option<i16>,
    pub published_at: Option<String>,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Response {
    // Auth before anything else. A missing server-side token is a 500; the
    // caller can't fix it.
    match auth::check_bearer(&headers, state.config.ingest_token.as_deref()) {
        Ok(()) => {}
        Err(auth::AuthFailure::ServerMisconfigured) => {
            warn!("INGEST_TOKEN is not configured");
            return internal_error();
        }
        Err(auth::AuthFailure::MissingBearer) => {
            return error_body(StatusCode::UNAUTHORIZED, "unauthorized", "Missing bearer token");
        }
        Err(auth::AuthFailure::InvalidToken) => {
            return error_body(StatusCode::FORBIDDEN, "forbidden", "Invalid token");
        }
    }

    // Sliding-window rate limit per client IP.
    {
        let mut limiter = state.rate_limiter.lock().await;
        let window = Duration::from_secs(state.config.rate_limit_window_secs);
        if limiter.len() > 1000 {
            prune_empty_entries(&mut limiter, window);
        }
        let entries = limiter.entry(addr.ip()).or_default();
        if !check_rate_limit(entries, Instant::now(), state.config.rate_limit_max_requests, window) {
            return error_body(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Rate limit exceeded",
            );
        }
    }

    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_body(StatusCode::BAD_REQUEST, "invalid_input", &rejection.to_string());
        }
    };

    match tokio::time::timeout(REQUEST_DEADLINE, process(&state, request)).await {
        Ok(Ok((status, payload))) => (status, Json(payload)).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(_) => {
            warn!("ingest request exceeded the {}s deadline", REQUEST_DEADLINE.as_secs());
            error_body(StatusCode::GATEWAY_TIMEOUT, "timeout", "Request deadline exceeded")
        }
    }
}

/// The guarded transition chain. Every early return is a typed rejection;
/// store and upstream failures bubble as their own kinds.
async fn process(
    state: &AppState,
    request: IngestRequest,
) -> Result<(StatusCode, serde_json::Value), SkywatchError> {
    let candidate = build_candidate(state, request).await?;

    let fingerprint = candidate.fingerprint();
    let mut tx = state.store.begin().await?;
    state
        .store
        .acquire_fingerprint_lock(&mut *tx, fingerprint.lock_key())
        .await?;

    // Authoritative source-URL lookup: an incident that already carries one
    // of these article URLs wins immediately. This is what serializes
    // concurrent arrivals of the same article.
    let mut url_match: Option<IncidentSummary> = None;
    for source in &candidate.sources {
        if let Some(existing) = state
            .store
            .find_by_source_url(&mut *tx, &source.source_url)
            .await?
        {
            url_match = Some(existing);
            break;
        }
    }

    // Tier-1: fuzzy titles within 1 km plus the same-facility spatial
    // fallback, over recent rows.
    let tier1: Option<Tier1Match> = if url_match.is_none() {
        let search_radius = candidate.asset_type.search_radius_m().max(dedup::TIER1_RADIUS_M);
        let rows = state
            .store
            .find_recent_nearby(
                &mut *tx,
                candidate.lat,
                candidate.lon,
                candidate.occurred_at,
                TIER1_WINDOW_HOURS,
                search_radius,
            )
            .await?;
        dedup::tier1_match(&candidate, &rows)
    } else {
        None
    };

    // Tier-2: semantic neighbor search, only when the cheap tiers missed.
    let mut candidate_embedding: Option<Vector> = None;
    let tier2: Option<(Uuid, f64)> = if url_match.is_none() && tier1.is_none() {
        match &state.embedder {
            Some(embedder) => match embedder.embed(&embedding_text(&candidate)).await {
                Ok(vector) if vector.len() == skywatch_pipeline::EMBEDDING_DIM => {
                    candidate_embedding = Some(Vector::from(vector.clone()));
                    let neighbors = state
                        .store
                        .nearest_neighbors(
                            &mut *tx,
                            Vector::from(vector),
                            candidate.occurred_at,
                            NEIGHBOR_TIME_WINDOW_HOURS,
                            candidate.lat,
                            candidate.lon,
                            NEIGHBOR_RADIUS_KM * 1000.0,
                            &candidate.country,
                            TIER2_LOW_CONFIDENCE,
                            NEIGHBOR_LIMIT,
                        )
                        .await?;
                    neighbors.first().map(|n| (n.incident_id, n.similarity))
                }
                Ok(vector) => {
                    warn!(dim = vector.len(), "embedding has wrong dimensionality, skipping Tier-2");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "embedding unavailable, skipping Tier-2");
                    None
                }
            },
            None => None,
        }
    } else {
        None
    };

    // Tier-3: LLM adjudication for the borderline band only.
    let tier3 = match (&state.adjudicator, tier2) {
        (Some(adjudicator), Some((neighbor_id, similarity)))
            if skywatch_pipeline::tier2_band(similarity)
                == skywatch_pipeline::Tier2Band::Borderline =>
        {
            match state.store.fetch_summary(&mut *tx, neighbor_id).await? {
                Some(existing) => {
                    let verdict = adjudicator
                        .adjudicate_duplicate(&candidate, &existing, similarity)
                        .await;
                    if verdict.is_none() {
                        info!("llm_unavailable: continuing with Tier-2 decision");
                    }
                    verdict
                }
                None => None,
            }
        }
        _ => None,
    };

    let threshold = state
        .adjudicator
        .as_ref()
        .map(|a| a.confidence_threshold)
        .unwrap_or(0.80);
    let outcome = dedup::resolve(
        url_match.as_ref().map(|m| m.id),
        tier1,
        tier2,
        tier3.as_ref(),
        threshold,
    );

    match outcome {
        DedupOutcome::Merge { target, tier, score } => {
            state
                .store
                .extend_time_range(
                    &mut *tx,
                    target,
                    candidate.occurred_at,
                    candidate.first_seen_at,
                    candidate.last_seen_at,
                )
                .await?;
            let attached = state
                .store
                .attach_sources(&mut tx, target, &candidate.sources)
                .await?;

            // Recompute evidence from the merged source set. The store
            // trigger computes the same value; this write keeps the
            // application's view authoritative too.
            let merged_sources = state.store.fetch_sources(&mut *tx, target).await?;
            let narrative = state
                .store
                .fetch_summary(&mut *tx, target)
                .await?
                .map(|s| s.narrative)
                .unwrap_or_default();
            let evidence = consolidate::evidence_score(&merged_sources, &narrative);
            state.store.set_evidence_score(&mut *tx, target, evidence).await?;

            tx.commit().await.map_err(|e| SkywatchError::StoreFailure(e.to_string()))?;

            info!(
                incident = %target,
                tier = %tier,
                score,
                attached,
                "merged into existing incident"
            );
            Ok((
                StatusCode::OK,
                json!({
                    "id": target.to_string(),
                    "status": "merged",
                    "evidence_score": evidence.as_i16(),
                    "matched_tier": tier.to_string(),
                }),
            ))
        }
        DedupOutcome::Create => {
            let evidence = consolidate::evidence_score(&candidate.sources, &candidate.narrative);
            let id = state.store.insert_incident(&mut *tx, &candidate, evidence).await?;
            let attached = state
                .store
                .attach_sources(&mut tx, id, &candidate.sources)
                .await?;

            if let Some(vector) = candidate_embedding {
                state
                    .store
                    .upsert_embedding(&mut *tx, id, vector, EMBEDDING_MODEL)
                    .await?;
            }

            tx.commit().await.map_err(|e| SkywatchError::StoreFailure(e.to_string()))?;

            info!(incident = %id, attached, evidence = evidence.as_i16(), "created incident");
            Ok((
                StatusCode::CREATED,
                json!({
                    "id": id.to_string(),
                    "status": "created",
                    "evidence_score": evidence.as_i16(),
                }),
            ))
        }
    }
}

/// Classifier verdicts below this confidence are re-examined by the AI
/// adjudicator when one is configured.
const AI_RECHECK_THRESHOLD: f32 = 0.7;

/// Run the validation layers in order and assemble a CandidateIncident.
async fn build_candidate(
    state: &AppState,
    request: IngestRequest,
) -> Result<CandidateIncident, SkywatchError> {
    // Required fields first, like-for-like with the endpoint contract.
    let mut missing = Vec::new();
    if request.title.as_deref().unwrap_or("").is_empty() {
        missing.push("title");
    }
    if request.occurred_at.is_none() {
        missing.push("occurred_at");
    }
    if request.lat.is_none() {
        missing.push("lat");
    }
    if request.lon.is_none() {
        missing.push("lon");
    }
    if !missing.is_empty() {
        return Err(SkywatchError::InvalidInput(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    // Layer C2: validate and sanitize text on the raw input.
    let title = validate_title(request.title.as_deref())?;
    let narrative = validate_narrative(request.narrative.as_deref())?;
    if title.is_empty() {
        return Err(SkywatchError::InvalidInput(
            "title is empty after sanitization".to_string(),
        ));
    }

    let occurred_at = parse_rfc3339(request.occurred_at.as_deref().unwrap_or(""), "occurred_at")?;
    let first_seen_at = match request.first_seen_at.as_deref() {
        Some(s) => parse_rfc3339(s, "first_seen_at")?,
        None => occurred_at,
    };
    let last_seen_at = match request.last_seen_at.as_deref() {
        Some(s) => parse_rfc3339(s, "last_seen_at")?,
        None => occurred_at,
    };
    // Keep the envelope well-formed: occurred <= last_seen, first <= last.
    let last_seen_at = last_seen_at.max(occurred_at);
    let first_seen_at = first_seen_at.min(last_seen_at);
    let lat = request.lat.unwrap_or_default();
    let lon = request.lon.unwrap_or_default();

    // Layer C5a: satire blacklist across all source URLs.
    for source in &request.sources {
        if let Some(url) = source.source_url.as_deref() {
            if let Some(domain) = satire_match(url) {
                return Err(SkywatchError::Forbidden(format!("satire_domain:{domain}")));
            }
        }
    }

    // Layer C5b: temporal window.
    check_temporal(occurred_at, Utc::now(), state.config.max_age_days).map_err(|r| {
        SkywatchError::OutOfScope {
            category: "temporal".to_string(),
            reason: r.to_string(),
        }
    })?;

    // Layer C4: incident classification. Low-confidence verdicts get an AI
    // re-check; any adjudicator failure falls through to the rule-based
    // verdict with the ai_unavailable flag.
    let classification = classify(&title, &narrative);
    let mut is_incident = classification.is_incident;
    let mut category = classification.category;
    let mut reason = classification.reason.clone();
    if classification.confidence < AI_RECHECK_THRESHOLD {
        if let Some(adjudicator) = &state.adjudicator {
            match adjudicator.adjudicate_classification(&title, &narrative).await {
                Some(verdict) => {
                    is_incident = verdict.is_incident;
                    category = verdict.category;
                    reason = verdict.reasoning;
                }
                None => {
                    warn!(flag = "ai_unavailable", "continuing with classifier verdict");
                }
            }
        }
    }
    if !is_incident {
        return Err(SkywatchError::Rejected { category, reason });
    }

    // Layer C3: geographic scope.
    let analysis = state.scope.analyze(&title, &narrative, Some(lat), Some(lon));
    if !analysis.in_scope {
        let foreign = analysis.flags.iter().any(|f| f == "foreign_incident");
        if foreign || analysis.flags.iter().any(|f| f == "foreign_with_nordic_context") {
            return Err(SkywatchError::Rejected {
                category: IncidentCategory::Foreign,
                reason: analysis.reason,
            });
        }
        return Err(SkywatchError::InvalidInput(analysis.reason));
    }

    // Resolve asset type and location name, consulting the gazetteer when
    // the feed didn't say.
    let mut asset_type = request
        .asset_type
        .as_deref()
        .map(|s| {
            s.parse::<AssetType>()
                .map_err(SkywatchError::InvalidInput)
        })
        .transpose()?;
    let mut location_name = request.location_name.clone();
    let mut low_precision = false;
    let mut country = request.country.clone();

    if asset_type.is_none() || location_name.is_none() {
        let text = format!("{title} {narrative}");
        if let Some(entry) = state.gazetteer.find_in_text(&text) {
            asset_type.get_or_insert(entry.asset_type);
            location_name.get_or_insert(entry.name.to_string());
            country.get_or_insert(entry.country.to_string());
            low_precision = entry.precision == LocationPrecision::CityFallback;
        }
    }

    let status = request
        .status
        .as_deref()
        .map(|s| s.parse::<IncidentStatus>().map_err(SkywatchError::InvalidInput))
        .transpose()?
        .unwrap_or(IncidentStatus::Active);
    let verification_status = request
        .verification_status
        .as_deref()
        .map(|s| {
            s.parse::<VerificationStatus>()
                .map_err(SkywatchError::InvalidInput)
        })
        .transpose()?
        .unwrap_or(VerificationStatus::Pending);

    let sources = request
        .sources
        .into_iter()
        .filter_map(|s| build_source(s, &narrative))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CandidateIncident {
        title,
        narrative,
        occurred_at,
        first_seen_at,
        last_seen_at,
        lat,
        lon,
        asset_type: asset_type.unwrap_or(AssetType::Other),
        status,
        verification_status,
        country: country.unwrap_or_else(|| "DK".to_string()).to_uppercase(),
        location_name,
        low_precision_location: low_precision,
        sources,
    })
}

/// Sources without a usable http(s) URL are dropped (there is nothing to
/// deduplicate on); a missing quote is backfilled from the narrative.
fn build_source(
    source: IngestSource,
    narrative: &str,
) -> Option<Result<CandidateSource, SkywatchError>> {
    let source_url = source.source_url.filter(|u| !u.is_empty())?;
    match url::Url::parse(&source_url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
        _ => {
            warn!(url = %source_url, "dropping source with unusable URL");
            return None;
        }
    }

    let source_type = match source
        .source_type
        .as_deref()
        .map(|s| s.parse::<SourceType>())
        .transpose()
    {
        Ok(t) => t.unwrap_or(SourceType::Other),
        Err(e) => return Some(Err(SkywatchError::InvalidInput(e))),
    };

    let published_at = match source
        .published_at
        .as_deref()
        .map(|s| parse_rfc3339(s, "published_at"))
        .transpose()
    {
        Ok(p) => p,
        Err(e) => return Some(Err(e)),
    };

    let source_quote = source
        .source_quote
        .filter(|q| !q.is_empty())
        .or_else(|| quotes::extract_quote(narrative))
        .map(|q| q.chars().take(MAX_QUOTE_LEN).collect());

    Some(Ok(CandidateSource {
        source_url,
        source_type,
        source_name: source.source_name.unwrap_or_else(|| "Unknown".to_string()),
        source_quote,
        trust_weight: source.trust_weight.unwrap_or(1).clamp(1, 4),
        published_at,
    }))
}

fn parse_rfc3339(value: &str, field: &str) -> Result<DateTime<Utc>, SkywatchError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| SkywatchError::InvalidInput(format!("invalid_date: cannot parse {field}")))
}

// --- Error mapping ---

fn error_body(status: StatusCode, category: &str, detail: &str) -> Response {
    (status, Json(json!({ "error": category, "detail": detail }))).into_response()
}

fn internal_error() -> Response {
    // Nothing internal leaves the process: no paths, no SQL, no traces.
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error", "detail": "generic" })),
    )
        .into_response()
}

pub fn error_response(e: SkywatchError) -> Response {
    // Rejection counts are an operator signal; log the category for every
    // gated request.
    if !matches!(e, SkywatchError::StoreFailure(_) | SkywatchError::Anyhow(_)) {
        info!(category = %e.category(), "candidate rejected");
    }
    match &e {
        SkywatchError::InvalidInput(detail) => {
            error_body(StatusCode::BAD_REQUEST, "invalid_input", detail)
        }
        SkywatchError::MaliciousContent(pattern) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "category": "malicious_content", "detail": pattern })),
        )
            .into_response(),
        SkywatchError::Rejected { category, reason } => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "category": category.to_string(), "detail": reason })),
        )
            .into_response(),
        SkywatchError::Forbidden(category) => {
            let category = category.split(':').next().unwrap_or("forbidden");
            (
                StatusCode::FORBIDDEN,
                Json(json!({ "category": category })),
            )
                .into_response()
        }
        SkywatchError::OutOfScope { category, reason } => (
            StatusCode::FORBIDDEN,
            Json(json!({ "category": category, "detail": reason })),
        )
            .into_response(),
        SkywatchError::Unauthorized => {
            error_body(StatusCode::UNAUTHORIZED, "unauthorized", "Missing bearer token")
        }
        SkywatchError::Timeout(_) => {
            error_body(StatusCode::GATEWAY_TIMEOUT, "timeout", "Request deadline exceeded")
        }
        SkywatchError::UpstreamUnavailable(_)
        | SkywatchError::StoreConflict(_)
        | SkywatchError::StoreFailure(_)
        | SkywatchError::Config(_)
        | SkywatchError::Anyhow(_) => {
            warn!(error = %e, "ingest failed server-side");
            internal_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rfc3339_accepts_zulu_and_offsets() {
        assert!(parse_rfc3339("2025-10-02T14:30:00Z", "occurred_at").is_ok());
        assert!(parse_rfc3339("2025-10-02T16:30:00+02:00", "occurred_at").is_ok());
    }

    #[test]
    fn parse_rfc3339_rejects_garbage() {
        let e = parse_rfc3339("next tuesday", "occurred_at").unwrap_err();
        assert!(matches!(e, SkywatchError::InvalidInput(d) if d.contains("invalid_date")));
    }

    #[test]
    fn build_source_drops_urlless_entries() {
        let s = IngestSource {
            source_url: None,
            source_type: None,
            source_name: None,
            source_quote: None,
            trust_weight: None,
            published_at: None,
        };
        assert!(build_source(s, "").is_none());
    }

    #[test]
    fn build_source_drops_non_http_urls() {
        let s = IngestSource {
            source_url: Some("ftp://archive.example/file".to_string()),
            source_type: None,
            source_name: None,
            source_quote: None,
            trust_weight: None,
            published_at: None,
        };
        assert!(build_source(s, "").is_none());
        let s = IngestSource {
            source_url: Some("not a url".to_string()),
            source_type: None,
            source_name: None,
            source_quote: None,
            trust_weight: None,
            published_at: None,
        };
        assert!(build_source(s, "").is_none());
    }

    #[test]
    fn build_source_backfills_quote_from_narrative() {
        let s = IngestSource {
            source_url: Some("https://dr.dk/a".to_string()),
            source_type: Some("media".to_string()),
            source_name: Some("DR".to_string()),
            source_quote: None,
            trust_weight: Some(3),
            published_at: None,
        };
        let built = build_source(s, "A drone closed the airport for two hours.")
            .unwrap()
            .unwrap();
        assert!(built.source_quote.unwrap().contains("drone"));
    }

    #[test]
    fn build_source_clamps_trust_weight() {
        let s = IngestSource {
            source_url: Some("https://dr.dk/a".to_string()),
            source_type: Some("media".to_string()),
            source_name: None,
            source_quote: Some("quoted".to_string()),
            trust_weight: Some(9),
            published_at: None,
        };
        let built = build_source(s, "").unwrap().unwrap();
        assert_eq!(built.trust_weight, 4);
    }

    #[test]
    fn unknown_source_type_is_invalid_input() {
        let s = IngestSource {
            source_url: Some("https://dr.dk/a".to_string()),
            source_type: Some("blog".to_string()),
            source_name: None,
            source_quote: None,
            trust_weight: None,
            published_at: None,
        };
        assert!(matches!(
            build_source(s, ""),
            Some(Err(SkywatchError::InvalidInput(_)))
        ));
    }
}
