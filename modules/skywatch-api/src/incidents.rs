//! Public read endpoint: filterable incident listing with sources attached.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use skywatch_store::IncidentFilter;

use crate::AppState;

const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct IncidentQuery {
    pub min_evidence: Option<i16>,
    pub country: Option<String>,
    pub asset_type: Option<String>,
    pub status: Option<String>,
    pub since: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IncidentQuery>,
) -> Response {
    let since: Option<DateTime<Utc>> = match query.since.as_deref() {
        Some(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid_input", "detail": "since must be RFC3339" })),
                )
                    .into_response();
            }
        },
        None => None,
    };

    if let Some(min) = query.min_evidence {
        if !(1..=4).contains(&min) {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_input", "detail": "min_evidence must be 1-4" })),
            )
                .into_response();
        }
    }

    let filter = IncidentFilter {
        min_evidence: query.min_evidence,
        country: query.country.map(|c| c.to_uppercase()),
        asset_type: query.asset_type,
        status: query.status,
        since,
        limit: query.limit.unwrap_or(DEFAULT_LIMIT),
        offset: query.offset.unwrap_or(0),
    };

    match state.store.list_incidents(&filter).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            warn!(error = %e, "incident listing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error", "detail": "generic" })),
            )
                .into_response()
        }
    }
}
