//! Read-side queries for the public incidents endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use skywatch_common::SkywatchError;

use crate::store::{store_failure, Store};

#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub min_evidence: Option<i16>,
    pub country: Option<String>,
    pub asset_type: Option<String>,
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

/// One row of the public read surface: flat incident fields with lat/lon
/// extracted from the geometry and sources aggregated as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentRecord {
    pub id: Uuid,
    pub title: String,
    pub narrative: String,
    pub occurred_at: DateTime<Utc>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub asset_type: String,
    pub status: String,
    pub evidence_score: i16,
    pub verification_status: String,
    pub country: String,
    pub sources: serde_json::Value,
}

impl Store {
    pub async fn list_incidents(
        &self,
        filter: &IncidentFilter,
    ) -> Result<Vec<IncidentRecord>, SkywatchError> {
        let limit = filter.limit.clamp(1, 500);
        let offset = filter.offset.max(0);

        let rows = sqlx::query(
            r#"
            SELECT i.id, i.title, i.narrative, i.occurred_at, i.first_seen_at, i.last_seen_at,
                   ST_Y(i.location::geometry) AS lat, ST_X(i.location::geometry) AS lon,
                   i.asset_type, i.status, i.evidence_score, i.verification_status, i.country,
                   COALESCE(
                       json_agg(
                           json_build_object(
                               'source_url', isc.source_url,
                               'source_title', isc.source_title,
                               'source_quote', isc.source_quote,
                               'published_at', isc.published_at,
                               'source_name', s.name,
                               'source_type', s.source_type,
                               'trust_weight', s.trust_weight
                           )
                       ) FILTER (WHERE isc.id IS NOT NULL),
                       '[]'::json
                   ) AS sources
            FROM incidents i
            LEFT JOIN incident_sources isc ON isc.incident_id = i.id
            LEFT JOIN sources s ON s.id = isc.source_id
            WHERE ($1::smallint IS NULL OR i.evidence_score >= $1)
              AND ($2::text IS NULL OR i.country = $2)
              AND ($3::text IS NULL OR i.asset_type = $3)
              AND ($4::text IS NULL OR i.status = $4)
              AND ($5::timestamptz IS NULL OR i.occurred_at >= $5)
            GROUP BY i.id
            ORDER BY i.occurred_at DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(filter.min_evidence)
        .bind(filter.country.as_deref())
        .bind(filter.asset_type.as_deref())
        .bind(filter.status.as_deref())
        .bind(filter.since)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await
        .map_err(store_failure)?;

        rows.iter()
            .map(|row| {
                Ok(IncidentRecord {
                    id: row.try_get("id").map_err(store_failure)?,
                    title: row.try_get("title").map_err(store_failure)?,
                    narrative: row.try_get("narrative").map_err(store_failure)?,
                    occurred_at: row.try_get("occurred_at").map_err(store_failure)?,
                    first_seen_at: row.try_get("first_seen_at").map_err(store_failure)?,
                    last_seen_at: row.try_get("last_seen_at").map_err(store_failure)?,
                    lat: row.try_get("lat").map_err(store_failure)?,
                    lon: row.try_get("lon").map_err(store_failure)?,
                    asset_type: row.try_get("asset_type").map_err(store_failure)?,
                    status: row.try_get("status").map_err(store_failure)?,
                    evidence_score: row.try_get("evidence_score").map_err(store_failure)?,
                    verification_status: row.try_get("verification_status").map_err(store_failure)?,
                    country: row.try_get("country").map_err(store_failure)?,
                    sources: row.try_get("sources").map_err(store_failure)?,
                })
            })
            .collect()
    }
}
