//! Vector side of the store: one 768-dim embedding per incident, plus the
//! Tier-2 neighbor query with its composite time/space/country filter.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use skywatch_common::SkywatchError;

use crate::store::{store_failure, Store};

/// A Tier-2 neighbor: an existing incident and its cosine similarity to
/// the candidate embedding.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub incident_id: Uuid,
    pub similarity: f64,
}

impl Store {
    /// Write (or replace) the embedding for an incident. Keyed on the
    /// incident id; re-embedding after a model change is an explicit upsert.
    pub async fn upsert_embedding(
        &self,
        exec: impl PgExecutor<'_>,
        incident_id: Uuid,
        embedding: Vector,
        model: &str,
    ) -> Result<(), SkywatchError> {
        sqlx::query(
            r#"
            INSERT INTO incident_embeddings (incident_id, embedding, embedding_model, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (incident_id)
            DO UPDATE SET embedding = EXCLUDED.embedding,
                          embedding_model = EXCLUDED.embedding_model,
                          updated_at = now()
            "#,
        )
        .bind(incident_id)
        .bind(embedding)
        .bind(model)
        .execute(exec)
        .await
        .map_err(store_failure)?;
        Ok(())
    }

    /// Nearest neighbors of `embedding` among incidents within the time
    /// window, radius and country, above the cosine threshold. Ordered by
    /// similarity descending (pgvector `<=>` is cosine distance).
    #[allow(clippy::too_many_arguments)]
    pub async fn nearest_neighbors(
        &self,
        exec: impl PgExecutor<'_>,
        embedding: Vector,
        occurred_at: DateTime<Utc>,
        window_hours: i64,
        lat: f64,
        lon: f64,
        radius_m: f64,
        country: &str,
        min_similarity: f64,
        limit: i64,
    ) -> Result<Vec<Neighbor>, SkywatchError> {
        let rows = sqlx::query(
            r#"
            SELECT e.incident_id, 1 - (e.embedding <=> $1) AS similarity
            FROM incident_embeddings e
            JOIN incidents i ON i.id = e.incident_id
            WHERE i.occurred_at BETWEEN $2::timestamptz - make_interval(hours => $3)
                                    AND $2::timestamptz + make_interval(hours => $3)
              AND i.country = $4
              AND ST_DWithin(
                      i.location::geography,
                      ST_SetSRID(ST_MakePoint($5, $6), 4326)::geography,
                      $7)
              AND 1 - (e.embedding <=> $1) >= $8
            ORDER BY e.embedding <=> $1 ASC
            LIMIT $9
            "#,
        )
        .bind(&embedding)
        .bind(occurred_at)
        .bind(window_hours as i32)
        .bind(country)
        .bind(lon)
        .bind(lat)
        .bind(radius_m)
        .bind(min_similarity)
        .bind(limit)
        .fetch_all(exec)
        .await
        .map_err(store_failure)?;

        rows.iter()
            .map(|row| {
                Ok(Neighbor {
                    incident_id: row.try_get("incident_id").map_err(store_failure)?,
                    similarity: row.try_get("similarity").map_err(store_failure)?,
                })
            })
            .collect()
    }
}
