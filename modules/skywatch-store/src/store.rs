use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Acquire, ConnectOptions, PgExecutor, PgPool, Postgres, Row, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use skywatch_common::{
    AssetType, CandidateIncident, CandidateSource, EvidenceScore, IncidentSummary, SkywatchError,
    SourceType,
};

pub type Tx = Transaction<'static, Postgres>;

/// Postgres-backed spatial store. Statement caching is disabled on every
/// connection: transaction-pooled deployments (pgbouncer and friends)
/// prohibit cross-transaction prepared statements.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, SkywatchError> {
        if !database_url.starts_with("postgresql://") && !database_url.starts_with("postgres://") {
            return Err(SkywatchError::Config(
                "DATABASE_URL must use the postgres:// or postgresql:// scheme".to_string(),
            ));
        }
        let options: PgConnectOptions = database_url
            .parse::<PgConnectOptions>()
            .map_err(|e| SkywatchError::Config(format!("invalid DATABASE_URL: {e}")))?
            .statement_cache_capacity(0)
            .disable_statement_logging();

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(store_failure)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Tx, SkywatchError> {
        self.pool.begin().await.map_err(store_failure)
    }

    /// Serialize writers per deduplication fingerprint. The lock is held
    /// until the transaction commits or rolls back.
    pub async fn acquire_fingerprint_lock(
        &self,
        exec: impl PgExecutor<'_>,
        key: i64,
    ) -> Result<(), SkywatchError> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(exec)
            .await
            .map_err(store_failure)?;
        debug!(key, "fingerprint lock acquired");
        Ok(())
    }

    /// Authoritative duplicate check: does any incident already carry this
    /// article URL?
    pub async fn find_by_source_url(
        &self,
        exec: impl PgExecutor<'_>,
        source_url: &str,
    ) -> Result<Option<IncidentSummary>, SkywatchError> {
        let row = sqlx::query(
            r#"
            SELECT i.id, i.title, i.narrative, i.occurred_at,
                   ST_Y(i.location::geometry) AS lat, ST_X(i.location::geometry) AS lon,
                   i.asset_type, i.country, i.evidence_score,
                   (SELECT count(*) FROM incident_sources WHERE incident_id = i.id) AS source_count
            FROM incidents i
            JOIN incident_sources s ON i.id = s.incident_id
            WHERE s.source_url = $1
            LIMIT 1
            "#,
        )
        .bind(source_url)
        .fetch_optional(exec)
        .await
        .map_err(store_failure)?;

        row.map(|r| row_to_summary(&r)).transpose()
    }

    /// Candidate rows for Tier-1: incidents within `radius_m` of the point
    /// whose event time falls inside ±`window_hours` of the candidate's.
    /// Ordered by occurred_at ascending so the earliest report at a
    /// facility is the canonical merge target.
    pub async fn find_recent_nearby(
        &self,
        exec: impl PgExecutor<'_>,
        lat: f64,
        lon: f64,
        occurred_at: DateTime<Utc>,
        window_hours: i64,
        radius_m: f64,
    ) -> Result<Vec<IncidentSummary>, SkywatchError> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.title, i.narrative, i.occurred_at,
                   ST_Y(i.location::geometry) AS lat, ST_X(i.location::geometry) AS lon,
                   i.asset_type, i.country, i.evidence_score,
                   (SELECT count(*) FROM incident_sources WHERE incident_id = i.id) AS source_count
            FROM incidents i
            WHERE ST_DWithin(
                      i.location::geography,
                      ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography,
                      $3)
              AND i.occurred_at BETWEEN $4::timestamptz - make_interval(hours => $5)
                                    AND $4::timestamptz + make_interval(hours => $5)
            ORDER BY i.occurred_at ASC
            "#,
        )
        .bind(lon)
        .bind(lat)
        .bind(radius_m)
        .bind(occurred_at)
        .bind(window_hours as i32)
        .fetch_all(exec)
        .await
        .map_err(store_failure)?;

        rows.iter().map(row_to_summary).collect()
    }

    pub async fn fetch_summary(
        &self,
        exec: impl PgExecutor<'_>,
        id: Uuid,
    ) -> Result<Option<IncidentSummary>, SkywatchError> {
        let row = sqlx::query(
            r#"
            SELECT i.id, i.title, i.narrative, i.occurred_at,
                   ST_Y(i.location::geometry) AS lat, ST_X(i.location::geometry) AS lon,
                   i.asset_type, i.country, i.evidence_score,
                   (SELECT count(*) FROM incident_sources WHERE incident_id = i.id) AS source_count
            FROM incidents i
            WHERE i.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(store_failure)?;

        row.map(|r| row_to_summary(&r)).transpose()
    }

    /// Insert a new incident row. The geographic trigger re-validates; a
    /// trigger rejection surfaces as StoreFailure (an ingester bug, not a
    /// client error).
    pub async fn insert_incident(
        &self,
        exec: impl PgExecutor<'_>,
        candidate: &CandidateIncident,
        evidence: EvidenceScore,
    ) -> Result<Uuid, SkywatchError> {
        let id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO incidents
                (title, narrative, occurred_at, first_seen_at, last_seen_at,
                 asset_type, status, evidence_score, country, location, verification_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                    ST_SetSRID(ST_MakePoint($10, $11), 4326), $12)
            RETURNING id
            "#,
        )
        .bind(&candidate.title)
        .bind(&candidate.narrative)
        .bind(candidate.occurred_at)
        .bind(candidate.first_seen_at)
        .bind(candidate.last_seen_at)
        .bind(candidate.asset_type.to_string())
        .bind(candidate.status.to_string())
        .bind(evidence.as_i16())
        .bind(&candidate.country)
        .bind(candidate.lon)
        .bind(candidate.lat)
        .bind(candidate.verification_status.to_string())
        .fetch_one(exec)
        .await
        .map_err(store_failure)?;

        Ok(id.0)
    }

    /// Widen an existing incident's time envelope to cover a merged report.
    pub async fn extend_time_range(
        &self,
        exec: impl PgExecutor<'_>,
        id: Uuid,
        occurred_at: DateTime<Utc>,
        first_seen_at: DateTime<Utc>,
        last_seen_at: DateTime<Utc>,
    ) -> Result<(), SkywatchError> {
        sqlx::query(
            r#"
            UPDATE incidents
            SET first_seen_at = LEAST(first_seen_at, $1),
                last_seen_at = GREATEST(last_seen_at, $2),
                occurred_at = LEAST(occurred_at, $3)
            WHERE id = $4
            "#,
        )
        .bind(first_seen_at)
        .bind(last_seen_at)
        .bind(occurred_at)
        .bind(id)
        .execute(exec)
        .await
        .map_err(store_failure)?;
        Ok(())
    }

    /// Get-or-create an outlet. `(domain, source_type)` is the identity;
    /// trust_weight only ever ratchets upward.
    pub async fn upsert_outlet(
        &self,
        exec: impl PgExecutor<'_>,
        source: &CandidateSource,
    ) -> Result<Uuid, SkywatchError> {
        let id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO sources (name, domain, source_type, homepage_url, trust_weight)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (domain, source_type)
            DO UPDATE SET
                name = EXCLUDED.name,
                trust_weight = GREATEST(sources.trust_weight, EXCLUDED.trust_weight)
            RETURNING id
            "#,
        )
        .bind(&source.source_name)
        .bind(source.domain())
        .bind(source.source_type.to_string())
        .bind(&source.source_url)
        .bind(source.trust_weight)
        .fetch_one(exec)
        .await
        .map_err(store_failure)?;

        Ok(id.0)
    }

    /// Attach an article to an incident. Returns false when the
    /// `(incident_id, source_url)` row already exists — a merge signal, not
    /// an error.
    pub async fn insert_incident_source(
        &self,
        exec: impl PgExecutor<'_>,
        incident_id: Uuid,
        source_id: Uuid,
        source: &CandidateSource,
    ) -> Result<bool, SkywatchError> {
        let result = sqlx::query(
            r#"
            INSERT INTO incident_sources
                (incident_id, source_id, source_url, source_title, source_quote, published_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (incident_id, source_url) DO NOTHING
            "#,
        )
        .bind(incident_id)
        .bind(source_id)
        .bind(&source.source_url)
        .bind(&source.source_name)
        .bind(&source.source_quote)
        .bind(source.published_at)
        .execute(exec)
        .await
        .map_err(store_failure)?;

        Ok(result.rows_affected() > 0)
    }

    /// Attach every source, each inside its own savepoint: one bad source
    /// (constraint violation, oversized field) is logged and skipped while
    /// the incident itself stays the transactional unit. Returns the number
    /// of rows actually inserted.
    pub async fn attach_sources(
        &self,
        tx: &mut Tx,
        incident_id: Uuid,
        sources: &[CandidateSource],
    ) -> Result<u64, SkywatchError> {
        let mut attached = 0u64;
        for source in sources {
            let mut sp = tx.begin().await.map_err(store_failure)?;
            let result = async {
                let outlet_id = self.upsert_outlet(&mut *sp, source).await?;
                self.insert_incident_source(&mut *sp, incident_id, outlet_id, source)
                    .await
            }
            .await;
            match result {
                Ok(inserted) => {
                    sp.commit().await.map_err(store_failure)?;
                    if inserted {
                        attached += 1;
                    }
                }
                Err(e) => {
                    warn!(error = %e, url = %source.source_url, "failed to attach source, continuing");
                    sp.rollback().await.map_err(store_failure)?;
                }
            }
        }
        Ok(attached)
    }

    /// All sources attached to an incident, joined with their outlet's type
    /// and trust weight, for the application-side evidence recompute.
    pub async fn fetch_sources(
        &self,
        exec: impl PgExecutor<'_>,
        incident_id: Uuid,
    ) -> Result<Vec<CandidateSource>, SkywatchError> {
        let rows = sqlx::query(
            r#"
            SELECT isc.source_url, isc.source_title, isc.source_quote, isc.published_at,
                   s.source_type, s.trust_weight
            FROM incident_sources isc
            JOIN sources s ON s.id = isc.source_id
            WHERE isc.incident_id = $1
            ORDER BY isc.source_url ASC
            "#,
        )
        .bind(incident_id)
        .fetch_all(exec)
        .await
        .map_err(store_failure)?;

        rows.iter()
            .map(|row| {
                let source_type: String = row.try_get("source_type").map_err(store_failure)?;
                Ok(CandidateSource {
                    source_url: row.try_get("source_url").map_err(store_failure)?,
                    source_type: parse_enum::<SourceType>(&source_type)?,
                    source_name: row.try_get("source_title").map_err(store_failure)?,
                    source_quote: row.try_get("source_quote").map_err(store_failure)?,
                    trust_weight: row.try_get("trust_weight").map_err(store_failure)?,
                    published_at: row.try_get("published_at").map_err(store_failure)?,
                })
            })
            .collect()
    }

    /// Application-side evidence write. The incident_sources trigger
    /// recomputes the same value; keeping both lets either side catch a
    /// divergence in the other.
    pub async fn set_evidence_score(
        &self,
        exec: impl PgExecutor<'_>,
        id: Uuid,
        evidence: EvidenceScore,
    ) -> Result<(), SkywatchError> {
        sqlx::query("UPDATE incidents SET evidence_score = $1 WHERE id = $2")
            .bind(evidence.as_i16())
            .bind(id)
            .execute(exec)
            .await
            .map_err(store_failure)?;
        Ok(())
    }
}

pub(crate) fn store_failure(e: impl std::fmt::Display) -> SkywatchError {
    SkywatchError::StoreFailure(e.to_string())
}

fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> Result<T, SkywatchError> {
    s.parse()
        .map_err(|e: String| SkywatchError::StoreFailure(format!("corrupt enum column: {e}")))
}

pub(crate) fn row_to_summary(row: &PgRow) -> Result<IncidentSummary, SkywatchError> {
    let asset_type: String = row.try_get("asset_type").map_err(store_failure)?;
    let evidence: i16 = row.try_get("evidence_score").map_err(store_failure)?;
    Ok(IncidentSummary {
        id: row.try_get("id").map_err(store_failure)?,
        title: row.try_get("title").map_err(store_failure)?,
        narrative: row.try_get("narrative").map_err(store_failure)?,
        occurred_at: row.try_get("occurred_at").map_err(store_failure)?,
        lat: row.try_get("lat").map_err(store_failure)?,
        lon: row.try_get("lon").map_err(store_failure)?,
        asset_type: parse_enum::<AssetType>(&asset_type)?,
        country: row.try_get("country").map_err(store_failure)?,
        evidence_score: EvidenceScore::from_i16(evidence)
            .ok_or_else(|| SkywatchError::StoreFailure(format!("evidence score out of range: {evidence}")))?,
        source_count: row.try_get("source_count").map_err(store_failure)?,
        location_name: None,
    })
}
