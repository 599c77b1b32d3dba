//! Idempotent schema migration, run at API startup.
//!
//! The two triggers are the final authority: geographic validation rejects
//! rows a misbehaving ingester slipped past the pipeline, and the evidence
//! trigger recomputes the score on every source insert. The application
//! computes the same score; the two must agree.

use sqlx::PgPool;
use tracing::info;

use skywatch_common::{
    GeoBounds, ScopeKind, EUROPEAN_BOUNDS, NORDIC_BOUNDS, OFFICIAL_QUOTE_SQL_PATTERN,
};

/// Server-side foreign-keyword list, stricter than the analyzer's: only
/// unambiguous war-zone and far-abroad tokens, checked with word boundaries.
const TRIGGER_FOREIGN_RE: &str =
    r"\y(kyiv|kiev|ukraine|ukraina|moscow|moskva|gaza|tehran|damascus|baghdad|beijing|pyongyang)\y";

const EXTENSIONS: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS postgis",
    "CREATE EXTENSION IF NOT EXISTS vector",
    "CREATE EXTENSION IF NOT EXISTS pgcrypto",
];

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS incidents (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        title TEXT NOT NULL,
        narrative TEXT NOT NULL DEFAULT '',
        occurred_at TIMESTAMPTZ NOT NULL,
        first_seen_at TIMESTAMPTZ NOT NULL,
        last_seen_at TIMESTAMPTZ NOT NULL,
        location GEOMETRY(Point, 4326) NOT NULL,
        asset_type TEXT NOT NULL DEFAULT 'other',
        status TEXT NOT NULL DEFAULT 'active',
        evidence_score SMALLINT NOT NULL DEFAULT 1 CHECK (evidence_score BETWEEN 1 AND 4),
        verification_status TEXT NOT NULL DEFAULT 'pending',
        country TEXT NOT NULL DEFAULT 'DK',
        CONSTRAINT seen_range CHECK (first_seen_at <= last_seen_at),
        CONSTRAINT occurred_within_range CHECK (occurred_at <= last_seen_at)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        domain TEXT NOT NULL,
        source_type TEXT NOT NULL,
        homepage_url TEXT NOT NULL DEFAULT '',
        trust_weight SMALLINT NOT NULL DEFAULT 1 CHECK (trust_weight BETWEEN 1 AND 4),
        UNIQUE (domain, source_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS incident_sources (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        incident_id UUID NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
        source_id UUID NOT NULL REFERENCES sources(id),
        source_url TEXT NOT NULL,
        source_title TEXT NOT NULL DEFAULT '',
        source_quote TEXT,
        published_at TIMESTAMPTZ,
        lang TEXT,
        UNIQUE (incident_id, source_url)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS incident_embeddings (
        incident_id UUID PRIMARY KEY REFERENCES incidents(id) ON DELETE CASCADE,
        embedding vector(768) NOT NULL,
        embedding_model TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_incidents_location ON incidents USING GIST (location)",
    "CREATE INDEX IF NOT EXISTS idx_incidents_occurred_at ON incidents (occurred_at)",
    "CREATE INDEX IF NOT EXISTS idx_incident_sources_url ON incident_sources (source_url)",
    // ANN index for Tier-2 neighbor search. Changing the embedding model
    // means dropping this table and re-embedding; cosine distances across
    // models are meaningless.
    "CREATE INDEX IF NOT EXISTS idx_incident_embeddings_ann ON incident_embeddings \
     USING ivfflat (embedding vector_cosine_ops) WITH (lists = 100)",
];

fn geography_trigger_fn(bounds: GeoBounds) -> String {
    format!(
        r#"
        CREATE OR REPLACE FUNCTION validate_incident_geography() RETURNS TRIGGER AS $fn$
        BEGIN
            IF ST_Y(NEW.location) < {lat_min} OR ST_Y(NEW.location) > {lat_max}
               OR ST_X(NEW.location) < {lon_min} OR ST_X(NEW.location) > {lon_max} THEN
                RAISE EXCEPTION 'incident location (%, %) outside allowed region',
                    ST_Y(NEW.location), ST_X(NEW.location);
            END IF;
            IF NEW.title ~* '{foreign}' OR NEW.narrative ~* '{foreign}' THEN
                RAISE EXCEPTION 'incident text matches foreign-location blocklist';
            END IF;
            RETURN NEW;
        END;
        $fn$ LANGUAGE plpgsql
        "#,
        lat_min = bounds.lat_min,
        lat_max = bounds.lat_max,
        lon_min = bounds.lon_min,
        lon_max = bounds.lon_max,
        foreign = TRIGGER_FOREIGN_RE,
    )
}

const GEOGRAPHY_TRIGGER: &str = r#"
    CREATE OR REPLACE TRIGGER trigger_validate_incident_geography
    BEFORE INSERT OR UPDATE ON incidents
    FOR EACH ROW EXECUTE FUNCTION validate_incident_geography()
"#;

/// The authoritative evidence-score computation. Mirrors
/// `skywatch_pipeline::consolidate::evidence_score` exactly; the quote
/// check is the shared pattern from skywatch-common so the two sides
/// cannot diverge.
fn evidence_trigger_fn() -> String {
    format!(
        r#"
    CREATE OR REPLACE FUNCTION recompute_evidence_score() RETURNS TRIGGER AS $fn$
    DECLARE
        official_count INT;
        media_count INT;
        max_trust SMALLINT;
        narr TEXT;
        score SMALLINT;
    BEGIN
        SELECT
            count(*) FILTER (WHERE s.trust_weight = 4
                OR s.source_type IN ('police', 'military', 'notam', 'aviation_authority')),
            count(*) FILTER (WHERE s.source_type IN ('media', 'verified_media')
                AND s.trust_weight >= 2),
            COALESCE(max(s.trust_weight), 0)
        INTO official_count, media_count, max_trust
        FROM incident_sources isc
        JOIN sources s ON s.id = isc.source_id
        WHERE isc.incident_id = NEW.incident_id;

        SELECT narrative INTO narr FROM incidents WHERE id = NEW.incident_id;

        IF official_count > 0 THEN
            score := 4;
        ELSIF media_count >= 2
            AND narr ~* '{quote}' THEN
            score := 3;
        ELSIF max_trust >= 2 THEN
            score := 2;
        ELSE
            score := 1;
        END IF;

        UPDATE incidents SET evidence_score = score WHERE id = NEW.incident_id;
        RETURN NEW;
    END;
    $fn$ LANGUAGE plpgsql
    "#,
        quote = OFFICIAL_QUOTE_SQL_PATTERN,
    )
}

const EVIDENCE_TRIGGER: &str = r#"
    CREATE OR REPLACE TRIGGER trigger_recompute_evidence_score
    AFTER INSERT ON incident_sources
    FOR EACH ROW EXECUTE FUNCTION recompute_evidence_score()
"#;

pub async fn migrate(pool: &PgPool, scope: ScopeKind) -> Result<(), sqlx::Error> {
    let bounds = match scope {
        ScopeKind::European => EUROPEAN_BOUNDS,
        ScopeKind::Nordic => NORDIC_BOUNDS,
    };

    for stmt in EXTENSIONS.iter().chain(TABLES).chain(INDEXES) {
        sqlx::query(stmt).execute(pool).await?;
    }

    sqlx::query(&geography_trigger_fn(bounds)).execute(pool).await?;
    sqlx::query(GEOGRAPHY_TRIGGER).execute(pool).await?;
    sqlx::query(&evidence_trigger_fn()).execute(pool).await?;
    sqlx::query(EVIDENCE_TRIGGER).execute(pool).await?;

    info!(?scope, "store migration complete");
    Ok(())
}
