//! Store integration tests. Require a Postgres with PostGIS and pgvector;
//! skipped unless SKYWATCH_TEST_DATABASE_URL is set.

use chrono::{Duration, TimeZone, Utc};
use pgvector::Vector;

use skywatch_common::{
    AssetType, CandidateIncident, CandidateSource, EvidenceScore, IncidentStatus, ScopeKind,
    SourceType, VerificationStatus,
};
use skywatch_store::{migrate, Store};

fn test_database_url() -> Option<String> {
    std::env::var("SKYWATCH_TEST_DATABASE_URL").ok()
}

async fn connect_and_migrate() -> Option<Store> {
    let url = test_database_url()?;
    let store = Store::connect(&url).await.expect("connect test database");
    migrate::migrate(store.pool(), ScopeKind::European)
        .await
        .expect("migrate test database");
    Some(store)
}

fn candidate(title: &str, url: &str) -> CandidateIncident {
    let t = Utc.with_ymd_and_hms(2025, 10, 2, 14, 30, 0).unwrap();
    CandidateIncident {
        title: title.to_string(),
        narrative: "Drone observed near the runway.".to_string(),
        occurred_at: t,
        first_seen_at: t,
        last_seen_at: t,
        lat: 55.6181,
        lon: 12.6508,
        asset_type: AssetType::Airport,
        status: IncidentStatus::Active,
        verification_status: VerificationStatus::Pending,
        country: "DK".to_string(),
        location_name: Some("Copenhagen Airport".to_string()),
        low_precision_location: false,
        sources: vec![CandidateSource {
            source_url: url.to_string(),
            source_type: SourceType::Media,
            source_name: "Test Media".to_string(),
            source_quote: None,
            trust_weight: 2,
            published_at: None,
        }],
    }
}

#[tokio::test]
async fn incident_roundtrip_with_sources() {
    let Some(store) = connect_and_migrate().await else {
        eprintln!("SKYWATCH_TEST_DATABASE_URL not set; skipping");
        return;
    };

    let run = uuid::Uuid::new_v4();
    let url = format!("https://test.dk/{run}/a1");
    let c = candidate("Drone at CPH roundtrip", &url);

    let mut tx = store.begin().await.unwrap();
    let id = store
        .insert_incident(&mut *tx, &c, EvidenceScore::Reported)
        .await
        .unwrap();
    let source_id = store.upsert_outlet(&mut *tx, &c.sources[0]).await.unwrap();
    let inserted = store
        .insert_incident_source(&mut *tx, id, source_id, &c.sources[0])
        .await
        .unwrap();
    assert!(inserted);
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let found = store.find_by_source_url(&mut *tx, &url).await.unwrap().unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.source_count, 1);
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn duplicate_source_url_is_a_merge_signal() {
    let Some(store) = connect_and_migrate().await else {
        eprintln!("SKYWATCH_TEST_DATABASE_URL not set; skipping");
        return;
    };

    let run = uuid::Uuid::new_v4();
    let url = format!("https://test.dk/{run}/dup");
    let c = candidate("Drone duplicate source", &url);

    let mut tx = store.begin().await.unwrap();
    let id = store
        .insert_incident(&mut *tx, &c, EvidenceScore::Reported)
        .await
        .unwrap();
    let source_id = store.upsert_outlet(&mut *tx, &c.sources[0]).await.unwrap();
    assert!(store
        .insert_incident_source(&mut *tx, id, source_id, &c.sources[0])
        .await
        .unwrap());
    // Second insert of the same (incident_id, source_url) is a no-op
    assert!(!store
        .insert_incident_source(&mut *tx, id, source_id, &c.sources[0])
        .await
        .unwrap());
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn outlet_trust_weight_only_ratchets_up() {
    let Some(store) = connect_and_migrate().await else {
        eprintln!("SKYWATCH_TEST_DATABASE_URL not set; skipping");
        return;
    };

    let run = uuid::Uuid::new_v4();
    let mut source = CandidateSource {
        source_url: format!("https://ratchet-{run}.dk/a"),
        source_type: SourceType::Media,
        source_name: "Ratchet Media".to_string(),
        source_quote: None,
        trust_weight: 3,
        published_at: None,
    };

    let mut tx = store.begin().await.unwrap();
    let id_high = store.upsert_outlet(&mut *tx, &source).await.unwrap();
    source.trust_weight = 1;
    let id_low = store.upsert_outlet(&mut *tx, &source).await.unwrap();
    assert_eq!(id_high, id_low);

    let (trust,): (i16,) = sqlx::query_as("SELECT trust_weight FROM sources WHERE id = $1")
        .bind(id_high)
        .fetch_one(&mut *tx)
        .await
        .unwrap();
    assert_eq!(trust, 3, "lower-trust upsert must not downgrade");
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn evidence_trigger_upgrades_on_official_source() {
    let Some(store) = connect_and_migrate().await else {
        eprintln!("SKYWATCH_TEST_DATABASE_URL not set; skipping");
        return;
    };

    let run = uuid::Uuid::new_v4();
    let c = candidate("Drone evidence upgrade", &format!("https://test.dk/{run}/m1"));

    let mut tx = store.begin().await.unwrap();
    let id = store
        .insert_incident(&mut *tx, &c, EvidenceScore::Reported)
        .await
        .unwrap();

    let police = CandidateSource {
        source_url: format!("https://politi.dk/{run}/p1"),
        source_type: SourceType::Police,
        source_name: "Politi".to_string(),
        source_quote: None,
        trust_weight: 4,
        published_at: None,
    };
    let source_id = store.upsert_outlet(&mut *tx, &police).await.unwrap();
    store
        .insert_incident_source(&mut *tx, id, source_id, &police)
        .await
        .unwrap();

    let (score,): (i16,) = sqlx::query_as("SELECT evidence_score FROM incidents WHERE id = $1")
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .unwrap();
    assert_eq!(score, 4, "trigger must recompute to OFFICIAL on police source");
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn geography_trigger_rejects_out_of_bounds() {
    let Some(store) = connect_and_migrate().await else {
        eprintln!("SKYWATCH_TEST_DATABASE_URL not set; skipping");
        return;
    };

    let mut c = candidate("Drone at JFK", "https://test.dk/oob");
    c.lat = 40.6413;
    c.lon = -73.7781;

    let mut tx = store.begin().await.unwrap();
    let result = store.insert_incident(&mut *tx, &c, EvidenceScore::Reported).await;
    assert!(result.is_err(), "trigger must reject coordinates outside the region");
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn geography_trigger_rejects_foreign_text() {
    let Some(store) = connect_and_migrate().await else {
        eprintln!("SKYWATCH_TEST_DATABASE_URL not set; skipping");
        return;
    };

    let mut c = candidate("Drones strike Kyiv overnight", "https://test.dk/foreign");
    c.narrative = "Explosions reported across Kyiv.".to_string();

    let mut tx = store.begin().await.unwrap();
    let result = store.insert_incident(&mut *tx, &c, EvidenceScore::Reported).await;
    assert!(result.is_err(), "server-side keyword check must fire");
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn embedding_upsert_and_neighbor_search() {
    let Some(store) = connect_and_migrate().await else {
        eprintln!("SKYWATCH_TEST_DATABASE_URL not set; skipping");
        return;
    };

    let run = uuid::Uuid::new_v4();
    let c = candidate("Drone embedding test", &format!("https://test.dk/{run}/e1"));

    let mut tx = store.begin().await.unwrap();
    let id = store
        .insert_incident(&mut *tx, &c, EvidenceScore::Reported)
        .await
        .unwrap();

    let mut values = vec![0.0f32; 768];
    values[0] = 1.0;
    store
        .upsert_embedding(&mut *tx, id, Vector::from(values.clone()), "test-model")
        .await
        .unwrap();

    let neighbors = store
        .nearest_neighbors(
            &mut *tx,
            Vector::from(values),
            c.occurred_at + Duration::hours(1),
            48,
            c.lat,
            c.lon,
            50_000.0,
            "DK",
            0.80,
            5,
        )
        .await
        .unwrap();

    assert!(
        neighbors.iter().any(|n| n.incident_id == id && n.similarity > 0.99),
        "identical embedding inside the filter envelope must be found"
    );
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn neighbor_search_respects_time_window() {
    let Some(store) = connect_and_migrate().await else {
        eprintln!("SKYWATCH_TEST_DATABASE_URL not set; skipping");
        return;
    };

    let run = uuid::Uuid::new_v4();
    let c = candidate("Drone old embedding", &format!("https://test.dk/{run}/e2"));

    let mut tx = store.begin().await.unwrap();
    let id = store
        .insert_incident(&mut *tx, &c, EvidenceScore::Reported)
        .await
        .unwrap();

    let mut values = vec![0.0f32; 768];
    values[1] = 1.0;
    store
        .upsert_embedding(&mut *tx, id, Vector::from(values.clone()), "test-model")
        .await
        .unwrap();

    // Query 5 days later: outside the ±48h envelope
    let neighbors = store
        .nearest_neighbors(
            &mut *tx,
            Vector::from(values),
            c.occurred_at + Duration::days(5),
            48,
            c.lat,
            c.lon,
            50_000.0,
            "DK",
            0.80,
            5,
        )
        .await
        .unwrap();

    assert!(
        !neighbors.iter().any(|n| n.incident_id == id),
        "stale incidents must not surface as Tier-2 neighbors"
    );
    tx.commit().await.unwrap();
}
