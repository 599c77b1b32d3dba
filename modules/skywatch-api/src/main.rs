use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use llm_client::OpenRouterClient;
use skywatch_common::{Config, TextEmbedder};
use skywatch_pipeline::{AiAdjudicator, Gazetteer, GeoScope};
use skywatch_store::{migrate, Store};

mod auth;
mod cors;
mod incidents;
mod ingest;
mod rate_limit;

use ingest::EMBEDDING_MODEL;

pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub scope: GeoScope,
    pub gazetteer: Gazetteer,
    pub embedder: Option<Arc<dyn TextEmbedder>>,
    pub adjudicator: Option<Arc<AiAdjudicator>>,
    pub rate_limiter: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("skywatch=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let store = Store::connect(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("store connect failed: {e}"))?;
    migrate::migrate(store.pool(), config.scope)
        .await
        .map_err(|e| anyhow::anyhow!("migration failed: {e}"))?;

    // AI components are optional: without a key the pipeline degrades to
    // its deterministic tiers.
    let (embedder, adjudicator) = match config.openrouter_api_key.as_deref() {
        Some(key) => {
            let client = Arc::new(
                OpenRouterClient::new(key, EMBEDDING_MODEL).with_app_name("skywatch"),
            );
            let embedder: Arc<dyn TextEmbedder> = client.clone();
            let chat: Arc<dyn llm_client::ChatModel> = client;
            (Some(embedder), Some(Arc::new(AiAdjudicator::new(chat))))
        }
        None => {
            info!("no AI key configured; Tier-2/Tier-3 and AI re-checks disabled");
            (None, None)
        }
    };

    let state = Arc::new(AppState {
        store,
        scope: GeoScope::for_kind(config.scope),
        gazetteer: Gazetteer::with_defaults(),
        embedder,
        adjudicator,
        rate_limiter: Mutex::new(HashMap::new()),
        config,
    });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Write surface
        .route("/ingest", post(ingest::ingest))
        // Read surface
        .route("/incidents", get(incidents::list_incidents))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            cors::cors_middleware,
        ))
        .with_state(state.clone())
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", state.config.api_host, state.config.api_port);
    info!(%addr, "skywatch api listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
