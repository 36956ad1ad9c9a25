use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use game_metadata_engine::{
    ArtworkCandidate, ArtworkResolution, CancelSignal, CatalogMatch, EngineConfig, EngineError,
    MetadataEngine, RefreshOutcome, RefreshRequest, RefreshResponse, RefreshState,
    UnmatchedResolution, REFRESH_PROGRESS_TOPIC,
};

#[derive(Clone)]
struct AppState {
    engine: Arc<MetadataEngine>,
    /// Cancel handle of the refresh in flight
    cancel: Arc<Mutex<Option<CancelSignal>>>,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    title: String,
    #[serde(default)]
    platform_hint: Option<String>,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_max_results() -> usize {
    10
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    title: String,
    results: Vec<CatalogMatch>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    providers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    cancelled: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "game_metadata_server=info,game_metadata_engine=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match std::env::var("GME_CONFIG") {
        Ok(path) => EngineConfig::from_file(&path).await?,
        Err(_) => EngineConfig::default(),
    };
    config.apply_env();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8090);

    tracing::info!("🚀 Starting game metadata server");
    tracing::info!("📦 Database: {}", config.storage.db_path);
    tracing::info!("🖼  Image cache: {}", config.storage.cache_dir.display());
    tracing::info!("🔌 Port: {}", port);

    let engine = MetadataEngine::open(config).await?;
    let state = AppState {
        engine: Arc::new(engine),
        cancel: Arc::new(Mutex::new(None)),
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/search", post(search_handler))
        .route("/v1/refresh", post(refresh_handler))
        .route("/v1/refresh/status", get(status_handler))
        .route("/v1/refresh/cancel", post(cancel_handler))
        .route("/v1/refresh/events", get(events_handler))
        .route("/v1/refresh/unmatched", post(unmatched_handler))
        .route("/v1/refresh/artwork", post(artwork_handler))
        .route("/v1/games/:id/artwork", get(artwork_candidates_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("🎮 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: game_metadata_engine::VERSION.to_string(),
        providers: state.engine.provider_names(),
    })
}

async fn search_handler(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    tracing::debug!("Search request: {:?}", req);

    let mut results = state
        .engine
        .search(&req.title, req.platform_hint.as_deref())
        .await?;
    results.truncate(req.max_results);

    tracing::info!("🔍 {} → {} results", req.title, results.len());

    Ok(Json(SearchResponse {
        title: req.title,
        results,
    }))
}

/// Runs one pass to its end or next pause; progress streams on
/// `/v1/refresh/events` meanwhile.
async fn refresh_handler(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Json<RefreshResponse> {
    let cancel = CancelSignal::new();
    {
        let mut slot = state.cancel.lock().await;
        if slot.is_some() {
            return Json(RefreshResponse::failed(
                0,
                req.continue_from_index,
                "A refresh is already running",
            ));
        }
        *slot = Some(cancel.clone());
    }

    let response = state.engine.refresh_with_cancel(req, &cancel).await;
    tracing::info!("Refresh: {}", response.display());

    state.cancel.lock().await.take();
    Json(response)
}

async fn status_handler(State(state): State<AppState>) -> Result<Json<RefreshState>, AppError> {
    Ok(Json(state.engine.status().await?))
}

async fn cancel_handler(State(state): State<AppState>) -> Json<CancelResponse> {
    let cancelled = match state.cancel.lock().await.as_ref() {
        Some(cancel) => {
            cancel.cancel();
            true
        }
        None => false,
    };
    Json(CancelResponse { cancelled })
}

async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let receiver = state.engine.subscribe_progress();

    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse = Event::default().event(event.topic).json_data(&event.payload);
                    return Some((sse, receiver));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("{} subscriber lagged, {} events dropped", REFRESH_PROGRESS_TOPIC, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn unmatched_handler(
    State(state): State<AppState>,
    Json(resolution): Json<UnmatchedResolution>,
) -> Result<Json<RefreshOutcome>, AppError> {
    Ok(Json(state.engine.apply_unmatched_resolution(resolution).await?))
}

async fn artwork_handler(
    State(state): State<AppState>,
    Json(choices): Json<ArtworkResolution>,
) -> Result<Json<RefreshOutcome>, AppError> {
    Ok(Json(state.engine.apply_artwork_resolution(choices).await?))
}

async fn artwork_candidates_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<Vec<ArtworkCandidate>>, AppError> {
    Ok(Json(state.engine.artwork_candidates(&game_id).await?))
}

// Error handling
struct AppError(EngineError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            EngineError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            EngineError::Catalog(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            EngineError::InvalidTransition { from, event } => (
                StatusCode::CONFLICT,
                format!("Cannot apply {} while refresh is {}", event, from),
            ),
            e => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        tracing::error!("❌ Error: {} - {}", status, message);

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<EngineError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
