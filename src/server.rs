use crate::config::AppConfig;
use crate::data::DatasetHandle;
use crate::render;
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

/// Shared by every request. The dataset is never mutated after load, so no locking.
pub struct AppState {
    pub dataset: DatasetHandle,
    pub config: AppConfig,
}

#[derive(Deserialize)]
pub struct SceneParams {
    year: i32,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct YearsResponse {
    min_year: i32,
    max_year: i32,
    data_years: Vec<i32>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/api/scene", get(scene_handler))
        .route("/api/years", get(years_handler))
        .fallback_service(static_files)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, dataset: DatasetHandle) -> Result<()> {
    let port = config.server.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let state = Arc::new(AppState { dataset, config });
    let app = router(state);

    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// A malformed `year` is rejected by the extractor with 400; a year without data is an empty scene.
async fn scene_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SceneParams>,
) -> Result<Json<FeatureCollection>, (StatusCode, String)> {
    info!("Updating map for year: {}", params.year);
    let scene = state.dataset.build_scene(params.year);
    render::scene_to_geojson(&scene)
        .map(Json)
        .map_err(|e| {
            error!("Failed to render scene for {}: {:#}", params.year, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

async fn years_handler(State(state): State<Arc<AppState>>) -> Json<YearsResponse> {
    Json(YearsResponse {
        min_year: state.config.scene.min_year,
        max_year: state.config.scene.max_year,
        data_years: state.dataset.years(),
    })
}
