use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::pipeline::{InferencePipeline, PipelineError, Prediction};
use crate::telemetry::{StatsSnapshot, TelemetryStore};
use crate::types::ClinicalRecord;

const FORM_PAGE: &str = include_str!("../assets/index.html");

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<InferencePipeline>,
    pub telemetry: Arc<TelemetryStore>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Form interface and prediction API.
pub async fn serve_api(
    addr: String,
    cors_origin: String,
    state: ApiState,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = api_router(state, &cors_origin);
    let addr: SocketAddr = addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("form interface listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Metrics exposition on its own listener; shares nothing with the form
/// server except the telemetry handle.
pub async fn serve_metrics(
    addr: String,
    telemetry: Arc<TelemetryStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = metrics_router(telemetry);
    let addr: SocketAddr = addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("metrics exposition listening on http://{addr}/metrics");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn api_router(state: ApiState, cors_origin: &str) -> Router {
    Router::new()
        .route("/", get(form_page))
        .route("/api/predict", post(predict))
        .route("/api/predict/delimited", post(predict_delimited))
        .route("/api/status", get(status))
        .with_state(state)
        .layer(cors_layer(cors_origin))
}

pub fn metrics_router(telemetry: Arc<TelemetryStore>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .with_state(telemetry)
}

async fn form_page() -> Html<&'static str> {
    Html(FORM_PAGE)
}

async fn predict(
    State(state): State<ApiState>,
    Json(record): Json<ClinicalRecord>,
) -> Result<Json<Prediction>, (StatusCode, Json<ErrorResponse>)> {
    state.pipeline.run(&record).map(Json).map_err(error_response)
}

async fn predict_delimited(
    State(state): State<ApiState>,
    body: String,
) -> Result<Json<Prediction>, (StatusCode, Json<ErrorResponse>)> {
    state
        .pipeline
        .run_delimited(&body)
        .map(Json)
        .map_err(error_response)
}

async fn status(State(state): State<ApiState>) -> Json<StatsSnapshot> {
    Json(state.telemetry.snapshot())
}

async fn metrics(State(telemetry): State<Arc<TelemetryStore>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        telemetry.render_exposition(),
    )
}

fn error_response(error: PipelineError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        PipelineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Decode(_) => StatusCode::BAD_REQUEST,
        PipelineError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: error.to_string() }))
}

fn cors_layer(allowed: &str) -> CorsLayer {
    let mut cors = if allowed.trim() == "*" {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = allowed
            .split(',')
            .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    cors = cors.allow_methods([Method::GET, Method::POST]);
    cors.allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}
