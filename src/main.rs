mod card;
mod config;
mod http;
mod idempotency;
mod imaging;
mod jobs;
mod listing;
mod llm;
mod metrics;
mod models;
mod notify;
mod pipeline;
mod research;
mod security;
mod shopify;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use card::CardError;
use config::AppConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{
    ApiError, NormalizeImageRequest, ProductRequest, ProductResponse, ResearchRequest,
    TastingCardRequest,
};
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use security::{AuthContext, AuthState, require_api_auth};
use serde_json::json;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "rickhouse.api", "server crashed: {err}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let auth_state = AuthState::from_env();
    let pipeline = Pipeline::new(AppConfig::from_env());
    let (queue, _worker) = jobs::JobQueue::spawn(pipeline.clone());
    let openapi_raw = include_str!("../docs/openapi.yaml");
    let openapi: serde_json::Value =
        serde_yaml::from_str(openapi_raw).unwrap_or(serde_json::json!({"openapi":"3.0.3"}));
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prom recorder");
    let redis = std::env::var("REDIS_URL")
        .ok()
        .and_then(|u| redis::Client::open(u).ok());
    let state = AppState {
        pipeline,
        queue,
        openapi: Arc::new(openapi),
        idempotency: Arc::new(Mutex::new(HashMap::new())),
        prometheus_handle,
        redis,
    };

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/products", post(create_product))
        .nest(
            "/tasting-cards",
            Router::new()
                .route("/generate", post(generate_tasting_card))
                .route("/preview", get(preview_tasting_card)),
        )
        .nest(
            "/stages",
            Router::new()
                .route("/normalize_image", post(stage_normalize_image))
                .route("/research", post(stage_research)),
        )
        .nest(
            "/jobs",
            Router::new()
                .route("/products", post(enqueue_product_job))
                .route("/{id}", get(get_job_status)),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_api_auth));

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "rickhouse.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    queue: jobs::JobQueue,
    openapi: Arc<serde_json::Value>,
    // In-memory fallback when Redis is not configured. Entries are never
    // evicted, so long-lived deployments should run with REDIS_URL set.
    idempotency: Arc<Mutex<HashMap<String, ProductResponse>>>,
    prometheus_handle: PrometheusHandle,
    redis: Option<redis::Client>,
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
///
/// Returns a small JSON payload with `status` and `service`.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "rickhouse-api-rs",
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Ok(key) = std::env::var("OPENAPI_KEY") {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return Err(AppError::Pipeline(PipelineError::invalid_input(
                "docs",
                "unauthorized",
            )));
        }
    }
    Ok(Json((*state.openapi).clone()))
}

async fn swagger_ui() -> axum::http::Response<String> {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Rickhouse API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    axum::http::Response::builder()
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.to_string())
        .unwrap()
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> axum::http::Response<String> {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return axum::http::Response::builder()
                .status(axum::http::StatusCode::UNAUTHORIZED)
                .body("unauthorized".into())
                .unwrap();
        }
    }
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap()
}

/// Run the bottle photo → draft product pipeline.
///
/// - Method: `POST`
/// - Path: `/products`
/// - Auth: `Authorization: Bearer <key>` or `X-Rickhouse-Key: <key>`
/// - Body: `ProductRequest`
/// - Response: `ProductResponse` (draft product + per-stage transcript)
///
/// Honors an `Idempotency-Key` header; a replayed key returns the stored
/// response without running the pipeline again.
async fn create_product(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<ProductResponse>, AppError> {
    crate::metrics::inc_requests("/products");
    info!(
        target = "rickhouse.api",
        caller = %context.caller,
        api_key = %context.api_key_id,
        dry_run = payload.dry_run,
        "product pipeline invoked",
    );

    if let Some(key) = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        if let Some(client) = &state.redis {
            if let Some(existing) = idempotency::redis_get(client, &key).await {
                return Ok(Json(existing));
            }
            let response = state.pipeline.run(payload).await?;
            let ttl = std::env::var("IDEMPOTENCY_TTL_SECS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(3600);
            idempotency::redis_set(client, &key, &response, ttl).await;
            return Ok(Json(response));
        }
        if let Some(existing) = state.idempotency.lock().await.get(&key).cloned() {
            return Ok(Json(existing));
        }
        let response = state.pipeline.run(payload).await?;
        state.idempotency.lock().await.insert(key, response.clone());
        return Ok(Json(response));
    }

    let response = state.pipeline.run(payload).await?;

    Ok(Json(response))
}

/// Regenerate the tasting card for an existing product. Skips the render
/// when the stored content hash still matches, unless `force` is set.
async fn generate_tasting_card(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<TastingCardRequest>,
) -> Result<Json<models::TastingCardResponse>, AppError> {
    crate::metrics::inc_requests("/tasting-cards/generate");
    let Some(product_id) = payload.resolve_product_id() else {
        return Err(AppError::Pipeline(PipelineError::invalid_input(
            "tasting_card",
            "product_id or admin_url is required",
        )));
    };
    info!(
        target = "rickhouse.api",
        caller = %context.caller,
        product_id,
        force = payload.force,
        "tasting card requested",
    );
    let response = state
        .pipeline
        .card()
        .generate(product_id, payload.force)
        .await
        .map_err(AppError::from_card)?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct PreviewParams {
    #[serde(default)]
    product_id: Option<u64>,
}

/// Card HTML for layout checks. With `product_id` the live product is
/// rendered; without it a canned sample bottle is used.
async fn preview_tasting_card(
    State(state): State<AppState>,
    Query(params): Query<PreviewParams>,
) -> Result<Html<String>, AppError> {
    crate::metrics::inc_requests("/tasting-cards/preview");
    let html = match params.product_id {
        Some(product_id) => state.pipeline.card().preview_html(product_id).await,
        None => state.pipeline.card().preview_sample().await,
    }
    .map_err(AppError::from_card)?;
    Ok(Html(html))
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl AppError {
    fn from_card(err: CardError) -> Self {
        match err {
            CardError::MissingImage(_) => {
                Self::Pipeline(PipelineError::validation("tasting_card", err.to_string()))
            }
            other => Self::Pipeline(PipelineError::internal("tasting_card", other.to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    job_id: String,
}

async fn enqueue_product_job(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<EnqueueResponse>, AppError> {
    crate::metrics::inc_requests("/jobs/products");
    let id = state
        .queue
        .enqueue_product(payload, context)
        .await
        .map_err(|err| AppError::Pipeline(PipelineError::internal("enqueue", err.error)))?;
    Ok(Json(EnqueueResponse {
        job_id: id.to_string(),
    }))
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<jobs::JobInfo>, AppError> {
    let Ok(uuid) = uuid::Uuid::parse_str(&id) else {
        return Err(AppError::Pipeline(PipelineError::invalid_input(
            "jobs",
            "invalid_job_id",
        )));
    };
    if let Some(info) = state.queue.get(uuid).await {
        Ok(Json(info))
    } else {
        Err(AppError::Pipeline(PipelineError::invalid_input(
            "jobs",
            "not_found",
        )))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
// -------- Stage endpoints (manual granular control) --------
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct NormalizeImageResponse {
    image_url: String,
    detail: serde_json::Value,
}

async fn stage_normalize_image(
    State(state): State<AppState>,
    Json(req): Json<NormalizeImageRequest>,
) -> Result<Json<NormalizeImageResponse>, AppError> {
    crate::metrics::inc_requests("/stages/normalize_image");
    let out = state
        .pipeline
        .stage_normalize_image(&req.image_url)
        .await
        .map_err(AppError::from)?;
    Ok(Json(NormalizeImageResponse {
        image_url: out.value,
        detail: out.output,
    }))
}

async fn stage_research(
    State(state): State<AppState>,
    Json(req): Json<ResearchRequest>,
) -> Result<Json<research::EvidenceBundle>, AppError> {
    crate::metrics::inc_requests("/stages/research");
    let out = state
        .pipeline
        .stage_research(&req.query)
        .await
        .map_err(AppError::from)?;
    Ok(Json(out.value))
}
