//! HTTP front door.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/scrape` | Trigger a run (409 while one is active) |
//! | `GET`  | `/vacancies` | Stored vacancies (`limit`, `profession` params) |
//! | `GET`  | `/vacancies/{id}` | Full record incl. child rows |
//! | `GET`  | `/stats` | Database statistics |
//! | `GET`  | `/export` | CSV download |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Error responses are `{ "error": { "code": "...", "message": "..." } }`
//! with codes `bad_request` (400), `not_found` (404), `run_active` (409),
//! `internal` (500).
//!
//! Exactly one scrape run is allowed at a time: the handler takes a
//! `try_lock` on the run guard and answers 409 instead of queueing.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::export;
use crate::pages::VacancySource;
use crate::scrape;
use crate::stats;
use crate::store::{self, SqliteStore};

/// Shared application state. The source (with its auth session) is
/// constructed once at startup and reused across requests.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    source: Arc<dyn VacancySource>,
    run_guard: Arc<Mutex<()>>,
}

/// Start the front door on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(
    config: &Config,
    pool: SqlitePool,
    source: Arc<dyn VacancySource>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
        source,
        run_guard: Arc::new(Mutex::new(())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/scrape", post(handle_scrape))
        .route("/vacancies", get(handle_list))
        .route("/vacancies/{id}", get(handle_detail))
        .route("/stats", get(handle_stats))
        .route("/export", get(handle_export))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!("listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn run_active() -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "run_active".to_string(),
        message: "a scrape run is already in progress".to_string(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /scrape ============

async fn handle_scrape(
    State(state): State<AppState>,
) -> Result<Json<scrape::ScrapeReport>, AppError> {
    // Reject, don't queue: overlapping runs would race the session state.
    let Ok(_guard) = state.run_guard.try_lock() else {
        return Err(run_active());
    };

    let sqlite = SqliteStore::new(state.pool.clone());
    let report = scrape::run_scrape(
        state.source.as_ref(),
        &sqlite,
        state.config.scrape.max_pages,
    )
    .await
    .map_err(internal)?;

    if let Some(webhook_url) = &state.config.notify.webhook_url {
        crate::notify::send_run_notice(webhook_url, &report).await;
    }

    Ok(Json(report))
}

// ============ GET /vacancies ============

#[derive(Deserialize)]
struct ListParams {
    limit: Option<i64>,
    profession: Option<String>,
}

#[derive(Serialize)]
struct ListResponse {
    count: usize,
    vacancies: Vec<store::StoredVacancy>,
}

async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let vacancies = store::list_vacancies(&state.pool, limit, params.profession.as_deref())
        .await
        .map_err(internal)?;

    Ok(Json(ListResponse {
        count: vacancies.len(),
        vacancies,
    }))
}

// ============ GET /vacancies/{id} ============

async fn handle_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<store::StoredDetail>, AppError> {
    let detail = store::load_detail(&state.pool, &id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("no vacancy with id: {}", id)))?;

    Ok(Json(detail))
}

// ============ GET /stats ============

async fn handle_stats(
    State(state): State<AppState>,
) -> Result<Json<stats::StatsReport>, AppError> {
    let report = stats::gather_stats(&state.pool).await.map_err(internal)?;
    Ok(Json(report))
}

// ============ GET /export ============

async fn handle_export(State(state): State<AppState>) -> Result<Response, AppError> {
    let bytes = export::csv_bytes(&state.pool).await.map_err(internal)?;
    let filename = format!(
        "vacancies_{}.csv",
        chrono::Utc::now().format("%Y%m%d_%H%M")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}
