// Treaty Reconcile - Web Server
// Read-only JSON API over the runs stored in SQLite

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use treaty_reconcile::{
    get_events_for_entity, get_rows_by_reserving_line, get_rows_for_contract, get_rows_for_run, latest_run,
    list_runs, Event, ReservingLine, RunReport, StoredRow,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn with_db<T>(state: &AppState, f: impl FnOnce(&Connection) -> anyhow::Result<T>) -> Result<T, ApiError> {
    let conn = state
        .db
        .lock()
        .map_err(|_| ApiError::internal("database lock poisoned"))?;
    f(&*conn).map_err(|e| {
        tracing::error!(error = %e, "query failed");
        ApiError::internal(e.to_string())
    })
}

fn latest_or_404(state: &AppState) -> Result<RunReport, ApiError> {
    with_db(state, latest_run)?.ok_or_else(|| ApiError::not_found("no runs stored yet"))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/runs - All stored runs, newest first
async fn get_runs(State(state): State<AppState>) -> ApiResult<Vec<RunReport>> {
    let runs = with_db(&state, list_runs)?;
    Ok(Json(ApiResponse::ok(runs)))
}

/// GET /api/runs/latest - Report of the most recent run
async fn get_latest_run(State(state): State<AppState>) -> ApiResult<RunReport> {
    Ok(Json(ApiResponse::ok(latest_or_404(&state)?)))
}

/// GET /api/runs/latest/rows - Output rows of the most recent run
async fn get_latest_rows(State(state): State<AppState>) -> ApiResult<Vec<StoredRow>> {
    let run = latest_or_404(&state)?;
    let rows = with_db(&state, |conn| get_rows_for_run(conn, &run.run_id))?;
    Ok(Json(ApiResponse::ok(rows)))
}

/// GET /api/runs/:run_id/rows
async fn get_run_rows(State(state): State<AppState>, Path(run_id): Path<String>) -> ApiResult<Vec<StoredRow>> {
    let rows = with_db(&state, |conn| get_rows_for_run(conn, &run_id))?;
    if rows.is_empty() {
        return Err(ApiError::not_found(format!("no rows for run {}", run_id)));
    }
    Ok(Json(ApiResponse::ok(rows)))
}

/// GET /api/runs/:run_id/events - Audit trail of one run
async fn get_run_events(State(state): State<AppState>, Path(run_id): Path<String>) -> ApiResult<Vec<Event>> {
    let events = with_db(&state, |conn| get_events_for_entity(conn, "run", &run_id))?;
    Ok(Json(ApiResponse::ok(events)))
}

/// GET /api/reserving-lines/:line - Latest run's rows in one reserving line
async fn get_reserving_line(State(state): State<AppState>, Path(line): Path<String>) -> ApiResult<Vec<StoredRow>> {
    if ReservingLine::from_label(&line).is_none() {
        return Err(ApiError::not_found(format!("unknown reserving line {}", line)));
    }
    let run = latest_or_404(&state)?;
    let rows = with_db(&state, |conn| get_rows_by_reserving_line(conn, &run.run_id, &line))?;
    Ok(Json(ApiResponse::ok(rows)))
}

/// GET /api/contracts/:crm_id - Latest run's layers of one contract
async fn get_contract(State(state): State<AppState>, Path(crm_id): Path<String>) -> ApiResult<Vec<StoredRow>> {
    let run = latest_or_404(&state)?;
    let rows = with_db(&state, |conn| get_rows_for_contract(conn, &run.run_id, &crm_id))?;
    if rows.is_empty() {
        return Err(ApiError::not_found(format!("contract {} not in latest run", crm_id)));
    }
    Ok(Json(ApiResponse::ok(rows)))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    println!("🌐 Treaty Reconcile - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TREATY_DB").ok())
        .unwrap_or_else(|| "contract_layers.db".to_string());
    let db_path = std::path::PathBuf::from(db_path);

    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: treaty-reconcile run [config.json]");
        eprintln!("   with output.database_path set first.");
        std::process::exit(1);
    }

    let conn = Connection::open(&db_path)?;
    println!("✓ Database opened: {:?}", db_path);

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/runs", get(get_runs))
        .route("/runs/latest", get(get_latest_run))
        .route("/runs/latest/rows", get(get_latest_rows))
        .route("/runs/:run_id/rows", get(get_run_rows))
        .route("/runs/:run_id/events", get(get_run_events))
        .route("/reserving-lines/:line", get(get_reserving_line))
        .route("/contracts/:crm_id", get(get_contract))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   API: http://localhost:3000/api/runs/latest");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}
