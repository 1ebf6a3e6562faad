//! HTTP server implementation for the board.
//!
//! This module provides the axum-based HTTP server that serves the board page,
//! exposes REST endpoints for edits, and pushes refresh signals over a
//! WebSocket.

use axum::{
    Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{oneshot, watch};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::templates;
use crate::board::{Board, LoadMode, WeekView};
use crate::config::UiConfig;
use crate::error::{ErrorCode, ScheduleError};
use crate::grid::ScheduleGrid;
use crate::merge::DepartmentSelection;
use crate::preferences::{PreferenceStore, Preferences, resolve_selection, stored_selection};
use crate::refresh::RefreshSignal;
use crate::types::{DescriptionEdit, NewTask};

/// Cookie naming a browser's editing session.
pub const SESSION_COOKIE: &str = "shop_schedule_edit";

/// Browsers that have entered the editing password.
#[derive(Debug, Default)]
struct EditSessions {
    tokens: Mutex<HashSet<String>>,
}

impl EditSessions {
    fn open(&self) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.clone());
        token
    }

    fn is_open(&self, token: &str) -> bool {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(token)
    }

    fn close(&self, token: &str) {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(token);
    }
}

/// Value of the session cookie sent with a request.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token)
}

fn session_cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Strict", SESSION_COOKIE, token)
}

fn expired_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0", SESSION_COOKIE)
}

/// Board server state shared across handlers.
#[derive(Clone)]
pub struct DashboardServer {
    board: Arc<Board>,
    prefs: Arc<PreferenceStore>,
    /// Unset means editing cannot be unlocked.
    editing_password: Option<Arc<str>>,
    sessions: Arc<EditSessions>,
    port: u16,
}

impl DashboardServer {
    pub fn new(
        board: Arc<Board>,
        prefs: Arc<PreferenceStore>,
        editing_password: Option<String>,
        port: u16,
    ) -> Self {
        Self {
            board,
            prefs,
            editing_password: editing_password.map(Arc::from),
            sessions: Arc::new(EditSessions::default()),
            port,
        }
    }

    fn is_unlocked(&self, headers: &HeaderMap) -> bool {
        session_token(headers).is_some_and(|token| self.sessions.is_open(token))
    }

    fn require_unlocked(&self, headers: &HeaderMap) -> Result<(), ScheduleError> {
        if self.is_unlocked(headers) {
            Ok(())
        } else {
            Err(ScheduleError::new(ErrorCode::NotEditable, "Editing is locked"))
        }
    }

    fn view_selection(&self, params: &BoardParams) -> (DepartmentSelection, Option<usize>) {
        let prefs = self.prefs.load();
        let selection = resolve_selection(params.departments.as_deref(), &prefs);
        (selection, params.week.or(prefs.current_week_index))
    }

    /// Store explicit week/department choices from the request.
    fn remember(&self, params: &BoardParams, selection: &DepartmentSelection, index: usize) {
        if params.week.is_none() && params.departments.is_none() {
            return;
        }
        let remembered = self.prefs.update(|p| {
            p.current_week_index = Some(index);
            if params.departments.is_some() {
                p.selected_departments = stored_selection(selection);
            }
        });
        if let Err(e) = remembered {
            warn!(error = %e, "Failed to save board preferences");
        }
    }

    /// Full grid for the request.
    fn board_grid(&self, params: &BoardParams, today: NaiveDate) -> (ScheduleGrid, usize) {
        let (selection, saved) = self.view_selection(params);
        let (grid, index) = self.board.grid(&selection, today, saved);
        self.remember(params, &selection, index);
        (grid, index)
    }

    /// Only the requested week.
    fn board_week(&self, params: &BoardParams, today: NaiveDate) -> WeekView {
        let (selection, saved) = self.view_selection(params);
        let view = self.board.week_view(&selection, today, saved);
        self.remember(params, &selection, view.index);
        view
    }
}

/// JSON error body with an HTTP status derived from the error code.
pub struct ApiError(ScheduleError);

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(err.into())
    }
}

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::MissingRequiredField
        | ErrorCode::InvalidFieldValue
        | ErrorCode::DepartmentMismatch
        | ErrorCode::SameDate => StatusCode::BAD_REQUEST,
        ErrorCode::DuplicateSubmission => StatusCode::CONFLICT,
        ErrorCode::IncorrectPassword => StatusCode::UNAUTHORIZED,
        ErrorCode::NotEditable => StatusCode::FORBIDDEN,
        ErrorCode::TaskNotFound | ErrorCode::ProjectNotFound => StatusCode::NOT_FOUND,
        ErrorCode::NetworkError
        | ErrorCode::AuthError
        | ErrorCode::DataError
        | ErrorCode::UpstreamError => StatusCode::BAD_GATEWAY,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let body = json!({
            "code": err.code,
            "message": err.message,
            "category": err.category(),
            "field": err.field,
        });
        (status_for(err.code), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Health check response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct BoardParams {
    departments: Option<String>,
    week: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MoveRequest {
    department: String,
    date: String,
}

#[derive(Debug, Deserialize)]
struct DescriptionRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
struct UnlockRequest {
    password: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

/// Root endpoint - serves the board page.
async fn root() -> Html<&'static str> {
    Html(templates::BOARD_TEMPLATE)
}

/// Current week as an HTML fragment.
async fn api_board(
    State(state): State<DashboardServer>,
    Query(params): Query<BoardParams>,
) -> Html<String> {
    let view = state.board_week(&params, Local::now().date_naive());
    let snapshot = state.board.snapshot();
    let banner = snapshot.last_error.as_ref();

    Html(match &view.week {
        Some(week) => templates::render_week(week, view.index, view.total, banner),
        None => templates::render_empty(banner),
    })
}

/// Full grid model as JSON.
async fn api_board_json(
    State(state): State<DashboardServer>,
    Query(params): Query<BoardParams>,
) -> impl IntoResponse {
    let (grid, index) = state.board_grid(&params, Local::now().date_naive());
    let snapshot = state.board.snapshot();
    Json(json!({
        "grid": grid,
        "currentWeek": index,
        "loadedAt": snapshot.loaded_at,
        "lastError": snapshot.last_error,
        "mutations": state.board.mutations(),
    }))
}

async fn api_tasks_list(State(state): State<DashboardServer>) -> impl IntoResponse {
    Json(state.board.snapshot().tasks.clone())
}

async fn api_task_add(
    State(state): State<DashboardServer>,
    Json(new_task): Json<NewTask>,
) -> ApiResult<impl IntoResponse> {
    let task = state.board.add_task(new_task).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn api_task_delete(
    State(state): State<DashboardServer>,
    Path(task_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.board.delete_task(&task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_task_move(
    State(state): State<DashboardServer>,
    Path(task_id): Path<String>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .board
        .move_task(&task_id, &req.department, &req.date)
        .await?;
    Ok(Json(task))
}

async fn api_task_description(
    State(state): State<DashboardServer>,
    Path(task_id): Path<String>,
    Json(req): Json<DescriptionRequest>,
) -> ApiResult<impl IntoResponse> {
    let task = state.board.update_description(&task_id, &req.text).await?;
    Ok(Json(task))
}

async fn api_project_plan(
    State(state): State<DashboardServer>,
    Path(project): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.board.build_plan(&project)?))
}

/// Build-plan edits; requires this browser to have unlocked editing.
async fn api_project_descriptions(
    State(state): State<DashboardServer>,
    Path(project): Path<String>,
    headers: HeaderMap,
    Json(edits): Json<Vec<DescriptionEdit>>,
) -> ApiResult<impl IntoResponse> {
    state.require_unlocked(&headers)?;
    let saved = state
        .board
        .save_project_descriptions(&project, &edits)
        .await?;
    Ok(Json(json!({ "saved": saved })))
}

async fn api_search(
    State(state): State<DashboardServer>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    Json(state.board.search(&params.q))
}

/// Foreground reload; other clients are told to refresh too.
async fn api_refresh(State(state): State<DashboardServer>) -> ApiResult<impl IntoResponse> {
    let snapshot = state.board.reload(LoadMode::Foreground).await?;
    state
        .board
        .hub()
        .publish(json!({ "action": "manual_refresh" }))
        .await;
    Ok(Json(json!({
        "taskCount": snapshot.tasks.len(),
        "loadedAt": snapshot.loaded_at,
    })))
}

/// Open an editing session for this browser.
async fn api_unlock(
    State(state): State<DashboardServer>,
    Json(req): Json<UnlockRequest>,
) -> ApiResult<impl IntoResponse> {
    match state.editing_password.as_deref() {
        Some(expected) if expected == req.password => {
            let token = state.sessions.open();
            info!("Editing unlocked");
            Ok((
                [(header::SET_COOKIE, session_cookie(&token))],
                Json(json!({ "unlocked": true })),
            ))
        }
        _ => Err(ScheduleError::incorrect_password().into()),
    }
}

async fn api_lock_status(
    State(state): State<DashboardServer>,
    headers: HeaderMap,
) -> impl IntoResponse {
    Json(json!({ "unlocked": state.is_unlocked(&headers) }))
}

async fn api_lock(State(state): State<DashboardServer>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        state.sessions.close(token);
    }
    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Json(json!({ "unlocked": false })),
    )
}

async fn api_preferences_get(State(state): State<DashboardServer>) -> impl IntoResponse {
    Json(state.prefs.load())
}

async fn api_preferences_put(
    State(state): State<DashboardServer>,
    Json(incoming): Json<Preferences>,
) -> ApiResult<impl IntoResponse> {
    state.prefs.save(&incoming)?;
    Ok(Json(incoming))
}

/// Push refresh signals to the browser.
async fn api_ws(ws: WebSocketUpgrade, State(state): State<DashboardServer>) -> Response {
    let rx = state.board.hub().subscribe();
    ws.on_upgrade(move |socket| forward_signals(socket, rx))
}

async fn forward_signals(mut socket: WebSocket, mut rx: broadcast::Receiver<RefreshSignal>) {
    debug!("Refresh socket connected");
    loop {
        tokio::select! {
            signal = rx.recv() => match signal {
                Ok(signal) => {
                    let text = match serde_json::to_string(&signal) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode refresh signal");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Refresh socket lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("Refresh socket closed");
}

/// Health check endpoint.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the router with all routes.
fn build_router(state: DashboardServer) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/api/board", get(api_board))
        .route("/api/board.json", get(api_board_json))
        .route("/api/tasks", get(api_tasks_list).post(api_task_add))
        .route("/api/tasks/{task_id}", axum::routing::delete(api_task_delete))
        .route("/api/tasks/{task_id}/move", post(api_task_move))
        .route("/api/tasks/{task_id}/description", post(api_task_description))
        .route("/api/projects/{project}", get(api_project_plan))
        .route(
            "/api/projects/{project}/descriptions",
            post(api_project_descriptions),
        )
        .route("/api/search", get(api_search))
        .route("/api/refresh", post(api_refresh))
        .route(
            "/api/unlock",
            get(api_lock_status).post(api_unlock).delete(api_lock),
        )
        .route(
            "/api/preferences",
            get(api_preferences_get).put(api_preferences_put),
        )
        .route("/api/ws", get(api_ws))
        .route("/api/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Status of the board server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardStatus {
    /// Serving requests.
    Running,
    /// Failed to bind, retrying in background.
    Retrying,
    /// Shut down.
    Stopped,
}

/// Handle for managing the server lifecycle.
pub struct DashboardHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    status_rx: watch::Receiver<DashboardStatus>,
}

impl DashboardHandle {
    pub fn status(&self) -> DashboardStatus {
        *self.status_rx.borrow()
    }

    /// Trigger shutdown of the server.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Start the HTTP server on the state's port.
///
/// Returns a oneshot sender that signals shutdown, and the bound address.
pub async fn start_server(
    state: DashboardServer,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr)> {
    let addr = SocketAddr::from(([127, 0, 0, 1], state.port));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Board server listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Board server shutting down");
            })
            .await
        {
            tracing::error!("Board server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr))
}

/// Retry delay with jitter taken from the clock's sub-second nanos.
fn compute_jittered_delay(base_ms: u64, jitter_ms: u64) -> Duration {
    use std::time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let jitter_range = (jitter_ms * 2) as i64;
    let jitter = if jitter_range > 0 {
        (nanos as i64 % jitter_range) - (jitter_ms as i64)
    } else {
        0
    };

    // At least one second.
    let delay_ms = (base_ms as i64 + jitter).max(1000) as u64;
    Duration::from_millis(delay_ms)
}

/// Start the HTTP server, retrying in the background while the port is busy.
///
/// Never fails; backoff is exponential with jitter, capped at
/// `ui.retry_max_ms`.
pub fn start_server_with_retry(state: DashboardServer, ui_config: &UiConfig) -> DashboardHandle {
    let port = state.port;
    let retry_initial_ms = ui_config.retry_initial_ms;
    let retry_jitter_ms = ui_config.retry_jitter_ms;
    let retry_max_ms = ui_config.retry_max_ms;
    let retry_multiplier = ui_config.retry_multiplier;

    let (status_tx, status_rx) = watch::channel(DashboardStatus::Retrying);
    let (handle_shutdown_tx, mut handle_shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let mut current_delay_ms = retry_initial_ms;

        loop {
            match handle_shutdown_rx.try_recv() {
                Ok(()) | Err(oneshot::error::TryRecvError::Closed) => {
                    info!("Board server retry loop shutting down");
                    let _ = status_tx.send(DashboardStatus::Stopped);
                    break;
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
            }

            match start_server(state.clone()).await {
                Ok((server_shutdown_tx, bound_addr)) => {
                    info!("Board available at http://{}", bound_addr);
                    let _ = status_tx.send(DashboardStatus::Running);

                    let _ = handle_shutdown_rx.await;
                    let _ = server_shutdown_tx.send(());
                    let _ = status_tx.send(DashboardStatus::Stopped);
                    break;
                }
                Err(e) => {
                    warn!(
                        "Failed to start board server on port {}: {}. Retrying in {:.1}s...",
                        port,
                        e,
                        current_delay_ms as f64 / 1000.0
                    );
                    let _ = status_tx.send(DashboardStatus::Retrying);

                    let delay = compute_jittered_delay(current_delay_ms, retry_jitter_ms);
                    tokio::time::sleep(delay).await;

                    current_delay_ms =
                        ((current_delay_ms as f64 * retry_multiplier) as u64).min(retry_max_ms);
                }
            }
        }
    });

    DashboardHandle {
        shutdown_tx: Some(handle_shutdown_tx),
        status_rx,
    }
}
