use std::sync::Arc;

use axum::{
    extract::{Path, Query, RawQuery, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use rand::{rngs::StdRng, SeedableRng};
use tracing::info;

use gamblesim_core::{
    AggregateStats, ChartData, JoinLink, Registry, Settlement, SimulationPlan, SimulationReport,
};
use gamblesim_shared::{
    ApiError, BalanceResponse, ChartsQuery, CreateSessionResponse, EndResponse, ErrorBody,
    JoinResponse, LinkResponse, PlayerView, SessionSummary, SessionsResponse, SpinResponse,
    VerifyResponse,
};

use crate::{assets, auth::require_admin, state::AppState};

const DEFAULT_STEP_SECS: f64 = 5.0;
const DEFAULT_BUCKET_SECS: f64 = 30.0;

/// `ApiError` as an HTTP response.
#[derive(Debug)]
pub struct AppError(pub ApiError);

impl<E: Into<ApiError>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiJson<T> = Result<Json<T>, AppError>;

pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/:sid", delete(delete_session))
        .route("/sessions/:sid/select", post(select_session))
        .route("/sessions/:sid/stop", post(stop_session))
        .route("/sessions/:sid/terminate", post(terminate_session))
        .route("/sessions/:sid/players/:pid/stop", post(stop_player))
        .route("/sessions/:sid/stats", get(session_stats))
        .route("/sessions/:sid/charts", get(session_charts))
        .route("/sessions/:sid/link", get(session_link))
        .route("/sessions/:sid/simulate", post(simulate))
        .route("/reset", post(reset))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/verify", get(verify))
        .route("/join", get(join_link))
        .route("/sessions/:sid/players", post(join_session))
        .route("/sessions/:sid/players/:pid", get(player_view))
        .route("/sessions/:sid/players/:pid/spin", post(spin))
        .route("/sessions/:sid/players/:pid/top-up", post(top_up))
        .route("/sessions/:sid/players/:pid/want-to-buy", post(want_to_buy))
        .route("/sessions/:sid/players/:pid/end", post(end_player))
        .nest("/admin", admin)
        .fallback(assets::serve)
        .with_state(state)
}

fn view(registry: &Registry, sid: &str, pid: &str) -> Result<PlayerView, AppError> {
    let player = registry.player(sid, pid)?;
    Ok(PlayerView::new(sid, player, registry.config()))
}

fn sessions_response(registry: &Registry) -> SessionsResponse {
    let current = registry.current_session_id();
    SessionsResponse {
        current_session_id: current.to_string(),
        sessions: registry
            .sessions_newest_first()
            .into_iter()
            .map(|s| SessionSummary::new(s, current))
            .collect(),
    }
}

// ── Player endpoints ───────────────────────────────────────────

async fn verify(State(state): State<Arc<AppState>>) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        server_seed_hash: state.server_seed_hash.clone(),
    })
}

/// Open a join link: resume the named player, or join the session as a new one.
async fn join_link(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> ApiJson<JoinResponse> {
    let link = JoinLink::parse(query.as_deref().unwrap_or_default())?;
    let mut registry = state.registry().await;
    if let Some(pid) = &link.player_id {
        let player = view(&registry, &link.session_id, pid)?;
        return Ok(Json(JoinResponse {
            created: false,
            player,
        }));
    }
    let pid = registry.add_player(&link.session_id)?;
    state.persist(&registry).await;
    Ok(Json(JoinResponse {
        created: true,
        player: view(&registry, &link.session_id, &pid)?,
    }))
}

async fn join_session(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiJson<JoinResponse> {
    let mut registry = state.registry().await;
    let pid = registry.add_player(&sid)?;
    state.persist(&registry).await;
    Ok(Json(JoinResponse {
        created: true,
        player: view(&registry, &sid, &pid)?,
    }))
}

async fn player_view(
    State(state): State<Arc<AppState>>,
    Path((sid, pid)): Path<(String, String)>,
) -> ApiJson<PlayerView> {
    let registry = state.registry().await;
    Ok(Json(view(&registry, &sid, &pid)?))
}

async fn spin(
    State(state): State<Arc<AppState>>,
    Path((sid, pid)): Path<(String, String)>,
) -> ApiJson<SpinResponse> {
    let mut registry = state.registry().await;
    let settlement = registry.spin_seeded(&sid, &pid, &state.server_seed)?;
    state.persist(&registry).await;
    let response = match settlement {
        Settlement::Settled(entry) => SpinResponse::settled(&entry, state.server_seed_hash.clone()),
        Settlement::InsufficientBalance { balance, spin_cost } => {
            SpinResponse::InsufficientBalance { balance, spin_cost }
        }
    };
    Ok(Json(response))
}

async fn top_up(
    State(state): State<Arc<AppState>>,
    Path((sid, pid)): Path<(String, String)>,
) -> ApiJson<BalanceResponse> {
    let mut registry = state.registry().await;
    let balance = registry.top_up(&sid, &pid)?;
    state.persist(&registry).await;
    Ok(Json(BalanceResponse { balance }))
}

async fn want_to_buy(
    State(state): State<Arc<AppState>>,
    Path((sid, pid)): Path<(String, String)>,
) -> ApiJson<PlayerView> {
    let mut registry = state.registry().await;
    registry.record_want_to_buy(&sid, &pid)?;
    state.persist(&registry).await;
    Ok(Json(view(&registry, &sid, &pid)?))
}

async fn end_player(
    State(state): State<Arc<AppState>>,
    Path((sid, pid)): Path<(String, String)>,
) -> ApiJson<EndResponse> {
    let mut registry = state.registry().await;
    let ended = registry.end_player(&sid, &pid)?;
    if ended {
        state.persist(&registry).await;
    }
    Ok(Json(EndResponse { ended }))
}

// ── Admin endpoints ────────────────────────────────────────────

async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    let registry = state.registry().await;
    Json(sessions_response(&registry))
}

async fn create_session(State(state): State<Arc<AppState>>) -> Json<CreateSessionResponse> {
    let mut registry = state.registry().await;
    let session_id = registry.create_session();
    state.persist(&registry).await;
    Json(CreateSessionResponse { session_id })
}

async fn select_session(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiJson<SessionsResponse> {
    let mut registry = state.registry().await;
    registry.switch_session(&sid)?;
    state.persist(&registry).await;
    Ok(Json(sessions_response(&registry)))
}

async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiJson<SessionsResponse> {
    let mut registry = state.registry().await;
    registry.stop_session(&sid)?;
    state.persist(&registry).await;
    Ok(Json(sessions_response(&registry)))
}

async fn terminate_session(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiJson<SessionsResponse> {
    let mut registry = state.registry().await;
    registry.terminate_session(&sid)?;
    state.persist(&registry).await;
    Ok(Json(sessions_response(&registry)))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiJson<SessionsResponse> {
    let mut registry = state.registry().await;
    registry.delete_session(&sid)?;
    state.persist(&registry).await;
    Ok(Json(sessions_response(&registry)))
}

async fn stop_player(
    State(state): State<Arc<AppState>>,
    Path((sid, pid)): Path<(String, String)>,
) -> ApiJson<EndResponse> {
    let mut registry = state.registry().await;
    let ended = registry.stop_player(&sid, &pid)?;
    if ended {
        state.persist(&registry).await;
    }
    Ok(Json(EndResponse { ended }))
}

async fn session_stats(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiJson<AggregateStats> {
    let registry = state.registry().await;
    Ok(Json(registry.stats(&sid)?))
}

async fn session_charts(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    Query(query): Query<ChartsQuery>,
) -> ApiJson<ChartData> {
    let step = query.step_secs.unwrap_or(DEFAULT_STEP_SECS);
    let bucket = query.bucket_secs.unwrap_or(DEFAULT_BUCKET_SECS);
    if ![step, bucket].iter().all(|w| w.is_finite() && *w > 0.0) {
        return Err(ApiError::Invalid(
            "step_secs and bucket_secs must be positive and finite".into(),
        )
        .into());
    }
    let registry = state.registry().await;
    Ok(Json(registry.charts(&sid, step, bucket)?))
}

async fn session_link(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiJson<LinkResponse> {
    let registry = state.registry().await;
    registry.session(&sid)?;
    let url = JoinLink::session(sid).to_url(&state.public_url);
    Ok(Json(LinkResponse {
        url: url.to_string(),
    }))
}

async fn simulate(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    Json(plan): Json<SimulationPlan>,
) -> ApiJson<SimulationReport> {
    let mut rng = StdRng::from_entropy();
    let mut registry = state.registry().await;
    let report = registry.simulate(&sid, &plan, &mut rng)?;
    state.persist(&registry).await;
    Ok(Json(report))
}

async fn reset(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    let mut registry = state.registry().await;
    registry.reset();
    state.persist(&registry).await;
    info!("registry reset through admin api");
    Json(sessions_response(&registry))
}
