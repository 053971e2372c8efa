use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use posflow_engine::{ConfigMap, ManageError, Manager, PluginView};
use posflow_events::wire;
use posflow_transport::{ChannelPublisher, TransportError};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub manager: Manager,
    pub publisher: ChannelPublisher,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/plugins", get(list_plugins))
        .route("/api/plugins/{name}/status", patch(update_status))
        .route("/api/plugins/{name}/config", patch(update_config))
        .route("/api/events", post(ingest_event))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ManageError> for ApiError {
    fn from(err: ManageError) -> Self {
        match err {
            ManageError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ManageError::Configuration { .. } => ApiError::Unprocessable(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    is_active: bool,
}

#[derive(Deserialize)]
pub struct ConfigRequest {
    config: ConfigMap,
}

async fn list_plugins(State(state): State<AppState>) -> Json<Vec<PluginView>> {
    Json(state.manager.list())
}

async fn update_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<PluginView>, ApiError> {
    let Json(req) = body?;
    state.manager.set_active(&name, req.is_active)?;
    Ok(Json(state.manager.view(&name)?))
}

async fn update_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<ConfigRequest>, JsonRejection>,
) -> Result<Json<PluginView>, ApiError> {
    let Json(req) = body?;
    if let Err(e) = state.manager.configure(&name, req.config) {
        warn!(plugin = name.as_str(), error = %e, "Plugin configuration rejected");
        return Err(e.into());
    }
    Ok(Json(state.manager.view(&name)?))
}

/// Accept one wire-format event and queue it for the consumer.
async fn ingest_event(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, ApiError> {
    let event = wire::decode(&body).map_err(|e| ApiError::BadRequest(format!("Invalid event: {e}")))?;

    // Re-encode so an id filled in on decode is the one the consumer sees.
    let payload = wire::encode(&event).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    match state.publisher.publish(payload).await {
        Ok(()) => {
            info!(event_id = event.id(), kind = %event.kind(), "Event queued");
            Ok((StatusCode::ACCEPTED, Json(json!({ "id": event.id() }))))
        }
        Err(TransportError::Closed) => Err(ApiError::Unavailable("Event broker is closed".into())),
        Err(e) => Err(ApiError::Unavailable(e.to_string())),
    }
}

async fn health() -> &'static str {
    "ok"
}
