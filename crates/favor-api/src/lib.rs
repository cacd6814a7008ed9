//! bafavorank REST API
//!
//! Read access to the sensor states, a live event stream, management of
//! config entries and the HTTP side of the config flow.

mod config_entries;
mod stream;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use favor_core::Context;
use favor_event_bus::EventBus;
use favor_integration::{FavorIntegration, FlowManager};
use favor_rank::{FavorProgress, RankTable};
use favor_state_store::StateStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub state_store: Arc<StateStore>,
    pub event_bus: Arc<EventBus>,
    pub integration: Arc<FavorIntegration>,
    pub flows: Arc<FlowManager>,
}

impl AppState {
    pub fn table(&self) -> &RankTable {
        &self.integration.settings().table
    }

    pub fn max_exp(&self) -> u64 {
        self.integration.settings().max_exp
    }
}

#[derive(Serialize)]
struct ApiStatus {
    message: &'static str,
}

/// State response for a single entity
#[derive(Serialize)]
pub struct StateResponse {
    pub entity_id: String,
    pub state: String,
    pub attributes: HashMap<String, serde_json::Value>,
    pub last_changed: String,
    pub last_updated: String,
    pub context: Context,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/", get(api_status))
        .route("/api/health", get(health_check))
        .route("/api/states", get(get_states))
        .route("/api/states/:entity_id", get(get_state))
        .route("/api/stream", get(stream::stream_events))
        .route("/api/rank/:cumulative", get(get_rank))
        .route(
            "/api/config/config_entries/entry",
            get(config_entries::list_entries),
        )
        .route(
            "/api/config/config_entries/entry/:entry_id",
            delete(config_entries::delete_entry),
        )
        .route(
            "/api/config/config_entries/flow",
            post(config_entries::start_flow).get(config_entries::list_flows),
        )
        .route(
            "/api/config/config_entries/flow/:flow_id",
            get(config_entries::get_flow)
                .post(config_entries::progress_flow)
                .delete(config_entries::abort_flow),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(state: AppState, addr: &str) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router).await
}

// ==================== Handlers ====================

/// GET /api/
async fn api_status() -> Json<ApiStatus> {
    Json(ApiStatus {
        message: "API running.",
    })
}

/// GET /api/health
async fn health_check() -> &'static str {
    "OK"
}

/// GET /api/states - all sensor states
async fn get_states(State(state): State<AppState>) -> Json<Vec<StateResponse>> {
    Json(state.state_store.all().iter().map(state_to_response).collect())
}

fn state_to_response(s: &favor_core::State) -> StateResponse {
    StateResponse {
        entity_id: s.entity_id.to_string(),
        state: s.state.clone(),
        attributes: s.attributes.clone(),
        last_changed: s.last_changed.to_rfc3339(),
        last_updated: s.last_updated.to_rfc3339(),
        context: s.context.clone(),
    }
}

/// GET /api/states/{entity_id}
async fn get_state(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<StateResponse>, ApiError> {
    state
        .state_store
        .get(&entity_id)
        .map(|s| Json(state_to_response(&s)))
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("Entity not found: {}", entity_id)))
}

/// GET /api/rank/{cumulative} - what the sensors would show for a total
async fn get_rank(
    State(state): State<AppState>,
    Path(cumulative): Path<String>,
) -> Result<Json<FavorProgress>, ApiError> {
    let cumulative: u64 = cumulative.parse().map_err(|_| {
        error(
            StatusCode::BAD_REQUEST,
            format!("Invalid cumulative exp: {}", cumulative),
        )
    })?;
    Ok(Json(FavorProgress::compute(
        state.table(),
        cumulative,
        state.max_exp(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use favor_client::{success_response, StaticFriendApi};
    use favor_config_entries::{ConfigEntries, ExpCache, Storage};
    use favor_integration::IntegrationSettings;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    pub(crate) struct TestApp {
        _dir: TempDir,
        pub state: AppState,
    }

    pub(crate) async fn create_test_app() -> TestApp {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(StaticFriendApi::new(success_response(&[
            (10000, 15, 46),
            (10005, 2, 1),
        ])));
        let storage = Arc::new(Storage::new(dir.path()));
        let entries = Arc::new(ConfigEntries::new(Arc::clone(&storage)));
        let exp_cache = Arc::new(ExpCache::load(storage).await.unwrap());
        let event_bus = Arc::new(EventBus::new());
        let state_store = Arc::new(StateStore::new(Arc::clone(&event_bus)));
        let settings = IntegrationSettings::default();

        let flows = Arc::new(FlowManager::new(
            api.clone(),
            Arc::clone(&entries),
            Arc::clone(&settings.students),
            Duration::from_secs(10),
        ));
        let integration = Arc::new(FavorIntegration::new(
            api,
            entries,
            exp_cache,
            Arc::clone(&state_store),
            Arc::clone(&event_bus),
            settings,
        ));

        TestApp {
            _dir: dir,
            state: AppState {
                state_store,
                event_bus,
                integration,
                flows,
            },
        }
    }

    pub(crate) async fn send(
        app: &TestApp,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = create_router(app.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test]
    async fn test_api_status_and_health() {
        let app = create_test_app().await;

        let (status, body) = send(&app, Method::GET, "/api/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "API running.");

        let (status, body) = send(&app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("OK"));
    }

    #[tokio::test]
    async fn test_get_state_not_found() {
        let app = create_test_app().await;
        let (status, body) = send(&app, Method::GET, "/api/states/sensor.nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].as_str().unwrap().contains("sensor.nope"));
    }

    #[tokio::test]
    async fn test_rank_endpoint() {
        let app = create_test_app().await;

        let (status, body) = send(&app, Method::GET, "/api/rank/1000", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rank"], 15);
        assert_eq!(body["exp_into_rank"], 46);
        assert_eq!(body["remaining_to_next"], 132);
        assert_eq!(body["percent_of_max"], 0.4163);

        let (status, _) = send(&app, Method::GET, "/api/rank/-4", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_states_after_flow() {
        let app = create_test_app().await;

        let (_, start) = send(&app, Method::POST, "/api/config/config_entries/flow", None).await;
        let uri = format!(
            "/api/config/config_entries/flow/{}",
            start["flow_id"].as_str().unwrap()
        );
        send(
            &app,
            Method::POST,
            &uri,
            Some(json!({"access_token": "tok", "usercode": "ABC"})),
        )
        .await;
        let (_, done) = send(&app, Method::POST, &uri, Some(json!({"stuid": "Hoshino"}))).await;
        assert_eq!(done["type"], "create_entry");

        let (status, states) = send(&app, Method::GET, "/api/states", None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = states
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["entity_id"].as_str().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![
                "sensor.abc_10005_exp",
                "sensor.abc_10005_hundred_percent",
                "sensor.abc_10005_level_exp",
                "sensor.abc_10005_level_remain_exp",
                "sensor.abc_10005_rank",
            ]
        );

        let (_, rank) = send(&app, Method::GET, "/api/states/sensor.abc_10005_rank", None).await;
        assert_eq!(rank["state"], "2");
        assert_eq!(rank["attributes"]["friendly_name"], "Hoshino Favor Rank");

        app.state.integration.shutdown().await;
    }
}
