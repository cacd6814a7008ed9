//! Config entry and config flow endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use favor_config_entries::{ConfigEntry, ConfigEntrySource, ConfigEntryState};
use favor_core::StudentId;
use favor_integration::{FlowError, FlowInfo, FlowResult, FlowResultType, SetupError};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{error, ApiError, AppState};

/// A config entry without its access token
#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub entry_id: String,
    pub title: String,
    pub unique_id: String,
    pub source: ConfigEntrySource,
    pub state: ConfigEntryState,
    pub reason: Option<String>,
    pub url: String,
    pub usercode: String,
    pub stuid: StudentId,
    pub cumulative_exp: Option<u64>,
}

fn entry_response(state: &AppState, entry: ConfigEntry) -> EntryResponse {
    let cumulative_exp = state
        .integration
        .coordinator(&entry.entry_id)
        .and_then(|c| c.data());
    EntryResponse {
        entry_id: entry.entry_id,
        title: entry.title,
        unique_id: entry.unique_id,
        source: entry.source,
        state: entry.state,
        reason: entry.reason,
        url: entry.data.url,
        usercode: entry.data.usercode,
        stuid: entry.data.stuid,
        cumulative_exp,
    }
}

fn flow_error(e: FlowError) -> ApiError {
    match e {
        FlowError::UnknownFlow(_) => error(StatusCode::NOT_FOUND, e.to_string()),
        FlowError::InvalidInput(_) => error(StatusCode::BAD_REQUEST, e.to_string()),
        FlowError::InProgress(_) => error(StatusCode::CONFLICT, e.to_string()),
    }
}

/// GET /api/config/config_entries/entry
pub(crate) async fn list_entries(State(state): State<AppState>) -> Json<Vec<EntryResponse>> {
    let entries = state.integration.entries().entries();
    Json(
        entries
            .into_iter()
            .map(|entry| entry_response(&state, entry))
            .collect(),
    )
}

/// DELETE /api/config/config_entries/entry/{entry_id}
pub(crate) async fn delete_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.integration.remove_entry(&entry_id).await {
        Ok(entry) => {
            info!(entry_id, "Config entry {} deleted via HTTP", entry.title);
            Ok(Json(json!({"require_restart": false})))
        }
        Err(SetupError::NotFound(_)) => Err(error(
            StatusCode::NOT_FOUND,
            format!("Invalid entry specified: {}", entry_id),
        )),
        Err(e) => {
            warn!(entry_id, error = %e, "Failed to delete config entry");
            Err(error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// POST /api/config/config_entries/flow
pub(crate) async fn start_flow(State(state): State<AppState>) -> Json<FlowResult> {
    Json(state.flows.start_flow())
}

/// GET /api/config/config_entries/flow
pub(crate) async fn list_flows(State(state): State<AppState>) -> Json<Vec<FlowInfo>> {
    Json(state.flows.list_flows())
}

/// GET /api/config/config_entries/flow/{flow_id} - show the current step
pub(crate) async fn get_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
) -> Result<Json<FlowResult>, ApiError> {
    state
        .flows
        .progress_flow(&flow_id, None)
        .await
        .map(Json)
        .map_err(flow_error)
}

/// POST /api/config/config_entries/flow/{flow_id} - submit the current step
///
/// A finished flow's entry is saved and set up before the response is sent.
pub(crate) async fn progress_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Json<FlowResult>, ApiError> {
    let input = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    let mut result = state
        .flows
        .progress_flow(&flow_id, Some(input))
        .await
        .map_err(flow_error)?;

    if result.result_type == FlowResultType::CreateEntry {
        if let Some(entry) = result.entry.take() {
            state.integration.add_entry(entry).await.map_err(|e| {
                warn!(flow_id, error = %e, "Failed to save entry from flow");
                error(StatusCode::CONFLICT, e.to_string())
            })?;
        }
    }

    Ok(Json(result))
}

/// DELETE /api/config/config_entries/flow/{flow_id}
pub(crate) async fn abort_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.flows.abort_flow(&flow_id).map_err(flow_error)?;
    Ok(Json(json!({"message": "Flow aborted"})))
}
