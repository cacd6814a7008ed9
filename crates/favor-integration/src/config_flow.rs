//! Two-step setup flow: credentials, then the student to track
//!
//! Each flow keeps the response it validated the credentials with, and the
//! student step offers exactly the students listed in that response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use favor_client::{FriendApi, FriendRefresh, RefreshRequest, DEFAULT_URL};
use favor_config_entries::{ConfigEntries, ConfigEntry, FavorEntryData};
use favor_core::{StudentDirectory, DOMAIN};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const STEP_USER: &str = "user";
pub const STEP_SELECT: &str = "select";

pub const ERROR_AUTH: &str = "auth";
pub const ERROR_NO_STUDENT: &str = "no_student";
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Unknown flow: {0}")]
    UnknownFlow(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Flow {0} is already handling a submission")]
    InProgress(String),
}

pub type FlowStepResult<T> = Result<T, FlowError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowResultType {
    Form,
    CreateEntry,
    Abort,
}

/// Form field schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Choices of a select field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl FormField {
    fn string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: "string".to_string(),
            required: Some(true),
            default: None,
            options: None,
        }
    }

    fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn select(name: &str, options: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            field_type: "select".to_string(),
            required: Some(true),
            default: None,
            options: Some(options),
        }
    }
}

/// Outcome of one flow step
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    pub flow_id: String,
    pub handler: String,
    #[serde(rename = "type")]
    pub result_type: FlowResultType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Always present, empty unless the result is a form
    pub data_schema: Vec<FormField>,
    /// Errors from the previous submission, null if none
    pub errors: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The entry to create, for create_entry results
    #[serde(skip)]
    pub entry: Option<ConfigEntry>,
}

impl FlowResult {
    fn form(
        flow_id: &str,
        step_id: &str,
        data_schema: Vec<FormField>,
        error: Option<&str>,
    ) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            handler: DOMAIN.to_string(),
            result_type: FlowResultType::Form,
            step_id: Some(step_id.to_string()),
            data_schema,
            errors: error.map(|e| HashMap::from([("base".to_string(), e.to_string())])),
            title: None,
            reason: None,
            result: None,
            entry: None,
        }
    }

    fn abort(flow_id: &str, reason: &str) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            handler: DOMAIN.to_string(),
            result_type: FlowResultType::Abort,
            step_id: None,
            data_schema: Vec::new(),
            errors: None,
            title: None,
            reason: Some(reason.to_string()),
            result: None,
            entry: None,
        }
    }

    fn create_entry(flow_id: &str, entry: ConfigEntry) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            handler: DOMAIN.to_string(),
            result_type: FlowResultType::CreateEntry,
            step_id: None,
            data_schema: Vec::new(),
            errors: None,
            title: Some(entry.title.clone()),
            reason: None,
            result: Some(json!({
                "entry_id": entry.entry_id,
                "title": entry.title,
                "unique_id": entry.unique_id,
            })),
            entry: Some(entry),
        }
    }
}

/// Summary of an in-progress flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowInfo {
    pub flow_id: String,
    pub handler: String,
    pub step_id: String,
}

#[derive(Debug, Clone)]
enum FlowState {
    User,
    Select {
        request: RefreshRequest,
        response: FriendRefresh,
    },
}

impl FlowState {
    fn step_id(&self) -> &'static str {
        match self {
            Self::User => STEP_USER,
            Self::Select { .. } => STEP_SELECT,
        }
    }
}

/// A flow stays listed while a submission is being handled
struct Flow {
    state: FlowState,
    busy: bool,
}

impl Flow {
    fn new(state: FlowState) -> Self {
        Self { state, busy: false }
    }
}

pub struct FlowManager {
    api: Arc<dyn FriendApi>,
    entries: Arc<ConfigEntries>,
    students: Arc<StudentDirectory>,
    request_timeout: Duration,
    flows: DashMap<String, Flow>,
}

impl FlowManager {
    pub fn new(
        api: Arc<dyn FriendApi>,
        entries: Arc<ConfigEntries>,
        students: Arc<StudentDirectory>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            api,
            entries,
            students,
            request_timeout,
            flows: DashMap::new(),
        }
    }

    /// Open a new flow at the credentials form
    pub fn start_flow(&self) -> FlowResult {
        let flow_id = ulid::Ulid::new().to_string();
        self.flows.insert(flow_id.clone(), Flow::new(FlowState::User));
        debug!(%flow_id, "Started config flow");
        FlowResult::form(&flow_id, STEP_USER, user_schema(), None)
    }

    /// Submit the current step
    ///
    /// Without input the current form is shown again. Finished and aborted
    /// flows are forgotten; a flow aborted while its submission is handled
    /// stays aborted.
    pub async fn progress_flow(
        &self,
        flow_id: &str,
        input: Option<Value>,
    ) -> FlowStepResult<FlowResult> {
        let unknown = || FlowError::UnknownFlow(flow_id.to_string());

        let Some(input) = input else {
            let flow = self.flows.get(flow_id).ok_or_else(unknown)?;
            return Ok(self.show_form(flow_id, &flow.state, None));
        };

        let state = {
            let mut flow = self.flows.get_mut(flow_id).ok_or_else(unknown)?;
            if flow.busy {
                return Err(FlowError::InProgress(flow_id.to_string()));
            }
            flow.busy = true;
            flow.state.clone()
        };

        let outcome = match &state {
            FlowState::User => self.step_user(flow_id, &input).await,
            FlowState::Select { request, response } => {
                self.step_select(flow_id, request, response, &input)
            }
        };

        let Some(mut flow) = self.flows.get_mut(flow_id) else {
            debug!(flow_id, "Flow aborted during submission");
            return Err(unknown());
        };
        flow.busy = false;

        match outcome {
            Ok((result, Some(next))) => {
                flow.state = next;
                Ok(result)
            }
            Ok((result, None)) => {
                drop(flow);
                self.flows.remove(flow_id);
                Ok(result)
            }
            Err(e) => Err(e),
        }
    }

    pub fn abort_flow(&self, flow_id: &str) -> FlowStepResult<()> {
        self.flows
            .remove(flow_id)
            .map(|_| debug!(flow_id, "Aborted config flow"))
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))
    }

    pub fn list_flows(&self) -> Vec<FlowInfo> {
        let mut flows: Vec<FlowInfo> = self
            .flows
            .iter()
            .map(|f| FlowInfo {
                flow_id: f.key().clone(),
                handler: DOMAIN.to_string(),
                step_id: f.value().state.step_id().to_string(),
            })
            .collect();
        flows.sort_by(|a, b| a.flow_id.cmp(&b.flow_id));
        flows
    }

    fn show_form(&self, flow_id: &str, state: &FlowState, error: Option<&str>) -> FlowResult {
        match state {
            FlowState::User => FlowResult::form(flow_id, STEP_USER, user_schema(), error),
            FlowState::Select { response, .. } => {
                FlowResult::form(flow_id, STEP_SELECT, self.select_schema(response), error)
            }
        }
    }

    fn select_schema(&self, response: &FriendRefresh) -> Vec<FormField> {
        let options = response
            .assist_ids()
            .into_iter()
            .map(|id| self.students.display_name(id))
            .collect();
        vec![FormField::select("stuid", options)]
    }

    async fn step_user(
        &self,
        flow_id: &str,
        input: &Value,
    ) -> FlowStepResult<(FlowResult, Option<FlowState>)> {
        let url = optional_field(input, "url").unwrap_or_else(|| DEFAULT_URL.to_string());
        let request = RefreshRequest {
            url,
            access_token: required_field(input, "access_token")?,
            usercode: required_field(input, "usercode")?,
        };

        let checked = tokio::time::timeout(self.request_timeout, self.api.refresh(&request))
            .await
            .map_err(|_| favor_client::ApiError::Timeout)
            .and_then(|r| r)
            .and_then(|response| response.ensure_usable().map(|_| response));

        match checked {
            Ok(response) => {
                debug!(flow_id, usercode = %request.usercode, "Credentials accepted");
                let next = FlowState::Select { request, response };
                Ok((self.show_form(flow_id, &next, None), Some(next)))
            }
            Err(e) => {
                warn!(flow_id, error = %e, "Credentials rejected");
                Ok((
                    FlowResult::form(flow_id, STEP_USER, user_schema(), Some(ERROR_AUTH)),
                    Some(FlowState::User),
                ))
            }
        }
    }

    fn step_select(
        &self,
        flow_id: &str,
        request: &RefreshRequest,
        response: &FriendRefresh,
        input: &Value,
    ) -> FlowStepResult<(FlowResult, Option<FlowState>)> {
        let again = || FlowState::Select {
            request: request.clone(),
            response: response.clone(),
        };

        let stuid = optional_field(input, "stuid")
            .map(|source| self.students.resolve_id(&source))
            .unwrap_or(0);
        if stuid == 0 || response.assist(stuid).is_err() {
            let state = again();
            return Ok((self.show_form(flow_id, &state, Some(ERROR_NO_STUDENT)), Some(state)));
        }

        let data = FavorEntryData {
            url: request.url.clone(),
            access_token: request.access_token.clone(),
            usercode: request.usercode.clone(),
            stuid,
        };
        if self.entries.get_by_unique_id(&data.unique_id()).is_some() {
            info!(flow_id, unique_id = %data.unique_id(), "Student already configured");
            return Ok((FlowResult::abort(flow_id, ABORT_ALREADY_CONFIGURED), None));
        }

        let title = format!("{}_{}", request.usercode, self.students.display_name(stuid));
        Ok((FlowResult::create_entry(flow_id, ConfigEntry::new(title, data)), None))
    }
}

fn user_schema() -> Vec<FormField> {
    vec![
        FormField::string("url").with_default(DEFAULT_URL),
        FormField::string("access_token"),
        FormField::string("usercode"),
    ]
}

/// A non-empty string field; numbers are accepted as their text
fn optional_field(input: &Value, name: &str) -> Option<String> {
    let text = match input.get(name)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn required_field(input: &Value, name: &str) -> FlowStepResult<String> {
    optional_field(input, name)
        .ok_or_else(|| FlowError::InvalidInput(format!("missing field {name}")))
}
