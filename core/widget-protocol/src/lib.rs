//! Request/response protocol for driving a widget engine from another process.
//!
//! This crate is shared by the `widget-hook` host and its clients to prevent
//! schema drift. The host remains the authority on validation, but clients can
//! reuse the same types to construct valid requests.
//!
//! One request per line, one response per line, both JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB

/// Stable error codes carried in [`ErrorInfo::code`].
pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_PARAMS: &str = "invalid_params";
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const INVALID_RECORD: &str = "invalid_record";
    pub const STORAGE_ERROR: &str = "storage_error";
    pub const PROTOCOL_MISMATCH: &str = "protocol_mismatch";
    pub const INVALID_JSON: &str = "invalid_json";
    pub const REQUEST_TOO_LARGE: &str = "request_too_large";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    SaveHabitData,
    GetWidgetMapping,
    SetWidgetMapping,
    ConfigureSurface,
    RemoveMapping,
    ClearMappingsFor,
    ToggleCompletion,
    GetPendingActions,
    ClearPendingActions,
    DrainPendingActions,
    SyncValidIds,
    DeleteHabit,
    RenderData,
    OnUserComplete,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: None,
            params,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Validates the envelope and params, producing a typed command.
    pub fn into_command(self) -> Result<Command, ErrorInfo> {
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(ErrorInfo::new(
                codes::PROTOCOL_MISMATCH,
                format!(
                    "unsupported protocol version {} (expected {})",
                    self.protocol_version, PROTOCOL_VERSION
                ),
            ));
        }
        parse_command(self.method, self.params)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Params
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HabitParams {
    pub habit_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SurfaceParams {
    pub surface_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MappingParams {
    pub surface_id: String,
    pub habit_id: String,
}

/// `habit` is the app's habit document, either inline or as a JSON string.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SaveHabitParams {
    pub habit_id: String,
    pub habit: Value,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigureParams {
    pub surface_id: String,
    pub habit: Value,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncParams {
    pub valid_ids: Vec<String>,
}

/// A validated request, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetHealth,
    SaveHabitData { habit_id: String, json: String },
    GetWidgetMapping,
    SetWidgetMapping { surface_id: String, habit_id: String },
    ConfigureSurface { surface_id: String, json: String },
    RemoveMapping { surface_id: String },
    ClearMappingsFor { habit_id: String },
    ToggleCompletion { habit_id: String },
    GetPendingActions,
    ClearPendingActions,
    DrainPendingActions,
    SyncValidIds { valid_ids: Vec<String> },
    DeleteHabit { habit_id: String },
    RenderData { surface_id: String },
    OnUserComplete { surface_id: String },
}

pub fn parse_command(method: Method, params: Option<Value>) -> Result<Command, ErrorInfo> {
    let command = match method {
        Method::GetHealth => Command::GetHealth,
        Method::GetWidgetMapping => Command::GetWidgetMapping,
        Method::GetPendingActions => Command::GetPendingActions,
        Method::ClearPendingActions => Command::ClearPendingActions,
        Method::DrainPendingActions => Command::DrainPendingActions,
        Method::SaveHabitData => {
            let p: SaveHabitParams = parse_params(method, params)?;
            require_id(&p.habit_id, "habit_id")?;
            Command::SaveHabitData {
                habit_id: p.habit_id,
                json: habit_document(p.habit)?,
            }
        }
        Method::SetWidgetMapping => {
            let p: MappingParams = parse_params(method, params)?;
            require_id(&p.surface_id, "surface_id")?;
            require_id(&p.habit_id, "habit_id")?;
            Command::SetWidgetMapping {
                surface_id: p.surface_id,
                habit_id: p.habit_id,
            }
        }
        Method::ConfigureSurface => {
            let p: ConfigureParams = parse_params(method, params)?;
            require_id(&p.surface_id, "surface_id")?;
            Command::ConfigureSurface {
                surface_id: p.surface_id,
                json: habit_document(p.habit)?,
            }
        }
        Method::RemoveMapping => Command::RemoveMapping {
            surface_id: surface_param(method, params)?,
        },
        Method::RenderData => Command::RenderData {
            surface_id: surface_param(method, params)?,
        },
        Method::OnUserComplete => Command::OnUserComplete {
            surface_id: surface_param(method, params)?,
        },
        Method::ClearMappingsFor => Command::ClearMappingsFor {
            habit_id: habit_param(method, params)?,
        },
        Method::ToggleCompletion => Command::ToggleCompletion {
            habit_id: habit_param(method, params)?,
        },
        Method::DeleteHabit => Command::DeleteHabit {
            habit_id: habit_param(method, params)?,
        },
        Method::SyncValidIds => {
            let p: SyncParams = parse_params(method, params)?;
            for id in &p.valid_ids {
                require_id(id, "valid_ids")?;
            }
            Command::SyncValidIds {
                valid_ids: p.valid_ids,
            }
        }
    };
    Ok(command)
}

fn parse_params<T: DeserializeOwned>(method: Method, params: Option<Value>) -> Result<T, ErrorInfo> {
    let params = params.ok_or_else(|| {
        ErrorInfo::new(
            codes::INVALID_PARAMS,
            format!("{} requires params", method_name(method)),
        )
    })?;
    serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            codes::INVALID_PARAMS,
            format!("{} params are invalid: {}", method_name(method), err),
        )
    })
}

fn habit_param(method: Method, params: Option<Value>) -> Result<String, ErrorInfo> {
    let p: HabitParams = parse_params(method, params)?;
    require_id(&p.habit_id, "habit_id")?;
    Ok(p.habit_id)
}

fn surface_param(method: Method, params: Option<Value>) -> Result<String, ErrorInfo> {
    let p: SurfaceParams = parse_params(method, params)?;
    require_id(&p.surface_id, "surface_id")?;
    Ok(p.surface_id)
}

fn habit_document(habit: Value) -> Result<String, ErrorInfo> {
    match habit {
        Value::String(doc) => Ok(doc),
        Value::Object(_) => Ok(habit.to_string()),
        _ => Err(ErrorInfo::new(
            codes::INVALID_PARAMS,
            "habit must be an object or a JSON string",
        )),
    }
}

fn require_id(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            codes::INVALID_PARAMS,
            format!("{} must not be empty", field),
        ));
    }
    Ok(())
}

pub fn method_name(method: Method) -> String {
    serde_json::to_value(method)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(line: &str) -> Request {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn parses_toggle_request() {
        let req = request(
            r#"{"protocol_version":1,"method":"toggle_completion","id":"r1","params":{"habit_id":"h1"}}"#,
        );
        assert_eq!(req.id.as_deref(), Some("r1"));
        assert_eq!(
            req.into_command().unwrap(),
            Command::ToggleCompletion {
                habit_id: "h1".to_string()
            }
        );
    }

    #[test]
    fn rejects_wrong_protocol_version() {
        let req = request(r#"{"protocol_version":2,"method":"get_health"}"#);
        assert_eq!(req.into_command().unwrap_err().code, codes::PROTOCOL_MISMATCH);
    }

    #[test]
    fn rejects_unknown_method() {
        assert!(serde_json::from_str::<Request>(r#"{"protocol_version":1,"method":"undo"}"#).is_err());
    }

    #[test]
    fn rejects_empty_ids() {
        let err = parse_command(Method::RenderData, Some(json!({"surface_id": "  "}))).unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);

        let err = parse_command(
            Method::SyncValidIds,
            Some(json!({"valid_ids": ["a", ""]})),
        )
        .unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
    }

    #[test]
    fn rejects_missing_params() {
        let err = parse_command(Method::DeleteHabit, None).unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
        assert!(err.message.contains("delete_habit"));
    }

    #[test]
    fn rejects_unknown_param_fields() {
        let err = parse_command(
            Method::ToggleCompletion,
            Some(json!({"habit_id": "h1", "surface_id": "2"})),
        )
        .unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
    }

    #[test]
    fn habit_document_accepts_object_or_string() {
        let inline = parse_command(
            Method::SaveHabitData,
            Some(json!({"habit_id": "h1", "habit": {"name": "Read"}})),
        )
        .unwrap();
        assert_eq!(
            inline,
            Command::SaveHabitData {
                habit_id: "h1".to_string(),
                json: r#"{"name":"Read"}"#.to_string()
            }
        );

        let encoded = parse_command(
            Method::ConfigureSurface,
            Some(json!({"surface_id": "4", "habit": "{\"id\":\"h1\"}"})),
        )
        .unwrap();
        assert_eq!(
            encoded,
            Command::ConfigureSurface {
                surface_id: "4".to_string(),
                json: r#"{"id":"h1"}"#.to_string()
            }
        );

        let err = parse_command(
            Method::SaveHabitData,
            Some(json!({"habit_id": "h1", "habit": 5})),
        )
        .unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
    }

    #[test]
    fn parameterless_methods_ignore_params() {
        assert_eq!(
            parse_command(Method::DrainPendingActions, None).unwrap(),
            Command::DrainPendingActions
        );
        assert_eq!(
            parse_command(Method::DrainPendingActions, Some(json!({"x": 1}))).unwrap(),
            Command::DrainPendingActions
        );
        assert_eq!(
            parse_command(Method::GetHealth, Some(json!(["anything"]))).unwrap(),
            Command::GetHealth
        );
    }

    #[test]
    fn error_response_omits_data() {
        let response = Response::error(Some("r1".to_string()), codes::NOT_FOUND, "missing");
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(
            encoded,
            json!({"ok": false, "id": "r1", "error": {"code": "not_found", "message": "missing"}})
        );
    }

    #[test]
    fn method_names_are_snake_case() {
        assert_eq!(method_name(Method::OnUserComplete), "on_user_complete");
    }
}
