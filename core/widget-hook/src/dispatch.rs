//! Request → engine → response.
//!
//! Results are rendered as JSON here; habit records use the same camelCase
//! document the app writes, so a client never sees two shapes for one habit.

use serde_json::{json, Map, Value};
use widget_core::{
    CompletionResult, HabitRecord, StorageConfig, ToggleOutcome, WidgetEngine, WidgetFfiError,
    WidgetView,
};
use widget_protocol::{codes, Command, ErrorInfo, Request, Response, PROTOCOL_VERSION};

pub fn handle_request(engine: &WidgetEngine, storage: &StorageConfig, request: Request) -> Response {
    let id = request.id.clone();
    let method = request.method;
    let command = match request.into_command() {
        Ok(command) => command,
        Err(error) => {
            tracing::debug!(method = ?method, code = %error.code, "Request rejected");
            return Response::error_with_info(id, error);
        }
    };

    match execute(engine, storage, command) {
        Ok(data) => Response::ok(id, data),
        Err(error) => {
            tracing::debug!(method = ?method, code = %error.code, message = %error.message, "Request failed");
            Response::error_with_info(id, error)
        }
    }
}

pub fn execute(
    engine: &WidgetEngine,
    storage: &StorageConfig,
    command: Command,
) -> Result<Value, ErrorInfo> {
    let data = match command {
        Command::GetHealth => health(storage),
        Command::SaveHabitData { habit_id, json } => {
            json!({ "surfaces": engine.save_habit_data(habit_id, json).map_err(error_info)? })
        }
        Command::GetWidgetMapping => {
            let mapping: Map<String, Value> = engine
                .get_widget_mapping()
                .map_err(error_info)?
                .into_iter()
                .map(|(surface, habit)| (surface, Value::String(habit)))
                .collect();
            Value::Object(mapping)
        }
        Command::SetWidgetMapping {
            surface_id,
            habit_id,
        } => {
            engine
                .set_widget_mapping(surface_id, habit_id)
                .map_err(error_info)?;
            json!({})
        }
        Command::ConfigureSurface { surface_id, json } => {
            json!({ "habit_id": engine.configure_surface(surface_id, json).map_err(error_info)? })
        }
        Command::RemoveMapping { surface_id } => {
            json!({ "habit_id": engine.remove_mapping(surface_id).map_err(error_info)? })
        }
        Command::ClearMappingsFor { habit_id } => {
            json!({ "surfaces": engine.clear_mappings_for(habit_id).map_err(error_info)? })
        }
        Command::ToggleCompletion { habit_id } => {
            outcome_value(&engine.toggle_completion(habit_id).map_err(error_info)?)?
        }
        Command::GetPendingActions => {
            json!({ "habit_ids": engine.get_pending_actions().map_err(error_info)? })
        }
        Command::ClearPendingActions => {
            engine.clear_pending_actions().map_err(error_info)?;
            json!({})
        }
        Command::DrainPendingActions => {
            json!({ "habit_ids": engine.drain_pending_actions().map_err(error_info)? })
        }
        Command::SyncValidIds { valid_ids } => {
            json!({ "surfaces": engine.sync_valid_ids(valid_ids).map_err(error_info)? })
        }
        Command::DeleteHabit { habit_id } => {
            json!({ "surfaces": engine.delete_habit(habit_id).map_err(error_info)? })
        }
        Command::RenderData { surface_id } => {
            view_value(&engine.render_data(surface_id).map_err(error_info)?)?
        }
        Command::OnUserComplete { surface_id } => {
            completion_value(&engine.on_user_complete(surface_id).map_err(error_info)?)?
        }
    };
    Ok(data)
}

fn health(storage: &StorageConfig) -> Value {
    let mut data = json!({
        "status": "ok",
        "pid": std::process::id(),
        "version": env!("CARGO_PKG_VERSION"),
        "protocol_version": PROTOCOL_VERSION,
        "root": storage.root().to_string_lossy(),
    });
    let holder = storage
        .lock_file()
        .exists()
        .then(|| widget_core::FileNamespace::open(storage.clone()).ok())
        .flatten()
        .and_then(|ns| ns.last_lock_holder());
    if let Some(holder) = holder {
        data["last_lock_holder"] = json!({
            "pid": holder.pid,
            "acquired_at": holder.acquired_at.to_rfc3339(),
        });
    }
    data
}

pub fn error_info(err: WidgetFfiError) -> ErrorInfo {
    let code = match &err {
        WidgetFfiError::NotFound { .. } => codes::NOT_FOUND,
        WidgetFfiError::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
        WidgetFfiError::InvalidRecord { .. } => codes::INVALID_RECORD,
        WidgetFfiError::Storage { .. } => codes::STORAGE_ERROR,
    };
    ErrorInfo::new(code, err.to_string())
}

fn record_value(record: &HabitRecord) -> Result<Value, ErrorInfo> {
    record
        .to_json()
        .map_err(|err| error_info(err.into()))
        .and_then(|doc| {
            serde_json::from_str(&doc)
                .map_err(|err| ErrorInfo::new(codes::STORAGE_ERROR, err.to_string()))
        })
}

fn outcome_value(outcome: &ToggleOutcome) -> Result<Value, ErrorInfo> {
    Ok(json!({
        "advanced": outcome.advanced,
        "habit": record_value(&outcome.record)?,
    }))
}

fn view_value(view: &WidgetView) -> Result<Value, ErrorInfo> {
    Ok(match view {
        WidgetView::Habit { record } => json!({
            "state": "habit",
            "habit": record_value(record)?,
        }),
        WidgetView::Unconfigured => json!({ "state": "unconfigured" }),
    })
}

fn completion_value(result: &CompletionResult) -> Result<Value, ErrorInfo> {
    Ok(json!({
        "habit_id": result.habit_id,
        "advanced": result.outcome.advanced,
        "habit": record_value(&result.outcome.record)?,
        "surfaces_to_refresh": result.surfaces_to_refresh,
    }))
}
