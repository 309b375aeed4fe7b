//! Error types for widget-core operations.
//! Keep WidgetFfiError minimal and stable to avoid breaking FFI clients.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// FFI-Compatible Error (for Swift/Kotlin)
// ═══════════════════════════════════════════════════════════════════════════════

/// FFI-safe error type for use across language boundaries.
///
/// Only the distinctions a widget or app caller acts on are kept: a missing
/// id is a no-op, a bad argument is a caller bug, a rejected record needs a
/// fresh save from the app, and storage failures are worth a retry.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum WidgetFfiError {
    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    InvalidArgument { message: String },

    #[error("{message}")]
    InvalidRecord { message: String },

    #[error("{message}")]
    Storage { message: String },
}

impl From<WidgetError> for WidgetFfiError {
    fn from(err: WidgetError) -> Self {
        let message = err.to_string();
        match err {
            WidgetError::HabitNotFound(_) | WidgetError::SurfaceNotMapped(_) => {
                WidgetFfiError::NotFound { message }
            }
            WidgetError::InvalidArgument { .. } => WidgetFfiError::InvalidArgument { message },
            WidgetError::MalformedRecord { .. } | WidgetError::UnsupportedSchema { .. } => {
                WidgetFfiError::InvalidRecord { message }
            }
            WidgetError::LockFailed { .. } | WidgetError::Io { .. } | WidgetError::Json { .. } => {
                WidgetFfiError::Storage { message }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Internal Error (for Rust-only use)
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur in widget-core operations.
///
/// None of these are fatal: every variant leaves the shared namespace exactly
/// as it was before the failing call.
#[derive(Debug, thiserror::Error)]
pub enum WidgetError {
    // ─────────────────────────────────────────────────────────────────────
    // Lookup Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Habit not found: {0}")]
    HabitNotFound(String),

    #[error("Widget surface has no habit mapped: {0}")]
    SurfaceNotMapped(String),

    // ─────────────────────────────────────────────────────────────────────
    // Input Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid argument: {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("Habit record malformed: {id}: {details}")]
    MalformedRecord { id: String, details: String },

    #[error("Habit record schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Namespace lock failed: {path}: {source}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON encoding error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl WidgetError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        WidgetError::InvalidArgument {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the "referenced id is absent" family, which callers treat as a no-op.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WidgetError::HabitNotFound(_) | WidgetError::SurfaceNotMapped(_)
        )
    }
}

/// Convenience type alias for Results using WidgetError.
pub type Result<T> = std::result::Result<T, WidgetError>;

/// Rejects empty or whitespace-only ids before anything is read or written.
pub(crate) fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(WidgetError::invalid(field, "must not be empty"));
    }
    Ok(())
}

// Conversion for string error compatibility
impl From<WidgetError> for String {
    fn from(err: WidgetError) -> String {
        err.to_string()
    }
}
