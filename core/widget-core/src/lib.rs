//! # widget-core
//!
//! Shared state for a habit tracker and its home-screen widgets. The app and
//! the widget extensions run as separate processes and never call each other;
//! they meet in one on-disk namespace holding three entries:
//!
//! - `habits_data`: habit id → habit record (JSON document per habit)
//! - `widget_habit_map`: widget surface id → habit id
//! - `pending_actions`: habit ids changed from a widget, waiting for the app
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency.
//! - **One lock per call**: Every operation takes the namespace lock once and
//!   finishes its read-modify-write under it.
//! - **Graceful degradation**: Corrupt blobs read as empty; a malformed record
//!   only makes its own widget render unconfigured.
//! - **FFI-ready**: UniFFI annotations enable Swift and Kotlin bindings.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use widget_core::WidgetEngine;
//!
//! let engine = WidgetEngine::new()?;
//! let view = engine.render_data("12".into())?;
//! ```

// UniFFI scaffolding for Swift/Kotlin bindings
uniffi::setup_scaffolding!();

pub mod engine;
pub mod error;
pub mod habits;
pub mod mapping;
pub mod namespace;
pub mod outbox;
pub mod reconcile;
pub mod storage;
pub mod toggle;
pub mod types;

pub use engine::WidgetEngine;
pub use error::{Result, WidgetError, WidgetFfiError};
pub use habits::HabitStore;
pub use mapping::MappingTable;
pub use namespace::{
    FileNamespace, LockHolder, MemoryNamespace, Namespace, Session, HABITS_KEY, MAPPING_KEY,
    PENDING_KEY,
};
pub use outbox::Outbox;
pub use reconcile::Reconciler;
pub use storage::{StorageConfig, ROOT_ENV_VAR};
pub use toggle::{next_completion, ToggleEngine};
pub use types::*;

#[cfg(test)]
mod integration_tests;
