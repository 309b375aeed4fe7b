//! WidgetEngine - the single entry point for the app and its widget extensions.
//!
//! Both processes construct an engine over the same shared namespace:
//! - **App side**: pushes habit records, manages surface bindings, drains the
//!   outbox and reconciles deletions.
//! - **Widget side**: renders a surface and applies taps.
//!
//! Every method is synchronous and holds the namespace lock for the duration
//! of one call. Compound operations (delete, tap, configure) run inside a
//! single session so another process never sees them half done.
//!
//! ```rust,ignore
//! use widget_core::WidgetEngine;
//!
//! let engine = WidgetEngine::new()?;
//! engine.save_habit_data("h1".into(), r#"{"id":"h1","name":"Read"}"#.into())?;
//! engine.set_widget_mapping("12".into(), "h1".into())?;
//! let result = engine.on_user_complete("12".into())?;
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::error::{require_id, WidgetError, WidgetFfiError};
use crate::habits::{HabitStore, HabitTable};
use crate::mapping::{self, MappingTable};
use crate::namespace::{FileNamespace, Namespace, PENDING_KEY};
use crate::outbox::{self, Outbox};
use crate::reconcile::{self, Reconciler};
use crate::storage::StorageConfig;
use crate::toggle::{self, ToggleEngine};
use crate::types::{habit_id_from_json, CompletionResult, HabitRecord, ToggleOutcome, WidgetView};

type FfiResult<T> = Result<T, WidgetFfiError>;

/// Habit widget sync engine.
#[derive(uniffi::Object)]
pub struct WidgetEngine {
    ns: Arc<dyn Namespace>,
    habits: HabitStore,
    mappings: MappingTable,
    toggles: ToggleEngine,
    outbox: Outbox,
    reconciler: Reconciler,
}

impl WidgetEngine {
    /// Builds an engine over any namespace backend.
    ///
    /// Not exposed to FFI. Tests use this with `MemoryNamespace`.
    pub fn with_namespace(ns: Arc<dyn Namespace>) -> Self {
        Self {
            habits: HabitStore::new(ns.clone()),
            mappings: MappingTable::new(ns.clone()),
            toggles: ToggleEngine::new(ns.clone()),
            outbox: Outbox::new(ns.clone()),
            reconciler: Reconciler::new(ns.clone()),
            ns,
        }
    }

    /// Builds an engine over the file namespace described by `storage`.
    pub fn with_storage(storage: StorageConfig) -> FfiResult<Self> {
        let ns = FileNamespace::open(storage)?;
        Ok(Self::with_namespace(Arc::new(ns)))
    }

    pub fn habits(&self) -> &HabitStore {
        &self.habits
    }

    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }
}

fn into_vec(set: BTreeSet<String>) -> Vec<String> {
    set.into_iter().collect()
}

#[uniffi::export]
impl WidgetEngine {
    /// Opens the shared namespace at the default location.
    ///
    /// `WIDGET_SYNC_ROOT` overrides the platform data directory.
    #[uniffi::constructor]
    pub fn new() -> FfiResult<Self> {
        Self::with_storage(StorageConfig::resolve()?)
    }

    /// Opens the shared namespace rooted at `root` (an app-group container).
    #[uniffi::constructor]
    pub fn open_at(root: String) -> FfiResult<Self> {
        if root.trim().is_empty() {
            return Err(WidgetError::invalid("root", "must not be empty").into());
        }
        Self::with_storage(StorageConfig::with_root(root.into()))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Habit Records
    // ─────────────────────────────────────────────────────────────────────────────

    /// Stores the app's JSON document for `habit_id`, replacing any previous one.
    ///
    /// Returns the surfaces showing this habit, which should be redrawn.
    pub fn save_habit_data(&self, habit_id: String, json: String) -> FfiResult<Vec<String>> {
        require_id("habit_id", &habit_id)?;
        let record = HabitRecord::from_json(&habit_id, &json)?;

        let mut session = self.ns.session()?;
        let mut table = HabitTable::load(session.as_ref())?;
        table.insert_document(&record, &json)?;
        table.save(session.as_mut())?;
        let surfaces = mapping::surfaces_in(&mapping::load(session.as_ref())?, &habit_id);

        tracing::debug!(habit = %habit_id, surfaces = surfaces.len(), "Habit data saved");
        Ok(into_vec(surfaces))
    }

    /// Reads one stored record.
    pub fn get_habit(&self, habit_id: String) -> FfiResult<HabitRecord> {
        Ok(self.habits.get(&habit_id)?)
    }

    /// Removes a habit and every mapping to it.
    ///
    /// Returns the surfaces that lost their mapping. Deleting an unknown
    /// habit is not an error.
    pub fn delete_habit(&self, habit_id: String) -> FfiResult<Vec<String>> {
        require_id("habit_id", &habit_id)?;
        let mut session = self.ns.session()?;
        let affected = reconcile::delete_in(session.as_mut(), &habit_id)?;
        tracing::info!(habit = %habit_id, surfaces = affected.len(), "Habit deleted");
        Ok(into_vec(affected))
    }

    /// Deletes every stored habit not listed in `valid_ids`.
    ///
    /// Returns the surfaces that were showing a removed habit.
    pub fn sync_valid_ids(&self, valid_ids: Vec<String>) -> FfiResult<Vec<String>> {
        let valid: HashSet<String> = valid_ids.into_iter().collect();
        Ok(into_vec(self.reconciler.sync_valid_ids(&valid)?))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Widget Mapping
    // ─────────────────────────────────────────────────────────────────────────────

    /// Every binding, surface id → habit id.
    pub fn get_widget_mapping(&self) -> FfiResult<HashMap<String, String>> {
        Ok(self.mappings.all_mappings()?.into_iter().collect())
    }

    pub fn set_widget_mapping(&self, surface_id: String, habit_id: String) -> FfiResult<()> {
        Ok(self.mappings.set_mapping(&surface_id, &habit_id)?)
    }

    /// Binds a surface and stores the habit it shows in one step.
    ///
    /// This is the configuration-screen path: the habit is taken from the
    /// payload's `id`. Returns that id.
    pub fn configure_surface(&self, surface_id: String, habit_json: String) -> FfiResult<String> {
        require_id("surface_id", &surface_id)?;
        let habit_id = habit_id_from_json(&habit_json)?;
        let record = HabitRecord::from_json(&habit_id, &habit_json)?;

        let mut session = self.ns.session()?;
        let mut table = HabitTable::load(session.as_ref())?;
        table.insert_document(&record, &habit_json)?;
        table.save(session.as_mut())?;
        let mut map = mapping::load(session.as_ref())?;
        map.insert(surface_id.clone(), habit_id.clone());
        mapping::save(session.as_mut(), &map)?;

        tracing::info!(surface = %surface_id, habit = %habit_id, "Widget configured");
        Ok(habit_id)
    }

    /// Unbinds a surface. Returns the habit it showed, if any.
    pub fn remove_mapping(&self, surface_id: String) -> FfiResult<Option<String>> {
        Ok(self.mappings.remove_mapping(&surface_id)?)
    }

    /// Unbinds every surface showing `habit_id`. Returns those surfaces.
    pub fn clear_mappings_for(&self, habit_id: String) -> FfiResult<Vec<String>> {
        Ok(into_vec(self.mappings.clear_mappings_for(&habit_id)?))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Completion
    // ─────────────────────────────────────────────────────────────────────────────

    /// Advances today's completion for `habit_id` by one tap.
    pub fn toggle_completion(&self, habit_id: String) -> FfiResult<ToggleOutcome> {
        Ok(self.toggles.toggle_completion(&habit_id)?)
    }

    /// Handles a tap on a widget surface.
    ///
    /// Resolves the surface's habit, applies the toggle and reports every
    /// surface that must re-render. The tapped surface is always included.
    pub fn on_user_complete(&self, surface_id: String) -> FfiResult<CompletionResult> {
        require_id("surface_id", &surface_id)?;
        let mut session = self.ns.session()?;

        let map = mapping::load(session.as_ref())?;
        let habit_id = map
            .get(&surface_id)
            .cloned()
            .ok_or_else(|| WidgetError::SurfaceNotMapped(surface_id.clone()))?;

        let outcome = toggle::toggle_in(session.as_mut(), &habit_id)?;

        let mut surfaces = mapping::surfaces_in(&map, &habit_id);
        surfaces.insert(surface_id);

        Ok(CompletionResult {
            habit_id,
            outcome,
            surfaces_to_refresh: into_vec(surfaces),
        })
    }

    /// What `surface_id` should draw right now.
    ///
    /// An unbound surface, a deleted habit and an unreadable record all
    /// render as `Unconfigured`. Only storage failures are errors.
    pub fn render_data(&self, surface_id: String) -> FfiResult<WidgetView> {
        require_id("surface_id", &surface_id)?;
        let session = self.ns.session()?;

        let Some(habit_id) = mapping::load(session.as_ref())?.remove(&surface_id) else {
            return Ok(WidgetView::Unconfigured);
        };
        match HabitTable::load(session.as_ref())?.get(&habit_id) {
            Ok(record) => Ok(WidgetView::Habit { record }),
            Err(err @ (WidgetError::HabitNotFound(_)
            | WidgetError::MalformedRecord { .. }
            | WidgetError::UnsupportedSchema { .. })) => {
                tracing::debug!(surface = %surface_id, error = %err, "Rendering unconfigured");
                Ok(WidgetView::Unconfigured)
            }
            Err(err) => Err(err.into()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Pending Actions
    // ─────────────────────────────────────────────────────────────────────────────

    /// Current outbox contents, duplicates included, without clearing.
    pub fn get_pending_actions(&self) -> FfiResult<Vec<String>> {
        Ok(self.outbox.peek()?)
    }

    pub fn clear_pending_actions(&self) -> FfiResult<()> {
        Ok(self.outbox.clear()?)
    }

    /// Takes everything pending and clears the outbox in one step.
    ///
    /// The result is deduplicated in first-seen order, and ids whose record
    /// no longer exists are dropped.
    pub fn drain_pending_actions(&self) -> FfiResult<Vec<String>> {
        let mut session = self.ns.session()?;
        let pending = outbox::load(session.as_ref())?;
        session.remove(PENDING_KEY)?;
        let table = HabitTable::load(session.as_ref())?;

        let mut seen = HashSet::new();
        let drained: Vec<String> = pending
            .into_iter()
            .filter(|id| table.contains(id) && seen.insert(id.clone()))
            .collect();
        tracing::debug!(drained = drained.len(), "Pending actions drained");
        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::MemoryNamespace;

    fn engine() -> (Arc<MemoryNamespace>, WidgetEngine) {
        let ns = Arc::new(MemoryNamespace::new());
        (ns.clone(), WidgetEngine::with_namespace(ns))
    }

    fn habit(id: &str, reminders: u32) -> String {
        format!(
            r#"{{"id":"{}","name":"Habit {}","remindersPerDay":{}}}"#,
            id, id, reminders
        )
    }

    #[test]
    fn test_save_returns_bound_surfaces() {
        let (_ns, engine) = engine();
        engine.set_widget_mapping("1".into(), "h1".into()).unwrap();
        engine.set_widget_mapping("2".into(), "h1".into()).unwrap();
        let surfaces = engine
            .save_habit_data("h1".into(), habit("h1", 1))
            .unwrap();
        assert_eq!(surfaces, vec!["1", "2"]);
    }

    #[test]
    fn test_rejected_save_writes_nothing() {
        let (ns, engine) = engine();
        let err = engine
            .save_habit_data("h1".into(), r#"{"name":"x","schemaVersion":7}"#.into())
            .unwrap_err();
        assert!(matches!(err, WidgetFfiError::InvalidRecord { .. }));
        assert!(ns.snapshot().is_empty());
    }

    #[test]
    fn test_configure_surface_binds_and_stores() {
        let (_ns, engine) = engine();
        let id = engine
            .configure_surface("7".into(), habit("h9", 2))
            .unwrap();
        assert_eq!(id, "h9");
        assert_eq!(engine.get_widget_mapping().unwrap()["7"], "h9");
        assert_eq!(engine.get_habit("h9".into()).unwrap().reminders_per_day, 2);
    }

    #[test]
    fn test_configure_surface_requires_payload_id() {
        let (ns, engine) = engine();
        let err = engine
            .configure_surface("7".into(), r#"{"name":"x"}"#.into())
            .unwrap_err();
        assert!(matches!(err, WidgetFfiError::InvalidArgument { .. }));
        assert!(ns.snapshot().is_empty());
    }

    #[test]
    fn test_on_user_complete_refreshes_siblings() {
        let (_ns, engine) = engine();
        engine.configure_surface("1".into(), habit("h1", 1)).unwrap();
        engine.set_widget_mapping("2".into(), "h1".into()).unwrap();

        let result = engine.on_user_complete("1".into()).unwrap();
        assert_eq!(result.habit_id, "h1");
        assert!(result.outcome.advanced);
        assert_eq!(result.surfaces_to_refresh, vec!["1", "2"]);
    }

    #[test]
    fn test_on_user_complete_unmapped_surface() {
        let (ns, engine) = engine();
        let err = engine.on_user_complete("5".into()).unwrap_err();
        assert!(matches!(err, WidgetFfiError::NotFound { .. }));
        assert!(ns.snapshot().is_empty());
    }

    #[test]
    fn test_render_states() {
        let (ns, engine) = engine();
        assert_eq!(engine.render_data("1".into()).unwrap(), WidgetView::Unconfigured);

        engine.set_widget_mapping("1".into(), "ghost".into()).unwrap();
        assert_eq!(engine.render_data("1".into()).unwrap(), WidgetView::Unconfigured);

        engine.configure_surface("2".into(), habit("h1", 1)).unwrap();
        match engine.render_data("2".into()).unwrap() {
            WidgetView::Habit { record } => assert_eq!(record.id, "h1"),
            other => panic!("expected habit view, got {:?}", other),
        }

        ns.insert_raw(crate::namespace::HABITS_KEY, r#"{"h1":"not json"}"#);
        assert_eq!(engine.render_data("2".into()).unwrap(), WidgetView::Unconfigured);
    }

    #[test]
    fn test_app_color_forms_render() {
        let (_ns, engine) = engine();
        engine
            .configure_surface("1".into(), r#"{"id":"h1","name":"Read","color":4288372197}"#.into())
            .unwrap();
        engine
            .configure_surface("2".into(), r##"{"id":"h2","name":"Run","color":"#9B5DE5"}"##.into())
            .unwrap();

        for surface in ["1", "2"] {
            match engine.render_data(surface.into()).unwrap() {
                WidgetView::Habit { record } => {
                    assert_eq!(record.color_argb, Some(0xFF9B_5DE5_u32 as i32))
                }
                other => panic!("expected habit view, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_toggle_keeps_app_only_keys() {
        let (ns, engine) = engine();
        engine
            .save_habit_data(
                "h1".into(),
                r#"{"id":"h1","name":"Read","isDarkMode":false,"remindersPerDay":2}"#.into(),
            )
            .unwrap();
        engine.toggle_completion("h1".into()).unwrap();

        let blob: HashMap<String, String> =
            serde_json::from_str(&ns.snapshot()[crate::namespace::HABITS_KEY]).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&blob["h1"]).unwrap();
        assert_eq!(doc["isDarkMode"], false);
        assert_eq!(doc["dailyCompletions"], 1);
        assert_eq!(engine.get_habit("h1".into()).unwrap().daily_completions, 1);
    }

    #[test]
    fn test_drain_dedups_and_drops_orphans() {
        let (_ns, engine) = engine();
        engine.save_habit_data("a".into(), habit("a", 3)).unwrap();
        engine.save_habit_data("b".into(), habit("b", 3)).unwrap();
        engine.toggle_completion("b".into()).unwrap();
        engine.toggle_completion("a".into()).unwrap();
        engine.toggle_completion("b".into()).unwrap();
        engine.outbox().append("gone").unwrap();

        assert_eq!(engine.get_pending_actions().unwrap().len(), 4);
        assert_eq!(engine.drain_pending_actions().unwrap(), vec!["b", "a"]);
        assert!(engine.get_pending_actions().unwrap().is_empty());
    }

    #[test]
    fn test_delete_habit_cascades() {
        let (_ns, engine) = engine();
        engine.configure_surface("1".into(), habit("h1", 1)).unwrap();
        engine.set_widget_mapping("2".into(), "h1".into()).unwrap();

        assert_eq!(engine.delete_habit("h1".into()).unwrap(), vec!["1", "2"]);
        assert!(engine.get_widget_mapping().unwrap().is_empty());
        assert!(matches!(
            engine.get_habit("h1".into()),
            Err(WidgetFfiError::NotFound { .. })
        ));
        assert!(engine.delete_habit("h1".into()).unwrap().is_empty());
    }

    #[test]
    fn test_open_at_rejects_blank_root() {
        assert!(matches!(
            WidgetEngine::open_at("  ".into()),
            Err(WidgetFfiError::InvalidArgument { .. })
        ));
    }
}
