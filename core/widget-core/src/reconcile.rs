//! Stale-id reconciliation.
//!
//! The widget-side store only learns about deletions when the app tells it.
//! If a deletion notice is missed (app killed, widget offline), the app's
//! periodic `sync_valid_ids` call removes every record it no longer knows and
//! unbinds the surfaces that showed one, so they re-render as unconfigured.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::error::Result;
use crate::habits::HabitTable;
use crate::mapping;
use crate::namespace::{Namespace, Session};

/// Removes one habit's record and every mapping to it inside an open session.
/// Returns the surfaces that lost their mapping.
pub(crate) fn delete_in(session: &mut dyn Session, habit_id: &str) -> Result<BTreeSet<String>> {
    let mut table = HabitTable::load(session)?;
    if table.remove(habit_id) {
        table.save(session)?;
    }
    mapping::clear_in(session, habit_id)
}

/// Reconciliation handle.
#[derive(Clone)]
pub struct Reconciler {
    ns: Arc<dyn Namespace>,
}

impl Reconciler {
    pub fn new(ns: Arc<dyn Namespace>) -> Self {
        Self { ns }
    }

    /// Deletes every stored habit not in `valid_ids` (record and mappings).
    ///
    /// Returns the union of surfaces that were showing a removed habit.
    /// Mappings that point at a habit with no record are left alone; they
    /// already render as unconfigured.
    pub fn sync_valid_ids(&self, valid_ids: &HashSet<String>) -> Result<BTreeSet<String>> {
        let mut session = self.ns.session()?;

        let mut table = HabitTable::load(session.as_ref())?;
        let stale: Vec<String> = table
            .ids()
            .into_iter()
            .filter(|id| !valid_ids.contains(id))
            .collect();
        if stale.is_empty() {
            return Ok(BTreeSet::new());
        }

        for id in &stale {
            table.remove(id);
        }
        table.save(session.as_mut())?;

        let mut map = mapping::load(session.as_ref())?;
        let mut affected = BTreeSet::new();
        for id in &stale {
            affected.extend(mapping::surfaces_in(&map, id));
        }
        if !affected.is_empty() {
            map.retain(|surface, _| !affected.contains(surface));
            mapping::save(session.as_mut(), &map)?;
        }

        tracing::info!(
            removed = stale.len(),
            surfaces = affected.len(),
            "Reconciled stale habits"
        );
        Ok(affected)
    }
}
