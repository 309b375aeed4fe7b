//! Widget mapping table: surface id → habit id, persisted as `widget_habit_map`.
//!
//! Many surfaces may show the same habit. A mapping is only a reference; the
//! habit's data lives in the record store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{require_id, Result};
use crate::namespace::{read_json, write_json, Namespace, Session, MAPPING_KEY};

pub(crate) type MappingBlob = BTreeMap<String, String>;

pub(crate) fn load(session: &dyn Session) -> Result<MappingBlob> {
    read_json(session, MAPPING_KEY)
}

pub(crate) fn save(session: &mut dyn Session, map: &MappingBlob) -> Result<()> {
    write_json(session, MAPPING_KEY, map)
}

pub(crate) fn surfaces_in(map: &MappingBlob, habit_id: &str) -> BTreeSet<String> {
    map.iter()
        .filter(|(_, habit)| habit.as_str() == habit_id)
        .map(|(surface, _)| surface.clone())
        .collect()
}

/// Removes every mapping to `habit_id` and returns the surfaces that had one.
/// The blob is only rewritten when something was removed.
pub(crate) fn clear_in(session: &mut dyn Session, habit_id: &str) -> Result<BTreeSet<String>> {
    let mut map = load(session)?;
    let affected = surfaces_in(&map, habit_id);
    if affected.is_empty() {
        return Ok(affected);
    }
    map.retain(|_, habit| habit.as_str() != habit_id);
    save(session, &map)?;
    tracing::debug!(habit = %habit_id, surfaces = affected.len(), "Cleared widget mappings");
    Ok(affected)
}

/// Mapping table handle. Every call is one namespace session.
#[derive(Clone)]
pub struct MappingTable {
    ns: Arc<dyn Namespace>,
}

impl MappingTable {
    pub fn new(ns: Arc<dyn Namespace>) -> Self {
        Self { ns }
    }

    /// Upsert.
    pub fn set_mapping(&self, surface_id: &str, habit_id: &str) -> Result<()> {
        require_id("surface_id", surface_id)?;
        require_id("habit_id", habit_id)?;
        let mut session = self.ns.session()?;
        let mut map = load(session.as_ref())?;
        map.insert(surface_id.to_string(), habit_id.to_string());
        save(session.as_mut(), &map)?;
        tracing::debug!(surface = %surface_id, habit = %habit_id, "Widget mapped");
        Ok(())
    }

    /// Returns the habit the surface pointed at, if any.
    pub fn remove_mapping(&self, surface_id: &str) -> Result<Option<String>> {
        require_id("surface_id", surface_id)?;
        let mut session = self.ns.session()?;
        let mut map = load(session.as_ref())?;
        let removed = map.remove(surface_id);
        if removed.is_some() {
            save(session.as_mut(), &map)?;
            tracing::debug!(surface = %surface_id, "Widget unmapped");
        }
        Ok(removed)
    }

    pub fn mapping_for(&self, surface_id: &str) -> Result<Option<String>> {
        require_id("surface_id", surface_id)?;
        let session = self.ns.session()?;
        Ok(load(session.as_ref())?.remove(surface_id))
    }

    pub fn surfaces_for(&self, habit_id: &str) -> Result<BTreeSet<String>> {
        require_id("habit_id", habit_id)?;
        let session = self.ns.session()?;
        Ok(surfaces_in(&load(session.as_ref())?, habit_id))
    }

    pub fn clear_mappings_for(&self, habit_id: &str) -> Result<BTreeSet<String>> {
        require_id("habit_id", habit_id)?;
        let mut session = self.ns.session()?;
        clear_in(session.as_mut(), habit_id)
    }

    pub fn all_mappings(&self) -> Result<BTreeMap<String, String>> {
        let session = self.ns.session()?;
        load(session.as_ref())
    }
}
