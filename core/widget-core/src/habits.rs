//! Habit record store: habit id → [`HabitRecord`], persisted as the
//! `habits_data` blob.
//!
//! # Blob Format
//!
//! The blob maps each habit id to that habit's JSON document *as a string*
//! (double encoding), so a record this build cannot decode still survives
//! writes to its neighbours byte for byte. Nested objects written by older
//! hosts are accepted and re-encoded as strings on the next write.
//!
//! # Failure Handling
//!
//! - Missing or corrupt blob: empty store (logged, never fatal)
//! - Undecodable record: `MalformedRecord` from `get`, still listed by
//!   `all_ids` so reconciliation can clean it up

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;

use crate::error::{require_id, Result, WidgetError};
use crate::namespace::{read_json, write_json, Namespace, Session, HABITS_KEY};
use crate::types::{CompletionFields, HabitRecord};

/// The decoded `habits_data` blob, valid for the session it was loaded in.
#[derive(Debug, Default)]
pub(crate) struct HabitTable {
    entries: BTreeMap<String, String>,
}

impl HabitTable {
    pub(crate) fn load(session: &dyn Session) -> Result<Self> {
        let raw: BTreeMap<String, Value> = read_json(session, HABITS_KEY)?;
        let entries = raw
            .into_iter()
            .map(|(id, value)| match value {
                Value::String(doc) => (id, doc),
                other => (id, other.to_string()),
            })
            .collect();
        Ok(Self { entries })
    }

    pub(crate) fn save(&self, session: &mut dyn Session) -> Result<()> {
        write_json(session, HABITS_KEY, &self.entries)
    }

    pub(crate) fn get(&self, id: &str) -> Result<HabitRecord> {
        let doc = self
            .entries
            .get(id)
            .ok_or_else(|| WidgetError::HabitNotFound(id.to_string()))?;
        HabitRecord::from_json(id, doc)
    }

    /// Replaces the entry with exactly `record`.
    pub(crate) fn insert(&mut self, record: &HabitRecord) -> Result<()> {
        self.entries.insert(record.id.clone(), record.to_json()?);
        Ok(())
    }

    /// Replaces the entry with the app's `document`, normalized by `record`.
    pub(crate) fn insert_document(&mut self, record: &HabitRecord, document: &str) -> Result<()> {
        self.entries
            .insert(record.id.clone(), record.to_json_over(document)?);
        Ok(())
    }

    /// Writes `record` over the stored entry, keeping keys it does not model.
    pub(crate) fn update(&mut self, record: &HabitRecord) -> Result<()> {
        let doc = match self.entries.get(&record.id) {
            Some(stored) => record.to_json_over(stored)?,
            None => record.to_json()?,
        };
        self.entries.insert(record.id.clone(), doc);
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn ids(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Loads the record, lets `decide` compute new completion fields, and writes
/// them back only when `decide` returns `Some`.
///
/// Returns the resulting record and whether anything was written.
pub(crate) fn merge_in(
    session: &mut dyn Session,
    id: &str,
    decide: impl FnOnce(&HabitRecord) -> Option<CompletionFields>,
) -> Result<(HabitRecord, bool)> {
    let mut table = HabitTable::load(session)?;
    let mut record = table.get(id)?;
    let Some(fields) = decide(&record) else {
        return Ok((record, false));
    };
    record.apply_completion_fields(fields);
    table.update(&record)?;
    table.save(session)?;
    Ok((record, true))
}

/// Store handle. Every call is one namespace session.
#[derive(Clone)]
pub struct HabitStore {
    ns: Arc<dyn Namespace>,
}

impl HabitStore {
    pub fn new(ns: Arc<dyn Namespace>) -> Self {
        Self { ns }
    }

    pub fn get(&self, id: &str) -> Result<HabitRecord> {
        require_id("habit_id", id)?;
        let session = self.ns.session()?;
        HabitTable::load(session.as_ref())?.get(id)
    }

    /// Full overwrite. `id` is authoritative over `record.id`.
    pub fn put(&self, id: &str, record: &HabitRecord) -> Result<HabitRecord> {
        require_id("habit_id", id)?;
        let mut record = record.clone();
        record.id = id.to_string();
        record.normalize();

        let mut session = self.ns.session()?;
        let mut table = HabitTable::load(session.as_ref())?;
        table.insert(&record)?;
        table.save(session.as_mut())?;
        tracing::debug!(habit = %id, "Habit record saved");
        Ok(record)
    }

    /// Decodes the app's JSON payload and stores it. Nothing is written if the
    /// payload is rejected.
    pub fn put_json(&self, id: &str, json: &str) -> Result<HabitRecord> {
        require_id("habit_id", id)?;
        let record = HabitRecord::from_json(id, json)?;

        let mut session = self.ns.session()?;
        let mut table = HabitTable::load(session.as_ref())?;
        table.insert_document(&record, json)?;
        table.save(session.as_mut())?;
        tracing::debug!(habit = %id, "Habit document saved");
        Ok(record)
    }

    /// Partial update of the completion fields only.
    pub fn merge_completion_fields(
        &self,
        id: &str,
        update: impl FnOnce(&mut CompletionFields),
    ) -> Result<HabitRecord> {
        require_id("habit_id", id)?;
        let mut session = self.ns.session()?;
        let (record, _) = merge_in(session.as_mut(), id, |current| {
            let mut fields = current.completion_fields();
            update(&mut fields);
            Some(fields)
        })?;
        Ok(record)
    }

    /// Removes the record. Returns false if it was not there.
    ///
    /// Mappings are left alone; use the engine's delete for the full cascade.
    pub fn delete(&self, id: &str) -> Result<bool> {
        require_id("habit_id", id)?;
        let mut session = self.ns.session()?;
        let mut table = HabitTable::load(session.as_ref())?;
        if !table.remove(id) {
            return Ok(false);
        }
        table.save(session.as_mut())?;
        tracing::debug!(habit = %id, "Habit record deleted");
        Ok(true)
    }

    pub fn all_ids(&self) -> Result<BTreeSet<String>> {
        let session = self.ns.session()?;
        Ok(HabitTable::load(session.as_ref())?.ids())
    }
}
