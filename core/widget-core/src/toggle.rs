//! Completion toggle: the saturating per-day state machine.
//!
//! ```text
//! completions < quota  --tap-->  completions + 1
//!                                streak + 1 only if this tap reaches quota
//!                                and the habit was not already completed
//! completions >= quota --tap-->  no change (inert until the day resets)
//! ```
//!
//! There is no undo: a second tap never decrements. Resetting the day is the
//! app's job and happens through a full record save.

use std::sync::Arc;

use crate::error::{require_id, Result};
use crate::habits;
use crate::namespace::{Namespace, Session};
use crate::outbox;
use crate::types::{progress, CompletionFields, HabitRecord, ToggleOutcome};

/// Completion fields after one tap, or `None` if the day's quota is already met.
pub fn next_completion(record: &HabitRecord) -> Option<CompletionFields> {
    let quota = record.quota();
    if record.daily_completions >= quota {
        return None;
    }

    let daily_completions = record.daily_completions + 1;
    let is_completed_now = daily_completions >= quota;
    let current_streak = if is_completed_now && !record.is_completed_today {
        record.current_streak.saturating_add(1)
    } else {
        record.current_streak
    };

    Some(CompletionFields {
        daily_completions,
        is_completed_today: is_completed_now,
        current_streak,
        progress_percent: progress(daily_completions, quota),
    })
}

/// Applies one tap inside an open session: record update and outbox append
/// share the session, so no other writer can interleave between them.
pub(crate) fn toggle_in(session: &mut dyn Session, habit_id: &str) -> Result<ToggleOutcome> {
    let (record, advanced) = habits::merge_in(session, habit_id, next_completion)?;
    if advanced {
        outbox::append_in(session, habit_id)?;
        tracing::debug!(
            habit = %habit_id,
            completions = record.daily_completions,
            quota = record.reminders_per_day,
            streak = record.current_streak,
            "Habit completion advanced"
        );
    } else {
        tracing::debug!(habit = %habit_id, "Habit already complete for today; tap ignored");
    }
    Ok(ToggleOutcome { record, advanced })
}

/// Toggle engine handle.
#[derive(Clone)]
pub struct ToggleEngine {
    ns: Arc<dyn Namespace>,
}

impl ToggleEngine {
    pub fn new(ns: Arc<dyn Namespace>) -> Self {
        Self { ns }
    }

    /// Advances today's completion for `habit_id`.
    ///
    /// A missing habit is `HabitNotFound` with no side effects. A saturated
    /// habit returns its unchanged record with `advanced == false` and
    /// nothing is written or queued.
    pub fn toggle_completion(&self, habit_id: &str) -> Result<ToggleOutcome> {
        require_id("habit_id", habit_id)?;
        let mut session = self.ns.session()?;
        toggle_in(session.as_mut(), habit_id)
    }
}
