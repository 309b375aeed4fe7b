//! Habit state shared by the app and its widget surfaces.
//!
//! **FFI Support:** Public types carry UniFFI annotations so the Kotlin and
//! Swift widget hosts receive the exact same shapes the app writes.
//!
//! # Wire Format
//!
//! Each habit is stored as its own JSON document (camelCase keys) inside the
//! `habits_data` blob. The app owns that document; decoding is strict about the
//! fields this crate depends on and ignores presentation fields it does not.
//! Writes overlay the completion fields onto the stored document, so keys
//! this crate does not model (`isDarkMode`, reminder times) survive a toggle.
//!
//! `color` is a signed ARGB int, the same value read unsigned (`0xFF9B5DE5`),
//! or a hex string (`"#9B5DE5"`, `"#FF9B5DE5"`).
//!
//! ```json
//! {"id":"h1","name":"Read","color":-16744448,"iconBase64":"iVBOR...",
//!  "remindersPerDay":3,"dailyCompletions":1,"isCompletedToday":false,
//!  "currentStreak":4,"progressPercent":0.333,"schemaVersion":1}
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WidgetError};

/// Highest record schema this build understands.
pub const SCHEMA_VERSION: u32 = 1;

/// Color values the app uses to mean "no custom color".
const COLOR_SENTINELS: [i32; 2] = [-1, 0];

/// Document keys a write always replaces. Everything else in the stored
/// document belongs to the app and is kept as written.
const OWNED_KEYS: [&str; 7] = [
    "id",
    "remindersPerDay",
    "dailyCompletions",
    "isCompletedToday",
    "currentStreak",
    "progressPercent",
    "schemaVersion",
];

/// A habit's state for today, as shown on a widget.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct HabitRecord {
    pub id: String,
    pub name: String,
    /// Signed ARGB; `None` means "use the default accent color".
    pub color_argb: Option<i32>,
    /// Decoded icon image bytes.
    pub icon_data: Option<Vec<u8>>,
    pub reminders_per_day: u32,
    pub daily_completions: u32,
    pub is_completed_today: bool,
    pub current_streak: u32,
    pub progress_percent: f64,
}

/// The fields the toggle engine is allowed to touch in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionFields {
    pub daily_completions: u32,
    pub is_completed_today: bool,
    pub current_streak: u32,
    pub progress_percent: f64,
}

impl HabitRecord {
    /// `reminders_per_day`, never less than 1.
    pub fn quota(&self) -> u32 {
        self.reminders_per_day.max(1)
    }

    /// True once today's quota is met; further toggles are inert.
    pub fn is_saturated(&self) -> bool {
        self.daily_completions >= self.quota()
    }

    pub fn completion_fields(&self) -> CompletionFields {
        CompletionFields {
            daily_completions: self.daily_completions,
            is_completed_today: self.is_completed_today,
            current_streak: self.current_streak,
            progress_percent: self.progress_percent,
        }
    }

    /// Applies completion fields, then re-derives everything the invariants pin.
    pub(crate) fn apply_completion_fields(&mut self, fields: CompletionFields) {
        self.daily_completions = fields.daily_completions;
        self.is_completed_today = fields.is_completed_today;
        self.current_streak = fields.current_streak;
        self.progress_percent = fields.progress_percent;
        self.normalize();
    }

    /// Restores every invariant:
    /// `1 <= reminders`, `0 <= completions <= reminders`,
    /// `completed == (completions >= reminders)`, `progress == completions / reminders`.
    pub fn normalize(&mut self) {
        self.reminders_per_day = self.quota();
        self.daily_completions = self.daily_completions.min(self.reminders_per_day);
        self.is_completed_today = self.daily_completions >= self.reminders_per_day;
        self.progress_percent = progress(self.daily_completions, self.reminders_per_day);
    }

    /// Decodes the app's JSON document for a habit.
    ///
    /// `id` is the key the record is stored under and wins over any `id`
    /// inside the payload.
    pub fn from_json(id: &str, json: &str) -> Result<Self> {
        let wire: HabitWire = serde_json::from_str(json).map_err(|e| WidgetError::MalformedRecord {
            id: id.to_string(),
            details: e.to_string(),
        })?;
        wire.into_record(id)
    }

    /// Encodes the record as the JSON document stored in `habits_data`.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&HabitWire::from(self)).map_err(|source| self.encode_error(source))
    }

    /// Encodes the record on top of `base`, the document it was read from.
    ///
    /// Owned keys are replaced; any other key in `base` is kept verbatim, and
    /// record fields `base` lacks are added. A `base` that is not a JSON
    /// object is ignored.
    pub fn to_json_over(&self, base: &str) -> Result<String> {
        let Ok(Value::Object(mut doc)) = serde_json::from_str::<Value>(base) else {
            return self.to_json();
        };
        let wire = match serde_json::to_value(HabitWire::from(self)) {
            Ok(Value::Object(wire)) => wire,
            Ok(_) => Map::new(),
            Err(source) => return Err(self.encode_error(source)),
        };
        for (key, value) in wire {
            if OWNED_KEYS.contains(&key.as_str()) || !doc.contains_key(&key) {
                doc.insert(key, value);
            }
        }
        serde_json::to_string(&doc).map_err(|source| self.encode_error(source))
    }

    fn encode_error(&self, source: serde_json::Error) -> WidgetError {
        WidgetError::Json {
            context: format!("encoding habit {}", self.id),
            source,
        }
    }
}

/// `clamp(completions / max(reminders, 1), 0, 1)`.
pub fn progress(daily_completions: u32, reminders_per_day: u32) -> f64 {
    let quota = reminders_per_day.max(1);
    (f64::from(daily_completions) / f64::from(quota)).clamp(0.0, 1.0)
}

/// Pulls the habit id out of an app payload, for calls that only carry the JSON.
pub fn habit_id_from_json(json: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct IdOnly {
        #[serde(default)]
        id: Option<String>,
    }
    let parsed: IdOnly = serde_json::from_str(json)
        .map_err(|e| WidgetError::invalid("habit", format!("not a JSON object: {}", e)))?;
    match parsed.id {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(WidgetError::invalid("habit", "payload has no id")),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// On-disk shape
// ═══════════════════════════════════════════════════════════════════════════════

/// Serialized form of [`HabitRecord`]. Integer fields are signed because the
/// app may hand us anything; `into_record` is where they become valid.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HabitWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    icon_base64: Option<String>,
    #[serde(default = "default_reminders")]
    reminders_per_day: i64,
    #[serde(default)]
    daily_completions: i64,
    #[serde(default)]
    is_completed_today: bool,
    #[serde(default)]
    current_streak: i64,
    #[serde(default)]
    progress_percent: f64,
    #[serde(default = "default_schema_version")]
    schema_version: u32,
}

fn default_reminders() -> i64 {
    1
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn clamp_u32(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

/// Reads every color form the app writes. Anything else is the default accent.
fn decode_color(id: &str, value: &Value) -> Option<i32> {
    let argb = match value {
        Value::Null => return None,
        Value::Number(n) => n.as_i64().and_then(|v| {
            if let Ok(signed) = i32::try_from(v) {
                Some(signed)
            } else {
                u32::try_from(v).ok().map(|unsigned| unsigned as i32)
            }
        }),
        Value::String(hex) => parse_hex_color(hex),
        _ => None,
    };
    if argb.is_none() {
        tracing::warn!(habit = %id, color = %value, "Unreadable color, using default accent");
    }
    argb.filter(|c| !COLOR_SENTINELS.contains(c))
}

/// `#RRGGBB` (opaque) or `#AARRGGBB`; the `#` is optional.
fn parse_hex_color(hex: &str) -> Option<i32> {
    let digits = hex.trim().trim_start_matches('#');
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    match digits.len() {
        6 => Some((0xFF00_0000 | value) as i32),
        8 => Some(value as i32),
        _ => None,
    }
}

impl HabitWire {
    fn into_record(self, id: &str) -> Result<HabitRecord> {
        if self.schema_version > SCHEMA_VERSION {
            return Err(WidgetError::UnsupportedSchema {
                found: self.schema_version,
                supported: SCHEMA_VERSION,
            });
        }

        let icon_data = match self.icon_base64.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(encoded) => match BASE64.decode(encoded) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    tracing::warn!(habit = %id, error = %err, "Dropping undecodable icon");
                    None
                }
            },
        };

        let mut record = HabitRecord {
            id: id.to_string(),
            name: self.name,
            color_argb: self.color.as_ref().and_then(|c| decode_color(id, c)),
            icon_data,
            reminders_per_day: clamp_u32(self.reminders_per_day),
            daily_completions: clamp_u32(self.daily_completions),
            is_completed_today: self.is_completed_today,
            current_streak: clamp_u32(self.current_streak),
            progress_percent: self.progress_percent,
        };
        record.normalize();
        Ok(record)
    }
}

impl From<&HabitRecord> for HabitWire {
    fn from(record: &HabitRecord) -> Self {
        HabitWire {
            id: Some(record.id.clone()),
            name: record.name.clone(),
            color: record.color_argb.map(Value::from),
            icon_base64: record.icon_data.as_ref().map(|bytes| BASE64.encode(bytes)),
            reminders_per_day: i64::from(record.reminders_per_day),
            daily_completions: i64::from(record.daily_completions),
            is_completed_today: record.is_completed_today,
            current_streak: i64::from(record.current_streak),
            progress_percent: record.progress_percent,
            schema_version: SCHEMA_VERSION,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Command results
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a completion toggle.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct ToggleOutcome {
    pub record: HabitRecord,
    /// False when the day's quota was already met and nothing changed.
    pub advanced: bool,
}

/// What a widget surface should draw.
#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum WidgetView {
    Habit { record: HabitRecord },
    /// No mapping, a deleted habit, or an unreadable record.
    Unconfigured,
}

/// Result of a tap on a widget surface.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct CompletionResult {
    pub habit_id: String,
    pub outcome: ToggleOutcome,
    /// Every surface that must re-render, including the one tapped.
    pub surfaces_to_refresh: Vec<String>,
}
