//! The shared key-value namespace the app and widget surfaces communicate through.
//!
//! Both processes read and write the same three entries:
//!
//! ```text
//! habits_data       {"<habit id>": "<HabitRecord JSON string>", ...}
//! widget_habit_map  {"<surface id>": "<habit id>", ...}
//! pending_actions   ["<habit id>", ...]
//! ```
//!
//! Each entry is a whole JSON blob with no per-key granularity, so every
//! mutation is a read-modify-write of the blob. A [`Session`] is the unit of
//! exclusion: while one is alive, no other session (in this process or any
//! other process sharing the directory) can observe or write the namespace.
//! Components open exactly one session per operation and never nest them.
//!
//! # Backends
//!
//! - [`FileNamespace`]: one file per entry, guarded by an advisory lock file.
//!   Entry writes use temp file + rename, so a crash mid-write leaves the
//!   previous blob intact.
//! - [`MemoryNamespace`]: a mutex-guarded map for tests and embedders that
//!   persist the namespace themselves.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, WidgetError};
use crate::storage::StorageConfig;

/// Habit id → double-encoded `HabitRecord`.
pub const HABITS_KEY: &str = "habits_data";
/// Surface id → habit id.
pub const MAPPING_KEY: &str = "widget_habit_map";
/// Habit ids changed while the app was not watching.
pub const PENDING_KEY: &str = "pending_actions";

/// Exclusive access to the namespace for the lifetime of the value.
pub trait Session {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// A persisted namespace that can hand out exclusive sessions.
pub trait Namespace: Send + Sync {
    /// Blocks until exclusive access is available.
    fn session(&self) -> Result<Box<dyn Session + '_>>;
}

/// Reads a JSON blob, substituting the default when it is absent or unparsable.
///
/// A corrupt blob is never fatal: the next write replaces it with a valid one.
pub(crate) fn read_json<T>(session: &dyn Session, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = session.get(key)? else {
        return Ok(T::default());
    };
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(key, error = %err, "Namespace entry unparsable, treating as empty");
            Ok(T::default())
        }
    }
}

pub(crate) fn write_json<T: Serialize>(session: &mut dyn Session, key: &str, value: &T) -> Result<()> {
    let content = serde_json::to_string(value).map_err(|source| WidgetError::Json {
        context: format!("encoding namespace entry {}", key),
        source,
    })?;
    session.set(key, &content)
}

// ═══════════════════════════════════════════════════════════════════════════════
// File Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Diagnostic record written into the lock file by the current holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Directory-backed namespace shared across processes.
#[derive(Debug, Clone)]
pub struct FileNamespace {
    storage: StorageConfig,
}

impl FileNamespace {
    /// Opens (creating if needed) the namespace directory described by `storage`.
    pub fn open(storage: StorageConfig) -> Result<Self> {
        fs_err::create_dir_all(storage.namespace_dir()).map_err(|source| WidgetError::Io {
            context: "creating namespace directory".to_string(),
            source,
        })?;
        Ok(Self { storage })
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Returns whoever last acquired the lock, if the lock file says so.
    ///
    /// The holder may have released it since; this is for diagnostics only.
    pub fn last_lock_holder(&self) -> Option<LockHolder> {
        let content = fs_err::read_to_string(self.storage.lock_file()).ok()?;
        serde_json::from_str(content.trim()).ok()
    }
}

impl Namespace for FileNamespace {
    fn session(&self) -> Result<Box<dyn Session + '_>> {
        let lock_path = self.storage.lock_file();
        let lock_err = |source| WidgetError::LockFailed {
            path: lock_path.clone(),
            source,
        };

        let mut lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(lock_err)?;
        lock.lock_exclusive().map_err(lock_err)?;

        let holder = LockHolder {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        if let Err(err) = record_holder(&mut lock, &holder) {
            tracing::debug!(error = %err, "Could not record lock holder");
        }

        Ok(Box::new(FileSession {
            storage: &self.storage,
            lock,
        }))
    }
}

fn record_holder(lock: &mut File, holder: &LockHolder) -> std::io::Result<()> {
    let content = serde_json::to_string(holder).map_err(std::io::Error::other)?;
    lock.set_len(0)?;
    lock.seek(SeekFrom::Start(0))?;
    lock.write_all(content.as_bytes())?;
    lock.flush()
}

struct FileSession<'a> {
    storage: &'a StorageConfig,
    lock: File,
}

impl Session for FileSession<'_> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs_err::read_to_string(self.storage.entry_file(key)) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(WidgetError::Io {
                context: format!("reading namespace entry {}", key),
                source,
            }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let io_err = |source| WidgetError::Io {
            context: format!("writing namespace entry {}", key),
            source,
        };

        let mut temp_file = NamedTempFile::new_in(self.storage.namespace_dir()).map_err(io_err)?;
        temp_file.write_all(value.as_bytes()).map_err(io_err)?;
        temp_file.flush().map_err(io_err)?;
        temp_file
            .persist(self.storage.entry_file(key))
            .map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match fs_err::remove_file(self.storage.entry_file(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WidgetError::Io {
                context: format!("removing namespace entry {}", key),
                source,
            }),
        }
    }
}

impl Drop for FileSession<'_> {
    fn drop(&mut self) {
        // Closing the handle releases the lock too; unlocking first keeps the
        // window before the next waiter wakes as short as possible.
        let _ = FileExt::unlock(&self.lock);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Memory Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// In-process namespace.
#[derive(Debug, Default)]
pub struct MemoryNamespace {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every raw entry, for assertions on exact persisted bytes.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock_entries().clone()
    }

    /// Writes a raw entry, bypassing every typed layer.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.lock_entries().insert(key.to_string(), value.to_string());
    }

    fn lock_entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        // A panic inside a session cannot leave a half-written blob behind,
        // so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Namespace for MemoryNamespace {
    fn session(&self) -> Result<Box<dyn Session + '_>> {
        Ok(Box::new(MemorySession {
            entries: self.lock_entries(),
        }))
    }
}

struct MemorySession<'a> {
    entries: MutexGuard<'a, BTreeMap<String, String>>,
}

impl Session for MemorySession<'_> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
