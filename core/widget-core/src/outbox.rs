//! Pending action outbox: habit ids changed while the app was not watching.
//!
//! Widget surfaces append; the app drains when it comes to the foreground.
//! Duplicates only mean "at least one change happened"; consumers should
//! treat presence, not count, as the signal.
//!
//! `drain` reads and clears inside one namespace session, so an append racing
//! with it lands either in the drained batch or in the next one, never nowhere.
//!
//! # Encoding
//!
//! Canonical: a JSON array of strings. Older hosts wrote a comma-joined
//! string (`h1,h2,h1`); that form is still read and is replaced by the array
//! on the next write.

use std::sync::Arc;

use crate::error::{require_id, Result};
use crate::namespace::{write_json, Namespace, Session, PENDING_KEY};

fn decode(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(ids) = serde_json::from_str::<Vec<String>>(trimmed) {
        return ids;
    }
    let legacy = match serde_json::from_str::<String>(trimmed) {
        Ok(joined) => joined,
        Err(_) if trimmed.starts_with('[') || trimmed.starts_with('"') => {
            tracing::warn!("Pending actions unparsable, treating as empty");
            return Vec::new();
        }
        Err(_) => trimmed.to_string(),
    };
    legacy
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn load(session: &dyn Session) -> Result<Vec<String>> {
    Ok(session
        .get(PENDING_KEY)?
        .map(|raw| decode(&raw))
        .unwrap_or_default())
}

pub(crate) fn append_in(session: &mut dyn Session, habit_id: &str) -> Result<()> {
    let mut pending = load(session)?;
    pending.push(habit_id.to_string());
    write_json(session, PENDING_KEY, &pending)?;
    tracing::debug!(habit = %habit_id, pending = pending.len(), "Pending action recorded");
    Ok(())
}

/// Outbox handle. Every call is one namespace session.
#[derive(Clone)]
pub struct Outbox {
    ns: Arc<dyn Namespace>,
}

impl Outbox {
    pub fn new(ns: Arc<dyn Namespace>) -> Self {
        Self { ns }
    }

    pub fn append(&self, habit_id: &str) -> Result<()> {
        require_id("habit_id", habit_id)?;
        let mut session = self.ns.session()?;
        append_in(session.as_mut(), habit_id)
    }

    /// Returns everything pending and empties the outbox, atomically.
    pub fn drain(&self) -> Result<Vec<String>> {
        let mut session = self.ns.session()?;
        let pending = load(session.as_ref())?;
        session.remove(PENDING_KEY)?;
        tracing::debug!(drained = pending.len(), "Pending actions drained");
        Ok(pending)
    }

    /// Current contents without clearing.
    pub fn peek(&self) -> Result<Vec<String>> {
        let session = self.ns.session()?;
        load(session.as_ref())
    }

    /// Discards everything pending. Prefer `drain` when the contents matter.
    pub fn clear(&self) -> Result<()> {
        let mut session = self.ns.session()?;
        session.remove(PENDING_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WidgetError;
    use crate::namespace::MemoryNamespace;

    fn outbox() -> (Arc<MemoryNamespace>, Outbox) {
        let ns = Arc::new(MemoryNamespace::new());
        (ns.clone(), Outbox::new(ns))
    }

    #[test]
    fn test_append_then_drain() {
        let (_ns, outbox) = outbox();
        outbox.append("x").unwrap();
        outbox.append("y").unwrap();
        assert_eq!(outbox.drain().unwrap(), vec!["x", "y"]);
        assert!(outbox.drain().unwrap().is_empty());
    }

    #[test]
    fn test_duplicates_are_kept_in_order() {
        let (_ns, outbox) = outbox();
        outbox.append("x").unwrap();
        outbox.append("x").unwrap();
        assert_eq!(outbox.peek().unwrap(), vec!["x", "x"]);
    }

    #[test]
    fn test_peek_does_not_clear() {
        let (_ns, outbox) = outbox();
        outbox.append("x").unwrap();
        assert_eq!(outbox.peek().unwrap(), vec!["x"]);
        assert_eq!(outbox.peek().unwrap(), vec!["x"]);
    }

    #[test]
    fn test_clear() {
        let (ns, outbox) = outbox();
        outbox.append("x").unwrap();
        outbox.clear().unwrap();
        assert!(outbox.peek().unwrap().is_empty());
        assert!(!ns.snapshot().contains_key(PENDING_KEY));
    }

    #[test]
    fn test_canonical_encoding_is_json_array() {
        let (ns, outbox) = outbox();
        outbox.append("a,b").unwrap();
        assert_eq!(ns.snapshot()[PENDING_KEY], r#"["a,b"]"#);
        assert_eq!(outbox.peek().unwrap(), vec!["a,b"]);
    }

    #[test]
    fn test_legacy_comma_joined_is_migrated() {
        let (ns, outbox) = outbox();
        ns.insert_raw(PENDING_KEY, "h1,h2,h1");
        outbox.append("h3").unwrap();
        assert_eq!(ns.snapshot()[PENDING_KEY], r#"["h1","h2","h1","h3"]"#);
    }

    #[test]
    fn test_legacy_json_string_is_read() {
        let (ns, outbox) = outbox();
        ns.insert_raw(PENDING_KEY, r#""h1,h2""#);
        assert_eq!(outbox.drain().unwrap(), vec!["h1", "h2"]);
    }

    #[test]
    fn test_corrupt_array_reads_as_empty() {
        let (ns, outbox) = outbox();
        ns.insert_raw(PENDING_KEY, "[\"h1\",");
        assert!(outbox.peek().unwrap().is_empty());
        // Draining clears the corrupt entry too.
        assert!(outbox.drain().unwrap().is_empty());
        assert!(!ns.snapshot().contains_key(PENDING_KEY));
    }

    #[test]
    fn test_empty_id_rejected() {
        let (ns, outbox) = outbox();
        assert!(matches!(
            outbox.append(""),
            Err(WidgetError::InvalidArgument { .. })
        ));
        assert!(ns.snapshot().is_empty());
    }

    #[test]
    fn test_no_append_is_lost_while_draining() {
        let ns = Arc::new(MemoryNamespace::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let outbox = Outbox::new(ns.clone());
                std::thread::spawn(move || {
                    for i in 0..50 {
                        outbox.append(&format!("w{}-{}", w, i)).unwrap();
                    }
                })
            })
            .collect();

        let drainer = Outbox::new(ns.clone());
        let mut seen = Vec::new();
        while writers.iter().any(|w| !w.is_finished()) {
            seen.extend(drainer.drain().unwrap());
        }
        for writer in writers {
            writer.join().unwrap();
        }
        seen.extend(drainer.drain().unwrap());

        assert_eq!(seen.len(), 200);
    }
}
