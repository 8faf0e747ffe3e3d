//! JSON file persistence for fetched events.
//!
//! Two files are involved: the data file holding every event seen so far
//! (newest first) and a small state file holding the newest event of the
//! last fetch, used to skip refreshes that brought nothing new.

use crate::error::Result;
use crate::event::{Event, EventId};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub struct EventStore {
    data_file: PathBuf,
    state_file: PathBuf,
    /// Serializes whole ingest cycles.
    writer: Mutex<()>,
}

impl EventStore {
    pub fn new(data_file: impl Into<PathBuf>, state_file: impl Into<PathBuf>) -> Self {
        Self {
            data_file: data_file.into(),
            state_file: state_file.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// All stored events, newest first.
    ///
    /// A missing, empty or unreadable data file is an empty store.
    pub fn load(&self) -> Result<Vec<Event>> {
        let Some(value) = read_json(&self.data_file)? else {
            return Ok(Vec::new());
        };

        let Value::Array(items) = value else {
            log::warn!("{} does not hold a list, ignoring it", self.data_file.display());
            return Ok(Vec::new());
        };

        let mut events = Vec::with_capacity(items.len());
        for item in items {
            match Event::try_from(item) {
                Ok(event) => events.push(event),
                Err(e) => log::warn!("Skipping stored record: {}", e),
            }
        }

        log::debug!("Loaded {} events from {}", events.len(), self.data_file.display());
        Ok(events)
    }

    pub fn find(&self, id: EventId) -> Result<Option<Event>> {
        Ok(self.load()?.into_iter().find(|e| e.id() == id))
    }

    /// Merge a fetched batch into the store and return the events not seen
    /// before, newest first.
    ///
    /// When the newest fetched id equals the one recorded by the previous
    /// ingest, nothing is read or written and no events are returned.
    pub fn ingest(&self, mut fetched: Vec<Event>) -> Result<Vec<Event>> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        fetched.sort_by(|a, b| b.id().cmp(&a.id()));
        let Some(newest) = fetched.first() else {
            return Ok(Vec::new());
        };

        let newest = newest.clone();
        if self.recorded_id()? == Some(newest.id()) {
            log::debug!("No new events, last id: {}", newest.id());
            return Ok(Vec::new());
        }

        let mut stored = self.load()?;
        let mut seen: HashSet<EventId> = stored.iter().map(Event::id).collect();
        let new_events: Vec<Event> = fetched
            .into_iter()
            .filter(|e| seen.insert(e.id()))
            .collect();

        for event in &new_events {
            log::debug!("New event: {}", event.headline());
        }

        if !new_events.is_empty() {
            stored.extend(new_events.iter().cloned());
            stored.sort_by(|a, b| b.id().cmp(&a.id()));
            write_json(&self.data_file, &stored)?;
            log::info!(
                "Saved {} new and {} total events to {}",
                new_events.len(),
                stored.len(),
                self.data_file.display()
            );
        }

        // Recorded last: a failed data write leaves the batch unseen.
        write_json(&self.state_file, &newest)?;

        Ok(new_events)
    }

    /// Id of the newest event seen by the last successful ingest.
    fn recorded_id(&self) -> Result<Option<EventId>> {
        Ok(read_json(&self.state_file)?
            .and_then(|value| value.get("id").and_then(Value::as_u64)))
    }
}

/// Parse a JSON file. Missing, empty and corrupt files read as `None`.
fn read_json(path: &Path) -> Result<Option<Value>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if raw.trim().is_empty() {
        return Ok(None);
    }

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            log::warn!("{} is corrupt ({}), starting fresh", path.display(), e);
            Ok(None)
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}
