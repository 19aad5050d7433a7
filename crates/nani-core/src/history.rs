//! Bounded local translation history.
//!
//! Newest entries sit at the front; once the log holds more than its
//! capacity the oldest ones are dropped. On disk it is a plain JSON array.

use std::fs;
use std::io;
use std::path::Path;

use chrono::Utc;
use nani_types::TargetLanguage;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub text: String,
    pub target_lang: TargetLanguage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
}

impl HistoryEntry {
    pub fn new(id: impl Into<String>, text: impl Into<String>, target_lang: TargetLanguage) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            target_lang,
            result: None,
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid history file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn with_entries(mut entries: Vec<HistoryEntry>, capacity: usize) -> Self {
        entries.truncate(capacity);
        Self { entries, capacity }
    }

    /// Read the log from `path`; a missing file is an empty log
    pub fn load(path: &Path, capacity: usize) -> Result<Self, HistoryError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new(capacity)),
            Err(e) => return Err(e.into()),
        };

        let entries: Vec<HistoryEntry> = serde_json::from_str(&data)?;
        Ok(Self::with_entries(entries, capacity))
    }

    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        fs::write(path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }

    /// Insert at the front, dropping whatever falls past the capacity
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        if self.entries.len() > self.capacity {
            self.entries.truncate(self.capacity);
        }
    }

    pub fn update_result(&mut self, id: &str, result: &str) -> bool {
        let mut updated = false;
        for entry in self.entries.iter_mut().filter(|e| e.id == id) {
            entry.result = Some(result.to_string());
            updated = true;
        }
        updated
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
