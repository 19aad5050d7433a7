use std::env;

use serde::{Deserialize, Serialize};

fn default_path() -> String {
    "nani_translation_history.json".to_string()
}

fn default_capacity() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSON file holding the local history
    #[serde(default = "default_path")]
    pub path: String,
    /// Oldest entries are dropped past this many
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl HistoryConfig {
    pub fn new() -> Self {
        let path = env::var("HISTORY_PATH").unwrap_or_else(|_| default_path());

        let capacity = env::var("HISTORY_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_capacity);

        Self { path, capacity }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            capacity: default_capacity(),
        }
    }
}
