//! Persistent store for completed conversation turns.
//!
//! Each conversation becomes one session record, created on its first
//! successful turn and appended to on later ones. Records are
//! file-per-session JSON under the platform config directory. The store
//! is the sole mutator of records; the engine only supplies completed
//! turn data, and cancelled turns never reach it.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TITLE_LIMIT: usize = 40;

/// One prompt-and-response exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTurn {
    pub prompt: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

/// A saved conversation, keyed by id. Turns are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub turns: Vec<SessionTurn>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    fn new(first_turn: SessionTurn) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: derive_title(&first_turn.prompt),
            turns: vec![first_turn],
            created_at: Utc::now(),
        }
    }

    fn filename(&self) -> String {
        format!("{}.json", self.id)
    }
}

/// Title from the first prompt, truncated.
fn derive_title(prompt: &str) -> String {
    let mut title: String = prompt.chars().take(TITLE_LIMIT).collect::<String>().trim().to_string();
    if prompt.chars().count() > TITLE_LIMIT {
        title.push_str("...");
    }
    if title.is_empty() {
        title = "New conversation".to_string();
    }
    title
}

/// File-backed session store with an in-memory index.
pub struct HistoryStore {
    base_path: PathBuf,
    records: HashMap<String, SessionRecord>,
}

impl HistoryStore {
    /// Store under the platform config directory.
    pub fn new() -> Self {
        Self::with_base_path(Self::default_base_path())
    }

    /// Store under an explicit directory (tests, portable installs).
    pub fn with_base_path(base_path: PathBuf) -> Self {
        let mut store = Self {
            base_path,
            records: HashMap::new(),
        };
        store.load_all();
        store
    }

    fn default_base_path() -> PathBuf {
        directories::ProjectDirs::from("com.local", "Gemini Bridge", "GeminiBridge")
            .map(|p| p.config_dir().join("sessions"))
            .unwrap_or_else(|| PathBuf::from("./sessions"))
    }

    fn load_all(&mut self) {
        let _ = fs::create_dir_all(&self.base_path);
        if let Ok(entries) = fs::read_dir(&self.base_path) {
            for entry in entries.flatten() {
                if let Ok(content) = fs::read_to_string(entry.path()) {
                    match serde_json::from_str::<SessionRecord>(&content) {
                        Ok(record) => {
                            self.records.insert(record.id.clone(), record);
                        }
                        Err(e) => {
                            tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable session record");
                        }
                    }
                }
            }
        }
    }

    /// All records, newest first.
    pub fn list(&self) -> Vec<&SessionRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    pub fn get(&self, id: &str) -> Option<&SessionRecord> {
        self.records.get(id)
    }

    /// First successful turn of a new conversation: creates the record
    /// and returns it.
    pub fn create(&mut self, turn: SessionTurn) -> Result<SessionRecord> {
        let record = SessionRecord::new(turn);
        self.save(&record)?;
        self.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    /// Later successful turn of an existing conversation.
    pub fn append(&mut self, id: &str, turn: SessionTurn) -> Result<()> {
        let record = self
            .records
            .get_mut(id)
            .with_context(|| format!("no session record {id}"))?;
        record.turns.push(turn);
        let record = record.clone();
        self.save(&record)
    }

    /// Explicit user deletion.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        if let Some(record) = self.records.remove(id) {
            let path = self.base_path.join(record.filename());
            fs::remove_file(&path)
                .with_context(|| format!("removing {}", path.display()))?;
        }
        Ok(())
    }

    fn save(&self, record: &SessionRecord) -> Result<()> {
        fs::create_dir_all(&self.base_path)?;
        let path = self.base_path.join(record.filename());
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(prompt: &str, response: &str) -> SessionTurn {
        SessionTurn {
            prompt: prompt.into(),
            response: response.into(),
            image_ref: None,
        }
    }

    #[test]
    fn create_then_append_keeps_turn_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HistoryStore::with_base_path(dir.path().to_path_buf());

        let record = store.create(turn("what is rust", "a language")).unwrap();
        store.append(&record.id, turn("and cargo?", "its build tool")).unwrap();

        let loaded = store.get(&record.id).unwrap();
        assert_eq!(loaded.turns.len(), 2);
        assert_eq!(loaded.turns[0].prompt, "what is rust");
        assert_eq!(loaded.turns[1].response, "its build tool");
    }

    #[test]
    fn records_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let mut store = HistoryStore::with_base_path(dir.path().to_path_buf());
            store.create(turn("persist me", "done")).unwrap().id
        };

        let store = HistoryStore::with_base_path(dir.path().to_path_buf());
        let record = store.get(&id).unwrap();
        assert_eq!(record.turns[0].prompt, "persist me");
        assert_eq!(record.title, "persist me");
    }

    #[test]
    fn long_prompts_truncate_into_the_title() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HistoryStore::with_base_path(dir.path().to_path_buf());
        let prompt = "x".repeat(80);
        let record = store.create(turn(&prompt, "ok")).unwrap();
        assert_eq!(record.title.chars().count(), TITLE_LIMIT + 3);
        assert!(record.title.ends_with("..."));
    }

    #[test]
    fn delete_removes_record_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HistoryStore::with_base_path(dir.path().to_path_buf());
        let record = store.create(turn("ephemeral", "gone soon")).unwrap();

        store.delete(&record.id).unwrap();
        assert!(store.get(&record.id).is_none());

        let reloaded = HistoryStore::with_base_path(dir.path().to_path_buf());
        assert!(reloaded.list().is_empty());
    }

    #[test]
    fn append_to_unknown_session_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HistoryStore::with_base_path(dir.path().to_path_buf());
        assert!(store.append("missing", turn("a", "b")).is_err());
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = SessionRecord::new(turn("hi", "hello"));
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("createdAt").is_some());
    }
}
