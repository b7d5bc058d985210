//! Persistent translation results for the bulk generator.
//!
//! The file is a JSON document `{ generatedAt, entries: [...] }`. Entries are
//! keyed by `file_path`, emitted sorted by path, and a rerun skips any entry
//! whose file name is unchanged and whose status is `translated`.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::time::now_rfc3339;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("translation database is not valid JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Translated,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub file_path: String,
    pub file_name: String,
    #[serde(default)]
    pub translated_name: Option<String>,
    pub status: EntryStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub updated_at: String,
}

impl DatabaseEntry {
    fn new(file_path: &str, file_name: &str, status: EntryStatus) -> Self {
        Self {
            file_path: file_path.to_string(),
            file_name: file_name.to_string(),
            translated_name: None,
            status,
            error_message: None,
            updated_at: now_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseDocument {
    #[serde(default)]
    generated_at: String,
    #[serde(default)]
    entries: Vec<DatabaseEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationDatabase {
    entries: BTreeMap<String, DatabaseEntry>,
}

impl TranslationDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path`, treating a missing or unreadable file as an empty
    /// database.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(database) => database,
                Err(error) => {
                    warn!(
                        "ignoring malformed translation database {}: {}",
                        path.to_string_lossy(),
                        error
                    );
                    Self::new()
                }
            },
            Err(error) => {
                warn!(
                    "failed to read translation database {}: {}",
                    path.to_string_lossy(),
                    error
                );
                Self::new()
            }
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, DatabaseError> {
        let document: DatabaseDocument = serde_json::from_str(json)?;
        let mut database = Self::new();
        for entry in document.entries {
            database.upsert(entry);
        }
        Ok(database)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, file_path: &str) -> Option<&DatabaseEntry> {
        self.entries.get(file_path)
    }

    /// Entries in `file_path` order.
    pub fn entries(&self) -> impl Iterator<Item = &DatabaseEntry> {
        self.entries.values()
    }

    /// True when a previous run already translated this unchanged file.
    pub fn is_current(&self, file_path: &str, file_name: &str) -> bool {
        self.entries
            .get(file_path)
            .map(|entry| entry.file_name == file_name && entry.status == EntryStatus::Translated)
            .unwrap_or(false)
    }

    /// Last write wins per `file_path`.
    pub fn upsert(&mut self, entry: DatabaseEntry) {
        self.entries.insert(entry.file_path.clone(), entry);
    }

    pub fn mark_pending(&mut self, file_path: &str, file_name: &str) {
        self.upsert(DatabaseEntry::new(file_path, file_name, EntryStatus::Pending));
    }

    pub fn record_translated(&mut self, file_path: &str, file_name: &str, translated_name: &str) {
        let mut entry = DatabaseEntry::new(file_path, file_name, EntryStatus::Translated);
        entry.translated_name = Some(translated_name.to_string());
        self.upsert(entry);
    }

    pub fn record_skipped(&mut self, file_path: &str, file_name: &str) {
        self.upsert(DatabaseEntry::new(file_path, file_name, EntryStatus::Skipped));
    }

    pub fn record_failed(&mut self, file_path: &str, file_name: &str, message: &str) {
        let mut entry = DatabaseEntry::new(file_path, file_name, EntryStatus::Failed);
        entry.error_message = Some(message.to_string());
        self.upsert(entry);
    }

    /// Drops entries whose path is not in `visited`. Returns how many were
    /// removed.
    pub fn retain_paths(&mut self, visited: &HashSet<String>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| visited.contains(path));
        before - self.entries.len()
    }

    pub fn to_json_pretty(&self) -> Result<String, DatabaseError> {
        let document = DatabaseDocument {
            generated_at: now_rfc3339(),
            entries: self.entries.values().cloned().collect(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Writes the database next to `path` and renames it into place, keeping
    /// the previous file as `<name>.bak`.
    pub fn save(&self, path: &Path) -> Result<(), DatabaseError> {
        let contents = self.to_json_pretty()?;
        write_replacing(path, contents.as_bytes())
    }
}

fn write_replacing(target: &Path, contents: &[u8]) -> Result<(), DatabaseError> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = sibling_with_suffix(target, &format!(".tmp{}", std::process::id()));
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    if target.exists() {
        fs::copy(target, sibling_with_suffix(target, ".bak"))?;
    }

    #[cfg(target_os = "windows")]
    {
        if target.exists() {
            fs::remove_file(target)?;
        }
    }
    fs::rename(&temp_path, target)?;
    Ok(())
}

fn sibling_with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "translations.json".into());
    name.push(suffix);
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_or_malformed_files_load_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        assert!(TranslationDatabase::load(&path).is_empty());

        fs::write(&path, "{ not json").unwrap();
        assert!(TranslationDatabase::load(&path).is_empty());
    }

    #[test]
    fn translated_and_unchanged_entries_are_current() {
        let mut db = TranslationDatabase::new();
        db.record_translated("/a.jpg", "a.jpg", "A.jpg");
        db.record_failed("/b.jpg", "b.jpg", "HTTP 500");

        assert!(db.is_current("/a.jpg", "a.jpg"));
        assert!(!db.is_current("/a.jpg", "renamed.jpg"));
        assert!(!db.is_current("/b.jpg", "b.jpg"));
        assert!(!db.is_current("/c.jpg", "c.jpg"));
    }

    #[test]
    fn last_write_wins() {
        let mut db = TranslationDatabase::new();
        db.record_failed("/x/写真.jpg", "写真.jpg", "timeout");
        db.record_translated("/x/写真.jpg", "写真.jpg", "Photo.jpg");

        let entry = db.get("/x/写真.jpg").unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(entry.status, EntryStatus::Translated);
        assert_eq!(entry.translated_name.as_deref(), Some("Photo.jpg"));
        assert_eq!(entry.error_message, None);
    }

    #[test]
    fn saves_sorted_document_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("db.json");
        let mut db = TranslationDatabase::new();
        db.record_skipped("/z.txt", "z.txt");
        db.record_translated("/a/猫.png", "猫.png", "Cat.png");
        db.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["generatedAt"].is_string());
        let entries = raw["entries"].as_array().unwrap();
        assert_eq!(entries[0]["file_path"], "/a/猫.png");
        assert_eq!(entries[0]["status"], "translated");
        assert_eq!(entries[1]["file_path"], "/z.txt");
        assert_eq!(entries[1]["translated_name"], serde_json::Value::Null);
        assert_eq!(entries[1]["status"], "skipped");

        let reloaded = TranslationDatabase::load(&path);
        assert_eq!(reloaded, db);
    }

    #[test]
    fn save_keeps_a_backup_of_the_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let mut db = TranslationDatabase::new();
        db.record_skipped("/one", "one");
        db.save(&path).unwrap();
        db.record_skipped("/two", "two");
        db.save(&path).unwrap();

        let backup = TranslationDatabase::load(&dir.path().join("db.json.bak"));
        assert_eq!(backup.len(), 1);
        assert_eq!(TranslationDatabase::load(&path).len(), 2);
    }

    #[test]
    fn retain_paths_prunes_unvisited() {
        let mut db = TranslationDatabase::new();
        db.record_skipped("/keep", "keep");
        db.record_skipped("/gone", "gone");
        let visited: HashSet<String> = ["/keep".to_string()].into_iter().collect();

        assert_eq!(db.retain_paths(&visited), 1);
        assert!(db.get("/gone").is_none());
    }
}
