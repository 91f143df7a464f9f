//! Host reputation lookup — the reference classifier. Each body entry is a
//! one-element array holding a hostname; the filter answers whether that
//! host appears in a loaded database (§1 worked example).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::task::Classifier;

/// A loaded host database. Stores a per-entry score even though the current
/// lookup path (matching the original) only ever returns 100 or 0 — kept so
/// the JSON loader can validate and reject out-of-range scores up front.
pub struct HostLookup {
    feed_name: String,
    database: HashMap<String, i32>,
}

#[derive(Deserialize)]
struct JsonDatabase {
    feed_name: String,
    data: Vec<JsonEntry>,
}

#[derive(Deserialize)]
struct JsonEntry {
    entry: String,
    #[serde(default)]
    score: Option<i64>,
}

impl HostLookup {
    /// Loads a text database (one hostname per non-empty line, feed name
    /// derived from the file's stem) or a JSON database (`{feed_name, data:
    /// [{entry, score?}]}`), matching `Generator::LoadConfig`.
    pub fn load(database_path: &str, db_type: &str) -> Result<Self, HostLookupError> {
        match db_type {
            "json" => Self::load_json(database_path),
            "text" | "" => Self::load_text(database_path),
            other => Err(HostLookupError::UnknownDbType(other.to_string())),
        }
    }

    fn load_text(path: &str) -> Result<Self, HostLookupError> {
        let content = fs::read_to_string(path).map_err(|e| HostLookupError::OpenFailed(path.to_string(), e))?;
        let mut database = HashMap::new();
        for line in content.lines() {
            if !line.is_empty() {
                database.insert(line.to_string(), 100);
            }
        }
        let feed_name = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { feed_name, database })
    }

    fn load_json(path: &str) -> Result<Self, HostLookupError> {
        let content = fs::read_to_string(path).map_err(|e| HostLookupError::OpenFailed(path.to_string(), e))?;
        let parsed: JsonDatabase = serde_json::from_str(&content).map_err(|_| HostLookupError::MalformedDatabase)?;

        if parsed.data.is_empty() {
            return Err(HostLookupError::EmptyDatabase);
        }

        let mut database = HashMap::new();
        for entry in parsed.data {
            let score = match entry.score {
                Some(s) if (0..=100).contains(&s) => s as i32,
                Some(_) => {
                    tracing::warn!(
                        feed_name = %parsed.feed_name,
                        entry = %entry.entry,
                        "score out of 0-100 range, defaulting to 100"
                    );
                    100
                }
                None => 100,
            };
            database.insert(entry.entry, score);
        }

        if database.is_empty() {
            return Err(HostLookupError::EmptyDatabase);
        }

        Ok(Self {
            feed_name: parsed.feed_name,
            database,
        })
    }

    pub fn feed_name(&self) -> &str {
        &self.feed_name
    }

    pub fn len(&self) -> usize {
        self.database.len()
    }
}

impl Classifier for HostLookup {
    fn filter_code(&self) -> u64 {
        // xxh3_64("HOSTLOOKUP"), matching DARWIN_FILTER_HOSTLOOKUP.
        crate::cache::fingerprint(b"HOSTLOOKUP")
    }

    /// Each entry must be a one-element array holding the hostname string.
    fn parse_entry(&self, entry: &serde_json::Value) -> Option<Vec<u8>> {
        let items = entry.as_array()?;
        if items.len() != 1 {
            return None;
        }
        let host = items[0].as_str()?;
        Some(host.as_bytes().to_vec())
    }

    /// Returns 100 if the host is present, 0 otherwise. The per-entry score
    /// loaded from a JSON database is not consulted here, matching
    /// `HostLookupTask::DBLookup`.
    fn classify(&self, entry: &[u8]) -> u32 {
        let host = String::from_utf8_lossy(entry);
        if self.database.contains_key(host.as_ref()) {
            100
        } else {
            0
        }
    }

    fn describe(&self, entry: &[u8]) -> String {
        String::from_utf8_lossy(entry).into_owned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostLookupError {
    #[error("cannot open host database {0}: {1}")]
    OpenFailed(String, std::io::Error),
    #[error("host database is not well-formed JSON")]
    MalformedDatabase,
    #[error("host database has no usable entries")]
    EmptyDatabase,
    #[error("unknown db_type '{0}'")]
    UnknownDbType(String),
}
