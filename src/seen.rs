use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ParsedNotification;

/// Local history for one notification thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenEntry {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub pr_number: u64,
    pub repo: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_history: Option<Vec<DateTime<Utc>>>,
}

impl SeenEntry {
    fn blank(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            pr_number: 0,
            repo: String::new(),
            title: String::new(),
            unsubscribed: None,
            done_history: None,
        }
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.unwrap_or(false)
    }

    /// Most recent time this thread was marked done
    pub fn last_done(&self) -> Option<DateTime<Utc>> {
        self.done_history.as_ref()?.iter().max().copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeenData {
    #[serde(default)]
    pub seen: HashMap<String, SeenEntry>,
}

/// Thread id -> SeenEntry map persisted as a single JSON document.
/// The whole file is rewritten on every save (last writer wins).
#[derive(Debug, Clone)]
pub struct SeenStore {
    path: Option<PathBuf>,
    data: SeenData,
}

/// ~/.gh-notifications-seen.json
pub fn default_path() -> Option<PathBuf> {
    Some(dirs::home_dir()?.join(".gh-notifications-seen.json"))
}

impl SeenStore {
    /// Load from disk. Missing or corrupt files load as an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| match serde_json::from_str::<SeenData>(&raw) {
                Ok(data) => Some(data),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring malformed seen file");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            path: Some(path),
            data,
        }
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: SeenData::default(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, thread_id: &str) -> Option<&SeenEntry> {
        self.data.seen.get(thread_id)
    }

    pub fn len(&self) -> usize {
        self.data.seen.len()
    }

    /// Stamp every fetched thread as seen, creating entries for new ones.
    pub fn record_fetch(&mut self, notifications: &[ParsedNotification], now: DateTime<Utc>) {
        for n in notifications {
            self.data
                .seen
                .entry(n.id.clone())
                .and_modify(|entry| entry.last_seen = now)
                .or_insert_with(|| SeenEntry {
                    pr_number: n.number,
                    repo: n.repo.clone(),
                    title: n.title.clone(),
                    ..SeenEntry::blank(now)
                });
        }
    }

    pub fn record_done(&mut self, thread_id: &str, now: DateTime<Utc>) {
        let entry = self
            .data
            .seen
            .entry(thread_id.to_string())
            .or_insert_with(|| SeenEntry::blank(now));
        entry.done_history.get_or_insert_with(Vec::new).push(now);
    }

    pub fn record_unsubscribed(&mut self, thread_id: &str, now: DateTime<Utc>) {
        let entry = self
            .data
            .seen
            .entry(thread_id.to_string())
            .or_insert_with(|| SeenEntry::blank(now));
        entry.unsubscribed = Some(true);
    }

    /// Write the whole store back. Failures are logged, never fatal.
    pub fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_json::to_string_pretty(&self.data)
            .map_err(std::io::Error::other)
            .and_then(|data| std::fs::write(path, data));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "could not save seen file");
        }
    }
}
