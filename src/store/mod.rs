use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EventConfig;
use crate::core::VideoRecord;
use crate::utils::{slugify, video_id_from_url};

/// Bookkeeping file listing events fetched via minimal download, reusable
/// later as a seed configuration.
pub const MINIMAL_DONE_FILE: &str = "minimal_download_done.yml";
/// Bookkeeping file listing events considered fully processed.
pub const DONE_FILE: &str = "done.yml";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize record {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize bookkeeping file {path}: {source}")]
    Bookkeeping {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// The persisted state of one event: its directory, its id-keyed records,
/// and the file stems they were read from.
pub struct EventState {
    event_dir: PathBuf,
    pub records: BTreeMap<String, VideoRecord>,
    slugs: HashMap<String, String>,
    stale: Vec<String>,
    had_prior_records: bool,
}

impl EventState {
    pub fn video_dir(&self) -> PathBuf {
        self.event_dir.join("videos")
    }

    /// Whether any records were already on disk when the event was loaded.
    /// The merge engine uses this to accept every video of a first scrape.
    pub fn had_prior_records(&self) -> bool {
        self.had_prior_records
    }

    /// Read an event's previously persisted records back from disk. A
    /// missing directory is an event never scraped before. Files that no
    /// longer parse are logged and ignored rather than failing the event.
    pub fn load(event_dir: &Path) -> Result<Self, StoreError> {
        let mut state = Self {
            event_dir: event_dir.to_path_buf(),
            records: BTreeMap::new(),
            slugs: HashMap::new(),
            stale: Vec::new(),
            had_prior_records: false,
        };
        let video_dir = state.video_dir();
        if !video_dir.is_dir() {
            return Ok(state);
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&video_dir)
            .map_err(|source| StoreError::Io {
                path: video_dir.clone(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
            .collect();
        paths.sort();

        for path in paths {
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(err) => {
                    warn!("skipping unreadable record {}: {err}", path.display());
                    continue;
                }
            };
            let fields: serde_json::Map<String, serde_json::Value> =
                match serde_json::from_str(&text) {
                    Ok(fields) => fields,
                    Err(err) => {
                        warn!("skipping unparseable record {}: {err}", path.display());
                        continue;
                    }
                };
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let mut record = VideoRecord {
                id: String::new(),
                fields,
            };
            // Records are keyed by the platform id stored in their watch
            // URL; files without one fall back to their own file stem.
            let id = record
                .source_url()
                .and_then(video_id_from_url)
                .unwrap_or_else(|| stem.clone());
            record.id = id;
            state.slugs.insert(record.id.clone(), stem);
            state.records.insert(record.id.clone(), record);
        }
        state.had_prior_records = !state.records.is_empty();
        debug!(
            "loaded {} existing records from {}",
            state.records.len(),
            video_dir.display()
        );
        Ok(state)
    }

    /// Drop the remembered file stem for a record, so the next save names
    /// it after its current title. The old file is removed on save unless
    /// the fresh title resolves to the same stem.
    pub fn forget_stem(&mut self, id: &str) {
        if let Some(stem) = self.slugs.remove(id) {
            self.stale.push(stem);
        }
    }

    /// Write the event's records and category file, then remove files whose
    /// records were renamed. Every file body is serialized before the first
    /// write, so a serialization failure leaves the directory untouched.
    pub fn save(&self, title: &str) -> Result<(), StoreError> {
        let category = json!({ "title": title });
        let mut category_text =
            serde_json::to_string_pretty(&category).map_err(|source| StoreError::Serialize {
                id: "category".into(),
                source,
            })?;
        category_text.push('\n');

        let mut files: Vec<(PathBuf, String)> =
            vec![(self.event_dir.join("category.json"), category_text)];

        let mut used: HashSet<String> = self.slugs.values().cloned().collect();
        let mut written: HashSet<String> = HashSet::new();
        let video_dir = self.video_dir();
        for record in self.records.values() {
            let stem = match self.slugs.get(&record.id) {
                Some(stem) => stem.clone(),
                None => {
                    let base = record
                        .title()
                        .map(slugify)
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| record.id.clone());
                    let stem = dedupe_stem(base, &used);
                    used.insert(stem.clone());
                    stem
                }
            };
            written.insert(stem.clone());
            let text = record
                .to_json_string()
                .map_err(|source| StoreError::Serialize {
                    id: record.id.clone(),
                    source,
                })?;
            files.push((video_dir.join(format!("{stem}.json")), text));
        }

        std::fs::create_dir_all(&video_dir).map_err(|source| StoreError::Io {
            path: video_dir.clone(),
            source,
        })?;
        for (path, text) in files {
            std::fs::write(&path, text).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            debug!("wrote {}", path.display());
        }

        for stem in &self.stale {
            if written.contains(stem) {
                continue;
            }
            let path = video_dir.join(format!("{stem}.json"));
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("removed {}", path.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
        Ok(())
    }
}

fn dedupe_stem(base: String, used: &HashSet<String>) -> String {
    if !used.contains(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !used.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EventList {
    #[serde(default)]
    events: Vec<EventConfig>,
}

/// A bookkeeping file in the events-file format: read at startup to skip
/// finished work, rewritten whenever an event completes.
pub struct Bookkeeping {
    path: PathBuf,
    events: Vec<EventConfig>,
}

impl Bookkeeping {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let events = match std::fs::read_to_string(path) {
            Ok(text) => {
                let list: EventList =
                    serde_yaml::from_str(&text).map_err(|source| StoreError::Bookkeeping {
                        path: path.to_path_buf(),
                        source,
                    })?;
                list.events
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            events,
        })
    }

    pub fn contains(&self, dir: &str) -> bool {
        self.events.iter().any(|event| event.dir == dir)
    }

    /// Append an event (if not present yet) and rewrite the file.
    pub fn record(&mut self, event: &EventConfig) -> Result<(), StoreError> {
        if !self.contains(&event.dir) {
            self.events.push(event.clone());
        }
        let list = EventList {
            events: self.events.clone(),
        };
        let text = serde_yaml::to_string(&list).map_err(|source| StoreError::Bookkeeping {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, text).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_appends_counter() {
        let mut used = HashSet::new();
        assert_eq!(dedupe_stem("talk".into(), &used), "talk");
        used.insert("talk".into());
        assert_eq!(dedupe_stem("talk".into(), &used), "talk-2");
        used.insert("talk-2".into());
        assert_eq!(dedupe_stem("talk".into(), &used), "talk-3");
    }

    #[test]
    fn load_of_missing_dir_is_fresh_event() {
        let temp = tempfile::tempdir().unwrap();
        let state = EventState::load(&temp.path().join("no-such-event")).unwrap();
        assert!(state.records.is_empty());
        assert!(!state.had_prior_records());
    }

    #[test]
    fn forget_stem_keeps_file_when_slug_unchanged() {
        let temp = tempfile::tempdir().unwrap();
        let event_dir = temp.path().join("conf-2024");
        let video_dir = event_dir.join("videos");
        std::fs::create_dir_all(&video_dir).unwrap();
        std::fs::write(
            video_dir.join("talk-one.json"),
            r#"{"title": "Talk One", "videos": [{"type": "youtube", "url": "https://youtu.be/a1"}]}"#,
        )
        .unwrap();

        let mut state = EventState::load(&event_dir).unwrap();
        state.forget_stem("a1");
        state.save("Conf 2024").unwrap();
        assert!(video_dir.join("talk-one.json").exists());
    }

    #[test]
    fn bookkeeping_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(DONE_FILE);
        let mut book = Bookkeeping::load(&path).unwrap();
        assert!(!book.contains("pycones-2024"));

        let event = EventConfig {
            title: "PyConES 2024".into(),
            dir: "pycones-2024".into(),
            ..Default::default()
        };
        book.record(&event).unwrap();
        book.record(&event).unwrap();

        let reloaded = Bookkeeping::load(&path).unwrap();
        assert!(reloaded.contains("pycones-2024"));
        assert_eq!(reloaded.events.len(), 1);
    }
}
