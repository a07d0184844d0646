use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read events file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse events file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("event #{index} ({title}): missing required field `{field}`")]
    MissingField {
        index: usize,
        title: String,
        field: &'static str,
    },
    #[error("event #{index} ({title}): dates.end {end} is before dates.begin {begin}")]
    DateOrder {
        index: usize,
        title: String,
        begin: NaiveDate,
        end: NaiveDate,
    },
}

/// The operator-supplied events file: the archival repository to write into
/// plus an ordered list of events to scrape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsFile {
    pub repo_dir: PathBuf,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

/// One conference whose talk videos are scraped as a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventConfig {
    #[serde(default)]
    pub title: String,
    /// Directory name under the repository root, also used as the branch name.
    #[serde(default)]
    pub dir: String,
    /// Tracking issue number referenced in commit messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<u64>,
    /// One or more video/playlist/channel URLs; a bare string is accepted.
    #[serde(default)]
    pub youtube_list: SourceList,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dates: Option<DateWindow>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub minimal_download: bool,
    #[serde(default, skip_serializing_if = "OverwriteSpec::is_empty")]
    pub overwrite: OverwriteSpec,
}

impl EventConfig {
    pub fn policy(&self) -> OverwritePolicy {
        self.overwrite.policy()
    }
}

/// `youtube_list: <url>` and `youtube_list: [<url>, ...]` are both valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceList {
    One(String),
    Many(Vec<String>),
}

impl Default for SourceList {
    fn default() -> Self {
        SourceList::Many(Vec::new())
    }
}

impl SourceList {
    pub fn urls(&self) -> &[String] {
        match self {
            SourceList::One(url) => std::slice::from_ref(url),
            SourceList::Many(urls) => urls,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SourceList::One(url) => url.is_empty(),
            SourceList::Many(urls) => urls.is_empty(),
        }
    }
}

/// The date window an event's talks were recorded in. `end` and `default`
/// fall back to `begin` when omitted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateWindow {
    pub begin: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<NaiveDate>,
}

impl DateWindow {
    pub fn end(&self) -> NaiveDate {
        self.end.unwrap_or(self.begin)
    }

    pub fn fallback(&self) -> NaiveDate {
        self.default.unwrap_or(self.begin)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.begin <= date && date <= self.end()
    }

    /// Resolve a video's recorded date: kept when inside the window,
    /// replaced with the configured default when absent or outside it.
    pub fn resolve(&self, recorded: Option<NaiveDate>) -> NaiveDate {
        match recorded {
            Some(date) if self.contains(date) => date,
            _ => self.fallback(),
        }
    }
}

/// Raw `overwrite:` section as written in YAML. `all` wins over the other
/// two when both are present; see [`OverwritePolicy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwriteSpec {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub add_new_files: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub existing_files_fields: Vec<String>,
}

impl OverwriteSpec {
    pub fn is_empty(&self) -> bool {
        !self.all && !self.add_new_files && self.existing_files_fields.is_empty()
    }

    pub fn policy(&self) -> OverwritePolicy {
        if self.all {
            OverwritePolicy::All
        } else {
            OverwritePolicy::Selective {
                add_new_files: self.add_new_files,
                existing_files_fields: self.existing_files_fields.clone(),
            }
        }
    }
}

/// Validated overwrite policy. The tagged form makes "all plus field list"
/// unrepresentable: `All` discards the whole prior record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Replace existing records wholesale and accept new ones.
    All,
    /// Composable partial policy; both parts empty is the no-op default.
    Selective {
        add_new_files: bool,
        existing_files_fields: Vec<String>,
    },
}

pub fn load_events(path: &Path) -> Result<EventsFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: EventsFile = serde_yaml::from_str(&text)?;
    for (index, event) in file.events.iter().enumerate() {
        validate_event(index, event)?;
    }
    Ok(file)
}

fn validate_event(index: usize, event: &EventConfig) -> Result<(), ConfigError> {
    let missing = |field| ConfigError::MissingField {
        index,
        title: event.title.clone(),
        field,
    };
    if event.title.is_empty() {
        return Err(missing("title"));
    }
    if event.dir.is_empty() {
        return Err(missing("dir"));
    }
    if event.youtube_list.is_empty() {
        return Err(missing("youtube_list"));
    }
    if let Some(dates) = &event.dates {
        if dates.end() < dates.begin {
            return Err(ConfigError::DateOrder {
                index,
                title: event.title.clone(),
                begin: dates.begin,
                end: dates.end(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parses_single_url_and_list() {
        let one: EventConfig =
            serde_yaml::from_str("title: T\ndir: t\nyoutube_list: https://example.com/a").unwrap();
        assert_eq!(one.youtube_list.urls(), ["https://example.com/a"]);

        let many: EventConfig = serde_yaml::from_str(
            "title: T\ndir: t\nyoutube_list:\n  - https://example.com/a\n  - https://example.com/b",
        )
        .unwrap();
        assert_eq!(many.youtube_list.urls().len(), 2);
    }

    #[test]
    fn defaults_for_optional_fields() {
        let event: EventConfig = serde_yaml::from_str("title: T\ndir: t\nyoutube_list: u").unwrap();
        assert!(!event.minimal_download);
        assert!(event.overwrite.is_empty());
        assert!(event.tags.is_empty());
        assert!(event.dates.is_none());
    }

    #[test]
    fn all_takes_precedence_over_partial_policy() {
        let spec = OverwriteSpec {
            all: true,
            add_new_files: true,
            existing_files_fields: vec!["duration".into()],
        };
        assert_eq!(spec.policy(), OverwritePolicy::All);
    }

    #[test]
    fn empty_spec_is_noop_selective() {
        assert_eq!(
            OverwriteSpec::default().policy(),
            OverwritePolicy::Selective {
                add_new_files: false,
                existing_files_fields: vec![],
            }
        );
    }

    #[test]
    fn missing_dir_is_rejected_with_index() {
        let event: EventConfig = serde_yaml::from_str("title: PyConES\nyoutube_list: u").unwrap();
        let err = validate_event(3, &event).unwrap_err();
        match err {
            ConfigError::MissingField { index, field, .. } => {
                assert_eq!(index, 3);
                assert_eq!(field, "dir");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn end_before_begin_is_rejected() {
        let event: EventConfig = serde_yaml::from_str(
            "title: T\ndir: t\nyoutube_list: u\ndates:\n  begin: 2024-05-10\n  end: 2024-05-01",
        )
        .unwrap();
        assert!(matches!(
            validate_event(0, &event),
            Err(ConfigError::DateOrder { .. })
        ));
    }

    #[test]
    fn date_window_resolution() {
        let window = DateWindow {
            begin: date("2024-05-01"),
            end: Some(date("2024-05-03")),
            default: Some(date("2024-05-02")),
        };
        assert_eq!(window.resolve(Some(date("2024-05-01"))), date("2024-05-01"));
        assert_eq!(window.resolve(Some(date("2024-06-15"))), date("2024-05-02"));
        assert_eq!(window.resolve(None), date("2024-05-02"));
    }

    #[test]
    fn date_window_end_and_default_fall_back_to_begin() {
        let window = DateWindow {
            begin: date("2024-05-01"),
            end: None,
            default: None,
        };
        assert_eq!(window.end(), date("2024-05-01"));
        assert_eq!(window.resolve(Some(date("2024-07-01"))), date("2024-05-01"));
    }
}
