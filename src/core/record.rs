use regex::Regex;
use serde_json::{json, Map, Value};

use crate::utils::parse_upload_date;

/// Field names the archival format recognizes; anything else coming back
/// from the extraction tool is dropped during normalization.
pub const RECOGNIZED_FIELDS: &[&str] = &[
    "copyright_text",
    "description",
    "duration",
    "language",
    "recorded",
    "related_urls",
    "speakers",
    "tags",
    "thumbnail_url",
    "title",
    "videos",
];

/// Fields that need no human curation. A minimal download keeps only these;
/// speakers, title, tags and the reviewed recorded date are left for a later
/// full pass.
pub const MINIMAL_FIELDS: &[&str] = &[
    "copyright_text",
    "duration",
    "recorded",
    "thumbnail_url",
    "videos",
];

/// One video's metadata: the platform id it is keyed by, and a mapping of
/// recognized field names to values. Missing fields are absent from the map,
/// never null-filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoRecord {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl VideoRecord {
    /// Normalize a raw yt-dlp info JSON into the recognized field set.
    pub fn from_ytdlp(id: &str, info: &Value) -> Self {
        let mut fields = Map::new();

        let title = info
            .get("fulltitle")
            .and_then(Value::as_str)
            .or_else(|| info.get("title").and_then(Value::as_str))
            .or_else(|| info.get("_filename").and_then(Value::as_str))
            .unwrap_or("Unknown");
        fields.insert("title".into(), json!(title));

        if let Some(description) = info.get("description").and_then(Value::as_str) {
            fields.insert("description".into(), json!(description));
            let harvested = harvest_urls(description);
            if !harvested.is_empty() {
                fields.insert("related_urls".into(), json!(harvested));
            }
        }
        if let Some(duration) = info
            .get("duration")
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
        {
            fields.insert("duration".into(), json!(duration));
        }
        if let Some(thumbnail) = info.get("thumbnail").and_then(Value::as_str) {
            fields.insert("thumbnail_url".into(), json!(thumbnail));
        }
        if let Some(license) = info.get("license").and_then(Value::as_str) {
            fields.insert("copyright_text".into(), json!(license));
        }
        if let Some(language) = extract_language(info) {
            fields.insert("language".into(), json!(language));
        }
        if let Some(recorded) = info
            .get("upload_date")
            .and_then(Value::as_str)
            .and_then(parse_upload_date)
        {
            fields.insert("recorded".into(), json!(recorded.to_string()));
        }
        if let Some(tags) = info.get("tags").and_then(Value::as_array) {
            let tags: Vec<&str> = tags.iter().filter_map(Value::as_str).collect();
            if !tags.is_empty() {
                fields.insert("tags".into(), json!(tags));
            }
        }
        if let Some(url) = info.get("webpage_url").and_then(Value::as_str) {
            fields.insert("videos".into(), json!([{"type": "youtube", "url": url}]));
        }

        Self {
            id: id.to_string(),
            fields,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }

    /// The watch URL stored in the `videos` list, if any.
    pub fn source_url(&self) -> Option<&str> {
        self.fields
            .get("videos")
            .and_then(Value::as_array)
            .and_then(|v| v.first())
            .and_then(|entry| entry.get("url"))
            .and_then(Value::as_str)
    }

    /// Strip the record down to the fields a minimal download may carry.
    pub fn retain_minimal(&mut self) {
        self.fields
            .retain(|name, _| MINIMAL_FIELDS.contains(&name.as_str()));
    }

    /// Serialize to the on-disk shape: pretty-printed JSON with sorted keys
    /// and a trailing newline, so files stay human-diffable.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        let mut text = serde_json::to_string_pretty(&self.fields)?;
        text.push('\n');
        Ok(text)
    }
}

fn extract_language(info: &Value) -> Option<String> {
    if let Some(language) = info.get("language").and_then(Value::as_str) {
        return Some(language.to_string());
    }
    info.get("formats")
        .and_then(Value::as_array)
        .and_then(|formats| formats.first())
        .and_then(|format| format.get("language"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

/// Pull http(s) URLs out of a description, first occurrence wins.
fn harvest_urls(description: &str) -> Vec<String> {
    let mut urls = Vec::new();
    if let Ok(re) = Regex::new(r"https?://[^ \\\n\t()\[\]]+") {
        for m in re.find_iter(description) {
            let url = m.as_str().to_string();
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> Value {
        json!({
            "id": "abc123",
            "fulltitle": "Fearless Concurrency",
            "title": "Fearless Concurrency (short)",
            "description": "Slides at https://example.com/slides and https://example.com/slides again",
            "duration": 1825,
            "thumbnail": "https://i.ytimg.com/vi/abc123/maxresdefault.jpg",
            "license": "CC-BY",
            "upload_date": "20240503",
            "tags": ["rust", "concurrency"],
            "webpage_url": "https://www.youtube.com/watch?v=abc123",
            "formats": [{"format_id": "22", "language": "en"}],
            "view_count": 4242,
            "uploader": "ConfChannel"
        })
    }

    #[test]
    fn normalizes_recognized_fields() {
        let record = VideoRecord::from_ytdlp("abc123", &sample_info());
        assert_eq!(record.title(), Some("Fearless Concurrency"));
        assert_eq!(record.fields["duration"], json!(1825));
        assert_eq!(record.fields["copyright_text"], json!("CC-BY"));
        assert_eq!(record.fields["language"], json!("en"));
        assert_eq!(record.fields["recorded"], json!("2024-05-03"));
        assert_eq!(
            record.source_url(),
            Some("https://www.youtube.com/watch?v=abc123")
        );
        // unrecognized incoming fields are dropped
        assert!(!record.fields.contains_key("view_count"));
        assert!(!record.fields.contains_key("uploader"));
    }

    #[test]
    fn missing_fields_stay_absent() {
        let record = VideoRecord::from_ytdlp("x", &json!({"title": "T"}));
        assert!(!record.fields.contains_key("duration"));
        assert!(!record.fields.contains_key("description"));
        assert!(!record.fields.values().any(Value::is_null));
    }

    #[test]
    fn title_fallback_chain() {
        let record = VideoRecord::from_ytdlp("x", &json!({"title": "Plain"}));
        assert_eq!(record.title(), Some("Plain"));
        let record = VideoRecord::from_ytdlp("x", &json!({"_filename": "talk.mp4"}));
        assert_eq!(record.title(), Some("talk.mp4"));
        let record = VideoRecord::from_ytdlp("x", &json!({}));
        assert_eq!(record.title(), Some("Unknown"));
    }

    #[test]
    fn harvests_description_urls_deduplicated() {
        let record = VideoRecord::from_ytdlp("abc123", &sample_info());
        assert_eq!(
            record.fields["related_urls"],
            json!(["https://example.com/slides"])
        );
    }

    #[test]
    fn retain_minimal_drops_curated_fields() {
        let mut record = VideoRecord::from_ytdlp("abc123", &sample_info());
        record.retain_minimal();
        for name in ["title", "tags", "description", "speakers", "language"] {
            assert!(!record.fields.contains_key(name), "{name} should be gone");
        }
        for name in MINIMAL_FIELDS {
            assert!(record.fields.contains_key(*name), "{name} should survive");
        }
    }

    #[test]
    fn json_output_is_sorted_and_newline_terminated() {
        let record = VideoRecord::from_ytdlp("abc123", &sample_info());
        let text = record.to_json_string().unwrap();
        assert!(text.ends_with('\n'));
        let title_pos = text.find("\"title\"").unwrap();
        let duration_pos = text.find("\"duration\"").unwrap();
        assert!(duration_pos < title_pos);
    }

    #[test]
    fn normalization_stays_within_recognized_fields() {
        let record = VideoRecord::from_ytdlp("abc123", &sample_info());
        for name in record.fields.keys() {
            assert!(
                RECOGNIZED_FIELDS.contains(&name.as_str()),
                "{name} is not a recognized field"
            );
        }
        for name in MINIMAL_FIELDS {
            assert!(RECOGNIZED_FIELDS.contains(name), "{name} is not recognized");
        }
    }

    #[test]
    fn fractional_duration_truncates() {
        let record = VideoRecord::from_ytdlp("x", &json!({"duration": 90.7}));
        assert_eq!(record.fields["duration"], json!(90));
    }
}
