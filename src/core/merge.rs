use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::config::{EventConfig, OverwritePolicy};
use crate::core::VideoRecord;
use crate::utils::parse_upload_date;

/// What the merge engine did with one fetched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// No prior record for this id; the fetched record was stored.
    AddedNew,
    /// New id skipped: the event already had records and the policy does not
    /// accept new files.
    SkippedNew,
    /// Prior record discarded and replaced wholesale (`overwrite.all`).
    Replaced,
    /// This many listed fields took the freshly fetched value.
    FieldsUpdated(usize),
    /// Prior record exists and the policy left every field alone.
    Untouched,
}

/// Apply event-level defaults to a freshly fetched full record: speakers
/// placeholder, event language, date-window resolution, and the tag /
/// related-URL unions. Minimal downloads skip this pass entirely, since
/// every field it touches needs human curation.
pub fn shape_for_event(record: &mut VideoRecord, event: &EventConfig) {
    if !record.fields.contains_key("speakers") {
        record.fields.insert("speakers".into(), json!(["TODO"]));
    }

    if !record.fields.contains_key("language") {
        if let Some(language) = &event.language {
            record.fields.insert("language".into(), json!(language));
        }
    }

    if let Some(dates) = &event.dates {
        let recorded = record
            .fields
            .get("recorded")
            .and_then(Value::as_str)
            .and_then(parse_upload_date);
        let resolved = dates.resolve(recorded);
        record
            .fields
            .insert("recorded".into(), json!(resolved.to_string()));
    }

    union_into(record, "tags", &event.tags);
    union_into(record, "related_urls", &event.related_urls);
}

/// Union event-level entries into a record's list field: event entries
/// first, then the video's own, duplicates removed.
fn union_into(record: &mut VideoRecord, field: &str, event_entries: &[String]) {
    let own: Vec<Value> = record
        .fields
        .get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if event_entries.is_empty() && own.is_empty() {
        return;
    }

    let mut merged: Vec<Value> = Vec::with_capacity(event_entries.len() + own.len());
    for entry in event_entries {
        let value = json!(entry);
        if !merged.contains(&value) {
            merged.push(value);
        }
    }
    for value in own {
        if !merged.contains(&value) {
            merged.push(value);
        }
    }
    record.fields.insert(field.into(), Value::Array(merged));
}

/// Decide, per field, whether the freshly fetched record is written over
/// whatever is already stored for the same id.
///
/// New ids are accepted under `all` or `add_new_files`, and also when the
/// event had no persisted records at all (a first scrape writes everything).
/// A field listed in `existing_files_fields` but absent from the fetch
/// leaves the stored value unchanged: nothing never overwrites something.
pub fn merge_record(
    records: &mut BTreeMap<String, VideoRecord>,
    fetched: VideoRecord,
    policy: &OverwritePolicy,
    had_prior_records: bool,
) -> MergeDecision {
    match records.get_mut(&fetched.id) {
        None => {
            let accept = match policy {
                OverwritePolicy::All => true,
                OverwritePolicy::Selective { add_new_files, .. } => {
                    *add_new_files || !had_prior_records
                }
            };
            if accept {
                records.insert(fetched.id.clone(), fetched);
                MergeDecision::AddedNew
            } else {
                MergeDecision::SkippedNew
            }
        }
        Some(current) => match policy {
            OverwritePolicy::All => {
                *current = fetched;
                MergeDecision::Replaced
            }
            OverwritePolicy::Selective {
                existing_files_fields,
                ..
            } => {
                let mut updated = 0;
                for field in existing_files_fields {
                    if let Some(value) = fetched.fields.get(field) {
                        if current.fields.get(field) != Some(value) {
                            updated += 1;
                        }
                        current.fields.insert(field.clone(), value.clone());
                    }
                }
                if updated > 0 {
                    MergeDecision::FieldsUpdated(updated)
                } else {
                    MergeDecision::Untouched
                }
            }
        },
    }
}
