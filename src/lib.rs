pub mod cli;
pub mod config;
pub mod core;
pub mod fetch;
pub mod repo;
pub mod store;
pub mod utils;

pub use config::{EventConfig, EventsFile, OverwritePolicy};
pub use self::core::{merge_record, shape_for_event, MergeDecision, VideoRecord};
pub use fetch::{ListEntry, MetadataSource, YtDlpSource};
