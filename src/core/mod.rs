pub mod merge;
pub mod record;

pub use merge::{merge_record, shape_for_event, MergeDecision};
pub use record::{VideoRecord, MINIMAL_FIELDS, RECOGNIZED_FIELDS};
