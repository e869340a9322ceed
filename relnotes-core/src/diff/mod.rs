// Change detection
//
// Two levels: a generic recursive diff over nested records, and a domain
// diff over changelog entries keyed by id.

pub mod detector;
pub mod entries;
pub mod value;

pub use detector::{detect_changes, extract_translatable_texts};
pub use entries::{
    compare_entries, has_content_changed, CompareOptions, ComparisonResult, ComparisonSummary,
    EntryUpdate, VersionStatus,
};
pub use value::{Node, Primitive, Value};
