pub mod error;
pub mod file_walker;
pub mod pattern;
pub mod record;
pub mod template;

pub use error::SearchError;
pub use file_walker::{CancelToken, DirectoryWalker, WalkOptions, WalkStats};
pub use pattern::{parse_filter_list, FilterSet};
pub use record::{FileRecord, ProgressSnapshot, SearchOutcome, SearchRequest, CSV_HEADER};
