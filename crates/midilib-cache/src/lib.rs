pub mod catalog;
pub mod content;
pub mod estimate;
pub mod metadata;
pub mod search;

pub use catalog::FileCatalog;
pub use content::{CacheEntry, CacheStats, ContentCache, PutOutcome, RejectReason};
pub use estimate::{JsonSizeEstimator, SizeEstimator};
pub use metadata::MetadataIndex;
pub use search::SearchIndex;
