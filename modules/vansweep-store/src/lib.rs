pub mod canonical;
pub mod error;
pub mod feedback;

pub use canonical::{CanonicalStore, FieldSummary, StoreStats};
pub use error::{Result, StoreError};
pub use feedback::{FeedbackTracker, TemporalPatterns};
