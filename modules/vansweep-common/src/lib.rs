pub mod config;
pub mod error;
pub mod parse;
pub mod types;

pub use config::Config;
pub use error::VansweepError;
pub use types::{
    Level, ListingRecord, ListingType, RawListing, Region, Source, YieldSample,
};
