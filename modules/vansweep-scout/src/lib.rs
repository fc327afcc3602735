pub mod adapter;
pub mod orchestrator;
pub mod regions;
pub mod rotator;
pub mod selector;
pub mod stats;

pub use adapter::{AdapterError, NoopAdapter, UpstreamAdapter};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use rotator::{EgressIdentity, EgressRotator};
pub use selector::{GeoFilter, KeySelector, Strategy};
pub use stats::{RunReport, SourceReport};
