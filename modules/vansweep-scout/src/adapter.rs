//! The upstream adapter boundary. Site-specific retrieval and extraction
//! (selectors, anti-bot handling, pagination) live behind this trait; the
//! orchestrator dispatches on the [`Source`] variant without inspecting any
//! of it.

use async_trait::async_trait;
use thiserror::Error;

use vansweep_common::{RawListing, Source};

use crate::rotator::EgressIdentity;

/// Invocation-local adapter failures. Retried by the orchestrator up to its
/// retry budget, then swallowed into a zero-yield sample — these never
/// propagate past the orchestrator.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The egress path itself failed (connect refused, proxy auth, ban).
    #[error("egress failure: {0}")]
    Egress(String),

    /// The upstream site did not respond in time.
    #[error("upstream timed out")]
    Timeout,

    /// The site responded but the fetch failed (blocked page, layout change).
    #[error("site error: {0}")]
    Site(String),
}

impl AdapterError {
    /// Whether the egress identity used for this fetch should be retired.
    /// Timeouts count: through a proxy there is no way to tell a dead exit
    /// from a slow site, and fresh identities are cheap.
    pub fn is_egress_related(&self) -> bool {
        matches!(self, AdapterError::Egress(_) | AdapterError::Timeout)
    }
}

#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    /// Fetch one page of listings for a (source, key) pair, optionally via
    /// the given egress identity.
    async fn fetch(
        &self,
        source: Source,
        search_key: &str,
        egress: Option<&EgressIdentity>,
    ) -> Result<Vec<RawListing>, AdapterError>;
}

/// No-op adapter for when no site adapters are wired up. Every fetch
/// succeeds with zero listings.
pub struct NoopAdapter;

#[async_trait]
impl UpstreamAdapter for NoopAdapter {
    async fn fetch(
        &self,
        _source: Source,
        _search_key: &str,
        _egress: Option<&EgressIdentity>,
    ) -> Result<Vec<RawListing>, AdapterError> {
        Ok(Vec::new())
    }
}
