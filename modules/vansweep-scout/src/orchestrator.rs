//! Fans (source, key) invocations out under two nested concurrency bounds:
//! a coarse bound on active source sessions (heavyweight per-source
//! resources) and a finer bound on in-flight fetches across all sessions.
//!
//! Invocation lifecycle: Pending → Running → {Succeeded, Retrying → Pending,
//! Failed}. A single invocation's failure never aborts the batch — after the
//! retry budget it becomes a zero-yield sample and the run moves on. Only
//! store-write failures are fatal: they set the cancel flag, halt further
//! scheduling, and surface to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vansweep_common::{ListingRecord, Source};
use vansweep_store::{CanonicalStore, FeedbackTracker};

use crate::adapter::{AdapterError, UpstreamAdapter};
use crate::rotator::EgressRotator;
use crate::stats::{RunReport, SourceReport};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Simultaneously active source sessions.
    pub session_concurrency: usize,
    /// In-flight fetches across all sessions.
    pub fetch_concurrency: usize,
    /// Per-fetch deadline.
    pub timeout: Duration,
    /// Retries per invocation after the first attempt.
    pub max_retries: u32,
    /// Inter-request pacing jitter bounds. Equal bounds make scheduling
    /// deterministic for tests.
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            session_concurrency: 2,
            fetch_concurrency: 8,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            min_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(3_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvocationState {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

enum InvocationOutcome {
    Succeeded { fetched: u32, inserted: u32 },
    Failed,
    Cancelled,
}

/// Everything an invocation task needs, cloned per task.
#[derive(Clone)]
struct InvocationCtx {
    adapter: Arc<dyn UpstreamAdapter>,
    rotator: Arc<EgressRotator>,
    store: Arc<Mutex<CanonicalStore>>,
    feedback: Arc<FeedbackTracker>,
    config: OrchestratorConfig,
    cancel: Arc<AtomicBool>,
    fetch_sem: Arc<Semaphore>,
}

pub struct Orchestrator {
    adapter: Arc<dyn UpstreamAdapter>,
    rotator: Arc<EgressRotator>,
    store: Arc<Mutex<CanonicalStore>>,
    feedback: Arc<FeedbackTracker>,
    config: OrchestratorConfig,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        adapter: Arc<dyn UpstreamAdapter>,
        rotator: Arc<EgressRotator>,
        store: CanonicalStore,
        feedback: FeedbackTracker,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            adapter,
            rotator,
            store: Arc::new(Mutex::new(store)),
            feedback: Arc::new(feedback),
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag observed before each invocation starts. Setting it (e.g. from a
    /// ctrl-c handler) stops new invocations; in-flight ones finish or hit
    /// their timeout, and everything already collected stays flushed.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Run one invocation per (source, key) pair and return the summary.
    /// Returns only once every scheduled invocation reached a terminal
    /// state or was skipped due to cancellation.
    pub async fn run(&self, sources: &[Source], keys: &[String]) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            sources = sources.len(),
            keys = keys.len(),
            egress_live = self.rotator.live_count(),
            "Starting sweep run"
        );

        let session_sem = Arc::new(Semaphore::new(self.config.session_concurrency.max(1)));
        let ctx = InvocationCtx {
            adapter: self.adapter.clone(),
            rotator: self.rotator.clone(),
            store: self.store.clone(),
            feedback: self.feedback.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
            fetch_sem: Arc::new(Semaphore::new(self.config.fetch_concurrency.max(1))),
        };

        let mut sessions: JoinSet<Result<SourceReport>> = JoinSet::new();
        for &source in sources {
            let session_sem = session_sem.clone();
            let ctx = ctx.clone();
            let keys = keys.to_vec();
            sessions.spawn(run_session(session_sem, ctx, source, keys));
        }

        let mut reports = Vec::new();
        let mut fatal: Option<anyhow::Error> = None;
        while let Some(joined) = sessions.join_next().await {
            match joined.context("session task panicked")? {
                Ok(report) => reports.push(report),
                Err(e) => {
                    // Fatal (store) error: stop scheduling, let the other
                    // sessions wind down, keep the first cause.
                    self.cancel.store(true, Ordering::SeqCst);
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        reports.sort_by_key(|r| r.source.as_str());
        let report = RunReport {
            run_id,
            sources: reports,
        };

        match fatal {
            Some(e) => {
                // The summary still reports what was collected before the
                // abort; nothing durably written is lost.
                info!(%run_id, "{report}");
                Err(e)
            }
            None => {
                info!(%run_id, new_records = report.total_new_records(), "Sweep run complete");
                Ok(report)
            }
        }
    }
}

async fn run_session(
    session_sem: Arc<Semaphore>,
    ctx: InvocationCtx,
    source: Source,
    keys: Vec<String>,
) -> Result<SourceReport> {
    let _permit = session_sem
        .acquire_owned()
        .await
        .map_err(|_| anyhow::anyhow!("session semaphore closed"))?;

    info!(source = %source, keys = keys.len(), "Session started");

    let mut invocations: JoinSet<Result<InvocationOutcome>> = JoinSet::new();
    for key in keys {
        invocations.spawn(run_invocation(ctx.clone(), source, key));
    }

    let mut report = SourceReport::new(source);
    while let Some(joined) = invocations.join_next().await {
        match joined.context("invocation task panicked")?? {
            InvocationOutcome::Succeeded { fetched, inserted } => {
                report.succeeded += 1;
                report.records_fetched += fetched;
                report.new_records += inserted;
            }
            InvocationOutcome::Failed => report.failed += 1,
            InvocationOutcome::Cancelled => report.cancelled += 1,
        }
    }

    info!(
        source = %source,
        ok = report.succeeded,
        failed = report.failed,
        cancelled = report.cancelled,
        new_records = report.new_records,
        "Session complete"
    );
    Ok(report)
}

async fn run_invocation(
    ctx: InvocationCtx,
    source: Source,
    key: String,
) -> Result<InvocationOutcome> {
    debug!(source = %source, key = %key, state = ?InvocationState::Pending, "Invocation queued");
    let _permit = ctx
        .fetch_sem
        .acquire_owned()
        .await
        .map_err(|_| anyhow::anyhow!("fetch semaphore closed"))?;

    if ctx.cancel.load(Ordering::SeqCst) {
        debug!(source = %source, key = %key, "Run cancelled, skipping invocation");
        return Ok(InvocationOutcome::Cancelled);
    }

    for attempt in 0..=ctx.config.max_retries {
        pace(&ctx.config).await;
        debug!(source = %source, key = %key, attempt, state = ?InvocationState::Running, "Invocation attempt");

        let egress = ctx.rotator.next();
        if egress.is_none() {
            warn!(
                source = %source,
                key = %key,
                "Egress pool exhausted, continuing without identity"
            );
        }

        let fetch = ctx.adapter.fetch(source, &key, egress.as_ref());
        let err = match tokio::time::timeout(ctx.config.timeout, fetch).await {
            Ok(Ok(raw)) => {
                let fetched = raw.len() as u32;
                let now = Utc::now();
                let records: Vec<ListingRecord> = raw
                    .into_iter()
                    .map(|r| ListingRecord::from_raw(r, &key, source, now))
                    .collect();

                let appended = {
                    let mut store = ctx.store.lock().await;
                    store.append_batch(&records)
                };
                let inserted = match appended {
                    Ok(n) => n as u32,
                    Err(e) => {
                        ctx.cancel.store(true, Ordering::SeqCst);
                        return Err(anyhow::Error::new(e).context("canonical store write failed"));
                    }
                };
                if let Err(e) = ctx.feedback.record(&key, source, fetched).await {
                    ctx.cancel.store(true, Ordering::SeqCst);
                    return Err(anyhow::Error::new(e).context("feedback store write failed"));
                }

                debug!(source = %source, key = %key, fetched, inserted, state = ?InvocationState::Succeeded, "Invocation succeeded");
                return Ok(InvocationOutcome::Succeeded { fetched, inserted });
            }
            Ok(Err(e)) => e,
            Err(_) => AdapterError::Timeout,
        };

        if err.is_egress_related() {
            if let Some(id) = egress.as_ref() {
                ctx.rotator.mark_failed(id);
            }
        }
        warn!(
            source = %source,
            key = %key,
            attempt,
            state = ?InvocationState::Retrying,
            error = %err,
            "Invocation attempt failed"
        );

        if ctx.cancel.load(Ordering::SeqCst) {
            // The run is winding down; don't burn retries into it.
            break;
        }
    }

    // Retry budget exhausted: the failure becomes a zero-yield observation
    // so the selector learns from it, and the batch continues.
    if let Err(e) = ctx.feedback.record(&key, source, 0).await {
        ctx.cancel.store(true, Ordering::SeqCst);
        return Err(anyhow::Error::new(e).context("feedback store write failed"));
    }
    info!(source = %source, key = %key, state = ?InvocationState::Failed, "Invocation failed, recorded zero yield");
    Ok(InvocationOutcome::Failed)
}

/// Random inter-request delay within the configured bounds. Zero bounds
/// mean no sleep and no RNG draw.
async fn pace(config: &OrchestratorConfig) {
    let min = config.min_delay.as_millis() as u64;
    let max = config.max_delay.as_millis() as u64;
    let delay = if max > min {
        rand::rng().random_range(min..=max)
    } else {
        min
    };
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}
