//! Fire-and-forget background jobs.
//!
//! Jobs are labelled and idempotent: at most one job per `(label, kind)` is
//! in flight, and enqueuing a second is a no-op. A job's only externally
//! visible effect is a later repository publish; it never touches the
//! synchronous response of the request that spawned it.

use crate::exceptions::ExtractResult;
use crate::logging::{report_progress, ProgressEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// The kinds of knowledge-learning jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Learn a label's first knowledge version from a cold document
    GenerateV1,
    /// Upgrade a label's knowledge from a corrected gabarito
    Refine,
}

/// Spawns deduplicated background jobs on the tokio runtime.
///
/// Handles are retained so tests and shutdown paths can drain the queue;
/// production callers simply let jobs run to completion on the worker pool.
#[derive(Clone)]
pub struct JobRunner {
    active: Arc<Mutex<HashSet<(String, JobKind)>>>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl JobRunner {
    pub fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashSet::new())),
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Enqueue `job` for `(label, kind)` unless one is already in flight.
    ///
    /// The job resolves to the published knowledge version, or `None` when
    /// it abandoned its work. Returns whether the job was accepted.
    pub fn spawn<F>(&self, label: &str, kind: JobKind, job: F) -> bool
    where
        F: Future<Output = Option<u32>> + Send + 'static,
    {
        let key = (label.to_string(), kind);
        {
            let mut active = self.active.lock().expect("job set poisoned");
            if !active.insert(key.clone()) {
                report_progress(ProgressEvent::JobEnqueued {
                    label: label.to_string(),
                    kind,
                    accepted: false,
                });
                return false;
            }
        }
        report_progress(ProgressEvent::JobEnqueued {
            label: label.to_string(),
            kind,
            accepted: true,
        });

        let active = Arc::clone(&self.active);
        let handle = tokio::spawn(async move {
            let published_version = job.await;
            report_progress(ProgressEvent::JobCompleted {
                label: key.0.clone(),
                kind,
                published_version,
            });
            active.lock().expect("job set poisoned").remove(&key);
        });
        self.handles.lock().expect("job handles poisoned").push(handle);
        true
    }

    /// Whether a `(label, kind)` job is currently in flight
    pub fn is_active(&self, label: &str, kind: JobKind) -> bool {
        self.active
            .lock()
            .expect("job set poisoned")
            .contains(&(label.to_string(), kind))
    }

    /// Await every spawned job. Used by tests and graceful shutdown; the
    /// batch loop itself never waits on background work.
    pub async fn wait_idle(&self) {
        loop {
            let drained: Vec<JoinHandle<()>> = {
                let mut handles = self.handles.lock().expect("job handles poisoned");
                handles.drain(..).collect()
            };
            if drained.is_empty() {
                return;
            }
            futures::future::join_all(drained).await;
        }
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry `operation` on transient failures with linearly growing backoff.
///
/// Non-transient errors abort immediately; after `max_retries` transient
/// failures the last error is returned and the caller abandons the work.
pub async fn retry_with_backoff<T, F, Fut>(
    mut operation: F,
    operation_name: &str,
    max_retries: usize,
    base_delay: Duration,
) -> ExtractResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ExtractResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                let delay = base_delay * attempt as u32;
                log::warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    operation_name,
                    attempt,
                    max_retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
