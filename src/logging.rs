//! Progress reporting for batch runs.
//!
//! The engine reports coarse progress events through a pluggable handler so
//! CLI front-ends can render them while library embedders stay silent or
//! forward them to `log`.

use crate::data::PathTaken;
use crate::jobs::JobKind;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Progress event types emitted by the pipeline and orchestrator
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A batch item entered the orchestrator
    ItemStarted { item_index: usize, label: String },
    /// Routing decision for an item
    PathTaken {
        item_index: usize,
        path: PathTaken,
        cache_hit: bool,
        confidence: f64,
    },
    /// A synchronous LLM dispatch is starting
    ModelCall {
        operation: &'static str,
        field_count: usize,
        deadline_s: f64,
    },
    /// Outcome of a synchronous LLM dispatch
    ModelResponse { success: bool, degraded: bool },
    /// A background job was enqueued (or dropped as a duplicate)
    JobEnqueued {
        label: String,
        kind: JobKind,
        accepted: bool,
    },
    /// A background job finished and published (or abandoned)
    JobCompleted {
        label: String,
        kind: JobKind,
        published_version: Option<u32>,
    },
    /// A knowledge entry became live
    RepositoryPublish { label: String, version: u32 },
    /// Error on some operation (always reported)
    Error { operation: String, error: String },
}

/// Trait for handling progress events
pub trait ProgressHandler: Send + Sync {
    fn handle_progress(&self, event: ProgressEvent);
}

/// Handler that forwards events to the `log` crate
pub struct LogProgressHandler;

impl ProgressHandler for LogProgressHandler {
    fn handle_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ItemStarted { item_index, label } => {
                log::debug!("item {} ({}): started", item_index, label);
            }
            ProgressEvent::PathTaken {
                item_index,
                path,
                cache_hit,
                confidence,
            } => {
                log::info!(
                    "item {}: path {} (cache {}, confidence {:.2})",
                    item_index,
                    path,
                    if cache_hit { "hit" } else { "miss" },
                    confidence
                );
            }
            ProgressEvent::ModelCall {
                operation,
                field_count,
                deadline_s,
            } => {
                log::debug!(
                    "dispatching {} for {} fields (deadline {:.2}s)",
                    operation,
                    field_count,
                    deadline_s
                );
            }
            ProgressEvent::ModelResponse { success, degraded } => {
                if degraded {
                    log::warn!("model call degraded to partial data");
                } else if success {
                    log::debug!("model call completed");
                }
            }
            ProgressEvent::JobEnqueued {
                label,
                kind,
                accepted,
            } => {
                if accepted {
                    log::debug!("enqueued {:?} job for '{}'", kind, label);
                } else {
                    log::debug!("dropped duplicate {:?} job for '{}'", kind, label);
                }
            }
            ProgressEvent::JobCompleted {
                label,
                kind,
                published_version,
            } => match published_version {
                Some(v) => log::info!("{:?} job for '{}' published v{}", kind, label, v),
                None => log::warn!("{:?} job for '{}' abandoned", kind, label),
            },
            ProgressEvent::RepositoryPublish { label, version } => {
                log::debug!("knowledge for '{}' now at v{}", label, version);
            }
            ProgressEvent::Error { operation, error } => {
                log::error!("{}: {}", operation, error);
            }
        }
    }
}

/// Handler that discards every event
pub struct SilentProgressHandler;

impl ProgressHandler for SilentProgressHandler {
    fn handle_progress(&self, _event: ProgressEvent) {}
}

static PROGRESS_HANDLER: OnceCell<Arc<dyn ProgressHandler>> = OnceCell::new();

/// Install the global progress handler; only the first call wins
pub fn init_progress_handler(handler: Arc<dyn ProgressHandler>) {
    let _ = PROGRESS_HANDLER.set(handler);
}

/// Report a progress event to the installed handler (default: `log` forwarding)
pub fn report_progress(event: ProgressEvent) {
    let handler = PROGRESS_HANDLER.get_or_init(|| Arc::new(LogProgressHandler));
    handler.handle_progress(event);
}
