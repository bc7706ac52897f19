//! Progress event types and broadcast channel for real-time modeling
//! telemetry.
//!
//! The driver emits `ModelEvent`s while it samples and clusters, flowing
//! through a `tokio::sync::broadcast` channel to all subscribers (CLI
//! summary, log sinks). When no subscriber exists, events are silently
//! dropped.

use serde::{Deserialize, Serialize};

/// A progress event emitted during a model run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ModelEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ModelEventKind {
    /// A modeling phase has started.
    PhaseStarted { phase: ModelPhase },
    /// A modeling phase completed.
    PhaseCompleted { phase: ModelPhase, duration_ms: u64 },
    /// A page was fetched and parsed.
    PageFetched { url: String, fetched_total: u32 },
    /// A page was dropped from its batch.
    PageDropped { url: String, reason: String },
    /// A link collection was queued for expansion.
    CollectionQueued { path: String, links: u32 },
    /// A new candidate class entered the model.
    ClassAdded { class: String, pages: u32 },
    /// A candidate was merged into an existing class.
    ClassMerged { into: String, pages: u32 },
    /// The run finished.
    RunComplete {
        classes: u32,
        pages_fetched: u32,
        pages_dropped: u32,
        elapsed_ms: u64,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Identifies which phase of the run is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelPhase {
    /// Fetching and classifying the entry page.
    Seed,
    /// Fetching a batch of a collection's target pages.
    Sample,
    /// Grouping the batch into candidate classes.
    Cluster,
    /// Walking the path lattice against a snapshot.
    Refine,
    /// Folding accepted candidates into the model.
    Update,
    /// Collapsing the model and emitting the graph.
    Finalize,
}

impl std::fmt::Display for ModelPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seed => write!(f, "Seed"),
            Self::Sample => write!(f, "Sample"),
            Self::Cluster => write!(f, "Cluster"),
            Self::Refine => write!(f, "Refine"),
            Self::Update => write!(f, "Update"),
            Self::Finalize => write!(f, "Finalize"),
        }
    }
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ModelEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ModelEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit a progress event, silently ignoring send errors (which occur when no
/// receivers are listening).
pub fn emit(tx: &Option<ProgressSender>, run_id: &str, seq: &mut u64, event: ModelEventKind) {
    if let Some(sender) = tx {
        *seq += 1;
        let _ = sender.send(ModelEvent {
            run_id: run_id.to_string(),
            seq: *seq,
            event,
        });
    }
}
