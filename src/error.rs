//! Run-level error taxonomy.
//!
//! Per-page and per-collection failures are absorbed inside the driver and
//! logged; only conditions that prevent a run from starting surface here.
//! "No model could be built" is a defined outcome, not an error.

use crate::acquisition::snapshot::SnapshotError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelerError {
    #[error("invalid seed URL {url}")]
    InvalidSeedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("snapshot store could not be opened")]
    Snapshot(#[from] SnapshotError),
}
