//! Run configuration: seed settings, sampling budgets and tuning constants.
//!
//! The cost weights and the collapse threshold are empirical constants; they
//! are carried as configuration rather than hard-coded so a recalibration is
//! an explicit, visible change.

use crate::model::cost::CostWeights;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of target pages sampled per collection expansion.
pub const DEFAULT_BATCH_WIDTH: usize = 3;

/// Default total page budget for one run.
pub const DEFAULT_MAX_TOTAL_PAGES: u32 = 200;

/// Schema-distance threshold below which two classes collapse.
pub const DEFAULT_COLLAPSE_THRESHOLD: f64 = 0.2;

/// Configuration for one site-model run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelerConfig {
    /// Entry URL the run starts from.
    pub entry_url: String,
    /// Target pages fetched per collection expansion.
    pub max_pages_per_batch: usize,
    /// Total page budget; once spent, the run finalizes with whatever has
    /// been classified.
    pub max_total_pages: u32,
    /// Politeness wait inserted before a batch when the previous batch
    /// produced fresh downloads.
    pub inter_batch_wait_ms: u64,
    /// Ask the fetch service to execute script when rendering pages.
    pub use_script: bool,
    /// Keep page snapshots on disk (otherwise they stay in memory for the
    /// lifetime of the run).
    pub persist_snapshots: bool,
    /// Root directory for disk snapshots; defaults to the platform data dir.
    pub snapshot_dir: Option<PathBuf>,
    /// Per-page fetch timeout.
    pub fetch_timeout_ms: u64,
    /// Cost-function weights.
    pub cost: CostWeights,
    /// Schema-distance collapse threshold.
    pub collapse_threshold: f64,
}

impl Default for ModelerConfig {
    fn default() -> Self {
        Self {
            entry_url: String::new(),
            max_pages_per_batch: DEFAULT_BATCH_WIDTH,
            max_total_pages: DEFAULT_MAX_TOTAL_PAGES,
            inter_batch_wait_ms: 500,
            use_script: false,
            persist_snapshots: false,
            snapshot_dir: None,
            fetch_timeout_ms: 10_000,
            cost: CostWeights::default(),
            collapse_threshold: DEFAULT_COLLAPSE_THRESHOLD,
        }
    }
}

impl ModelerConfig {
    /// Configuration for a run against one entry URL, everything else at
    /// defaults.
    pub fn for_site(entry_url: &str) -> Self {
        Self {
            entry_url: entry_url.to_string(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Resolved snapshot root: the configured directory, or
    /// `<data dir>/tessera/snapshots`.
    pub fn snapshot_root(&self) -> PathBuf {
        self.snapshot_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("tessera")
                .join("snapshots")
        })
    }
}
