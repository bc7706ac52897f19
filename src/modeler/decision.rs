//! The decision table: is a batch's grouping trustworthy, or must the path
//! be refined first?
//!
//! A single sampled target is ambiguous between "there is truly one target"
//! and "the path is too coarse and merges several distinct targets", so one
//! refinement is spent before committing. A menu is only trusted once enough
//! samples confirm heterogeneity; an undersampled menu suspect is re-queued
//! for a full resample.

use crate::schema::page::LinkKind;

/// Outcome of inspecting a clustered batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Ambiguous; walk the path lattice before re-deciding.
    Refine,
    /// Commit the classification.
    Classify(LinkKind),
    /// Commit as menu, and re-queue the collection with its fetch budget
    /// raised to the full collection size.
    ClassifyAndResample,
}

/// Decide from the number of sampled pages and surviving clusters.
///
/// `refinable` already accounts for the lattice boundary, the one-refinement
/// budget and snapshot availability; `collection_len` is the full link count
/// of the collection the batch was sampled from.
pub fn inspect(pages: usize, clusters: usize, refinable: bool, collection_len: usize) -> Verdict {
    debug_assert!(pages > 0, "inspect requires a non-empty batch");
    match (pages, clusters) {
        (1, _) => {
            if refinable {
                Verdict::Refine
            } else {
                Verdict::Classify(LinkKind::Singleton)
            }
        }
        (2, 1) => Verdict::Classify(LinkKind::List),
        (2, _) => Verdict::Classify(LinkKind::Menu),
        (3, 1) => Verdict::Classify(LinkKind::List),
        (3, 2) => {
            if refinable {
                Verdict::Refine
            } else {
                Verdict::Classify(LinkKind::List)
            }
        }
        (3, _) => {
            if collection_len > 3 {
                Verdict::ClassifyAndResample
            } else {
                Verdict::Classify(LinkKind::Menu)
            }
        }
        // Beyond the default sampling width the batch is a full resample:
        // homogeneity means list, anything else means menu.
        (_, 1) => Verdict::Classify(LinkKind::List),
        (_, _) => Verdict::Classify(LinkKind::Menu),
    }
}
