//! The refinement loop: walk the path lattice against a cached snapshot.
//!
//! One granularity step at a time, the adjusted path is re-resolved against
//! the parent page's saved document. A step is accepted the first time its
//! resolved link set differs from the previous one *and* is strictly smaller
//! than the page's total outgoing-link count, i.e. it actually
//! discriminates. If no step on either side of the lattice ever
//! discriminates, the original path stands and the collection is marked
//! non-refinable.

use crate::schema::page::resolve_links;
use crate::schema::path::PathExpression;
use scraper::Html;
use url::Url;

/// Result of one refinement attempt.
#[derive(Debug)]
pub enum RefineOutcome {
    /// A discriminating path was found; the collection should adopt it and
    /// be re-queued.
    Accepted {
        path: PathExpression,
        links: Vec<String>,
    },
    /// The lattice was exhausted in both directions without discriminating.
    Exhausted,
}

/// Try to find a discriminating adjustment of `original` against the parent
/// page's document. Refines first; if the refine direction is exhausted,
/// falls back to coarsening a fresh copy of the original path.
pub fn refine_collection(
    original: &PathExpression,
    current_links: &[String],
    doc: &Html,
    base: &Url,
    page_total_links: usize,
) -> RefineOutcome {
    let mut work = original.clone();
    let mut prev: Vec<String> = current_links.to_vec();
    while work.refine() {
        let resolved = resolve_links(&work, doc, base);
        if discriminates(&resolved, &prev, page_total_links) {
            return RefineOutcome::Accepted {
                path: work,
                links: resolved,
            };
        }
        prev = resolved;
    }

    let mut work = original.clone();
    let mut prev: Vec<String> = current_links.to_vec();
    while work.coarsen() {
        let resolved = resolve_links(&work, doc, base);
        if discriminates(&resolved, &prev, page_total_links) {
            return RefineOutcome::Accepted {
                path: work,
                links: resolved,
            };
        }
        prev = resolved;
    }

    RefineOutcome::Exhausted
}

/// An adjustment discriminates when it changes the resolved set to a
/// non-empty strict subset of the page's outgoing links.
fn discriminates(resolved: &[String], prev: &[String], page_total_links: usize) -> bool {
    !resolved.is_empty() && resolved != prev && resolved.len() < page_total_links
}
