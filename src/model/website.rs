//! The mutable set of candidate classes for one site.
//!
//! The model owns its classes, classes reference pages by id, and a reverse
//! page→class map is maintained alongside; no back-pointers. Classes never
//! share a page, so the model is always a valid partition of the classified
//! pages.

use crate::model::class::{schema_distance, CandidateClass, ClassId, ClassIdAlloc};
use crate::model::cost::{class_cost, CostWeights};
use crate::schema::page::{PageId, PageStore};
use std::collections::HashMap;
use tracing::debug;

/// How a candidate class was folded into the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Kept as a brand-new class.
    Added(ClassId),
    /// Merged into an existing class because that was cheaper.
    MergedInto(ClassId),
}

impl UpdateOutcome {
    pub fn class(self) -> ClassId {
        match self {
            Self::Added(id) | Self::MergedInto(id) => id,
        }
    }
}

/// The current set of candidate classes for one site.
#[derive(Debug)]
pub struct WebsiteModel {
    site: String,
    classes: Vec<CandidateClass>,
    class_of: HashMap<PageId, ClassId>,
    alloc: ClassIdAlloc,
}

impl WebsiteModel {
    pub fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
            classes: Vec::new(),
            class_of: HashMap::new(),
            alloc: ClassIdAlloc::default(),
        }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn classes(&self) -> &[CandidateClass] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The explicit id allocator, threaded to whoever materializes classes.
    pub fn allocator(&mut self) -> &mut ClassIdAlloc {
        &mut self.alloc
    }

    /// The class a page currently belongs to, if classified.
    pub fn class_of(&self, page: PageId) -> Option<ClassId> {
        self.class_of.get(&page).copied()
    }

    /// Fold an accepted candidate into the model, guided by cost.
    ///
    /// Compares the cost of keeping the candidate as a new class against the
    /// cheapest merge with an existing class and takes the minimum; ties keep
    /// the candidate separate. The comparison is over cost deltas, so the
    /// chosen alternative never costs more than the cheaper of the two.
    pub fn update(
        &mut self,
        candidate: CandidateClass,
        store: &PageStore,
        weights: &CostWeights,
    ) -> UpdateOutcome {
        let new_cost = class_cost(&candidate, store, weights);

        let mut best: Option<(usize, f64)> = None;
        for (idx, existing) in self.classes.iter().enumerate() {
            let mut merged = existing.clone();
            merged.absorb(candidate.clone());
            let delta = class_cost(&merged, store, weights) - class_cost(existing, store, weights);
            if best.map_or(true, |(_, d)| delta < d) {
                best = Some((idx, delta));
            }
        }

        match best {
            Some((idx, delta)) if delta < new_cost => {
                let target = self.classes[idx].id;
                for &p in &candidate.pages {
                    self.class_of.insert(p, target);
                }
                self.classes[idx].absorb(candidate);
                debug!(class = %target, "merged candidate into existing class");
                UpdateOutcome::MergedInto(target)
            }
            _ => {
                let id = candidate.id;
                for &p in &candidate.pages {
                    self.class_of.insert(p, id);
                }
                self.classes.push(candidate);
                debug!(class = %id, "added new class");
                UpdateOutcome::Added(id)
            }
        }
    }

    /// Collapse near-duplicate classes by schema distance.
    ///
    /// Classes are enumerated largest-first (ties broken by ascending id, so
    /// the result does not depend on incidental insertion order); each later
    /// class within the threshold of an earlier one is merged into it.
    /// Returns the number of merges performed.
    pub fn collapse_by_schema(&mut self, threshold: f64, store: &PageStore) -> usize {
        let mut order: Vec<usize> = (0..self.classes.len()).collect();
        order.sort_by(|&a, &b| {
            self.classes[b]
                .len()
                .cmp(&self.classes[a].len())
                .then(self.classes[a].id.cmp(&self.classes[b].id))
        });

        let mut merged_into: HashMap<usize, usize> = HashMap::new();
        for i in 0..order.len() {
            let ci = order[i];
            if merged_into.contains_key(&ci) {
                continue;
            }
            for &cj in order.iter().skip(i + 1) {
                if merged_into.contains_key(&cj) {
                    continue;
                }
                let d = schema_distance(
                    &self.classes[ci].schema(store),
                    &self.classes[cj].schema(store),
                );
                if d < threshold {
                    merged_into.insert(cj, ci);
                }
            }
        }

        let merges = merged_into.len();
        if merges == 0 {
            return 0;
        }

        // Apply merges, then drop emptied classes preserving id order.
        let moves: Vec<(usize, usize)> = {
            let mut v: Vec<_> = merged_into.into_iter().collect();
            v.sort();
            v
        };
        for (from, to) in moves {
            let pages = std::mem::take(&mut self.classes[from].pages);
            let target = self.classes[to].id;
            for &p in &pages {
                self.class_of.insert(p, target);
            }
            self.classes[to].pages.extend(pages);
        }
        self.classes.retain(|c| !c.pages.is_empty());
        debug!(merges, classes = self.classes.len(), "collapsed model by schema distance");
        merges
    }
}
