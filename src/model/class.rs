//! Candidate page classes: clusters of pages believed to share a template.

use crate::schema::page::{PageId, PageStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a class within one website model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Hands out class ids. Owned by the website model and threaded explicitly;
/// there is no global counter.
#[derive(Debug, Default)]
pub struct ClassIdAlloc {
    next: u32,
}

impl ClassIdAlloc {
    pub fn next(&mut self) -> ClassId {
        let id = ClassId(self.next);
        self.next += 1;
        id
    }
}

/// A working cluster of pages believed to share one template.
///
/// The class never stores its schema: it is always recomputed as the union of
/// its member pages' schemas, so it cannot go stale as members are added.
#[derive(Debug, Clone)]
pub struct CandidateClass {
    pub id: ClassId,
    pub pages: Vec<PageId>,
}

impl CandidateClass {
    pub fn new(id: ClassId, pages: Vec<PageId>) -> Self {
        Self { id, pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Union of the members' link schemas.
    pub fn link_schema(&self, store: &PageStore) -> BTreeSet<String> {
        let mut schema = BTreeSet::new();
        for &p in &self.pages {
            schema.extend(store.get(p).schema.iter().cloned());
        }
        schema
    }

    /// Union of the members' label schemas.
    pub fn label_schema(&self, store: &PageStore) -> BTreeSet<String> {
        let mut schema = BTreeSet::new();
        for &p in &self.pages {
            schema.extend(store.get(p).label_schema.iter().cloned());
        }
        schema
    }

    /// Full schema: link schema ∪ label schema.
    pub fn schema(&self, store: &PageStore) -> BTreeSet<String> {
        let mut schema = self.link_schema(store);
        schema.extend(self.label_schema(store));
        schema
    }

    /// Fold another class's members into this one.
    pub fn absorb(&mut self, other: CandidateClass) {
        self.pages.extend(other.pages);
    }
}

/// Normalized symmetric set-difference distance between two schemas.
///
/// Identical schemas distance to 0, disjoint schemas to 1; two empty schemas
/// count as identical.
pub fn schema_distance(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let sym_diff = union - shared;
    sym_diff as f64 / union as f64
}
