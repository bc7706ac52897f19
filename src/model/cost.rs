//! Description-length cost of a website model.
//!
//! Classes pay for the size of their schema (more bits to describe the
//! template) and every member page pays for how poorly it fits the class it
//! was assigned to (paths it lacks, paths the class lacks). The weights are
//! empirical and deliberately configurable.

use crate::model::class::CandidateClass;
use crate::model::website::WebsiteModel;
use crate::schema::page::{PageId, PageStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Weights of the cost terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Per schema path, both in class schemas and in page-only paths.
    pub path: f64,
    /// Per path shared between a page and its class.
    pub intersect: f64,
    /// Per link URL on a page.
    pub url: f64,
    /// Per class path a page is missing.
    pub missing: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            path: 1.0,
            intersect: 0.8,
            url: 1.0,
            missing: 1.0,
        }
    }
}

/// Cost of one page as a member of a class with the given schema.
pub fn page_cost(
    page: PageId,
    class_schema: &BTreeSet<String>,
    store: &PageStore,
    w: &CostWeights,
) -> f64 {
    let p = store.get(page);
    // Link and label paths never collide (label paths exclude anchors), so
    // the page's full schema is the plain concatenation.
    let page_total = p.schema.len() + p.label_schema.len();
    let shared = p
        .schema
        .iter()
        .chain(p.label_schema.iter())
        .filter(|s| class_schema.contains(s.as_str()))
        .count();
    let extra = page_total - shared;
    let missing = class_schema.len() - shared;

    w.url * p.total_links as f64
        + w.intersect * shared as f64
        + w.path * extra as f64
        + w.missing * missing as f64
}

/// Cost of one class: its schema size plus the fit of every member.
pub fn class_cost(class: &CandidateClass, store: &PageStore, w: &CostWeights) -> f64 {
    let schema = class.schema(store);
    let mut cost = w.path * schema.len() as f64;
    for &p in &class.pages {
        cost += page_cost(p, &schema, store, w);
    }
    cost
}

/// Total cost of a model: the sum over its classes.
pub fn model_cost(model: &WebsiteModel, store: &PageStore, w: &CostWeights) -> f64 {
    model
        .classes()
        .iter()
        .map(|c| class_cost(c, store, w))
        .sum()
}
