//! Materialize the finalized website model into a page-class graph.
//!
//! After the schema-distance collapse, classes are given their typed
//! outgoing links and a second collapse runs over link structure: classes
//! whose typed link sets are near-identical, or where one set subsumes the
//! other, are merged. This catches classes that look structurally different
//! by raw schema but are link-for-link identical once the graph is built.

use crate::model::class::ClassId;
use crate::model::website::WebsiteModel;
use crate::modeler::CollectionRecord;
use crate::schema::page::{LinkKind, PageId, PageStore};
use crate::graph::types::{
    ClassEdge, DataPath, EdgeKind, ExtractorKind, GraphHeader, PageClassGraph, PageClassNode,
    FORMAT_VERSION,
};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};

/// Maximum member URLs listed per node.
const MAX_MEMBER_URLS: usize = 10;

/// Everything the builder needs from a finished run.
pub struct GraphInputs<'a> {
    pub model: &'a WebsiteModel,
    pub store: &'a PageStore,
    pub records: &'a [CollectionRecord],
    pub visited: &'a HashMap<String, PageId>,
    pub seed: PageId,
    pub link_threshold: f64,
    pub run_id: &'a str,
    pub pages_fetched: u32,
    pub pages_dropped: u32,
}

/// One typed outgoing link of a class, before edge deduplication.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TypedLink {
    kind: LinkKind,
    index: Option<u32>,
    path: String,
    to: ClassId,
}

/// Build the page-class graph, or `None` when the model is empty.
pub fn build(inputs: GraphInputs<'_>) -> Option<PageClassGraph> {
    let GraphInputs {
        model,
        store,
        records,
        visited,
        seed,
        link_threshold,
        run_id,
        pages_fetched,
        pages_dropped,
    } = inputs;

    if model.is_empty() {
        return None;
    }

    // Typed outgoing links per class, aggregated over member pages.
    let mut links_of: BTreeMap<ClassId, BTreeSet<TypedLink>> =
        model.classes().iter().map(|c| (c.id, BTreeSet::new())).collect();

    for record in records {
        let Some(owner) = record.page else {
            continue;
        };
        let Some(from) = model.class_of(owner) else {
            continue;
        };
        let Some(set) = links_of.get_mut(&from) else {
            continue;
        };
        match record.kind {
            LinkKind::Singleton | LinkKind::List => {
                if let Some(to) = majority_target(&record.links, visited, model) {
                    set.insert(TypedLink {
                        kind: record.kind,
                        index: None,
                        path: record.path.clone(),
                        to,
                    });
                }
            }
            LinkKind::Menu => {
                for (i, link) in record.links.iter().enumerate() {
                    let target = visited.get(link).and_then(|&p| model.class_of(p));
                    if let Some(to) = target {
                        set.insert(TypedLink {
                            kind: LinkKind::Menu,
                            index: Some(i as u32),
                            path: record.path.clone(),
                            to,
                        });
                    }
                }
            }
        }
    }

    // Second collapse: link-structure distance plus subsumption, enumerated
    // largest-class-first with ascending-id tiebreak.
    let mut order: Vec<usize> = (0..model.classes().len()).collect();
    order.sort_by(|&a, &b| {
        let ca = &model.classes()[a];
        let cb = &model.classes()[b];
        cb.len().cmp(&ca.len()).then(ca.id.cmp(&cb.id))
    });

    let mut remap: HashMap<ClassId, ClassId> = HashMap::new();
    for i in 0..order.len() {
        let ci = model.classes()[order[i]].id;
        if remap.contains_key(&ci) {
            continue;
        }
        for &oj in order.iter().skip(i + 1) {
            let cj = model.classes()[oj].id;
            if remap.contains_key(&cj) {
                continue;
            }
            let a = &links_of[&ci];
            let b = &links_of[&cj];
            if a.is_empty() && b.is_empty() {
                // Leaf classes carry no link signal; their schemas already
                // decided they are distinct.
                continue;
            }
            let near = link_distance(a, b) < link_threshold;
            let subsumed = (!b.is_empty() && b.is_subset(a)) || (!a.is_empty() && a.is_subset(b));
            if near || subsumed {
                remap.insert(cj, ci);
            }
        }
    }
    if !remap.is_empty() {
        info!(merges = remap.len(), "collapsed classes by link structure");
    }

    let resolve = |id: ClassId| -> ClassId { remap.get(&id).copied().unwrap_or(id) };

    // Assemble nodes for surviving classes.
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for class in model.classes() {
        if remap.contains_key(&class.id) {
            continue;
        }

        // Members and label schema of the merged group.
        let group: Vec<&_> = model
            .classes()
            .iter()
            .filter(|c| c.id == class.id || resolve(c.id) == class.id)
            .collect();
        let mut members: Vec<String> = Vec::new();
        let mut labels: BTreeSet<String> = BTreeSet::new();
        for c in &group {
            labels.extend(c.label_schema(store));
            for &p in &c.pages {
                if members.len() < MAX_MEMBER_URLS {
                    members.push(store.get(p).final_url.clone());
                }
            }
        }

        nodes.push(PageClassNode {
            id: class.id.0,
            name: class.id.to_string(),
            members,
            data_paths: labels
                .into_iter()
                .map(|path| DataPath {
                    kind: ExtractorKind::infer(&path),
                    path,
                })
                .collect(),
        });

        // Edges: the group's typed links, remapped and deduplicated. The
        // first target (in deterministic set order) wins a conflict.
        let mut chosen: BTreeMap<(EdgeKind, String), ClassId> = BTreeMap::new();
        for c in &group {
            for link in &links_of[&c.id] {
                let kind = match (link.kind, link.index) {
                    (LinkKind::Menu, Some(index)) => EdgeKind::Menu { index },
                    (LinkKind::Menu, None) => continue,
                    (LinkKind::Singleton, _) => EdgeKind::Singleton,
                    (LinkKind::List, _) => EdgeKind::List,
                };
                let to = resolve(link.to);
                let key = (kind, link.path.clone());
                match chosen.get(&key) {
                    None => {
                        chosen.insert(key, to);
                    }
                    Some(&existing) if existing != to => {
                        warn!(
                            class = %class.id,
                            path = %link.path,
                            "conflicting edge targets after collapse; keeping the first"
                        );
                    }
                    Some(_) => {}
                }
            }
        }
        for ((kind, path), to) in chosen {
            edges.push(ClassEdge {
                from: class.id.0,
                to: to.0,
                kind,
                path,
            });
        }
    }

    let root = model
        .class_of(seed)
        .map(resolve)
        .unwrap_or_else(|| ClassId(nodes.first().map(|n| n.id).unwrap_or(0)));

    let graph = PageClassGraph {
        header: GraphHeader {
            site: model.site().to_string(),
            run_id: run_id.to_string(),
            modeled_at: Utc::now(),
            format_version: FORMAT_VERSION,
            node_count: nodes.len() as u32,
            edge_count: edges.len() as u32,
            pages_fetched,
            pages_dropped,
        },
        root: root.0,
        nodes,
        edges,
    };

    if let Err(e) = graph.validate() {
        warn!(error = %e, "built graph failed validation");
    }
    Some(graph)
}

/// Pick the most frequent classified target of a link list; ties go to the
/// smallest class id.
fn majority_target(
    links: &[String],
    visited: &HashMap<String, PageId>,
    model: &WebsiteModel,
) -> Option<ClassId> {
    let mut counts: BTreeMap<ClassId, usize> = BTreeMap::new();
    for link in links {
        if let Some(to) = visited.get(link).and_then(|&p| model.class_of(p)) {
            *counts.entry(to).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(id, _)| id)
}

/// Normalized symmetric difference over two typed link sets.
fn link_distance(a: &BTreeSet<TypedLink>, b: &BTreeSet<TypedLink>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    (union - shared) as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::class::CandidateClass;
    use crate::model::cost::CostWeights;
    use crate::schema::page::Page;
    use std::collections::BTreeSet as Set;

    fn page(id: u32, url: &str, links: &[&str], labels: &[&str]) -> Page {
        Page {
            id: PageId(id),
            url: url.to_string(),
            final_url: url.to_string(),
            schema: links.iter().map(|s| s.to_string()).collect(),
            label_schema: labels.iter().map(|s| s.to_string()).collect(),
            collections: Vec::new(),
            total_links: links.len(),
            content_hash: 0,
            snapshot: None,
            classified: true,
        }
    }

    /// Home page (class A) with a list of two detail pages (class B).
    fn fixture() -> (WebsiteModel, PageStore, Vec<CollectionRecord>, HashMap<String, PageId>) {
        let mut store = PageStore::new();
        store.insert(page(0, "https://s.com/", &["list-path"], &["h1-path"]));
        store.insert(page(1, "https://s.com/d/1", &[], &["price-path"]));
        store.insert(page(2, "https://s.com/d/2", &[], &["price-path"]));

        let mut model = WebsiteModel::new("s.com");
        let w = CostWeights::default();
        let home = CandidateClass::new(model.allocator().next(), vec![PageId(0)]);
        model.update(home, &store, &w);
        let details = CandidateClass::new(model.allocator().next(), vec![PageId(1), PageId(2)]);
        model.update(details, &store, &w);

        let records = vec![CollectionRecord {
            page: Some(PageId(0)),
            path: "list-path".to_string(),
            kind: LinkKind::List,
            links: vec!["https://s.com/d/1".to_string(), "https://s.com/d/2".to_string()],
        }];

        let visited: HashMap<String, PageId> = [
            ("https://s.com/".to_string(), PageId(0)),
            ("https://s.com/d/1".to_string(), PageId(1)),
            ("https://s.com/d/2".to_string(), PageId(2)),
        ]
        .into_iter()
        .collect();

        (model, store, records, visited)
    }

    fn build_fixture(
        model: &WebsiteModel,
        store: &PageStore,
        records: &[CollectionRecord],
        visited: &HashMap<String, PageId>,
    ) -> PageClassGraph {
        build(GraphInputs {
            model,
            store,
            records,
            visited,
            seed: PageId(0),
            link_threshold: 0.2,
            run_id: "test-run",
            pages_fetched: 3,
            pages_dropped: 0,
        })
        .expect("non-empty model must build")
    }

    #[test]
    fn test_list_edge_targets_detail_class() {
        let (model, store, records, visited) = fixture();
        let g = build_fixture(&model, &store, &records, &visited);
        assert_eq!(g.nodes.len(), 2);
        assert_eq!(g.edges.len(), 1);
        let edge = &g.edges[0];
        assert_eq!(edge.kind, EdgeKind::List);
        assert_eq!(edge.from, g.root);
        assert_ne!(edge.to, edge.from);
        g.validate().unwrap();
    }

    #[test]
    fn test_data_paths_are_typed() {
        let (model, store, records, visited) = fixture();
        let g = build_fixture(&model, &store, &records, &visited);
        let root = g.nodes.iter().find(|n| n.id == g.root).unwrap();
        assert_eq!(root.data_paths.len(), 1);
        assert_eq!(root.data_paths[0].kind, ExtractorKind::String);
    }

    #[test]
    fn test_empty_model_builds_nothing() {
        let store = PageStore::new();
        let model = WebsiteModel::new("s.com");
        let out = build(GraphInputs {
            model: &model,
            store: &store,
            records: &[],
            visited: &HashMap::new(),
            seed: PageId(0),
            link_threshold: 0.2,
            run_id: "r",
            pages_fetched: 0,
            pages_dropped: 0,
        });
        assert!(out.is_none());
    }

    #[test]
    fn test_link_distance_bounds() {
        let mk = |paths: &[&str]| -> Set<TypedLink> {
            paths
                .iter()
                .map(|p| TypedLink {
                    kind: LinkKind::List,
                    index: None,
                    path: p.to_string(),
                    to: ClassId(1),
                })
                .collect()
        };
        let a = mk(&["x", "y"]);
        let b = mk(&["y", "z"]);
        assert_eq!(link_distance(&a, &a), 0.0);
        assert!(link_distance(&a, &b) > 0.0 && link_distance(&a, &b) < 1.0);
        assert_eq!(link_distance(&a, &b), link_distance(&b, &a));
    }

    #[test]
    fn test_menu_record_emits_indexed_edges() {
        let mut store = PageStore::new();
        store.insert(page(0, "https://s.com/", &["menu-path"], &[]));
        store.insert(page(1, "https://s.com/about", &["a"], &[]));
        store.insert(page(2, "https://s.com/faq", &["b"], &[]));

        let mut model = WebsiteModel::new("s.com");
        let w = CostWeights::default();
        for pages in [vec![PageId(0)], vec![PageId(1)], vec![PageId(2)]] {
            let c = CandidateClass::new(model.allocator().next(), pages);
            model.update(c, &store, &w);
        }

        let records = vec![CollectionRecord {
            page: Some(PageId(0)),
            path: "menu-path".to_string(),
            kind: LinkKind::Menu,
            links: vec![
                "https://s.com/about".to_string(),
                "https://s.com/faq".to_string(),
            ],
        }];
        let visited: HashMap<String, PageId> = [
            ("https://s.com/".to_string(), PageId(0)),
            ("https://s.com/about".to_string(), PageId(1)),
            ("https://s.com/faq".to_string(), PageId(2)),
        ]
        .into_iter()
        .collect();

        let g = build_fixture(&model, &store, &records, &visited);
        let menu_edges: Vec<_> = g
            .edges
            .iter()
            .filter(|e| matches!(e.kind, EdgeKind::Menu { .. }))
            .collect();
        assert_eq!(menu_edges.len(), 2);
        assert!(menu_edges
            .iter()
            .any(|e| e.kind == EdgeKind::Menu { index: 0 }));
        assert!(menu_edges
            .iter()
            .any(|e| e.kind == EdgeKind::Menu { index: 1 }));
        g.validate().unwrap();
    }
}
