//! The clustering pass over a batch of freshly sampled pages.
//!
//! Grouping is by exact equality of the default link schema; a split pass
//! then pulls out pages whose label schema diverges from the group, and an
//! ordered collapse pass merges near-duplicate groups. The whole pass is a
//! pure function of the batch order, so running it twice yields the same
//! partition.

use crate::model::class::{schema_distance, CandidateClass, ClassIdAlloc};
use crate::schema::page::{PageId, PageStore};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Cluster a batch of pages sharing one parent link collection into
/// candidate classes, ordered largest-first.
pub fn cluster_batch(
    batch: &[PageId],
    store: &PageStore,
    alloc: &mut ClassIdAlloc,
    collapse_threshold: f64,
) -> Vec<CandidateClass> {
    // 1. Group by exact default-schema equality, in batch order.
    let mut index_of: HashMap<Vec<String>, usize> = HashMap::new();
    let mut classes: Vec<CandidateClass> = Vec::new();
    for &page in batch {
        let key: Vec<String> = store.get(page).schema.iter().cloned().collect();
        match index_of.get(&key) {
            Some(&idx) => classes[idx].pages.push(page),
            None => {
                index_of.insert(key, classes.len());
                classes.push(CandidateClass::new(alloc.next(), vec![page]));
            }
        }
    }

    // 2. Split pass: pages whose label schema does not contain the class's
    // label schema (the union over members) are pulled out into their own
    // classes. Catches pages that coincidentally match on links but diverge
    // on content fields.
    let mut split_off: Vec<CandidateClass> = Vec::new();
    for class in &mut classes {
        if class.len() < 2 {
            continue;
        }
        let union = class.label_schema(store);
        let (keep, pull): (Vec<PageId>, Vec<PageId>) = class
            .pages
            .iter()
            .copied()
            .partition(|&p| store.get(p).label_schema.is_superset(&union));
        if pull.is_empty() {
            continue;
        }
        debug!(class = %class.id, pulled = pull.len(), "split label-divergent pages");
        class.pages = keep;
        for p in pull {
            split_off.push(CandidateClass::new(alloc.next(), vec![p]));
        }
    }
    classes.extend(split_off);
    classes.retain(|c| !c.is_empty());

    // 3. Collapse pass: largest-first (ties by ascending id), merge any later
    // class within the distance threshold of an earlier one.
    let mut order: Vec<usize> = (0..classes.len()).collect();
    order.sort_by(|&a, &b| {
        classes[b]
            .len()
            .cmp(&classes[a].len())
            .then(classes[a].id.cmp(&classes[b].id))
    });
    let schemas: Vec<BTreeSet<String>> = classes.iter().map(|c| c.schema(store)).collect();

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
            if schema_distance(&schemas[ci], &schemas[cj]) < collapse_threshold {
                merged_into.insert(cj, ci);
            }
        }
    }
    if !merged_into.is_empty() {
        let mut moves: Vec<(usize, usize)> = merged_into.into_iter().collect();
        moves.sort();
        for (from, to) in moves {
            let pages = std::mem::take(&mut classes[from].pages);
            classes[to].pages.extend(pages);
        }
        classes.retain(|c| !c.is_empty());
    }

    classes.sort_by(|a, b| b.len().cmp(&a.len()).then(a.id.cmp(&b.id)));
    classes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::page::Page;
    use std::collections::BTreeSet;

    fn page(id: u32, links: &[&str], labels: &[&str]) -> Page {
        Page {
            id: PageId(id),
            url: format!("https://example.com/{id}"),
            final_url: format!("https://example.com/{id}"),
            schema: links.iter().map(|s| s.to_string()).collect(),
            label_schema: labels.iter().map(|s| s.to_string()).collect(),
            collections: Vec::new(),
            total_links: links.len(),
            content_hash: 0,
            snapshot: None,
            classified: false,
        }
    }

    fn store_of(pages: Vec<Page>) -> PageStore {
        let mut store = PageStore::new();
        for p in pages {
            store.insert(p);
        }
        store
    }

    #[test]
    fn test_identical_schemas_form_one_class() {
        // Three pages with identical link schemas collapse to one class.
        let store = store_of(vec![
            page(0, &["a", "b", "c"], &["t"]),
            page(1, &["a", "b", "c"], &["t"]),
            page(2, &["a", "b", "c"], &["t"]),
        ]);
        let mut alloc = ClassIdAlloc::default();
        let classes = cluster_batch(&[PageId(0), PageId(1), PageId(2)], &store, &mut alloc, 0.2);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].len(), 3);
    }

    #[test]
    fn test_disjoint_schemas_stay_apart() {
        // Two pages with disjoint schemas stay in two classes.
        let store = store_of(vec![
            page(0, &["a", "b"], &["t"]),
            page(1, &["x", "y"], &["u"]),
        ]);
        let mut alloc = ClassIdAlloc::default();
        let classes = cluster_batch(&[PageId(0), PageId(1)], &store, &mut alloc, 0.2);
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].len(), 1);
        assert_eq!(classes[1].len(), 1);
    }

    #[test]
    fn test_label_divergent_page_is_split_off() {
        // Links match exactly, but page 2 is missing a content field the
        // others share.
        let store = store_of(vec![
            page(0, &["a"], &["price", "title"]),
            page(1, &["a"], &["price", "title"]),
            page(2, &["a"], &["title"]),
        ]);
        let mut alloc = ClassIdAlloc::default();
        // Threshold 0 disables the collapse so the split is observable.
        let classes = cluster_batch(&[PageId(0), PageId(1), PageId(2)], &store, &mut alloc, 0.0);
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].len(), 2);
        assert_eq!(classes[1].pages, vec![PageId(2)]);
    }

    #[test]
    fn test_near_duplicate_classes_collapse() {
        let shared: Vec<String> = (0..9).map(|i| format!("s{i}")).collect();
        let shared_refs: Vec<&str> = shared.iter().map(|s| s.as_str()).collect();
        let mut extended = shared_refs.clone();
        extended.push("extra");
        let store = store_of(vec![
            page(0, &shared_refs, &[]),
            page(1, &extended, &[]),
        ]);
        let mut alloc = ClassIdAlloc::default();
        // Distance 1/10 < 0.2: the two groups merge.
        let classes = cluster_batch(&[PageId(0), PageId(1)], &store, &mut alloc, 0.2);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].len(), 2);
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let store = store_of(vec![
            page(0, &["a", "b"], &["t"]),
            page(1, &["a", "b"], &["t"]),
            page(2, &["x"], &["u"]),
        ]);
        let batch = [PageId(0), PageId(1), PageId(2)];
        let run = |alloc: &mut ClassIdAlloc| -> Vec<Vec<PageId>> {
            cluster_batch(&batch, &store, alloc, 0.2)
                .into_iter()
                .map(|c| c.pages)
                .collect()
        };
        let first = run(&mut ClassIdAlloc::default());
        let second = run(&mut ClassIdAlloc::default());
        assert_eq!(first, second);
    }
}
