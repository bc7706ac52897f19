//! Pages reduced to their link/label schemas.
//!
//! A fetched page is parsed once and reduced to the set of path expressions
//! it exposes: one `LinkCollection` per distinct default path render over its
//! anchors, plus a label schema of text-bearing paths. The default schema is
//! the clustering key and never changes after construction.

use crate::acquisition::snapshot::SnapshotHandle;
use crate::schema::path::{anchor_chain, PathExpression};
use fnv::FnvHasher;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::hash::Hasher;
use tracing::warn;
use url::Url;

/// Index of a page in the [`PageStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Classification of a link collection, assigned by the decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// One target page.
    Singleton,
    /// Many targets sharing one page class.
    List,
    /// Heterogeneous targets spanning several classes; edges are emitted
    /// per positional index.
    Menu,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => write!(f, "singleton"),
            Self::List => write!(f, "list"),
            Self::Menu => write!(f, "menu"),
        }
    }
}

/// One path expression's resolved set of target links on one page.
#[derive(Debug, Clone)]
pub struct LinkCollection {
    /// Owning page; `None` only for the synthetic seed collection.
    pub page: Option<PageId>,
    pub path: PathExpression,
    /// Normalized absolute target URLs, deduplicated, in document order.
    pub links: Vec<String>,
    pub kind: Option<LinkKind>,
    /// One refinement has already been spent on this collection.
    pub refined_once: bool,
    /// Refinement was attempted and exhausted without discriminating.
    pub not_refinable: bool,
    /// The collection has already been re-queued for a full menu resample.
    pub resampled: bool,
}

impl LinkCollection {
    /// The synthetic collection that bootstraps a run: a single link (the
    /// entry URL) with no owning page and no DOM route.
    pub fn seed(entry_url: &str) -> Self {
        Self {
            page: None,
            path: PathExpression::synthetic(),
            links: vec![entry_url.to_string()],
            kind: None,
            refined_once: false,
            not_refinable: true,
            resampled: false,
        }
    }
}

/// A fetched page reduced to its schema.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: PageId,
    /// URL as requested.
    pub url: String,
    /// URL after redirects; used for deduplication.
    pub final_url: String,
    /// Default-render path strings over the page's anchors. The clustering
    /// key; immutable after construction.
    pub schema: BTreeSet<String>,
    /// Default-render path strings over the page's text-bearing elements.
    pub label_schema: BTreeSet<String>,
    pub collections: Vec<LinkCollection>,
    /// Count of distinct outgoing link URLs across all collections.
    pub total_links: usize,
    /// FNV-1a hash of the raw HTML.
    pub content_hash: u64,
    pub snapshot: Option<SnapshotHandle>,
    /// Set once the page has been folded into a model class.
    pub classified: bool,
}

impl Page {
    /// Parse a document into a page: group anchors by default path render
    /// into link collections and derive the label schema. Anchors whose path
    /// cannot be built are dropped with a warning rather than failing the
    /// page.
    pub fn from_document(id: PageId, url: &str, final_url: &str, html: &str) -> Self {
        let doc = Html::parse_document(html);
        let base = Url::parse(final_url).or_else(|_| Url::parse(url)).ok();

        let mut groups: BTreeMap<String, (PathExpression, Vec<String>)> = BTreeMap::new();
        let mut all_links: HashSet<String> = HashSet::new();
        let mut dropped = 0usize;

        if let (Ok(sel), Some(base)) = (Selector::parse("a[href]"), base.as_ref()) {
            for anchor in doc.select(&sel) {
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                let Some(target) = normalize_link(base, href) else {
                    continue;
                };
                let Some(path) = PathExpression::from_anchor(anchor) else {
                    dropped += 1;
                    continue;
                };
                let entry = groups
                    .entry(path.default_render().to_string())
                    .or_insert_with(|| (path, Vec::new()));
                if !entry.1.contains(&target) {
                    entry.1.push(target.clone());
                }
                all_links.insert(target);
            }
        }
        if dropped > 0 {
            warn!(url, dropped, "dropped anchors with unbuildable paths");
        }

        let schema: BTreeSet<String> = groups.keys().cloned().collect();
        let collections: Vec<LinkCollection> = groups
            .into_values()
            .map(|(path, links)| LinkCollection {
                page: Some(id),
                path,
                links,
                kind: None,
                refined_once: false,
                not_refinable: false,
                resampled: false,
            })
            .collect();

        let label_schema = label_schema(&doc);

        let mut hasher = FnvHasher::default();
        hasher.write(html.as_bytes());

        Self {
            id,
            url: url.to_string(),
            final_url: final_url.to_string(),
            schema,
            label_schema,
            collections,
            total_links: all_links.len(),
            content_hash: hasher.finish(),
            snapshot: None,
            classified: false,
        }
    }
}

/// Resolve the link set a path expression selects in a document, using the
/// same normalization as page construction. Used by the refinement loop to
/// replay adjusted paths against a cached snapshot.
pub fn resolve_links(path: &PathExpression, doc: &Html, base: &Url) -> Vec<String> {
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let mut links = Vec::new();
    for anchor in doc.select(&sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !path.matches(&anchor_chain(anchor)) {
            continue;
        }
        if let Some(target) = normalize_link(base, href) {
            if !links.contains(&target) {
                links.push(target);
            }
        }
    }
    links
}

/// Normalize an href against the page base: absolute, fragment-stripped,
/// http(s)-only, same site. Returns `None` for anything else.
pub fn normalize_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut target = base.join(href).ok()?;
    if target.scheme() != "http" && target.scheme() != "https" {
        return None;
    }
    if !same_site(base, &target) {
        return None;
    }
    target.set_fragment(None);
    Some(target.to_string())
}

fn same_site(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(ha), Some(hb)) => {
            ha.trim_start_matches("www.") == hb.trim_start_matches("www.")
        }
        _ => false,
    }
}

/// Tags that never contribute label paths.
const NON_LABEL_TAGS: &[&str] = &[
    "script", "style", "a", "html", "head", "title", "meta", "link", "noscript", "body",
];

/// Derive the label schema: default path renders of leaf elements carrying
/// their own text (data fields, not navigation), plus images.
fn label_schema(doc: &Html) -> BTreeSet<String> {
    let mut labels = BTreeSet::new();
    let Ok(sel) = Selector::parse("body *") else {
        return labels;
    };
    for el in doc.select(&sel) {
        let tag = el.value().name();
        if NON_LABEL_TAGS.contains(&tag) {
            continue;
        }
        // Elements inside an anchor belong to the link, not to the page's
        // data fields.
        let in_anchor = el.ancestors().any(|n| {
            scraper::ElementRef::wrap(n).is_some_and(|a| a.value().name() == "a")
        });
        if in_anchor {
            continue;
        }
        let is_leaf = !el.children().any(|c| c.value().is_element());
        let has_text = el
            .children()
            .any(|c| c.value().as_text().is_some_and(|t| !t.trim().is_empty()));
        if tag == "img" || (is_leaf && has_text) {
            if let Some(path) = PathExpression::from_anchor(el) {
                labels.insert(path.default_render().to_string());
            }
        }
    }
    labels
}

/// Owning store for all pages seen during one model run. Classes reference
/// pages by id; there are no back-pointers.
#[derive(Debug, Default)]
pub struct PageStore {
    pages: Vec<Page>,
}

impl PageStore {
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    /// The id the next inserted page will receive.
    pub fn next_id(&self) -> PageId {
        PageId(self.pages.len() as u32)
    }

    pub fn insert(&mut self, page: Page) -> PageId {
        debug_assert_eq!(page.id, self.next_id());
        let id = page.id;
        self.pages.push(page);
        id
    }

    pub fn get(&self, id: PageId) -> &Page {
        &self.pages[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: PageId) -> &mut Page {
        &mut self.pages[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_PAGE: &str = r#"<html><body>
        <ul class="results">
            <li class="row"><a href="/item/1">Item one</a></li>
            <li class="row"><a href="/item/2">Item two</a></li>
            <li class="row"><a href="/item/3">Item three</a></li>
        </ul>
        <div class="footer"><a href="/about">About</a></div>
        <h1>Results</h1>
        <span class="count">3 items</span>
    </body></html>"#;

    fn page(html: &str) -> Page {
        Page::from_document(PageId(0), "https://example.com/list", "https://example.com/list", html)
    }

    #[test]
    fn test_anchors_group_by_default_render() {
        let p = page(LIST_PAGE);
        // Two distinct anchor paths: the result rows and the footer link.
        assert_eq!(p.collections.len(), 2);
        assert_eq!(p.schema.len(), 2);
        let rows = p
            .collections
            .iter()
            .find(|c| c.links.len() == 3)
            .expect("row collection");
        assert!(rows.links[0].ends_with("/item/1"));
        assert!(rows.links[2].ends_with("/item/3"));
        assert_eq!(p.total_links, 4);
    }

    #[test]
    fn test_label_schema_excludes_links() {
        let p = page(LIST_PAGE);
        // h1 and span.count are labels; anchor text is not.
        assert_eq!(p.label_schema.len(), 2);
        assert!(p.label_schema.iter().any(|l| l.ends_with("h1")));
        assert!(p.label_schema.iter().any(|l| l.contains("span[@class]")));
    }

    #[test]
    fn test_links_normalized_and_deduplicated() {
        let p = page(
            r##"<html><body><div>
                <a href="/x#frag">one</a>
                <a href="/x">dup</a>
                <a href="https://other.example.org/ext">external</a>
                <a href="mailto:a@b.c">mail</a>
                <a href="#top">fragment</a>
            </div></body></html>"##,
        );
        assert_eq!(p.collections.len(), 1);
        assert_eq!(p.collections[0].links, vec!["https://example.com/x"]);
        assert_eq!(p.total_links, 1);
    }

    #[test]
    fn test_www_host_counts_as_same_site() {
        let base = Url::parse("https://example.com/").unwrap();
        assert!(normalize_link(&base, "https://www.example.com/a").is_some());
        assert!(normalize_link(&base, "https://sub.example.com/a").is_none());
    }

    #[test]
    fn test_resolve_links_with_refined_path() {
        let html = r#"<html><body>
            <div class="nav"><a href="/home">home</a></div>
            <div class="items"><a href="/i/1">a</a><a href="/i/2">b</a></div>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let sel = Selector::parse("a").unwrap();
        // Both divs render identically at default granularity.
        let anchor = doc.select(&sel).next().unwrap();
        let mut path = PathExpression::from_anchor(anchor).unwrap();
        let coarse = resolve_links(&path, &doc, &base);
        assert_eq!(coarse.len(), 3);
        // Pinning class='nav' narrows the selection.
        assert!(path.refine());
        let fine = resolve_links(&path, &doc, &base);
        assert_eq!(fine, vec!["https://example.com/home"]);
    }

    #[test]
    fn test_seed_collection_shape() {
        let c = LinkCollection::seed("https://example.com/");
        assert!(c.page.is_none());
        assert_eq!(c.links.len(), 1);
        assert!(c.not_refinable);
    }
}
