//! The driver: a single-threaded cooperative loop that samples a site,
//! clusters the sampled pages and converges on a website model.
//!
//! One driver owns one website model. Control flow is an explicit state
//! enum driven by a plain loop; every transition happens only after the
//! previous step's I/O completed, so the model, the pending queue and the
//! visited map are never mutated concurrently. The unit of parallelism is
//! "one site": independent runs share no mutable state.

use crate::acquisition::snapshot::SnapshotStore;
use crate::acquisition::{FetchService, FetchedPage};
use crate::config::ModelerConfig;
use crate::error::ModelerError;
use crate::graph::builder::{build, GraphInputs};
use crate::model::class::CandidateClass;
use crate::model::website::{UpdateOutcome, WebsiteModel};
use crate::modeler::cluster::cluster_batch;
use crate::modeler::decision::{inspect, Verdict};
use crate::modeler::refine::{refine_collection, RefineOutcome};
use crate::modeler::{CollectionRecord, RunOutcome};
use crate::progress::{emit, ModelEventKind, ModelPhase, ProgressSender};
use crate::schema::page::{LinkCollection, LinkKind, Page, PageId, PageStore};
use crate::schema::path::PathExpression;
use scraper::Html;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// A collection waiting for expansion, ordered densest-first in the queue.
struct QueuedCollection {
    collection: LinkCollection,
    /// Insertion sequence; earlier collections win ties deterministically.
    seq: u64,
}

impl PartialEq for QueuedCollection {
    fn eq(&self, other: &Self) -> bool {
        self.collection.links.len() == other.collection.links.len() && self.seq == other.seq
    }
}

impl Eq for QueuedCollection {}

impl PartialOrd for QueuedCollection {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedCollection {
    fn cmp(&self, other: &Self) -> Ordering {
        self.collection
            .links
            .len()
            .cmp(&other.collection.links.len())
            .then(other.seq.cmp(&self.seq))
    }
}

/// The driver's explicit states.
enum State {
    Seed,
    Poll,
    Expand(Box<LinkCollection>),
    Finalize,
    Done(RunOutcome),
}

/// Orchestrates sampling, clustering, refinement and convergence for one
/// site.
pub struct ModelerDriver {
    config: ModelerConfig,
    fetcher: Arc<dyn FetchService>,
    snapshots: SnapshotStore,
    store: PageStore,
    model: WebsiteModel,
    queue: BinaryHeap<QueuedCollection>,
    queue_seq: u64,
    visited: HashMap<String, PageId>,
    /// Classified collections, keyed by (owner, path) so a menu resample
    /// overwrites its earlier record.
    records: BTreeMap<(PageId, String), CollectionRecord>,
    pages_fetched: u32,
    pages_dropped: u32,
    last_batch_fresh: bool,
    progress: Option<ProgressSender>,
    run_id: String,
    seq: u64,
}

impl ModelerDriver {
    pub fn new(
        config: ModelerConfig,
        fetcher: Arc<dyn FetchService>,
        progress: Option<ProgressSender>,
    ) -> Result<Self, ModelerError> {
        let seed_url =
            Url::parse(&config.entry_url).map_err(|source| ModelerError::InvalidSeedUrl {
                url: config.entry_url.clone(),
                source,
            })?;
        let site = seed_url.host_str().unwrap_or("site").to_string();

        let snapshots = if config.persist_snapshots {
            SnapshotStore::on_disk(&config.snapshot_root(), &site)?
        } else {
            SnapshotStore::in_memory()
        };

        Ok(Self {
            config,
            fetcher,
            snapshots,
            store: PageStore::new(),
            model: WebsiteModel::new(&site),
            queue: BinaryHeap::new(),
            queue_seq: 0,
            visited: HashMap::new(),
            records: BTreeMap::new(),
            pages_fetched: 0,
            pages_dropped: 0,
            last_batch_fresh: false,
            progress,
            run_id: uuid::Uuid::new_v4().to_string(),
            seq: 0,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Drive the run to completion and return the terminal signal.
    pub async fn run(mut self) -> RunOutcome {
        let started = Instant::now();
        info!(site = self.model.site(), entry = %self.config.entry_url, "starting model run");

        let mut state = State::Seed;
        loop {
            state = match state {
                State::Seed => self.seed(),
                State::Poll => self.poll(),
                State::Expand(col) => self.expand(*col).await,
                State::Finalize => State::Done(self.finalize(started)),
                State::Done(outcome) => return outcome,
            };
        }
    }

    /// SEED: queue the synthetic collection holding the entry URL.
    fn seed(&mut self) -> State {
        self.emit(ModelEventKind::PhaseStarted {
            phase: ModelPhase::Seed,
        });
        let seed = LinkCollection::seed(&self.config.entry_url);
        self.push_collection(seed);
        State::Poll
    }

    /// POLL: pop the densest pending collection, or finalize when the queue
    /// is exhausted or the page budget is spent.
    fn poll(&mut self) -> State {
        if self.pages_fetched >= self.config.max_total_pages {
            info!(
                fetched = self.pages_fetched,
                "page budget exhausted, finalizing"
            );
            return State::Finalize;
        }
        match self.queue.pop() {
            Some(queued) => State::Expand(Box::new(queued.collection)),
            None => State::Finalize,
        }
    }

    /// GETLINKS → FETCH → CLUSTER → INSPECT → (REFINE ⇄ INSPECT) → UPDATE
    /// for one collection.
    async fn expand(&mut self, mut col: LinkCollection) -> State {
        let batch_width = if col.resampled {
            col.links.len()
        } else {
            self.config.max_pages_per_batch
        };
        let targets: Vec<String> = col.links.iter().take(batch_width).cloned().collect();

        let batch = self.fetch_batch(&targets).await;
        if batch.is_empty() {
            debug!(path = col.path.render(), "batch produced no pages, skipping collection");
            return State::Poll;
        }

        self.emit(ModelEventKind::PhaseStarted {
            phase: ModelPhase::Cluster,
        });

        loop {
            let classes = cluster_batch(
                &batch,
                &self.store,
                self.model.allocator(),
                self.config.collapse_threshold,
            );

            let refinable = self.is_refinable(&col);
            let verdict = inspect(batch.len(), classes.len(), refinable, col.links.len());
            debug!(
                pages = batch.len(),
                clusters = classes.len(),
                refinable,
                ?verdict,
                path = col.path.render(),
                "inspected batch"
            );

            match verdict {
                Verdict::Refine => {
                    self.emit(ModelEventKind::PhaseStarted {
                        phase: ModelPhase::Refine,
                    });
                    match self.try_refine(&col) {
                        Some((path, links)) => {
                            debug!(refined = path.render(), "accepted discriminating refinement");
                            col.path = path;
                            col.links = links;
                            col.refined_once = true;
                            self.push_collection(col);
                            return State::Poll;
                        }
                        None => {
                            // Defined fallback: the nearest decision row that
                            // does not require refinement.
                            col.not_refinable = true;
                            continue;
                        }
                    }
                }
                Verdict::Classify(kind) => {
                    col.kind = Some(kind);
                    self.fold_classes(classes);
                    self.record(&col, kind);
                    return State::Poll;
                }
                Verdict::ClassifyAndResample => {
                    col.kind = Some(LinkKind::Menu);
                    self.fold_classes(classes);
                    self.record(&col, LinkKind::Menu);
                    if !col.resampled {
                        col.resampled = true;
                        debug!(
                            path = col.path.render(),
                            links = col.links.len(),
                            "menu suspected, re-queueing for full resample"
                        );
                        self.push_collection(col);
                    }
                    return State::Poll;
                }
            }
        }
    }

    /// FINALIZE: collapse the model and materialize the graph.
    fn finalize(&mut self, started: Instant) -> RunOutcome {
        self.emit(ModelEventKind::PhaseStarted {
            phase: ModelPhase::Finalize,
        });
        self.model
            .collapse_by_schema(self.config.collapse_threshold, &self.store);

        let records: Vec<CollectionRecord> = self.records.values().cloned().collect();
        let graph = build(GraphInputs {
            model: &self.model,
            store: &self.store,
            records: &records,
            visited: &self.visited,
            seed: PageId(0),
            link_threshold: self.config.collapse_threshold,
            run_id: &self.run_id,
            pages_fetched: self.pages_fetched,
            pages_dropped: self.pages_dropped,
        });

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.emit(ModelEventKind::PhaseCompleted {
            phase: ModelPhase::Finalize,
            duration_ms: elapsed_ms,
        });
        self.emit(ModelEventKind::RunComplete {
            classes: self.model.len() as u32,
            pages_fetched: self.pages_fetched,
            pages_dropped: self.pages_dropped,
            elapsed_ms,
        });

        match graph {
            Some(g) => {
                info!(
                    classes = g.nodes.len(),
                    edges = g.edges.len(),
                    pages = self.pages_fetched,
                    elapsed_ms,
                    "model run complete"
                );
                RunOutcome::Graph(g)
            }
            None => {
                warn!(entry = %self.config.entry_url, "no model could be built");
                RunOutcome::NoModel {
                    reason: format!("no page class could be derived from {}", self.config.entry_url),
                }
            }
        }
    }

    /// Fetch a batch of target URLs, reusing already-visited pages and
    /// deduplicating redirects. Transient failures drop the page from the
    /// batch with a log line; they are never retried.
    async fn fetch_batch(&mut self, targets: &[String]) -> Vec<PageId> {
        let any_fresh = targets.iter().any(|t| !self.visited.contains_key(t));
        if any_fresh {
            self.emit(ModelEventKind::PhaseStarted {
                phase: ModelPhase::Sample,
            });
            // Politeness pacing after a batch of fresh downloads.
            if self.last_batch_fresh && self.config.inter_batch_wait_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.inter_batch_wait_ms)).await;
            }
        }

        let mut batch: Vec<PageId> = Vec::new();
        let mut fresh = 0u32;
        for target in targets {
            if let Some(&id) = self.visited.get(target) {
                if !batch.contains(&id) {
                    batch.push(id);
                }
                continue;
            }
            if self.pages_fetched >= self.config.max_total_pages {
                debug!("page budget reached mid-batch, truncating");
                break;
            }
            match self.fetcher.fetch(target, self.config.use_script).await {
                Ok(fetched) => {
                    self.pages_fetched += 1;
                    fresh += 1;
                    let id = self.store_page(target, fetched);
                    if !batch.contains(&id) {
                        batch.push(id);
                    }
                }
                Err(e) => {
                    self.pages_dropped += 1;
                    warn!(url = target.as_str(), error = %e, "dropped page from batch");
                    self.emit(ModelEventKind::PageDropped {
                        url: target.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        self.last_batch_fresh = fresh > 0;
        batch
    }

    /// Parse and store a fetched page, deduplicating against redirects that
    /// land on an already-visited URL.
    fn store_page(&mut self, requested: &str, fetched: FetchedPage) -> PageId {
        if let Some(&existing) = self.visited.get(&fetched.final_url) {
            debug!(
                from = requested,
                to = fetched.final_url.as_str(),
                "redirect deduplicated"
            );
            self.visited.insert(requested.to_string(), existing);
            return existing;
        }

        let id = self.store.next_id();
        let mut page = Page::from_document(id, &fetched.url, &fetched.final_url, &fetched.html);
        page.snapshot = match self.snapshots.save(id, &fetched.html) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(url = requested, error = %e, "snapshot save failed; page will not refine");
                None
            }
        };
        self.store.insert(page);
        self.visited.insert(requested.to_string(), id);
        self.visited.insert(fetched.final_url.clone(), id);

        self.emit(ModelEventKind::PageFetched {
            url: fetched.final_url,
            fetched_total: self.pages_fetched,
        });
        id
    }

    /// UPDATE: fold surviving candidate classes into the model (cost-guided)
    /// and queue the collections of every newly classified page.
    fn fold_classes(&mut self, classes: Vec<CandidateClass>) {
        self.emit(ModelEventKind::PhaseStarted {
            phase: ModelPhase::Update,
        });
        for class in classes {
            // Pages already in the model keep their class; only fresh pages
            // are folded in.
            let fresh: Vec<PageId> = class
                .pages
                .iter()
                .copied()
                .filter(|&p| !self.store.get(p).classified)
                .collect();
            if fresh.is_empty() {
                continue;
            }
            let pages = fresh.len() as u32;
            let candidate = CandidateClass::new(class.id, fresh.clone());
            let outcome = self.model.update(candidate, &self.store, &self.config.cost);
            match outcome {
                UpdateOutcome::Added(id) => self.emit(ModelEventKind::ClassAdded {
                    class: id.to_string(),
                    pages,
                }),
                UpdateOutcome::MergedInto(id) => self.emit(ModelEventKind::ClassMerged {
                    into: id.to_string(),
                    pages,
                }),
            }
            for p in fresh {
                self.store.get_mut(p).classified = true;
                let collections = self.store.get(p).collections.clone();
                for c in collections {
                    if !c.links.is_empty() {
                        self.push_collection(c);
                    }
                }
            }
        }
    }

    /// Whether a refinement attempt is still worth making for a collection.
    fn is_refinable(&self, col: &LinkCollection) -> bool {
        let Some(owner) = col.page else {
            return false;
        };
        !col.refined_once
            && !col.not_refinable
            && (col.path.can_refine() || col.path.can_coarsen())
            && self.store.get(owner).snapshot.is_some()
    }

    /// Replay the collection's path against the owner page's snapshot,
    /// looking for a discriminating adjustment. Snapshot I/O failure is
    /// treated like refinement exhaustion.
    fn try_refine(&self, col: &LinkCollection) -> Option<(PathExpression, Vec<String>)> {
        let owner = col.page?;
        let page = self.store.get(owner);
        let handle = page.snapshot.as_ref()?;
        let html = match self.snapshots.reload(handle) {
            Ok(html) => html,
            Err(e) => {
                warn!(page = %owner, error = %e, "snapshot reload failed, treating as exhausted");
                return None;
            }
        };
        let base = Url::parse(&page.final_url).ok()?;
        let doc = Html::parse_document(&html);
        match refine_collection(&col.path, &col.links, &doc, &base, page.total_links) {
            RefineOutcome::Accepted { path, links } => Some((path, links)),
            RefineOutcome::Exhausted => None,
        }
    }

    fn push_collection(&mut self, collection: LinkCollection) {
        self.emit(ModelEventKind::CollectionQueued {
            path: collection.path.render().to_string(),
            links: collection.links.len() as u32,
        });
        self.queue_seq += 1;
        self.queue.push(QueuedCollection {
            collection,
            seq: self.queue_seq,
        });
    }

    fn record(&mut self, col: &LinkCollection, kind: LinkKind) {
        let Some(owner) = col.page else {
            // The synthetic seed collection never becomes an edge.
            return;
        };
        let path = col.path.render().to_string();
        self.records.insert(
            (owner, path.clone()),
            CollectionRecord {
                page: Some(owner),
                path,
                kind,
                links: col.links.clone(),
            },
        );
    }

    fn emit(&mut self, event: ModelEventKind) {
        emit(&self.progress, &self.run_id, &mut self.seq, event);
    }
}
