//! Adjustable-granularity DOM path expressions.
//!
//! A `PathExpression` describes the route from an anchor element up to the
//! document root (or the nearest ancestor carrying an `id` attribute). The
//! chain of tag steps is fixed at construction; only the granularity of the
//! attribute descriptors on each step can change afterwards. The rendered
//! string form doubles as the schema key for page clustering, so rendering
//! must be deterministic for a given granularity state.

use scraper::ElementRef;
use std::fmt;
use std::hash::{Hash, Hasher};

/// How much of an attribute is included in the rendered path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Granularity {
    /// The attribute does not appear in the rendering.
    Omitted,
    /// Only the attribute name appears, e.g. `[@class]`.
    NameOnly,
    /// Name and value appear, e.g. `[@class='nav-item']`.
    NameAndValue,
}

/// One attribute on one step, with its current granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    name: String,
    value: String,
    granularity: Granularity,
}

/// One element along the root-to-anchor chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagStep {
    tag: String,
    attributes: Vec<AttributeDescriptor>,
}

/// A raw ancestor-chain element used when matching a path against a live
/// document: tag name plus all attributes in document order.
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

/// An adjustable-granularity description of a root-to-anchor DOM path.
///
/// Steps are ordered outermost-first: index 0 is the step farthest from the
/// anchor, the last step is the anchor element itself. Refinement walks from
/// index 0 toward the anchor, generalization walks the other way, which makes
/// the sequence of granularity states finite and deterministic.
#[derive(Debug, Clone)]
pub struct PathExpression {
    steps: Vec<TagStep>,
    default_render: String,
    rendered: String,
}

impl PathExpression {
    /// Build a path from a live anchor element.
    ///
    /// Walks ancestors from the anchor up to `<html>`, or stops early at the
    /// first ancestor carrying an `id` attribute. The anchor step keeps all
    /// its attributes at name-only granularity; intermediate steps keep only
    /// their first attribute at name-only; an id-bearing stop step keeps only
    /// `id` at name-only.
    pub fn from_anchor(anchor: ElementRef<'_>) -> Option<Self> {
        let mut elements: Vec<ElementRef<'_>> = vec![anchor];
        for node in anchor.ancestors() {
            let Some(el) = ElementRef::wrap(node) else {
                continue;
            };
            elements.push(el);
            if el.value().attr("id").is_some() || el.value().name() == "html" {
                break;
            }
        }
        if elements.len() < 2 {
            // An anchor with no element ancestry cannot anchor a path.
            return None;
        }
        elements.reverse();

        let last = elements.len() - 1;
        let steps: Vec<TagStep> = elements
            .iter()
            .enumerate()
            .map(|(i, el)| {
                let is_anchor = i == last;
                let stop_id = i == 0 && el.value().attr("id").is_some() && !is_anchor;
                let attributes = el
                    .value()
                    .attrs()
                    .enumerate()
                    .map(|(a, (name, value))| {
                        let granularity = if is_anchor {
                            Granularity::NameOnly
                        } else if stop_id {
                            if name == "id" {
                                Granularity::NameOnly
                            } else {
                                Granularity::Omitted
                            }
                        } else if a == 0 {
                            Granularity::NameOnly
                        } else {
                            Granularity::Omitted
                        };
                        AttributeDescriptor {
                            name: name.to_string(),
                            value: value.to_string(),
                            granularity,
                        }
                    })
                    .collect();
                TagStep {
                    tag: el.value().name().to_string(),
                    attributes,
                }
            })
            .collect();

        let rendered = render_steps(&steps);
        Some(Self {
            steps,
            default_render: rendered.clone(),
            rendered,
        })
    }

    /// The synthetic path used by the seed collection, which has no owning
    /// page and therefore no DOM route.
    pub fn synthetic() -> Self {
        Self {
            steps: Vec::new(),
            default_render: String::new(),
            rendered: String::new(),
        }
    }

    /// Current string form for the active granularity state.
    pub fn render(&self) -> &str {
        &self.rendered
    }

    /// The rendering produced at construction time, before any granularity
    /// change. This is the clustering key and never changes.
    pub fn default_render(&self) -> &str {
        &self.default_render
    }

    /// Number of steps in the chain.
    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    /// Apply one atomic granularity increase: the first attribute below
    /// name-and-value on the lowest-index step that still has one. Returns
    /// `false` at the lattice boundary; that is the refinement loop's
    /// termination signal, not an error.
    pub fn refine(&mut self) -> bool {
        for step in &mut self.steps {
            for attr in &mut step.attributes {
                if let Some(next) = raise(attr.granularity) {
                    attr.granularity = next;
                    self.rendered = render_steps(&self.steps);
                    return true;
                }
            }
        }
        false
    }

    /// Apply one atomic granularity decrease: the last attribute above
    /// omitted on the highest-index step that still has one. Returns `false`
    /// at the lattice boundary.
    pub fn coarsen(&mut self) -> bool {
        for step in self.steps.iter_mut().rev() {
            for attr in step.attributes.iter_mut().rev() {
                if let Some(prev) = lower(attr.granularity) {
                    attr.granularity = prev;
                    self.rendered = render_steps(&self.steps);
                    return true;
                }
            }
        }
        false
    }

    /// Whether at least one further `refine()` step exists.
    pub fn can_refine(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.attributes.iter().any(|a| raise(a.granularity).is_some()))
    }

    /// Whether at least one further `coarsen()` step exists.
    pub fn can_coarsen(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.attributes.iter().any(|a| lower(a.granularity).is_some()))
    }

    /// Jump to the finest lattice extreme: every attribute at name-and-value.
    pub fn finest(&mut self) {
        for step in &mut self.steps {
            for attr in &mut step.attributes {
                attr.granularity = Granularity::NameAndValue;
            }
        }
        self.rendered = render_steps(&self.steps);
    }

    /// Jump to the coarsest lattice extreme: tags only.
    pub fn coarsest(&mut self) {
        for step in &mut self.steps {
            for attr in &mut step.attributes {
                attr.granularity = Granularity::Omitted;
            }
        }
        self.rendered = render_steps(&self.steps);
    }

    /// Test whether an anchor's raw ancestor chain satisfies this path at its
    /// current granularity. The chain must have the same length and tag
    /// sequence; every non-omitted attribute descriptor must be present on
    /// the corresponding chain element (with an equal value at
    /// name-and-value granularity).
    pub fn matches(&self, chain: &[ChainStep]) -> bool {
        if self.steps.len() != chain.len() {
            return false;
        }
        self.steps.iter().zip(chain.iter()).all(|(step, elem)| {
            if step.tag != elem.tag {
                return false;
            }
            step.attributes.iter().all(|attr| match attr.granularity {
                Granularity::Omitted => true,
                Granularity::NameOnly => elem.attrs.iter().any(|(n, _)| *n == attr.name),
                Granularity::NameAndValue => elem
                    .attrs
                    .iter()
                    .any(|(n, v)| *n == attr.name && *v == attr.value),
            })
        })
    }
}

/// Build the raw ancestor chain for an anchor, mirroring the walk performed
/// by [`PathExpression::from_anchor`] so that candidate anchors and sample
/// paths stop at the same reference ancestor.
pub fn anchor_chain(anchor: ElementRef<'_>) -> Vec<ChainStep> {
    let mut elements: Vec<ElementRef<'_>> = vec![anchor];
    for node in anchor.ancestors() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        elements.push(el);
        if el.value().attr("id").is_some() || el.value().name() == "html" {
            break;
        }
    }
    elements.reverse();
    elements
        .iter()
        .map(|el| ChainStep {
            tag: el.value().name().to_string(),
            attrs: el
                .value()
                .attrs()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        })
        .collect()
}

fn raise(g: Granularity) -> Option<Granularity> {
    match g {
        Granularity::Omitted => Some(Granularity::NameOnly),
        Granularity::NameOnly => Some(Granularity::NameAndValue),
        Granularity::NameAndValue => None,
    }
}

fn lower(g: Granularity) -> Option<Granularity> {
    match g {
        Granularity::NameAndValue => Some(Granularity::NameOnly),
        Granularity::NameOnly => Some(Granularity::Omitted),
        Granularity::Omitted => None,
    }
}

fn render_steps(steps: &[TagStep]) -> String {
    let parts: Vec<String> = steps
        .iter()
        .map(|step| {
            let mut s = step.tag.clone();
            for attr in &step.attributes {
                match attr.granularity {
                    Granularity::Omitted => {}
                    Granularity::NameOnly => {
                        s.push_str(&format!("[@{}]", attr.name));
                    }
                    Granularity::NameAndValue => {
                        s.push_str(&format!("[@{}='{}']", attr.name, attr.value));
                    }
                }
            }
            s
        })
        .collect();
    parts.join("/")
}

impl PartialEq for PathExpression {
    fn eq(&self, other: &Self) -> bool {
        self.rendered == other.rendered
    }
}

impl Eq for PathExpression {}

impl Hash for PathExpression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rendered.hash(state);
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendered)
    }
}
