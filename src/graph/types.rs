//! Page-class graph types: the artifact handed to a production crawler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Graph format version, bumped on breaking layout changes.
pub const FORMAT_VERSION: u16 = 1;

/// How a data-extraction path's value should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    String,
    Url,
    Image,
}

impl ExtractorKind {
    /// Infer the kind from a rendered path's terminal tag.
    pub fn infer(path: &str) -> Self {
        let last = path.rsplit('/').next().unwrap_or(path);
        let tag = last.split('[').next().unwrap_or(last);
        match tag {
            "img" => Self::Image,
            "a" => Self::Url,
            _ => Self::String,
        }
    }
}

impl FromStr for ExtractorKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "url" => Ok(Self::Url),
            "image" => Ok(Self::Image),
            other => Err(GraphError::UnknownExtractorKind(other.to_string())),
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Url => write!(f, "url"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// A typed data-extraction path on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPath {
    pub path: String,
    pub kind: ExtractorKind,
}

/// Edge typing, exactly the classification the modeler produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeKind {
    /// One target page.
    Singleton,
    /// Many targets, one class.
    List,
    /// Heterogeneous targets; one edge per positional index.
    Menu { index: u32 },
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => write!(f, "singleton"),
            Self::List => write!(f, "list"),
            Self::Menu { index } => write!(f, "menu[{index}]"),
        }
    }
}

/// One page class in the finalized graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageClassNode {
    pub id: u32,
    pub name: String,
    /// Sample member URLs, capped by the builder.
    pub members: Vec<String>,
    /// Typed data-extraction paths derived from the class's label schema.
    pub data_paths: Vec<DataPath>,
}

/// A typed navigation edge between two page classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEdge {
    pub from: u32,
    pub to: u32,
    pub kind: EdgeKind,
    /// The rendered path expression the links live under.
    pub path: String,
}

/// Graph metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphHeader {
    pub site: String,
    pub run_id: String,
    pub modeled_at: DateTime<Utc>,
    pub format_version: u16,
    pub node_count: u32,
    pub edge_count: u32,
    pub pages_fetched: u32,
    pub pages_dropped: u32,
}

/// The finalized page-class graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageClassGraph {
    pub header: GraphHeader,
    /// Node id of the entry page's class.
    pub root: u32,
    pub nodes: Vec<PageClassNode>,
    pub edges: Vec<ClassEdge>,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown extractor kind '{0}' (expected string, url or image)")]
    UnknownExtractorKind(String),
    #[error("edge {kind} at {path} targets missing node {to}")]
    MissingTarget { kind: String, path: String, to: u32 },
    #[error("root {0} is not a node of the graph")]
    MissingRoot(u32),
    #[error("node {from} has two {kind} edges at {path} with different targets")]
    ConflictingEdge { from: u32, kind: String, path: String },
}

impl PageClassGraph {
    /// Check well-formedness: every edge targets an existing node, the root
    /// exists, and no node carries two edges with the same (type, path) pair
    /// pointing at different destinations.
    pub fn validate(&self) -> Result<(), GraphError> {
        let ids: HashSet<u32> = self.nodes.iter().map(|n| n.id).collect();
        if !ids.contains(&self.root) {
            return Err(GraphError::MissingRoot(self.root));
        }
        let mut seen: HashSet<(u32, EdgeKind, &str)> = HashSet::new();
        for edge in &self.edges {
            if !ids.contains(&edge.to) || !ids.contains(&edge.from) {
                return Err(GraphError::MissingTarget {
                    kind: edge.kind.to_string(),
                    path: edge.path.clone(),
                    to: edge.to,
                });
            }
            if !seen.insert((edge.from, edge.kind, edge.path.as_str())) {
                return Err(GraphError::ConflictingEdge {
                    from: edge.from,
                    kind: edge.kind.to_string(),
                    path: edge.path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Serialize the graph as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
