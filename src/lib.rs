//! Tessera library: website structure modeler.
//!
//! Given only a seed URL, tessera samples a bounded number of pages, groups
//! them into page classes by comparing their DOM link schemas, resolves
//! ambiguous groupings by refining path expressions against cached
//! snapshots, and emits a typed page-class graph for a production crawler
//! to consume.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod modeler;
pub mod progress;
pub mod schema;
