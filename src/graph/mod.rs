//! The page-class graph: construction and output types.

pub mod builder;
pub mod types;
