//! The website model: candidate classes, cost function and model state.

pub mod class;
pub mod cost;
pub mod website;
