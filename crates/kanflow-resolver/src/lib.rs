//! Generic versioned dependency resolution for the kanflow engine.
//!
//! Independent of the task scheduler but solving the same class of problem
//! for declared service/package dependencies: register `(name, version)`
//! pairs with their dependency specs, select the best version under a set
//! of semver constraints, and walk the graph depth-first with cycle
//! detection.
//!
//! # Main types
//!
//! - [`DependencyResolver`] — The registry and resolution walk.
//! - [`DependencySpec`] — One declared dependency with a semver constraint.
//! - [`Resolution`] — The per-dependency outcome of a resolution walk.
//! - [`verify_graph`] — Up-front acyclicity check for plain id graphs.

/// Structural validation for declared dependency graphs.
pub mod graph;
/// The dependency registry and resolution walk.
pub mod resolver;

pub use graph::verify_graph;
pub use resolver::{DependencyResolver, DependencySpec, Resolution};
