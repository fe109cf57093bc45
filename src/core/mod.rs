// File: src/core/mod.rs
//! The static lattice: graph, embedding, windows and their ordering.

pub mod cluster;
pub mod context;
pub mod embedding;
pub mod engine;
pub mod graph;
pub mod lattice;
pub mod reorder;
pub mod types;
