// src/lib.rs
//! Lattice mechanism engine: builds a circular window lattice over a token
//! corpus, learns drift corrections and suffix recovery against it, scores
//! corpora for admissibility and generates seeded mirror corpora.

pub mod config;
pub mod core;
pub mod emulator;
pub mod error;
pub mod evaluation;
pub mod fuzzy;
pub mod learning;
pub mod persistence;

pub use crate::config::EngineConfig;
pub use crate::core::context::LatticeContext;
pub use crate::core::engine::LatticeEngine;
pub use crate::core::lattice::Lattice;
pub use crate::error::{LatticeError, Result};
pub use crate::evaluation::{calculate_admissibility, calculate_overgeneration};
