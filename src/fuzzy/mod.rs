// File: src/fuzzy/mod.rs
//! Out-of-vocabulary recovery.

pub mod suffix;

pub use suffix::{SuffixEntry, SuffixRecoveryMap, SuffixResolution};
