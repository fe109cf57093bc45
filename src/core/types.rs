// src/core/types.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An opaque corpus token.
pub type Token = String;

/// An ordered run of tokens. Transitions never cross line boundaries.
pub type Line = Vec<Token>;

/// Index of a window state in `[0, N)`.
pub type WindowId = usize;

/// Token occurrence counts over a corpus.
/// Ordered so that every walk over it is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyTable {
    counts: BTreeMap<Token, u64>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines(lines: &[Line]) -> Self {
        let mut table = Self::new();
        for line in lines {
            for token in line {
                table.add(token, 1);
            }
        }
        table
    }

    pub fn add(&mut self, token: &str, count: u64) {
        *self.counts.entry(token.to_string()).or_insert(0) += count;
    }

    /// Occurrences of `token`; zero when unseen.
    pub fn count(&self, token: &str) -> u64 {
        self.counts.get(token).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(t, &c)| (t.as_str(), c))
    }

    /// Tokens ordered by descending count, ties broken lexicographically.
    pub fn ranked(&self) -> Vec<(&str, u64)> {
        let mut ranked: Vec<(&str, u64)> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

/// Signed circular offset from `from` to `to` on a ring of `n` windows,
/// normalised into `(-n/2, n/2]`.
pub fn signed_offset(from: i64, to: i64, n: usize) -> i64 {
    wrap_offset(to - from, n)
}

/// Normalises an arbitrary offset into `(-n/2, n/2]`.
pub fn wrap_offset(delta: i64, n: usize) -> i64 {
    let n = n as i64;
    let d = delta.rem_euclid(n);
    if 2 * d > n {
        d - n
    } else {
        d
    }
}

/// Circular distance in window steps.
pub fn circular_distance(a: i64, b: i64, n: usize) -> u64 {
    signed_offset(a, b, n).unsigned_abs()
}

/// Moves `window` by `step` around a ring of `n` windows.
pub fn advance(window: WindowId, step: i64, n: usize) -> WindowId {
    (window as i64 + step).rem_euclid(n as i64) as WindowId
}
