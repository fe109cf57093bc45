// --- File: src/core/lattice.rs
use crate::core::types::WindowId;
use crate::error::{LatticeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The window-to-word lattice.
///
/// Only `word_to_window` is stored as the source of truth; the per-window
/// contents are derived from it and never exposed mutably, so the two
/// views cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LatticeArtifact", into = "LatticeArtifact")]
pub struct Lattice {
    word_to_window: BTreeMap<String, WindowId>,
    /// Sorted token lists, one per window.
    contents: Vec<Vec<String>>,
}

/// Boundary shape of a lattice: both maps written out explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatticeArtifact {
    pub word_to_window: BTreeMap<String, WindowId>,
    pub window_contents: BTreeMap<WindowId, Vec<String>>,
    pub num_windows: usize,
}

impl Lattice {
    /// Builds a lattice from a token assignment, deriving window contents.
    pub fn from_assignments(
        word_to_window: BTreeMap<String, WindowId>,
        num_windows: usize,
    ) -> Result<Self> {
        if num_windows == 0 {
            return Err(LatticeError::InvariantViolation("lattice needs at least one window".into()));
        }
        let mut contents = vec![Vec::new(); num_windows];
        for (token, &window) in &word_to_window {
            if window >= num_windows {
                return Err(LatticeError::InvariantViolation(format!(
                    "token `{token}` assigned to window {window} outside [0, {num_windows})"
                )));
            }
            // BTreeMap iteration keeps each list sorted.
            contents[window].push(token.clone());
        }
        Ok(Self { word_to_window, contents })
    }

    /// Rebuilds a lattice from both boundary maps, rejecting any pair that is
    /// not an exact bijection.
    pub fn from_parts(
        word_to_window: BTreeMap<String, WindowId>,
        window_contents: &BTreeMap<WindowId, Vec<String>>,
        num_windows: usize,
    ) -> Result<Self> {
        let lattice = Self::from_assignments(word_to_window, num_windows)?;
        let mut listed: BTreeSet<&str> = BTreeSet::new();
        for (&window, tokens) in window_contents {
            if window >= num_windows {
                return Err(LatticeError::InvariantViolation(format!(
                    "window_contents names window {window} outside [0, {num_windows})"
                )));
            }
            for token in tokens {
                match lattice.word_to_window.get(token) {
                    Some(&w) if w == window => {
                        if !listed.insert(token.as_str()) {
                            return Err(LatticeError::InvariantViolation(format!(
                                "token `{token}` listed more than once in window contents"
                            )));
                        }
                    }
                    Some(&w) => {
                        return Err(LatticeError::InvariantViolation(format!(
                            "token `{token}` listed in window {window} but mapped to {w}"
                        )))
                    }
                    None => {
                        return Err(LatticeError::InvariantViolation(format!(
                            "token `{token}` listed in window {window} has no mapping"
                        )))
                    }
                }
            }
        }
        if listed.len() != lattice.word_to_window.len() {
            return Err(LatticeError::InvariantViolation(format!(
                "{} mapped tokens but {} listed in window contents",
                lattice.word_to_window.len(),
                listed.len()
            )));
        }
        Ok(lattice)
    }

    pub fn num_windows(&self) -> usize {
        self.contents.len()
    }

    /// Number of tokens in the lattice.
    pub fn len(&self) -> usize {
        self.word_to_window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_to_window.is_empty()
    }

    pub fn window_of(&self, token: &str) -> Option<WindowId> {
        self.word_to_window.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.word_to_window.contains_key(token)
    }

    /// Tokens of `window`, sorted. Empty for an out-of-range index.
    pub fn contents(&self, window: WindowId) -> &[String] {
        self.contents.get(window).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn words(&self) -> impl Iterator<Item = (&str, WindowId)> {
        self.word_to_window.iter().map(|(t, &w)| (t.as_str(), w))
    }

    pub fn window_sizes(&self) -> Vec<usize> {
        self.contents.iter().map(Vec::len).collect()
    }

    /// Relabels windows: `mapping[old] = new`. `mapping` must be a permutation.
    pub fn relabel(&self, mapping: &[WindowId]) -> Result<Self> {
        let n = self.num_windows();
        if mapping.len() != n {
            return Err(LatticeError::InvariantViolation(format!(
                "relabel mapping has {} entries for {n} windows",
                mapping.len()
            )));
        }
        let mut seen = vec![false; n];
        for &target in mapping {
            if target >= n || seen[target] {
                return Err(LatticeError::InvariantViolation(
                    "relabel mapping is not a permutation".into(),
                ));
            }
            seen[target] = true;
        }
        let assignments = self
            .word_to_window
            .iter()
            .map(|(t, &w)| (t.clone(), mapping[w]))
            .collect();
        Self::from_assignments(assignments, n)
    }

    /// Folds window `absorb` into `keep` and closes the gap, so the result
    /// has one window fewer. Indices above `absorb` shift down by one.
    pub fn merge_windows(&self, keep: WindowId, absorb: WindowId) -> Result<Self> {
        let n = self.num_windows();
        if keep >= n || absorb >= n || keep == absorb {
            return Err(LatticeError::InvariantViolation(format!(
                "cannot merge window {absorb} into {keep} on a {n}-window lattice"
            )));
        }
        if n < 2 {
            return Err(LatticeError::InvariantViolation("merge would leave no windows".into()));
        }
        let compact = |w: WindowId| if w > absorb { w - 1 } else { w };
        let assignments = self
            .word_to_window
            .iter()
            .map(|(t, &w)| {
                let w = if w == absorb { keep } else { w };
                (t.clone(), compact(w))
            })
            .collect();
        Self::from_assignments(assignments, n - 1)
    }

    pub fn to_artifact(&self) -> LatticeArtifact {
        LatticeArtifact {
            word_to_window: self.word_to_window.clone(),
            window_contents: self.contents.iter().cloned().enumerate().collect(),
            num_windows: self.num_windows(),
        }
    }
}

impl TryFrom<LatticeArtifact> for Lattice {
    type Error = LatticeError;

    fn try_from(artifact: LatticeArtifact) -> Result<Self> {
        Lattice::from_parts(artifact.word_to_window, &artifact.window_contents, artifact.num_windows)
    }
}

impl From<Lattice> for LatticeArtifact {
    fn from(lattice: Lattice) -> Self {
        lattice.to_artifact()
    }
}
