// File: src/fuzzy/suffix.rs
use crate::config::SuffixConfig;
use crate::core::lattice::Lattice;
use crate::core::types::{FrequencyTable, WindowId};
use crate::error::{LatticeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Support gathered for one candidate suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixEntry {
    pub suffix: String,
    /// Majority window, or `None` when support stayed under `min_count`.
    pub window: Option<WindowId>,
    /// Frequency-weighted count behind the chosen window.
    pub support: u64,
    /// Frequency-weighted count over all windows.
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuffixResolution<'a> {
    Resolved { suffix: &'a str, window: WindowId },
    Unresolved,
}

impl SuffixResolution<'_> {
    pub fn window(&self) -> Option<WindowId> {
        match self {
            SuffixResolution::Resolved { window, .. } => Some(*window),
            SuffixResolution::Unresolved => None,
        }
    }
}

/// Maps token endings to windows so out-of-vocabulary tokens can be placed.
///
/// Entries keep the configured priority order; resolution returns the first
/// mapped suffix the token ends with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixRecoveryMap {
    entries: Vec<SuffixEntry>,
}

impl SuffixRecoveryMap {
    pub fn build(lattice: &Lattice, frequencies: &FrequencyTable, config: &SuffixConfig) -> Self {
        let entries: Vec<SuffixEntry> = config
            .suffixes
            .iter()
            .map(|suffix| {
                let mut by_window: BTreeMap<WindowId, u64> = BTreeMap::new();
                for (token, window) in lattice.words() {
                    if token.len() > suffix.len() && token.ends_with(suffix.as_str()) {
                        *by_window.entry(window).or_insert(0) += frequencies.count(token).max(1);
                    }
                }
                let total: u64 = by_window.values().sum();
                // Heaviest window; the lowest index wins ties.
                let best = by_window
                    .iter()
                    .fold(None, |best: Option<(WindowId, u64)>, (&w, &c)| match best {
                        Some((_, bc)) if bc >= c => best,
                        _ => Some((w, c)),
                    });
                let window = best.filter(|_| total >= config.min_count).map(|(w, _)| w);
                debug!(suffix = suffix.as_str(), total, ?window, "suffix support gathered");
                SuffixEntry {
                    suffix: suffix.clone(),
                    window,
                    support: best.map_or(0, |(_, c)| c),
                    total,
                }
            })
            .collect();
        let map = Self { entries };
        info!(
            mapped = map.mapped_count(),
            unmapped = map.fallback_count(),
            "suffix recovery map built"
        );
        map
    }

    pub fn entries(&self) -> &[SuffixEntry] {
        &self.entries
    }

    pub fn mapped_count(&self) -> usize {
        self.entries.iter().filter(|e| e.window.is_some()).count()
    }

    /// Suffixes left unmapped for lack of support.
    pub fn fallback_count(&self) -> usize {
        self.entries.len() - self.mapped_count()
    }

    pub fn is_empty(&self) -> bool {
        self.mapped_count() == 0
    }

    pub fn resolve(&self, token: &str) -> SuffixResolution<'_> {
        self.entries
            .iter()
            .find_map(|e| match e.window {
                Some(window) if token.ends_with(e.suffix.as_str()) => {
                    Some(SuffixResolution::Resolved { suffix: e.suffix.as_str(), window })
                }
                _ => None,
            })
            .unwrap_or(SuffixResolution::Unresolved)
    }

    /// The `{ suffix: window }` boundary view over mapped entries.
    pub fn to_map(&self) -> BTreeMap<String, WindowId> {
        self.entries
            .iter()
            .filter_map(|e| e.window.map(|w| (e.suffix.clone(), w)))
            .collect()
    }

    /// Every mapped window must exist in the lattice the map is used with.
    pub fn validate(&self, num_windows: usize) -> Result<()> {
        match self.entries.iter().find(|e| e.window.is_some_and(|w| w >= num_windows)) {
            Some(entry) => Err(LatticeError::InvariantViolation(format!(
                "suffix `{}` maps to window {:?} outside [0, {num_windows})",
                entry.suffix, entry.window
            ))),
            None => Ok(()),
        }
    }
}
