// File: src/core/context.rs
use crate::core::lattice::Lattice;
use crate::core::types::{FrequencyTable, Line};
use crate::error::{LatticeError, Result};
use crate::evaluation::{calculate_admissibility, AdmissibilityReport};
use crate::fuzzy::SuffixRecoveryMap;
use crate::learning::Corrections;
use serde::{Deserialize, Serialize};

/// Everything the evaluator and emulator read: the lattice plus whatever
/// was trained against it. Built once, then shared by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ContextParts")]
pub struct LatticeContext {
    pub lattice: Lattice,
    pub corrections: Option<Corrections>,
    pub suffix_map: Option<SuffixRecoveryMap>,
    /// Training token counts, used for frequency-weighted sampling.
    pub frequencies: FrequencyTable,
}

/// Unchecked deserialization shape; converted through `validate`.
#[derive(Deserialize)]
struct ContextParts {
    lattice: Lattice,
    corrections: Option<Corrections>,
    suffix_map: Option<SuffixRecoveryMap>,
    #[serde(default)]
    frequencies: FrequencyTable,
}

impl TryFrom<ContextParts> for LatticeContext {
    type Error = LatticeError;

    fn try_from(parts: ContextParts) -> Result<Self> {
        let context = LatticeContext {
            lattice: parts.lattice,
            corrections: parts.corrections,
            suffix_map: parts.suffix_map,
            frequencies: parts.frequencies,
        };
        context.validate()?;
        Ok(context)
    }
}

impl LatticeContext {
    /// A bare context with no corrections or suffix recovery.
    pub fn new(lattice: Lattice) -> Self {
        Self { lattice, corrections: None, suffix_map: None, frequencies: FrequencyTable::new() }
    }

    pub fn with_corrections(mut self, corrections: Corrections) -> Self {
        self.corrections = Some(corrections);
        self
    }

    pub fn with_suffix_map(mut self, suffix_map: SuffixRecoveryMap) -> Self {
        self.suffix_map = Some(suffix_map);
        self
    }

    pub fn with_frequencies(mut self, frequencies: FrequencyTable) -> Self {
        self.frequencies = frequencies;
        self
    }

    /// Checks that corrections and suffix windows fit this lattice.
    pub fn validate(&self) -> Result<()> {
        let n = self.num_windows();
        if let Some(corrections) = &self.corrections {
            corrections.validate(n)?;
        }
        if let Some(suffix_map) = &self.suffix_map {
            suffix_map.validate(n)?;
        }
        Ok(())
    }

    pub fn num_windows(&self) -> usize {
        self.lattice.num_windows()
    }

    /// Offset applied to a prediction out of `window`.
    pub fn correction(&self, window: usize, destination: Option<&str>) -> i64 {
        self.corrections.as_ref().map_or(0, |c| c.offset(window, destination))
    }

    pub fn admissibility(&self, lines: &[Line]) -> AdmissibilityReport {
        calculate_admissibility(
            lines,
            &self.lattice,
            self.corrections.as_ref(),
            self.suffix_map.as_ref(),
        )
    }
}
