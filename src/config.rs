// File: src/config.rs
use crate::error::{LatticeError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Top-level engine configuration. Every field has a default so partial
/// JSON documents are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub graph: GraphConfig,
    pub embedding: EmbeddingConfig,
    pub windows: WindowConfig,
    pub reorder: ReorderConfig,
    pub corrections: CorrectionConfig,
    pub suffix: SuffixConfig,
    pub emulator: EmulatorConfig,
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: EngineConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section and reports the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.graph.validate()?;
        self.embedding.validate()?;
        self.windows.validate()?;
        self.corrections.validate()?;
        self.suffix.validate()?;
        self.emulator.validate()
    }
}

/// Default vocabulary cap. The embedding's repulsion pass is quadratic in
/// the node count; `"top_n": null` lifts the cap.
pub const DEFAULT_TOP_N: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Keep only the `top_n` most frequent tokens as nodes.
    pub top_n: Option<usize>,
    /// Weight contributed by each slip observation on an edge.
    pub slip_weight: f64,
    /// Exclude tokens that take part in no transition.
    pub drop_isolated: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { top_n: Some(DEFAULT_TOP_N), slip_weight: 1.0, drop_isolated: true }
    }
}

impl GraphConfig {
    fn validate(&self) -> Result<()> {
        if self.top_n == Some(0) {
            return Err(LatticeError::config("graph.top_n", "must be positive when set"));
        }
        if !self.slip_weight.is_finite() || self.slip_weight < 0.0 {
            return Err(LatticeError::config("graph.slip_weight", "must be finite and non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub iterations: usize,
    pub seed: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { iterations: 200, seed: 42 }
    }
}

impl EmbeddingConfig {
    fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(LatticeError::config("embedding.iterations", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub num_windows: usize,
    /// Reduce the window count to the node count instead of failing.
    pub allow_reduction: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { num_windows: 50, allow_reduction: true }
    }
}

impl WindowConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_windows < 2 {
            return Err(LatticeError::config("windows.num_windows", "must be at least 2"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReorderConfig {
    pub enabled: bool,
    pub max_passes: usize,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self { enabled: true, max_passes: 20 }
    }
}

/// Count thresholds that split tokens into frequency tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub common_min: u64,
    pub medium_min: u64,
    pub rare_min: u64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self { common_min: 100, medium_min: 10, rare_min: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Minimum observations a group needs before its mode is trusted.
    pub min_obs: usize,
    pub tiers: TierThresholds,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self { min_obs: 5, tiers: TierThresholds::default() }
    }
}

impl CorrectionConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.min_obs == 0 {
            return Err(LatticeError::config("corrections.min_obs", "must be at least 1"));
        }
        let t = &self.tiers;
        if !(t.common_min > t.medium_min && t.medium_min > t.rare_min && t.rare_min >= 2) {
            return Err(LatticeError::config(
                "corrections.tiers",
                "thresholds must satisfy common_min > medium_min > rare_min >= 2",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuffixConfig {
    /// Candidate suffixes in resolution priority order.
    pub suffixes: Vec<String>,
    /// Minimum frequency-weighted support before a suffix is mapped.
    pub min_count: u64,
}

impl Default for SuffixConfig {
    fn default() -> Self {
        let suffixes = [
            "eedy", "aiin", "edy", "ain", "iin", "dy", "ey", "ol", "or", "ar", "al", "am", "in",
            "y", "n", "l", "r",
        ];
        Self { suffixes: suffixes.iter().map(|s| s.to_string()).collect(), min_count: 5 }
    }
}

impl SuffixConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.min_count == 0 {
            return Err(LatticeError::config("suffix.min_count", "must be at least 1"));
        }
        if self.suffixes.iter().any(|s| s.is_empty()) {
            return Err(LatticeError::config("suffix.suffixes", "empty suffix in candidate list"));
        }
        for (i, s) in self.suffixes.iter().enumerate() {
            if self.suffixes[..i].contains(s) {
                return Err(LatticeError::config(
                    "suffix.suffixes",
                    format!("duplicate suffix `{s}`"),
                ));
            }
        }
        Ok(())
    }
}

/// How the emulator picks among admissible candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    Uniform,
    FrequencyWeighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub seed: u64,
    pub start_window: usize,
    /// Window steps taken after each emitted token, before correction.
    pub forward_step: i64,
    pub selection: Selection,
    pub trace: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            start_window: 0,
            forward_step: 1,
            selection: Selection::FrequencyWeighted,
            trace: false,
        }
    }
}

impl EmulatorConfig {
    fn validate(&self) -> Result<()> {
        if self.forward_step.unsigned_abs() > 1_000_000 {
            return Err(LatticeError::config("emulator.forward_step", "out of range"));
        }
        Ok(())
    }
}
