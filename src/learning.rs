// File: src/learning.rs
use crate::config::{CorrectionConfig, TierThresholds};
use crate::core::lattice::Lattice;
use crate::core::types::{advance, signed_offset, wrap_offset, FrequencyTable, Line, WindowId};
use crate::error::{LatticeError, Result};
use crate::evaluation::calculate_admissibility;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// How a window's correction was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    /// The modal offset of at least `min_obs` observations.
    Learned,
    /// Fewer than `min_obs` observations; zero applied.
    InsufficientData,
    /// The mode would cover fewer drift-band observations than zero; zero kept.
    Guarded,
}

/// Per-window signed offsets applied on top of the `+1` forward drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionTable {
    num_windows: usize,
    offsets: Vec<i64>,
    observations: Vec<usize>,
    status: Vec<CorrectionStatus>,
}

impl CorrectionTable {
    /// A no-op table: every window falls back to zero.
    pub fn zeros(num_windows: usize) -> Self {
        Self {
            num_windows,
            offsets: vec![0; num_windows],
            observations: vec![0; num_windows],
            status: vec![CorrectionStatus::InsufficientData; num_windows],
        }
    }

    pub fn num_windows(&self) -> usize {
        self.num_windows
    }

    pub fn offset(&self, window: WindowId) -> i64 {
        self.offsets.get(window).copied().unwrap_or(0)
    }

    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }

    pub fn observations(&self, window: WindowId) -> usize {
        self.observations.get(window).copied().unwrap_or(0)
    }

    pub fn status(&self, window: WindowId) -> CorrectionStatus {
        self.status.get(window).copied().unwrap_or(CorrectionStatus::InsufficientData)
    }

    /// Windows that fell back to zero, for whatever reason.
    pub fn fallback_count(&self) -> usize {
        self.status.iter().filter(|&&s| s != CorrectionStatus::Learned).count()
    }

    pub fn is_identity(&self) -> bool {
        self.offsets.iter().all(|&o| o == 0)
    }

    /// Window predicted to follow a token in `window`.
    pub fn predict(&self, window: WindowId) -> WindowId {
        advance(window, 1 + self.offset(window), self.num_windows)
    }

    /// The `{ window: offset }` boundary view.
    pub fn to_map(&self) -> BTreeMap<WindowId, i64> {
        self.offsets.iter().copied().enumerate().collect()
    }

    /// Checks a loaded table against the lattice it will be applied to.
    pub fn validate(&self, num_windows: usize) -> Result<()> {
        if self.num_windows != num_windows {
            return Err(LatticeError::InvariantViolation(format!(
                "correction table covers {} windows, lattice has {num_windows}",
                self.num_windows
            )));
        }
        let lengths = [self.offsets.len(), self.observations.len(), self.status.len()];
        if lengths.iter().any(|&len| len != num_windows) {
            return Err(LatticeError::InvariantViolation(format!(
                "correction table rows {lengths:?} do not match {num_windows} windows"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyTier {
    Common,
    Medium,
    Rare,
    Hapax,
}

impl FrequencyTier {
    pub const ALL: [FrequencyTier; 4] =
        [FrequencyTier::Common, FrequencyTier::Medium, FrequencyTier::Rare, FrequencyTier::Hapax];

    /// Unseen tokens count as hapax.
    pub fn of(count: u64, thresholds: &TierThresholds) -> Self {
        if count >= thresholds.common_min {
            FrequencyTier::Common
        } else if count >= thresholds.medium_min {
            FrequencyTier::Medium
        } else if count >= thresholds.rare_min {
            FrequencyTier::Rare
        } else {
            FrequencyTier::Hapax
        }
    }
}

/// One table per destination frequency tier, plus a pooled table for
/// predictions made before the destination is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieredCorrections {
    thresholds: TierThresholds,
    frequencies: FrequencyTable,
    tables: BTreeMap<FrequencyTier, CorrectionTable>,
    pooled: CorrectionTable,
}

impl TieredCorrections {
    pub fn tier_of(&self, token: &str) -> FrequencyTier {
        FrequencyTier::of(self.frequencies.count(token), &self.thresholds)
    }

    pub fn table(&self, tier: FrequencyTier) -> Option<&CorrectionTable> {
        self.tables.get(&tier)
    }

    pub fn pooled(&self) -> &CorrectionTable {
        &self.pooled
    }

    pub fn offset_for(&self, window: WindowId, destination: &str) -> i64 {
        self.tables
            .get(&self.tier_of(destination))
            .map(|t| t.offset(window))
            .unwrap_or(0)
    }
}

/// Boundary shape of learned corrections: window to signed offset, with
/// one extra map per tier when the corrections are tiered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionArtifact {
    pub corrections: BTreeMap<WindowId, i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tiers: BTreeMap<FrequencyTier, BTreeMap<WindowId, i64>>,
}

/// Either correction flavour, as consumed by the evaluator and emulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corrections {
    Uniform(CorrectionTable),
    Tiered(TieredCorrections),
}

impl Corrections {
    /// Offset for a transition out of `window`. Tiered corrections use the
    /// destination's tier when it is known and the pooled table otherwise.
    pub fn offset(&self, window: WindowId, destination: Option<&str>) -> i64 {
        match (self, destination) {
            (Corrections::Uniform(table), _) => table.offset(window),
            (Corrections::Tiered(tiered), Some(dest)) => tiered.offset_for(window, dest),
            (Corrections::Tiered(tiered), None) => tiered.pooled.offset(window),
        }
    }

    /// The `{ corrections, tiers }` boundary view. Tiered corrections put
    /// the pooled table under `corrections`.
    pub fn to_artifact(&self) -> CorrectionArtifact {
        match self {
            Corrections::Uniform(table) => {
                CorrectionArtifact { corrections: table.to_map(), tiers: BTreeMap::new() }
            }
            Corrections::Tiered(tiered) => CorrectionArtifact {
                corrections: tiered.pooled.to_map(),
                tiers: tiered.tables.iter().map(|(&tier, t)| (tier, t.to_map())).collect(),
            },
        }
    }

    pub fn validate(&self, num_windows: usize) -> Result<()> {
        match self {
            Corrections::Uniform(table) => table.validate(num_windows),
            Corrections::Tiered(tiered) => {
                tiered.pooled.validate(num_windows)?;
                tiered.tables.values().try_for_each(|t| t.validate(num_windows))
            }
        }
    }

    pub fn fallback_count(&self) -> usize {
        match self {
            Corrections::Uniform(table) => table.fallback_count(),
            Corrections::Tiered(tiered) => {
                tiered.tables.values().map(CorrectionTable::fallback_count).sum()
            }
        }
    }
}

/// Offsets observed for one group, in first-seen order.
#[derive(Default)]
struct OffsetTally {
    counts: Vec<(i64, usize)>,
    total: usize,
}

impl OffsetTally {
    fn push(&mut self, offset: i64) {
        self.total += 1;
        match self.counts.iter_mut().find(|(o, _)| *o == offset) {
            Some((_, c)) => *c += 1,
            None => self.counts.push((offset, 1)),
        }
    }

    /// Most frequent offset; the earliest-seen value wins ties.
    fn mode(&self) -> Option<i64> {
        let mut best: Option<(i64, usize)> = None;
        for &(offset, count) in &self.counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((offset, count));
            }
        }
        best.map(|(o, _)| o)
    }

    /// Observations landing within ±1 of the prediction under `correction`.
    fn band_hits(&self, correction: i64, n: usize) -> usize {
        self.counts
            .iter()
            .filter(|(o, _)| wrap_offset(o - correction, n).abs() <= 1)
            .map(|&(_, c)| c)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold: usize,
    pub train_lines: usize,
    pub test_lines: usize,
    pub uniform_rate: f64,
    pub tiered_rate: f64,
    pub delta: f64,
    pub uniform: CorrectionTable,
    pub tiered: TieredCorrections,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub folds: Vec<FoldResult>,
    pub pooled_uniform: CorrectionTable,
    pub pooled_tiered: TieredCorrections,
    /// Mean of `tiered_rate - uniform_rate` across folds.
    pub mean_delta: f64,
}

/// Learns modal drift corrections from observed transitions.
pub struct OffsetCorrectionLearner {
    min_obs: usize,
    thresholds: TierThresholds,
}

impl OffsetCorrectionLearner {
    pub fn new(config: CorrectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { min_obs: config.min_obs, thresholds: config.tiers })
    }

    /// One table over all transitions, grouped by source window.
    pub fn learn(&self, lines: &[Line], lattice: &Lattice) -> CorrectionTable {
        let n = lattice.num_windows();
        let mut tallies: Vec<OffsetTally> = (0..n).map(|_| OffsetTally::default()).collect();
        for_each_offset(lines, lattice, |window, _, offset| tallies[window].push(offset));
        let table = self.resolve(&tallies, n);
        info!(
            windows = n,
            fallbacks = table.fallback_count(),
            "uniform corrections learned"
        );
        table
    }

    /// One table per destination tier. Tiers come from `frequencies`,
    /// normally the training corpus's own counts.
    pub fn learn_tiered(
        &self,
        lines: &[Line],
        lattice: &Lattice,
        frequencies: &FrequencyTable,
    ) -> TieredCorrections {
        let n = lattice.num_windows();
        let mut tallies: BTreeMap<FrequencyTier, Vec<OffsetTally>> = FrequencyTier::ALL
            .iter()
            .map(|&tier| (tier, (0..n).map(|_| OffsetTally::default()).collect()))
            .collect();
        for_each_offset(lines, lattice, |window, dest, offset| {
            let tier = FrequencyTier::of(frequencies.count(dest), &self.thresholds);
            if let Some(group) = tallies.get_mut(&tier) {
                group[window].push(offset);
            }
        });
        let tables: BTreeMap<FrequencyTier, CorrectionTable> = tallies
            .iter()
            .map(|(&tier, group)| (tier, self.resolve(group, n)))
            .collect();
        for (tier, table) in &tables {
            debug!(?tier, fallbacks = table.fallback_count(), "tier corrections learned");
        }
        TieredCorrections {
            thresholds: self.thresholds.clone(),
            frequencies: frequencies.clone(),
            tables,
            pooled: self.learn(lines, lattice),
        }
    }

    /// Leave-one-fold-out comparison of tiered against uniform corrections.
    pub fn cross_validate(&self, folds: &[Vec<Line>], lattice: &Lattice) -> Result<CrossValidationReport> {
        if folds.len() < 2 {
            return Err(LatticeError::config("cross_validate.folds", "need at least two folds"));
        }
        let mut results = Vec::with_capacity(folds.len());
        for (k, held_out) in folds.iter().enumerate() {
            let train: Vec<Line> = folds
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != k)
                .flat_map(|(_, fold)| fold.iter().cloned())
                .collect();
            let frequencies = FrequencyTable::from_lines(&train);
            let uniform = self.learn(&train, lattice);
            let tiered = self.learn_tiered(&train, lattice, &frequencies);

            let uniform_rate = calculate_admissibility(
                held_out,
                lattice,
                Some(&Corrections::Uniform(uniform.clone())),
                None,
            )
            .drift_rate;
            let tiered_rate = calculate_admissibility(
                held_out,
                lattice,
                Some(&Corrections::Tiered(tiered.clone())),
                None,
            )
            .drift_rate;
            let delta = tiered_rate - uniform_rate;
            info!(fold = k, uniform_rate, tiered_rate, delta, "cross-validation fold scored");
            results.push(FoldResult {
                fold: k,
                train_lines: train.len(),
                test_lines: held_out.len(),
                uniform_rate,
                tiered_rate,
                delta,
                uniform,
                tiered,
            });
        }

        let all: Vec<Line> = folds.iter().flat_map(|f| f.iter().cloned()).collect();
        let frequencies = FrequencyTable::from_lines(&all);
        let mean_delta = results.iter().map(|r| r.delta).sum::<f64>() / results.len() as f64;
        Ok(CrossValidationReport {
            pooled_uniform: self.learn(&all, lattice),
            pooled_tiered: self.learn_tiered(&all, lattice, &frequencies),
            folds: results,
            mean_delta,
        })
    }

    fn resolve(&self, tallies: &[OffsetTally], n: usize) -> CorrectionTable {
        let mut table = CorrectionTable::zeros(n);
        for (window, tally) in tallies.iter().enumerate() {
            table.observations[window] = tally.total;
            if tally.total < self.min_obs {
                continue;
            }
            let Some(mode) = tally.mode() else { continue };
            if tally.band_hits(mode, n) < tally.band_hits(0, n) {
                warn!(window, mode, "modal correction would lose drift coverage, keeping zero");
                table.status[window] = CorrectionStatus::Guarded;
                continue;
            }
            table.offsets[window] = mode;
            table.status[window] = CorrectionStatus::Learned;
        }
        table
    }
}

/// Calls `f(source_window, destination, offset)` for every in-line pair with
/// both tokens in the lattice, in corpus order.
fn for_each_offset<'a>(lines: &'a [Line], lattice: &Lattice, mut f: impl FnMut(WindowId, &'a str, i64)) {
    let n = lattice.num_windows();
    for line in lines {
        for pair in line.windows(2) {
            if let (Some(a), Some(b)) = (lattice.window_of(&pair[0]), lattice.window_of(&pair[1])) {
                let expected = advance(a, 1, n);
                f(a, pair[1].as_str(), signed_offset(expected as i64, b as i64, n));
            }
        }
    }
}
