// File: src/core/engine.rs
use crate::config::EngineConfig;
use crate::core::cluster::{Degradation, WindowClusterer};
use crate::core::context::LatticeContext;
use crate::core::embedding::EmbeddingSolver;
use crate::core::graph::{GraphBuilder, GraphStats, SlipPair};
use crate::core::lattice::Lattice;
use crate::core::reorder::{ReorderReport, WindowReorderer};
use crate::core::types::{FrequencyTable, Line};
use crate::emulator::{EmulatorOutput, MirrorEmulator};
use crate::error::Result;
use crate::evaluation::{calculate_overgeneration, AdmissibilityReport, OvergenerationReport};
use crate::fuzzy::SuffixRecoveryMap;
use crate::learning::{Corrections, CrossValidationReport, OffsetCorrectionLearner};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Result of building the static lattice from a corpus.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub lattice: Lattice,
    pub graph: GraphStats,
    pub requested_windows: usize,
    pub degradations: Vec<Degradation>,
    pub reorder: Option<ReorderReport>,
}

/// Scores of one corpus against a trained context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub admissibility: AdmissibilityReport,
    pub overgeneration: Option<OvergenerationReport>,
}

/// The lattice pipeline: graph, embedding, windows, reordering, then
/// training of corrections and suffix recovery. It holds only validated
/// configuration; every artifact it produces is returned to the caller.
pub struct LatticeEngine {
    config: EngineConfig,
}

impl LatticeEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn build_lattice(&self, lines: &[Line], slips: &[SlipPair]) -> Result<BuildReport> {
        let graph = GraphBuilder::new(self.config.graph.clone()).build(lines, slips)?;
        let embedding = EmbeddingSolver::new(self.config.embedding.clone()).solve(&graph);
        let clustered = WindowClusterer::new(self.config.windows.clone())?.cluster(&graph, &embedding)?;

        let (lattice, reorder) = if self.config.reorder.enabled {
            let outcome = WindowReorderer::new(self.config.reorder.clone())
                .reorder(&clustered.lattice, lines)?;
            (outcome.lattice, Some(outcome.report))
        } else {
            (clustered.lattice, None)
        };
        info!(
            tokens = lattice.len(),
            windows = lattice.num_windows(),
            degraded = !clustered.degradations.is_empty(),
            "lattice built"
        );
        Ok(BuildReport {
            lattice,
            graph: graph.stats().clone(),
            requested_windows: clustered.requested_windows,
            degradations: clustered.degradations,
            reorder,
        })
    }

    /// Trains corrections (tiered when `tiered` is set) and the suffix map
    /// against a fixed lattice.
    pub fn train(&self, lines: &[Line], lattice: Lattice, tiered: bool) -> Result<LatticeContext> {
        let frequencies = FrequencyTable::from_lines(lines);
        let learner = OffsetCorrectionLearner::new(self.config.corrections.clone())?;
        let corrections = if tiered {
            Corrections::Tiered(learner.learn_tiered(lines, &lattice, &frequencies))
        } else {
            Corrections::Uniform(learner.learn(lines, &lattice))
        };
        let suffix_map = SuffixRecoveryMap::build(&lattice, &frequencies, &self.config.suffix);
        Ok(LatticeContext::new(lattice)
            .with_corrections(corrections)
            .with_suffix_map(suffix_map)
            .with_frequencies(frequencies))
    }

    /// Convenience: build and train on the same corpus.
    pub fn fit(&self, lines: &[Line], slips: &[SlipPair]) -> Result<(BuildReport, LatticeContext)> {
        let report = self.build_lattice(lines, slips)?;
        let context = self.train(lines, report.lattice.clone(), false)?;
        Ok((report, context))
    }

    /// Leave-one-fold-out comparison of tiered and uniform corrections on a
    /// fixed lattice, e.g. one fold per manuscript section.
    pub fn cross_validate(&self, folds: &[Vec<Line>], lattice: &Lattice) -> Result<CrossValidationReport> {
        OffsetCorrectionLearner::new(self.config.corrections.clone())?.cross_validate(folds, lattice)
    }

    pub fn emulate(&self, context: &LatticeContext, real_lines: &[Line]) -> Result<EmulatorOutput> {
        Ok(MirrorEmulator::new(context, self.config.emulator.clone())?.mirror(real_lines))
    }

    /// Admissibility of `lines`, plus overgeneration when a reference corpus
    /// is given (`lines` is then treated as the synthetic side).
    pub fn evaluate(
        &self,
        context: &LatticeContext,
        lines: &[Line],
        reference: Option<&[Line]>,
    ) -> EvaluationReport {
        EvaluationReport {
            admissibility: context.admissibility(lines),
            overgeneration: reference.map(|real| calculate_overgeneration(lines, real)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Line> {
        let vocab: Vec<String> = (0..24).map(|i| format!("w{i}")).collect();
        (0..60)
            .map(|i| (0..6).map(|j| vocab[(i * 5 + j * 3) % 24].clone()).collect())
            .collect()
    }

    fn engine(windows: usize) -> LatticeEngine {
        let mut config = EngineConfig::default();
        config.windows.num_windows = windows;
        config.embedding.iterations = 60;
        config.corrections.min_obs = 2;
        LatticeEngine::new(config).unwrap()
    }

    #[test]
    fn build_produces_requested_windows() {
        let report = engine(6).build_lattice(&corpus(), &[]).unwrap();
        assert_eq!(report.lattice.num_windows(), 6);
        assert_eq!(report.lattice.len(), report.graph.vocabulary - report.graph.isolated);
        assert!(report.degradations.is_empty());
        let reorder = report.reorder.unwrap();
        assert!(reorder.cost_after <= reorder.cost_before);
    }

    #[test]
    fn invalid_config_fails_fast() {
        let mut config = EngineConfig::default();
        config.windows.num_windows = 0;
        assert!(LatticeEngine::new(config).is_err());
    }

    #[test]
    fn trained_corrections_never_hurt_training_drift() {
        let engine = engine(6);
        let lines = corpus();
        let report = engine.build_lattice(&lines, &[]).unwrap();
        let bare = LatticeContext::new(report.lattice.clone()).admissibility(&lines);
        for tiered in [false, true] {
            let context = engine.train(&lines, report.lattice.clone(), tiered).unwrap();
            let corrected = context.admissibility(&lines);
            assert!(corrected.drift_hits >= bare.drift_hits, "tiered={tiered}");
        }
    }

    #[test]
    fn evaluate_adds_overgeneration_against_reference() {
        let engine = engine(4);
        let lines = corpus();
        let (_, context) = engine.fit(&lines, &[]).unwrap();
        let synthetic = engine.emulate(&context, &lines).unwrap();
        let report = engine.evaluate(&context, &synthetic.lines, Some(lines.as_slice()));
        let orders = report.overgeneration.unwrap().orders;
        assert_eq!(orders.iter().map(|o| o.n).collect::<Vec<_>>(), vec![2, 3, 4, 5]);
        assert_eq!(report.admissibility.tokens, lines.iter().map(Vec::len).sum::<usize>());
    }

    #[test]
    fn cross_validation_runs_per_section() {
        let engine = engine(4);
        let lines = corpus();
        let report = engine.build_lattice(&lines, &[]).unwrap();
        let folds: Vec<Vec<Line>> = lines.chunks(20).map(|c| c.to_vec()).collect();
        let cv = engine.cross_validate(&folds, &report.lattice).unwrap();
        assert_eq!(cv.folds.len(), 3);
        let mean = cv.folds.iter().map(|f| f.delta).sum::<f64>() / 3.0;
        assert!((cv.mean_delta - mean).abs() < 1e-12);
    }
}
