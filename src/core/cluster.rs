// File: src/core/cluster.rs
use crate::config::WindowConfig;
use crate::core::embedding::Embedding;
use crate::core::graph::TransitionGraph;
use crate::core::lattice::Lattice;
use crate::error::{LatticeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::TAU;
use tracing::warn;

/// A recorded departure from the requested configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Degradation {
    WindowsReduced { requested: usize, effective: usize },
}

#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    pub lattice: Lattice,
    pub requested_windows: usize,
    pub degradations: Vec<Degradation>,
}

/// Quantizes node positions into `N` circular windows.
///
/// Nodes are ordered by angle around the centroid (node index breaks exact
/// ties), the circle is cut at its widest empty arc, and the ordering is
/// split into `N` contiguous runs whose sizes differ by at most one.
pub struct WindowClusterer {
    num_windows: usize,
    allow_reduction: bool,
}

impl WindowClusterer {
    pub fn new(config: WindowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { num_windows: config.num_windows, allow_reduction: config.allow_reduction })
    }

    pub fn cluster(&self, graph: &TransitionGraph, embedding: &Embedding) -> Result<ClusterOutcome> {
        let n = graph.node_count();
        if n == 0 {
            return Err(LatticeError::EmptyGraph);
        }
        if embedding.len() != n {
            return Err(LatticeError::InvariantViolation(format!(
                "embedding has {} positions for {n} nodes",
                embedding.len()
            )));
        }

        let mut degradations = Vec::new();
        let mut windows = self.num_windows;
        if n < windows {
            if !self.allow_reduction || n < 2 {
                return Err(LatticeError::WindowCountExceedsVocabulary {
                    requested: windows,
                    available: n,
                });
            }
            warn!(requested = windows, effective = n, "too few nodes, reducing window count");
            degradations.push(Degradation::WindowsReduced { requested: windows, effective: n });
            windows = n;
        }

        let order = circular_order(embedding);
        let mut assignments = BTreeMap::new();
        for window in 0..windows {
            let (start, end) = (window * n / windows, (window + 1) * n / windows);
            for &node in &order[start..end] {
                assignments.insert(graph.nodes()[node].clone(), window);
            }
        }
        let lattice = Lattice::from_assignments(assignments, windows)?;
        Ok(ClusterOutcome { lattice, requested_windows: self.num_windows, degradations })
    }
}

/// Node indices in angular order, rotated to start just after the widest gap.
fn circular_order(embedding: &Embedding) -> Vec<usize> {
    let [cx, cy] = embedding.centroid();
    let mut angles: Vec<(f64, usize)> = embedding
        .positions()
        .iter()
        .enumerate()
        .map(|(i, p)| ((p[1] - cy).atan2(p[0] - cx).rem_euclid(TAU), i))
        .collect();
    angles.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let n = angles.len();
    let mut cut = 0;
    let mut widest = f64::NEG_INFINITY;
    for i in 0..n {
        let next = (i + 1) % n;
        let gap = if next == 0 {
            angles[0].0 + TAU - angles[i].0
        } else {
            angles[next].0 - angles[i].0
        };
        if gap > widest {
            widest = gap;
            cut = next;
        }
    }
    angles[cut..].iter().chain(angles[..cut].iter()).map(|&(_, i)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, GraphConfig};
    use crate::core::embedding::EmbeddingSolver;
    use crate::core::graph::GraphBuilder;
    use crate::core::types::Line;

    fn chain_corpus(vocab: usize) -> Vec<Line> {
        (0..vocab * 3)
            .map(|i| vec![format!("w{}", i % vocab), format!("w{}", (i + 1) % vocab)])
            .collect()
    }

    fn pipeline(vocab: usize, windows: usize) -> Result<ClusterOutcome> {
        let graph = GraphBuilder::new(GraphConfig::default()).build(&chain_corpus(vocab), &[])?;
        let embedding = EmbeddingSolver::new(EmbeddingConfig { iterations: 80, seed: 3 }).solve(&graph);
        WindowClusterer::new(WindowConfig { num_windows: windows, allow_reduction: true })?
            .cluster(&graph, &embedding)
    }

    #[test]
    fn windows_are_balanced_and_cover_vocabulary() {
        let outcome = pipeline(23, 5).unwrap();
        let sizes = outcome.lattice.window_sizes();
        assert_eq!(sizes.len(), 5);
        assert_eq!(sizes.iter().sum::<usize>(), 23);
        let (min, max) = (sizes.iter().min().unwrap(), sizes.iter().max().unwrap());
        assert!(max - min <= 1, "{sizes:?}");
        assert!(outcome.degradations.is_empty());
        for (token, window) in outcome.lattice.words() {
            assert!(outcome.lattice.contents(window).iter().any(|t| t == token));
        }
    }

    #[test]
    fn clustering_is_deterministic() {
        let a = pipeline(17, 4).unwrap().lattice;
        let b = pipeline(17, 4).unwrap().lattice;
        assert_eq!(a, b);
    }

    #[test]
    fn small_graph_reduces_window_count_explicitly() {
        let outcome = pipeline(3, 8).unwrap();
        assert_eq!(outcome.lattice.num_windows(), 3);
        assert_eq!(
            outcome.degradations,
            vec![Degradation::WindowsReduced { requested: 8, effective: 3 }]
        );
        assert!(outcome.lattice.window_sizes().iter().all(|&s| s == 1));
    }

    #[test]
    fn reduction_can_be_refused() {
        let graph = GraphBuilder::new(GraphConfig::default()).build(&chain_corpus(3), &[]).unwrap();
        let embedding = EmbeddingSolver::new(EmbeddingConfig::default()).solve(&graph);
        let clusterer =
            WindowClusterer::new(WindowConfig { num_windows: 8, allow_reduction: false }).unwrap();
        assert!(matches!(
            clusterer.cluster(&graph, &embedding),
            Err(LatticeError::WindowCountExceedsVocabulary { requested: 8, available: 3 })
        ));
    }

    #[test]
    fn single_node_graph_cannot_form_a_lattice() {
        let config = GraphConfig { drop_isolated: false, ..GraphConfig::default() };
        let graph = GraphBuilder::new(config).build(&[vec!["solo".to_string()]], &[]).unwrap();
        assert_eq!(graph.node_count(), 1);
        let embedding = EmbeddingSolver::new(EmbeddingConfig::default()).solve(&graph);
        let clusterer =
            WindowClusterer::new(WindowConfig { num_windows: 4, allow_reduction: true }).unwrap();
        assert!(matches!(
            clusterer.cluster(&graph, &embedding),
            Err(LatticeError::WindowCountExceedsVocabulary { requested: 4, available: 1 })
        ));
    }

    #[test]
    fn single_window_request_is_a_config_error() {
        let config = WindowConfig { num_windows: 1, allow_reduction: true };
        assert!(WindowClusterer::new(config).is_err());
    }
}
