// File: src/core/graph.rs
use crate::config::GraphConfig;
use crate::core::types::{FrequencyTable, Line};
use crate::error::{LatticeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// An externally supplied anomaly pair (a known correction or restart).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlipPair {
    pub from: String,
    pub to: String,
}

impl SlipPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into() }
    }
}

/// Observations behind one undirected edge. Slips are kept apart from
/// ordinary co-occurrence so neither is counted twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeCounts {
    pub cooccurrence: u64,
    pub slips: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub tokens_seen: u64,
    pub vocabulary: usize,
    pub capped: usize,
    pub isolated: usize,
    pub self_transitions: u64,
    pub slips_applied: usize,
    pub slips_ignored: usize,
}

/// Weighted undirected transition graph over corpus tokens.
#[derive(Debug, Clone)]
pub struct TransitionGraph {
    nodes: Vec<String>,
    frequencies: Vec<u64>,
    /// Keyed by `(lo, hi)` node indices; ordered for deterministic walks.
    edges: BTreeMap<(usize, usize), EdgeCounts>,
    slip_weight: f64,
    stats: GraphStats,
}

impl TransitionGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn frequency(&self, node: usize) -> u64 {
        self.frequencies[node]
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n == token)
    }

    pub fn stats(&self) -> &GraphStats {
        &self.stats
    }

    pub fn edge_counts(&self, a: &str, b: &str) -> Option<EdgeCounts> {
        let (ia, ib) = (self.index_of(a)?, self.index_of(b)?);
        self.edges.get(&(ia.min(ib), ia.max(ib))).copied()
    }

    pub fn weight(&self, counts: &EdgeCounts) -> f64 {
        counts.cooccurrence as f64 + self.slip_weight * counts.slips as f64
    }

    /// `(lo, hi, weight)` triples in ascending key order.
    pub fn weighted_edges(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.edges.iter().map(|(&(a, b), c)| (a, b, self.weight(c)))
    }
}

pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    /// Counts in-line bigrams, overlays slip pairs and applies the
    /// vocabulary cap. Pure: no side effects beyond logging.
    pub fn build(&self, lines: &[Line], slips: &[SlipPair]) -> Result<TransitionGraph> {
        let freq = FrequencyTable::from_lines(lines);
        if freq.is_empty() {
            return Err(LatticeError::EmptyCorpus);
        }
        let mut stats = GraphStats {
            tokens_seen: freq.total(),
            vocabulary: freq.len(),
            ..GraphStats::default()
        };

        let ranked = freq.ranked();
        let keep = self.config.top_n.unwrap_or(ranked.len()).min(ranked.len());
        stats.capped = ranked.len() - keep;
        let retained: Vec<(&str, u64)> = ranked[..keep].to_vec();
        let index: HashMap<&str, usize> =
            retained.iter().enumerate().map(|(i, &(t, _))| (t, i)).collect();

        let mut edges: BTreeMap<(usize, usize), EdgeCounts> = BTreeMap::new();
        for line in lines {
            for pair in line.windows(2) {
                let (Some(&a), Some(&b)) = (index.get(pair[0].as_str()), index.get(pair[1].as_str()))
                else {
                    continue;
                };
                if a == b {
                    stats.self_transitions += 1;
                    continue;
                }
                edges.entry((a.min(b), a.max(b))).or_default().cooccurrence += 1;
            }
        }
        for slip in slips {
            match (index.get(slip.from.as_str()), index.get(slip.to.as_str())) {
                (Some(&a), Some(&b)) if a != b => {
                    edges.entry((a.min(b), a.max(b))).or_default().slips += 1;
                    stats.slips_applied += 1;
                }
                _ => stats.slips_ignored += 1,
            }
        }

        let mut connected = vec![!self.config.drop_isolated; retained.len()];
        for &(a, b) in edges.keys() {
            connected[a] = true;
            connected[b] = true;
        }
        stats.isolated = connected.iter().filter(|&&c| !c).count();

        // Compact node indices once isolated tokens are gone.
        let mut remap = vec![usize::MAX; retained.len()];
        let mut nodes = Vec::new();
        let mut frequencies = Vec::new();
        for (old, &(token, count)) in retained.iter().enumerate() {
            if connected[old] {
                remap[old] = nodes.len();
                nodes.push(token.to_string());
                frequencies.push(count);
            }
        }
        let edges = edges
            .into_iter()
            .map(|((a, b), c)| ((remap[a], remap[b]), c))
            .collect();

        debug!(capped = stats.capped, isolated = stats.isolated, "graph vocabulary filtered");
        let graph = TransitionGraph {
            nodes,
            frequencies,
            edges,
            slip_weight: self.config.slip_weight,
            stats,
        };
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            slips_applied = graph.stats.slips_applied,
            "transition graph built"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<Line> {
        raw.iter()
            .map(|l| l.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn counts_only_within_lines() {
        let corpus = lines(&["a b c", "d a", "c"]);
        let graph = GraphBuilder::new(GraphConfig::default()).build(&corpus, &[]).unwrap();
        assert_eq!(graph.edge_counts("a", "b").unwrap().cooccurrence, 1);
        assert_eq!(graph.edge_counts("b", "c").unwrap().cooccurrence, 1);
        assert_eq!(graph.edge_counts("a", "d").unwrap().cooccurrence, 1);
        // "c" ends line 1 and "d" starts line 2: no edge.
        assert!(graph.edge_counts("c", "d").is_none());
    }

    #[test]
    fn weight_grows_with_cooccurrence() {
        let corpus = lines(&["a b", "a b", "a b", "b c"]);
        let graph = GraphBuilder::new(GraphConfig::default()).build(&corpus, &[]).unwrap();
        let ab = graph.weight(&graph.edge_counts("a", "b").unwrap());
        let bc = graph.weight(&graph.edge_counts("b", "c").unwrap());
        assert!(ab > bc);
    }

    #[test]
    fn slips_are_tracked_separately() {
        let corpus = lines(&["a b", "c d"]);
        let slips = vec![SlipPair::new("a", "b"), SlipPair::new("b", "c"), SlipPair::new("a", "zz")];
        let config = GraphConfig { slip_weight: 0.5, ..GraphConfig::default() };
        let graph = GraphBuilder::new(config).build(&corpus, &slips).unwrap();
        let ab = graph.edge_counts("a", "b").unwrap();
        assert_eq!(ab, EdgeCounts { cooccurrence: 1, slips: 1 });
        assert_eq!(graph.weight(&ab), 1.5);
        assert_eq!(graph.edge_counts("b", "c").unwrap().cooccurrence, 0);
        assert_eq!(graph.stats().slips_applied, 2);
        assert_eq!(graph.stats().slips_ignored, 1);
    }

    #[test]
    fn cap_drops_rare_tokens_and_their_edges() {
        let corpus = lines(&["a b a b a c", "x y"]);
        let config = GraphConfig { top_n: Some(2), ..GraphConfig::default() };
        let graph = GraphBuilder::new(config).build(&corpus, &[]).unwrap();
        assert_eq!(graph.nodes(), ["a".to_string(), "b".to_string()]);
        assert_eq!(graph.stats().capped, 3);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn isolated_tokens_are_excluded() {
        let corpus = lines(&["a b", "lonely", "q q"]);
        let graph = GraphBuilder::new(GraphConfig::default()).build(&corpus, &[]).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.stats().isolated, 2);
        assert_eq!(graph.stats().self_transitions, 1);

        let keep = GraphConfig { drop_isolated: false, ..GraphConfig::default() };
        let graph = GraphBuilder::new(keep).build(&corpus, &[]).unwrap();
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn empty_corpus_is_an_error() {
        let result = GraphBuilder::new(GraphConfig::default()).build(&[vec![]], &[]);
        assert!(matches!(result, Err(LatticeError::EmptyCorpus)));
    }
}
