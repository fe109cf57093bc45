// File: src/core/reorder.rs
use crate::config::ReorderConfig;
use crate::core::lattice::Lattice;
use crate::core::types::{circular_distance, Line, WindowId};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderReport {
    pub cost_before: u64,
    pub cost_after: u64,
    pub passes: usize,
    /// `mapping[old] = new` window index.
    pub mapping: Vec<WindowId>,
}

#[derive(Debug, Clone)]
pub struct ReorderOutcome {
    pub lattice: Lattice,
    pub report: ReorderReport,
}

/// Relabels windows so observed successors land one step ahead.
///
/// The cost of an arrangement is `Σ T[i][j] · circdist(pos(i) + 1, pos(j))`
/// over window transition counts `T`. A greedy chain gives the starting
/// arrangement and pairwise swaps are accepted while they strictly lower the
/// cost. Integer arithmetic keeps the search exact.
pub struct WindowReorderer {
    max_passes: usize,
}

impl WindowReorderer {
    pub fn new(config: ReorderConfig) -> Self {
        Self { max_passes: config.max_passes }
    }

    pub fn reorder(&self, lattice: &Lattice, lines: &[Line]) -> Result<ReorderOutcome> {
        let n = lattice.num_windows();
        let traffic = transition_counts(lattice, lines);
        let identity: Vec<WindowId> = (0..n).collect();
        let cost_before = arrangement_cost(&traffic, &identity);

        let mut order = greedy_chain(&traffic);
        let mut pos = positions(&order);
        let mut best = arrangement_cost(&traffic, &pos);
        let mut passes = 0;
        while passes < self.max_passes {
            passes += 1;
            let mut improved = false;
            for a in 0..n {
                for b in (a + 1)..n {
                    order.swap(a, b);
                    let candidate = positions(&order);
                    let cost = arrangement_cost(&traffic, &candidate);
                    if cost < best {
                        best = cost;
                        pos = candidate;
                        improved = true;
                    } else {
                        order.swap(a, b);
                    }
                }
            }
            if !improved {
                break;
            }
        }

        // Never hand back something worse than the clusterer's own labels.
        if cost_before <= best {
            pos = identity;
            best = cost_before;
        }
        debug!(passes, "window reorder search finished");
        info!(cost_before, cost_after = best, windows = n, "windows reordered");
        let lattice = lattice.relabel(&pos)?;
        Ok(ReorderOutcome {
            lattice,
            report: ReorderReport { cost_before, cost_after: best, passes, mapping: pos },
        })
    }
}

/// `T[i][j]`: in-line transitions from a token in window `i` to one in `j`.
pub fn transition_counts(lattice: &Lattice, lines: &[Line]) -> Vec<Vec<u64>> {
    let n = lattice.num_windows();
    let mut traffic = vec![vec![0u64; n]; n];
    for line in lines {
        for pair in line.windows(2) {
            if let (Some(a), Some(b)) = (lattice.window_of(&pair[0]), lattice.window_of(&pair[1])) {
                traffic[a][b] += 1;
            }
        }
    }
    traffic
}

/// Cost of placing window `w` at index `pos[w]`.
fn arrangement_cost(traffic: &[Vec<u64>], pos: &[WindowId]) -> u64 {
    let n = pos.len();
    let mut cost = 0;
    for (i, row) in traffic.iter().enumerate() {
        for (j, &count) in row.iter().enumerate() {
            if count > 0 {
                cost += count * circular_distance(pos[i] as i64 + 1, pos[j] as i64, n);
            }
        }
    }
    cost
}

fn positions(order: &[WindowId]) -> Vec<WindowId> {
    let mut pos = vec![0; order.len()];
    for (index, &window) in order.iter().enumerate() {
        pos[window] = index;
    }
    pos
}

fn greedy_chain(traffic: &[Vec<u64>]) -> Vec<WindowId> {
    let n = traffic.len();
    let outgoing: Vec<u64> = traffic.iter().map(|row| row.iter().sum()).collect();
    let busiest = |placed: &[bool]| {
        (0..n)
            .filter(|&w| !placed[w])
            .max_by(|&a, &b| outgoing[a].cmp(&outgoing[b]).then(b.cmp(&a)))
    };

    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut current = match busiest(&placed) {
        Some(w) => w,
        None => return order,
    };
    loop {
        placed[current] = true;
        order.push(current);
        let next = (0..n)
            .filter(|&w| !placed[w] && traffic[current][w] > 0)
            .max_by(|&a, &b| traffic[current][a].cmp(&traffic[current][b]).then(b.cmp(&a)))
            .or_else(|| busiest(&placed));
        match next {
            Some(w) => current = w,
            None => break,
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn shuffled_lattice() -> Lattice {
        // The chain a→b→c→d→e is scattered over windows 3,0,4,1,2.
        let assignments: BTreeMap<String, usize> =
            [("a", 3), ("b", 0), ("c", 4), ("d", 1), ("e", 2)]
                .iter()
                .map(|&(t, w)| (t.to_string(), w))
                .collect();
        Lattice::from_assignments(assignments, 5).unwrap()
    }

    fn chain_lines() -> Vec<Line> {
        (0..6)
            .map(|_| ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn chain_becomes_consecutive() {
        let outcome = WindowReorderer::new(ReorderConfig::default())
            .reorder(&shuffled_lattice(), &chain_lines())
            .unwrap();
        assert_eq!(outcome.report.cost_after, 0);
        assert!(outcome.report.cost_before > 0);
        let lattice = &outcome.lattice;
        let chain = ["a", "b", "c", "d", "e"];
        for pair in chain.windows(2) {
            let (wa, wb) = (lattice.window_of(pair[0]).unwrap(), lattice.window_of(pair[1]).unwrap());
            assert_eq!((wa + 1) % 5, wb);
        }
    }

    #[test]
    fn reorder_keeps_bijection_and_never_worsens() {
        let lines: Vec<Line> = vec![
            vec!["a".into(), "c".into(), "a".into()],
            vec!["e".into(), "b".into()],
        ];
        let outcome = WindowReorderer::new(ReorderConfig::default())
            .reorder(&shuffled_lattice(), &lines)
            .unwrap();
        assert!(outcome.report.cost_after <= outcome.report.cost_before);
        let mut seen = 0;
        for w in 0..outcome.lattice.num_windows() {
            for token in outcome.lattice.contents(w) {
                assert_eq!(outcome.lattice.window_of(token), Some(w));
                seen += 1;
            }
        }
        assert_eq!(seen, 5);
    }

    #[test]
    fn empty_corpus_keeps_labels() {
        let outcome = WindowReorderer::new(ReorderConfig::default())
            .reorder(&shuffled_lattice(), &[])
            .unwrap();
        assert_eq!(outcome.report.mapping, vec![0, 1, 2, 3, 4]);
        assert_eq!(outcome.lattice, shuffled_lattice());
    }
}
