// File: src/core/embedding.rs
use crate::config::EmbeddingConfig;
use crate::core::graph::TransitionGraph;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Ideal edge length for unit-weight edges.
const SPRING_LENGTH: f64 = 1.0;
const GRAVITY: f64 = 0.05;
const MIN_DISTANCE: f64 = 1e-9;

/// Continuous 2-D node positions, indexed like the graph's nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    positions: Vec<[f64; 2]>,
}

impl Embedding {
    pub fn positions(&self) -> &[[f64; 2]] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn centroid(&self) -> [f64; 2] {
        if self.positions.is_empty() {
            return [0.0, 0.0];
        }
        let n = self.positions.len() as f64;
        let (sx, sy) = self
            .positions
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
        [sx / n, sy / n]
    }

    pub fn distance(&self, a: usize, b: usize) -> f64 {
        let (pa, pb) = (self.positions[a], self.positions[b]);
        ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2)).sqrt()
    }
}

/// Weighted force-directed relaxation with a fixed iteration budget.
///
/// Repulsion `k²/d` acts between every pair, attraction `w'·d²/k` along
/// edges, with `w'` the log-scaled edge weight in `(0, 1]`. An edge settles
/// near `k / w'^(1/3)`, so heavier edges pull their ends closer. The loops
/// run in fixed index order and the only randomness is the seeded initial
/// layout, so equal inputs give bit-identical positions.
pub struct EmbeddingSolver {
    iterations: usize,
    seed: u64,
}

impl EmbeddingSolver {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { iterations: config.iterations, seed: config.seed }
    }

    pub fn solve(&self, graph: &TransitionGraph) -> Embedding {
        let n = graph.node_count();
        if n == 0 {
            return Embedding { positions: Vec::new() };
        }
        let k = SPRING_LENGTH;
        let side = (n as f64).sqrt() * k;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut positions: Vec<[f64; 2]> = (0..n)
            .map(|_| {
                [
                    rng.gen_range(-0.5..0.5) * side,
                    rng.gen_range(-0.5..0.5) * side,
                ]
            })
            .collect();

        let edges: Vec<(usize, usize, f64)> = graph.weighted_edges().collect();
        let max_log = edges
            .iter()
            .map(|&(_, _, w)| w.ln_1p())
            .fold(0.0_f64, f64::max);
        let scaled: Vec<(usize, usize, f64)> = edges
            .iter()
            .map(|&(a, b, w)| {
                let s = if max_log > 0.0 { w.ln_1p() / max_log } else { 1.0 };
                (a, b, s.max(MIN_DISTANCE))
            })
            .collect();

        let initial_temperature = side / 10.0;
        let mut disp = vec![[0.0_f64; 2]; n];
        for iter in 0..self.iterations {
            let temperature =
                initial_temperature * (1.0 - iter as f64 / self.iterations as f64);
            disp.iter_mut().for_each(|d| *d = [0.0, 0.0]);

            for i in 0..n {
                for j in (i + 1)..n {
                    let (dir, d) = direction(positions[i], positions[j], i, j);
                    let force = k * k / d;
                    disp[i][0] += dir[0] * force;
                    disp[i][1] += dir[1] * force;
                    disp[j][0] -= dir[0] * force;
                    disp[j][1] -= dir[1] * force;
                }
            }

            for &(a, b, w) in &scaled {
                let (dir, d) = direction(positions[a], positions[b], a, b);
                let force = w * d * d / k;
                disp[a][0] -= dir[0] * force;
                disp[a][1] -= dir[1] * force;
                disp[b][0] += dir[0] * force;
                disp[b][1] += dir[1] * force;
            }

            for (p, d) in positions.iter_mut().zip(disp.iter_mut()) {
                d[0] -= GRAVITY * p[0];
                d[1] -= GRAVITY * p[1];
                let len = (d[0] * d[0] + d[1] * d[1]).sqrt();
                if len > MIN_DISTANCE {
                    let step = len.min(temperature);
                    p[0] += d[0] / len * step;
                    p[1] += d[1] / len * step;
                }
            }
        }

        let mut embedding = Embedding { positions };
        let [cx, cy] = embedding.centroid();
        for p in embedding.positions.iter_mut() {
            p[0] -= cx;
            p[1] -= cy;
        }
        debug!(nodes = n, edges = scaled.len(), iterations = self.iterations, "embedding solved");
        embedding
    }
}

/// Unit vector from `b` towards `a` and their distance. Coincident points get
/// a direction derived from their indices.
fn direction(a: [f64; 2], b: [f64; 2], ia: usize, ib: usize) -> ([f64; 2], f64) {
    let (dx, dy) = (a[0] - b[0], a[1] - b[1]);
    let d = (dx * dx + dy * dy).sqrt();
    if d > MIN_DISTANCE {
        ([dx / d, dy / d], d)
    } else {
        let angle = (ia * 7 + ib * 13) as f64;
        ([angle.cos(), angle.sin()], MIN_DISTANCE)
    }
}
