// File: src/evaluation.rs
use crate::core::lattice::Lattice;
use crate::core::types::{advance, signed_offset, Line, WindowId};
use crate::fuzzy::SuffixRecoveryMap;
use crate::learning::Corrections;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// N-gram orders covered by the overgeneration report.
pub const NGRAM_ORDERS: std::ops::RangeInclusive<usize> = 2..=5;

/// Admissibility of a corpus against a lattice.
///
/// Base rates cover transitions whose tokens are both in the lattice. OOV
/// transitions are either recovered through the suffix map, in which case
/// they join the consolidated rate, or unresolved, in which case they sit in
/// their own bucket and appear in no denominator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdmissibilityReport {
    pub lines: usize,
    pub tokens: usize,
    pub transitions: usize,

    pub base_transitions: usize,
    pub strict_hits: usize,
    pub drift_hits: usize,
    /// Signed deviation of base successors from the corrected prediction.
    pub deviation_histogram: BTreeMap<i64, usize>,

    pub oov_tokens: usize,
    pub oov_tokens_recovered: usize,
    pub oov_transitions: usize,
    pub oov_recovered: usize,
    pub oov_strict_hits: usize,
    pub oov_admissible: usize,
    pub unresolved: usize,

    pub strict_rate: f64,
    pub drift_rate: f64,
    pub consolidated_transitions: usize,
    pub consolidated_hits: usize,
    pub consolidated_rate: f64,
    pub oov_recovery_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    InLattice(WindowId),
    Recovered(WindowId),
    Unresolved,
}

impl Placement {
    fn window(self) -> Option<WindowId> {
        match self {
            Placement::InLattice(w) | Placement::Recovered(w) => Some(w),
            Placement::Unresolved => None,
        }
    }
}

fn place(token: &str, lattice: &Lattice, suffix_map: Option<&SuffixRecoveryMap>) -> Placement {
    if let Some(w) = lattice.window_of(token) {
        return Placement::InLattice(w);
    }
    suffix_map
        .and_then(|map| map.resolve(token).window())
        .map_or(Placement::Unresolved, Placement::Recovered)
}

fn rate(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Scores every in-line transition against the lattice.
///
/// The prediction for a successor of a token in window `w` is
/// `w + 1 + correction`. A strict hit lands on it exactly; a drift hit lands
/// within one window of it. The lattice is trusted to be a valid bijection.
pub fn calculate_admissibility(
    lines: &[Line],
    lattice: &Lattice,
    corrections: Option<&Corrections>,
    suffix_map: Option<&SuffixRecoveryMap>,
) -> AdmissibilityReport {
    let n = lattice.num_windows();
    let mut report = AdmissibilityReport { lines: lines.len(), ..AdmissibilityReport::default() };

    for line in lines {
        let placements: Vec<Placement> =
            line.iter().map(|t| place(t, lattice, suffix_map)).collect();
        report.tokens += line.len();
        for p in &placements {
            match p {
                Placement::InLattice(_) => {}
                Placement::Recovered(_) => {
                    report.oov_tokens += 1;
                    report.oov_tokens_recovered += 1;
                }
                Placement::Unresolved => report.oov_tokens += 1,
            }
        }

        for (i, pair) in placements.windows(2).enumerate() {
            report.transitions += 1;
            let base = matches!(pair, [Placement::InLattice(_), Placement::InLattice(_)]);
            if !base {
                report.oov_transitions += 1;
            }
            let (Some(prev), Some(curr)) = (pair[0].window(), pair[1].window()) else {
                report.unresolved += 1;
                continue;
            };
            let correction = corrections.map_or(0, |c| c.offset(prev, Some(line[i + 1].as_str())));
            let predicted = advance(prev, 1 + correction, n);
            let deviation = signed_offset(predicted as i64, curr as i64, n);
            let strict = deviation == 0;
            let drift = deviation.abs() <= 1;
            if base {
                report.base_transitions += 1;
                report.strict_hits += strict as usize;
                report.drift_hits += drift as usize;
                *report.deviation_histogram.entry(deviation).or_insert(0) += 1;
            } else {
                report.oov_recovered += 1;
                report.oov_strict_hits += strict as usize;
                report.oov_admissible += drift as usize;
            }
        }
    }

    report.strict_rate = rate(report.strict_hits, report.base_transitions);
    report.drift_rate = rate(report.drift_hits, report.base_transitions);
    report.consolidated_transitions = report.base_transitions + report.oov_recovered;
    report.consolidated_hits = report.drift_hits + report.oov_admissible;
    report.consolidated_rate = rate(report.consolidated_hits, report.consolidated_transitions);
    report.oov_recovery_rate = rate(report.oov_recovered, report.oov_transitions);
    debug!(
        transitions = report.transitions,
        base = report.base_transitions,
        unresolved = report.unresolved,
        drift_rate = report.drift_rate,
        "admissibility scored"
    );
    report
}

/// N-gram statistics for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NgramOrderStats {
    pub n: usize,
    pub synthetic_total: usize,
    pub synthetic_distinct: usize,
    pub real_total: usize,
    pub real_distinct: usize,
    pub overlap: usize,
    pub unattested: usize,
    /// Share of distinct synthetic n-grams never seen in the real corpus.
    pub unattested_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvergenerationReport {
    pub orders: Vec<NgramOrderStats>,
}

impl OvergenerationReport {
    pub fn order(&self, n: usize) -> Option<&NgramOrderStats> {
        self.orders.iter().find(|o| o.n == n)
    }
}

/// Distinct in-line n-grams and the number of n-gram positions.
pub fn ngram_set(lines: &[Line], n: usize) -> (HashSet<&[String]>, usize) {
    let mut set = HashSet::new();
    let mut total = 0;
    for line in lines {
        for gram in line.windows(n) {
            set.insert(gram);
            total += 1;
        }
    }
    (set, total)
}

/// How far a synthetic corpus strays into n-grams the real corpus never used.
pub fn calculate_overgeneration(synthetic: &[Line], real: &[Line]) -> OvergenerationReport {
    let orders = NGRAM_ORDERS
        .map(|n| {
            let (syn, synthetic_total) = ngram_set(synthetic, n);
            let (seen, real_total) = ngram_set(real, n);
            let overlap = syn.intersection(&seen).count();
            let unattested = syn.len() - overlap;
            NgramOrderStats {
                n,
                synthetic_total,
                synthetic_distinct: syn.len(),
                real_total,
                real_distinct: seen.len(),
                overlap,
                unattested,
                unattested_rate: rate(unattested, syn.len()),
            }
        })
        .collect();
    OvergenerationReport { orders }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuffixConfig;
    use crate::core::lattice::tests::four_window_lattice;
    use crate::core::types::FrequencyTable;
    use crate::learning::CorrectionTable;

    fn line(tokens: &str) -> Line {
        tokens.split_whitespace().map(str::to_string).collect()
    }

    fn training() -> Vec<Line> {
        let mut lines: Vec<Line> = (0..10).map(|_| line("a c e g")).collect();
        lines.extend((0..10).map(|_| line("a d f h")));
        lines
    }

    #[test]
    fn forward_chain_is_fully_admissible() {
        let report = calculate_admissibility(&training(), &four_window_lattice(), None, None);
        assert_eq!(report.base_transitions, 60);
        assert_eq!(report.strict_rate, 1.0);
        assert_eq!(report.drift_rate, 1.0);
        assert_eq!(report.consolidated_rate, 1.0);
        assert_eq!(report.deviation_histogram.get(&0), Some(&60));
    }

    #[test]
    fn drift_band_is_one_window_wide() {
        // a(0): predicted 1. a->a deviates -1, a->e deviates +1, a->g deviates +2.
        let lines = vec![line("a a"), line("a e"), line("a g")];
        let report = calculate_admissibility(&lines, &four_window_lattice(), None, None);
        assert_eq!(report.strict_hits, 0);
        assert_eq!(report.drift_hits, 2);
        assert_eq!(report.base_transitions, 3);
    }

    #[test]
    fn corrections_shift_the_prediction() {
        let lattice = four_window_lattice();
        let lines = vec![line("a e"), line("a e")];
        let table = serde_json::from_value::<CorrectionTable>(serde_json::json!({
            "num_windows": 4,
            "offsets": [1, 0, 0, 0],
            "observations": [2, 0, 0, 0],
            "status": ["learned", "insufficient_data", "insufficient_data", "insufficient_data"]
        }))
        .unwrap();
        let corrected =
            calculate_admissibility(&lines, &lattice, Some(&Corrections::Uniform(table)), None);
        assert_eq!(corrected.strict_rate, 1.0);
        let plain = calculate_admissibility(&lines, &lattice, None, None);
        assert_eq!(plain.strict_rate, 0.0);
        assert_eq!(plain.drift_rate, 1.0);
    }

    #[test]
    fn unresolved_transitions_stay_out_of_denominators() {
        let lines = vec![line("a c xyz e g")];
        let report = calculate_admissibility(&lines, &four_window_lattice(), None, None);
        assert_eq!(report.transitions, 4);
        assert_eq!(report.base_transitions, 2);
        assert_eq!(report.oov_transitions, 2);
        assert_eq!(report.unresolved, 2);
        assert_eq!(report.oov_tokens, 1);
        assert_eq!(report.drift_rate, 1.0);
        assert_eq!(report.consolidated_transitions, 2);
    }

    #[test]
    fn consolidated_extends_the_base_set() {
        let lattice = four_window_lattice();
        let mut freq = FrequencyTable::new();
        freq.add("e", 10);
        let mut lattice_map = std::collections::BTreeMap::new();
        for (t, w) in lattice.words() {
            lattice_map.insert(t.to_string(), w);
        }
        lattice_map.insert("ke".into(), 2);
        lattice_map.insert("se".into(), 2);
        let suffix_lattice = Lattice::from_assignments(lattice_map, 4).unwrap();
        let config = SuffixConfig { suffixes: vec!["e".into()], min_count: 1 };
        let suffix_map = SuffixRecoveryMap::build(&suffix_lattice, &freq, &config);

        // "qe" is OOV for the four-window lattice and resolves to window 2.
        let lines = vec![line("a c qe g"), line("a c zz")];
        let base = calculate_admissibility(&lines, &lattice, None, None);
        let consolidated = calculate_admissibility(&lines, &lattice, None, Some(&suffix_map));
        assert_eq!(base.base_transitions, consolidated.base_transitions);
        assert_eq!(base.drift_rate, consolidated.drift_rate);
        assert_eq!(consolidated.oov_recovered, 2);
        assert_eq!(consolidated.oov_admissible, 2);
        assert_eq!(consolidated.unresolved, 1);
        assert_eq!(consolidated.oov_tokens_recovered, 1);
        assert!(consolidated.consolidated_transitions >= base.consolidated_transitions);
        assert_eq!(consolidated.consolidated_transitions, 4);
    }

    #[test]
    fn overgeneration_counts_unattested_ngrams() {
        let real = vec![line("a b c d e f")];
        let synthetic = vec![line("a b c x")];
        let report = calculate_overgeneration(&synthetic, &real);
        let bigrams = report.order(2).unwrap();
        assert_eq!(bigrams.synthetic_distinct, 3);
        assert_eq!(bigrams.overlap, 2);
        assert_eq!(bigrams.unattested, 1);
        assert!((bigrams.unattested_rate - 1.0 / 3.0).abs() < 1e-12);
        let four = report.order(4).unwrap();
        assert_eq!(four.synthetic_distinct, 1);
        assert_eq!(four.unattested_rate, 1.0);
        let five = report.order(5).unwrap();
        assert_eq!(five.synthetic_total, 0);
        assert_eq!(five.unattested_rate, 0.0);
    }

    #[test]
    fn ngram_counts_respect_sanity_bounds() {
        let corpus = vec![line("a b a b c a b"), line("c a b"), line("b"), line("a b c a")];
        let mut previous: Option<(usize, usize)> = None;
        for n in 1..=6 {
            let (set, total) = ngram_set(&corpus, n);
            assert!(set.len() <= total);
            if let Some((prev_distinct, prev_total)) = previous {
                assert!(total <= prev_total);
                // Every n-gram not ending a line extends to an (n+1)-gram.
                assert!(set.len() + corpus.len() >= prev_distinct);
            }
            previous = Some((set.len(), total));
        }
    }
}
