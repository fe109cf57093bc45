// File: src/emulator.rs
use crate::config::{EmulatorConfig, Selection};
use crate::core::context::LatticeContext;
use crate::core::types::{advance, Line, WindowId};
use crate::error::{LatticeError, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// One emitted token and the choice that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceTrace {
    pub line: usize,
    pub position: usize,
    /// Center of the drift band the token was drawn from.
    pub window: WindowId,
    pub candidates: usize,
    pub chosen_index: usize,
    pub token: String,
    pub previous: Option<String>,
    /// Window of the chosen token, if it could be placed.
    pub token_window: Option<WindowId>,
    pub oov: bool,
    /// Half-width of the band actually searched; 1 unless the band was empty.
    pub band_radius: usize,
}

/// Out-of-vocabulary emission plan: probability per token and a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OovPlan {
    pub rate: f64,
    pub pool: Vec<String>,
}

impl OovPlan {
    /// Observed OOV rate and sorted distinct OOV tokens of a real corpus.
    pub fn observe(lines: &[Line], context: &LatticeContext) -> Option<Self> {
        let mut pool = BTreeSet::new();
        let (mut oov, mut total) = (0usize, 0usize);
        for token in lines.iter().flatten() {
            total += 1;
            if !context.lattice.contains(token) {
                oov += 1;
                pool.insert(token.clone());
            }
        }
        (oov > 0).then(|| OovPlan { rate: oov as f64 / total as f64, pool: pool.into_iter().collect() })
    }

    fn is_active(&self) -> bool {
        self.rate > 0.0 && !self.pool.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorOutput {
    pub lines: Vec<Line>,
    pub trace: Option<Vec<ChoiceTrace>>,
}

/// Seeded generator that walks the lattice's drift bands.
///
/// The register holds the center window of the next draw. After a token in
/// window `w` is emitted the center moves to `w + forward_step + correction(w)`.
/// Every random draw comes from one `ChaCha8Rng`, and the trace is filled
/// from values already drawn, so tracing never changes the output.
pub struct MirrorEmulator<'a> {
    context: &'a LatticeContext,
    config: EmulatorConfig,
}

impl<'a> MirrorEmulator<'a> {
    pub fn new(context: &'a LatticeContext, config: EmulatorConfig) -> Result<Self> {
        if context.lattice.is_empty() {
            return Err(LatticeError::EmptyGraph);
        }
        if config.start_window >= context.num_windows() {
            return Err(LatticeError::config(
                "emulator.start_window",
                format!("{} is outside [0, {})", config.start_window, context.num_windows()),
            ));
        }
        Ok(Self { context, config })
    }

    /// Mirrors the line shape and OOV rate of a real corpus.
    pub fn mirror(&self, real_lines: &[Line]) -> EmulatorOutput {
        let lengths: Vec<usize> = real_lines.iter().map(Vec::len).collect();
        let plan = OovPlan::observe(real_lines, self.context);
        self.generate(&lengths, plan.as_ref())
    }

    pub fn generate(&self, line_lengths: &[usize], oov: Option<&OovPlan>) -> EmulatorOutput {
        let n = self.context.num_windows();
        let lattice = &self.context.lattice;
        let oov = oov.filter(|plan| plan.is_active());
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut center = self.config.start_window;
        let mut previous: Option<String> = None;
        let mut lines = Vec::with_capacity(line_lengths.len());
        let mut trace = self.config.trace.then(Vec::new);

        for (line_no, &length) in line_lengths.iter().enumerate() {
            let mut line = Vec::with_capacity(length);
            for position in 0..length {
                let (candidates, band_radius) = self.candidates(center);
                let emit_oov = match oov {
                    Some(plan) => rng.gen::<f64>() < plan.rate,
                    None => false,
                };

                let (token, chosen_index, token_window, pool_size) = if let (true, Some(plan)) = (emit_oov, oov) {
                    let index = rng.gen_range(0..plan.pool.len());
                    let token = plan.pool[index].clone();
                    let window = self
                        .context
                        .suffix_map
                        .as_ref()
                        .and_then(|map| map.resolve(&token).window());
                    (token, index, window, plan.pool.len())
                } else {
                    let index = self.pick(&candidates, &mut rng);
                    let token = candidates[index].to_string();
                    let window = lattice.window_of(&token);
                    (token, index, window, candidates.len())
                };

                if let Some(records) = trace.as_mut() {
                    records.push(ChoiceTrace {
                        line: line_no,
                        position,
                        window: center,
                        candidates: pool_size,
                        chosen_index,
                        token: token.clone(),
                        previous: previous.clone(),
                        token_window,
                        oov: emit_oov,
                        band_radius,
                    });
                }

                center = match token_window {
                    Some(w) => {
                        let correction = self.context.correction(w, None);
                        advance(w, self.config.forward_step + correction, n)
                    }
                    // Unplaced OOV tokens leave the device stepping forward.
                    None => advance(center, self.config.forward_step, n),
                };
                previous = Some(token.clone());
                line.push(token);
            }
            lines.push(line);
        }

        info!(
            lines = lines.len(),
            tokens = line_lengths.iter().sum::<usize>(),
            seed = self.config.seed,
            "mirror corpus generated"
        );
        EmulatorOutput { lines, trace }
    }

    /// Tokens of the drift band around `center`, in window order
    /// `center - r ..= center + r`. The band widens while it is empty.
    fn candidates(&self, center: WindowId) -> (Vec<&'a str>, usize) {
        let context: &'a LatticeContext = self.context;
        let n = context.num_windows();
        let lattice = &context.lattice;
        let mut radius = 1;
        loop {
            let mut windows: Vec<WindowId> = Vec::new();
            for step in -(radius as i64)..=(radius as i64) {
                let w = advance(center, step, n);
                if !windows.contains(&w) {
                    windows.push(w);
                }
            }
            let tokens: Vec<&'a str> = windows
                .iter()
                .flat_map(|&w| lattice.contents(w).iter().map(String::as_str))
                .collect();
            if !tokens.is_empty() {
                if radius > 1 {
                    debug!(center, radius, "drift band widened past empty windows");
                }
                return (tokens, radius);
            }
            // The lattice holds at least one token, so this terminates.
            radius += 1;
        }
    }

    fn pick(&self, candidates: &[&str], rng: &mut ChaCha8Rng) -> usize {
        match self.config.selection {
            Selection::Uniform => rng.gen_range(0..candidates.len()),
            Selection::FrequencyWeighted => {
                let weights: Vec<u64> = candidates
                    .iter()
                    .map(|t| self.context.frequencies.count(t).max(1))
                    .collect();
                match WeightedIndex::new(&weights) {
                    Ok(dist) => dist.sample(rng),
                    Err(_) => rng.gen_range(0..candidates.len()),
                }
            }
        }
    }
}
