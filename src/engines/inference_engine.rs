//! Active Inference Engine: per-phase outcome histogram feeding an
//! advisory scalar that can only down-weight authorized size.
//!
//! Uses a fixed-bin-count-over-`[0,1]` layout repurposed from probability
//! calibration to histogramming realized outcomes.

use std::collections::HashMap;

use crate::domain::PhaseId;

const DEFAULT_BIN_COUNT: usize = 20;

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub bin_count: usize,
    pub sensitivity: f64,
    pub surprise_offset: f64,
    pub min_history: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            bin_count: DEFAULT_BIN_COUNT,
            sensitivity: 4.0,
            surprise_offset: 0.0,
            min_history: 20,
        }
    }
}

#[derive(Debug, Clone)]
struct PhaseHistogram {
    counts: Vec<u64>,
    total: u64,
}

impl PhaseHistogram {
    fn new(bin_count: usize) -> Self {
        Self {
            counts: vec![0; bin_count],
            total: 0,
        }
    }

    fn observe(&mut self, bin: usize) {
        if let Some(slot) = self.counts.get_mut(bin) {
            *slot += 1;
            self.total += 1;
        }
    }

    fn probability(&self, bin: usize) -> f64 {
        if self.total == 0 {
            return 1.0 / self.counts.len() as f64;
        }
        let count = self.counts.get(bin).copied().unwrap_or(0);
        // Laplace smoothing so a never-observed bin doesn't yield p=0 -> S=inf.
        (count as f64 + 1.0) / (self.total as f64 + self.counts.len() as f64)
    }
}

/// Maps a raw outcome in `[0,1]` to its histogram bin index.
pub fn bin_of(outcome: f64, bin_count: usize) -> usize {
    let clamped = outcome.clamp(0.0, 1.0);
    let idx = (clamped * bin_count as f64) as usize;
    idx.min(bin_count - 1)
}

/// Per-phase fixed-bin outcome histograms and the derived surprise scalar.
pub struct InferenceEngine {
    cfg: InferenceConfig,
    histograms: HashMap<PhaseId, PhaseHistogram>,
}

impl InferenceEngine {
    pub fn new(cfg: InferenceConfig) -> Self {
        let mut histograms = HashMap::new();
        for phase in PhaseId::all() {
            histograms.insert(phase, PhaseHistogram::new(cfg.bin_count));
        }
        Self { cfg, histograms }
    }

    /// `record(phaseId, outcome)` folds a realized outcome into the phase's histogram.
    pub fn record(&mut self, phase: PhaseId, outcome: f64) {
        let bin = bin_of(outcome, self.cfg.bin_count);
        self.histograms
            .entry(phase)
            .or_insert_with(|| PhaseHistogram::new(self.cfg.bin_count))
            .observe(bin);
    }

    fn history_count(&self, phase: PhaseId) -> u32 {
        self.histograms.get(&phase).map(|h| h.total).unwrap_or(0) as u32
    }

    /// `inferenceScalar(phaseId, predictedOutcome) -> s ∈ [0,1]`, never raises size.
    pub fn scalar(&self, phase: PhaseId, predicted_outcome: f64) -> f64 {
        if self.history_count(phase) < self.cfg.min_history {
            return 1.0;
        }
        let bin = bin_of(predicted_outcome, self.cfg.bin_count);
        let p = self
            .histograms
            .get(&phase)
            .map(|h| h.probability(bin))
            .unwrap_or(1.0);
        let surprise = (-p.ln()).clamp(0.0, self.cfg.sensitivity) + self.cfg.surprise_offset;
        (1.0 - surprise / self.cfg.sensitivity).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_neutral_below_min_history() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        assert_eq!(engine.scalar(PhaseId::P1, 0.5), 1.0);
    }

    #[test]
    fn scalar_never_exceeds_one() {
        let mut engine = InferenceEngine::new(InferenceConfig {
            min_history: 5,
            ..InferenceConfig::default()
        });
        for _ in 0..30 {
            engine.record(PhaseId::P1, 0.5);
        }
        let s = engine.scalar(PhaseId::P1, 0.5);
        assert!(s <= 1.0 && s >= 0.0);
    }

    #[test]
    fn rare_outcome_lowers_scalar() {
        let mut engine = InferenceEngine::new(InferenceConfig {
            min_history: 5,
            ..InferenceConfig::default()
        });
        for _ in 0..50 {
            engine.record(PhaseId::P1, 0.1);
        }
        let common = engine.scalar(PhaseId::P1, 0.1);
        let rare = engine.scalar(PhaseId::P1, 0.9);
        assert!(rare < common);
    }

    #[test]
    fn bin_of_clamps_endpoints() {
        assert_eq!(bin_of(1.0, 20), 19);
        assert_eq!(bin_of(0.0, 20), 0);
        assert_eq!(bin_of(-0.5, 20), 0);
        assert_eq!(bin_of(1.5, 20), 19);
    }
}
