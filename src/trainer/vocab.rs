//! Feature vocabulary: frequency counts, pruning, down-sampling and the
//! negative-sampling noise distribution.

use std::collections::HashMap;

use dashmap::DashMap;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rayon::prelude::*;

use crate::corpus::Feature;

/// Exponent applied to counts when building the noise distribution.
const NOISE_POWER: f64 = 0.75;

/// Retained features with their training statistics.
#[derive(Debug)]
pub struct Vocabulary {
    index: HashMap<Feature, usize>,
    features: Vec<Feature>,
    counts: Vec<u64>,
    keep_prob: Vec<f32>,
    noise: Option<WeightedIndex<f64>>,
}

impl Vocabulary {
    /// Count every feature across `documents` and keep those seen at least
    /// `min_count` times.
    ///
    /// Counting runs on the current rayon pool. Indices are assigned by
    /// descending frequency, ties by ascending feature value, so the layout
    /// does not depend on how the counting work was split.
    pub fn build(documents: &[&[Feature]], min_count: u64, sample: f64) -> Self {
        let counts: DashMap<Feature, u64> = DashMap::new();
        documents.par_iter().for_each(|doc| {
            for &f in doc.iter() {
                *counts.entry(f).or_insert(0) += 1;
            }
        });

        let mut retained: Vec<(Feature, u64)> = counts
            .into_iter()
            .filter(|(_, c)| *c >= min_count)
            .collect();
        retained.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let total: u64 = retained.iter().map(|(_, c)| c).sum();
        let threshold = sample * total as f64;

        let mut index = HashMap::with_capacity(retained.len());
        let mut features = Vec::with_capacity(retained.len());
        let mut counts = Vec::with_capacity(retained.len());
        let mut keep_prob = Vec::with_capacity(retained.len());
        for (i, (f, c)) in retained.into_iter().enumerate() {
            index.insert(f, i);
            features.push(f);
            counts.push(c);
            keep_prob.push(keep_probability(c, threshold));
        }

        let noise = if counts.is_empty() {
            None
        } else {
            WeightedIndex::new(counts.iter().map(|&c| (c as f64).powf(NOISE_POWER))).ok()
        };

        Self {
            index,
            features,
            counts,
            keep_prob,
            noise,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn index_of(&self, feature: Feature) -> Option<usize> {
        self.index.get(&feature).copied()
    }

    pub fn count(&self, idx: usize) -> u64 {
        self.counts[idx]
    }

    pub fn feature(&self, idx: usize) -> Feature {
        self.features[idx]
    }

    /// Probability that an occurrence of `idx` survives down-sampling.
    pub fn keep_probability(&self, idx: usize) -> f32 {
        self.keep_prob[idx]
    }

    /// Map a document's tokens to vocabulary indices, dropping pruned ones.
    pub fn encode(&self, doc: &[Feature]) -> Vec<usize> {
        doc.iter().filter_map(|f| self.index_of(*f)).collect()
    }

    /// Draw one index from the unigram^0.75 noise distribution.
    pub fn sample_noise<R: Rng>(&self, rng: &mut R) -> Option<usize> {
        self.noise.as_ref().map(|d| d.sample(rng))
    }
}

/// word2vec-style keep probability; `threshold = sample * total`.
fn keep_probability(count: u64, threshold: f64) -> f32 {
    if threshold <= 0.0 {
        return 1.0;
    }
    let c = count as f64;
    (((c / threshold).sqrt() + 1.0) * threshold / c).min(1.0) as f32
}
