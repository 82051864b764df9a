//! Distributed bag-of-words paragraph vectors with negative sampling.
//!
//! Each document owns one tag vector. For every retained token occurrence the
//! tag vector is trained to score the true token above `negative` noise
//! tokens. Tag vectors are touched by exactly one task per epoch; the shared
//! output matrix is guarded row by row.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::vocab::Vocabulary;

/// Hyperparameters for one training run, already validated.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SgdParams {
    pub dim: usize,
    pub negative: usize,
    pub clip: f32,
    pub seed: u64,
}

pub(crate) struct DbowModel {
    doc_vecs: Vec<Vec<f32>>,
    out: Vec<Mutex<Vec<f32>>>,
    params: SgdParams,
}

impl DbowModel {
    /// Document vectors start uniform in `[-0.5, 0.5) / dim`, output rows at zero.
    pub fn new(n_docs: usize, vocab_len: usize, params: SgdParams) -> Self {
        let dim = params.dim;
        let doc_vecs = (0..n_docs)
            .map(|d| {
                let mut rng = StdRng::seed_from_u64(stream_seed(params.seed, u64::MAX, d));
                (0..dim)
                    .map(|_| rng.gen_range(-0.5f32..0.5) / dim as f32)
                    .collect()
            })
            .collect();
        let out = (0..vocab_len).map(|_| Mutex::new(vec![0.0; dim])).collect();

        Self {
            doc_vecs,
            out,
            params,
        }
    }

    /// One pass over every document at learning rate `alpha`.
    ///
    /// Returns the mean negative-sampling loss per scored pair. Must be
    /// called inside the worker pool that should run it.
    pub fn epoch(&mut self, docs: &[Vec<usize>], vocab: &Vocabulary, epoch: usize, alpha: f32) -> f64 {
        let params = self.params;
        let out = &self.out;

        let (loss, pairs) = self
            .doc_vecs
            .par_iter_mut()
            .zip(docs.par_iter())
            .enumerate()
            .map(|(d, (doc_vec, tokens))| {
                let mut rng = StdRng::seed_from_u64(stream_seed(params.seed, epoch as u64, d));
                train_document(doc_vec, tokens, vocab, out, alpha, &params, &mut rng)
            })
            .reduce(|| (0.0, 0usize), |a, b| (a.0 + b.0, a.1 + b.1));

        if pairs == 0 { 0.0 } else { loss / pairs as f64 }
    }

    pub fn into_vectors(self) -> Vec<Vec<f32>> {
        self.doc_vecs
    }
}

fn train_document(
    doc_vec: &mut [f32],
    tokens: &[usize],
    vocab: &Vocabulary,
    out: &[Mutex<Vec<f32>>],
    alpha: f32,
    params: &SgdParams,
    rng: &mut StdRng,
) -> (f64, usize) {
    let mut loss = 0.0f64;
    let mut pairs = 0usize;
    let mut doc_grad = vec![0.0f32; params.dim];
    let mut row_grad = vec![0.0f32; params.dim];

    for &word in tokens {
        if rng.gen_range(0.0f32..1.0) > vocab.keep_probability(word) {
            continue;
        }
        doc_grad.iter_mut().for_each(|g| *g = 0.0);

        for i in 0..=params.negative {
            let (target, label) = if i == 0 {
                (word, 1.0f32)
            } else {
                match vocab.sample_noise(rng) {
                    Some(t) if t != word => (t, 0.0f32),
                    _ => continue,
                }
            };

            let mut row = out[target].lock().unwrap_or_else(|p| p.into_inner());
            let score = dot(doc_vec, &row);
            let g = (label - sigmoid(score)) * alpha;
            let pair_loss = if label > 0.0 {
                -log_sigmoid(score)
            } else {
                -log_sigmoid(-score)
            };
            loss += pair_loss as f64;
            pairs += 1;

            for (dg, &r) in doc_grad.iter_mut().zip(row.iter()) {
                *dg += g * r;
            }
            for (rg, &dv) in row_grad.iter_mut().zip(doc_vec.iter()) {
                *rg = g * dv;
            }
            clip_norm(&mut row_grad, params.clip);
            for (r, &rg) in row.iter_mut().zip(row_grad.iter()) {
                *r += rg;
            }
        }

        clip_norm(&mut doc_grad, params.clip);
        for (v, &g) in doc_vec.iter_mut().zip(doc_grad.iter()) {
            *v += g;
        }
    }

    (loss, pairs)
}

/// Independent RNG stream per (epoch, document); unaffected by scheduling.
fn stream_seed(seed: u64, epoch: u64, doc: usize) -> u64 {
    seed ^ epoch.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (doc as u64).wrapping_add(1).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn log_sigmoid(x: f32) -> f32 {
    // Stable for large |x|.
    if x >= 0.0 {
        -(-x).exp().ln_1p()
    } else {
        x - x.exp().ln_1p()
    }
}

/// Rescale `v` in place so its L2 norm is at most `max`.
pub(crate) fn clip_norm(v: &mut [f32], max: f32) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > max && norm > 0.0 {
        let scale = max / norm;
        v.iter_mut().for_each(|x| *x *= scale);
    }
}
