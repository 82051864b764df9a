//! Pointwise disagreement between ground-truth and embedding scores.

use serde::{Deserialize, Serialize};

use super::histogram::minmax_scale;
use crate::error::{AnalysisError, AnalysisResult};

/// Degrees of freedom of the chi-square kernel.
const CHI_K: i32 = 3;
/// Kernel normalizer.
const CHI_GAMMA: f64 = 1.0;

/// Mean disagreement of one embedding system with the ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreDivergence {
    pub mean_abs_diff: f64,
    /// Mean of `2|a - b| / |a + b|`; pairs with `a + b = 0` contribute zero.
    pub weighted_mean_abs_diff: f64,
    pub chi_squared: f64,
    pub normalized_mean_abs_diff: f64,
    pub normalized_chi_squared: f64,
}

fn chi_kernel(diff: f64) -> f64 {
    // Integer halving matches the kernel's k / 2 exponent.
    let half = CHI_K / 2;
    diff.powi(half - 1) * (-diff / 2.0).exp() / (2f64.powi(half) * CHI_GAMMA)
}

/// Compare index-aligned score sequences, raw and after min-max scaling.
pub fn divergence(ground_truth: &[f64], embedding: &[f64]) -> AnalysisResult<ScoreDivergence> {
    if ground_truth.len() != embedding.len() {
        return Err(AnalysisError::LengthMismatch {
            left: ground_truth.len(),
            right: embedding.len(),
        });
    }
    if ground_truth.is_empty() {
        return Err(AnalysisError::TooFewSamples {
            required: 1,
            actual: 0,
        });
    }

    let norm_gt = minmax_scale(ground_truth);
    let norm_emb = minmax_scale(embedding);
    let n = ground_truth.len() as f64;

    let mut out = ScoreDivergence {
        mean_abs_diff: 0.0,
        weighted_mean_abs_diff: 0.0,
        chi_squared: 0.0,
        normalized_mean_abs_diff: 0.0,
        normalized_chi_squared: 0.0,
    };
    for i in 0..ground_truth.len() {
        let (a, b) = (embedding[i], ground_truth[i]);
        let diff = (a - b).abs();
        let sum = (a + b).abs();
        let norm_diff = (norm_emb[i] - norm_gt[i]).abs();

        out.mean_abs_diff += diff;
        if sum > 0.0 {
            out.weighted_mean_abs_diff += 2.0 * diff / sum;
        }
        out.chi_squared += chi_kernel(diff);
        out.normalized_mean_abs_diff += norm_diff;
        out.normalized_chi_squared += chi_kernel(norm_diff);
    }

    out.mean_abs_diff /= n;
    out.weighted_mean_abs_diff /= n;
    out.chi_squared /= n;
    out.normalized_mean_abs_diff /= n;
    out.normalized_chi_squared /= n;
    Ok(out)
}
