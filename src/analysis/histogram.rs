//! Bucketed similarity distributions.

use serde::{Deserialize, Serialize};

use super::moments::{Moments, moments};
use crate::error::{AnalysisError, AnalysisResult};

/// Default number of buckets for uniform bucketing.
pub const DEFAULT_BUCKETS: usize = 50;

/// Fraction of the observed range added on both sides of uniform buckets.
const RANGE_PAD: f64 = 0.001;

/// How a score population is split into buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucketing {
    /// `buckets` equal-width buckets over the padded `[min, max]` range.
    Uniform { buckets: usize },
    /// Caller-chosen bucket centers; borders come from [`bucket_borders`].
    Centers(Vec<f64>),
}

impl Default for Bucketing {
    fn default() -> Self {
        Bucketing::Uniform {
            buckets: DEFAULT_BUCKETS,
        }
    }
}

/// One histogram bucket, labelled by its center value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub value: f64,
    pub frequency: usize,
}

/// Bucketed summary of one similarity source plus raw-population moments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityDistribution {
    pub name: String,
    pub buckets: Vec<Bucket>,
    pub borders: Vec<f64>,
    pub moments: Moments,
}

impl SimilarityDistribution {
    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.frequency).sum()
    }
}

/// Derive `C + 1` strictly increasing borders from `C` bucket centers.
///
/// Inner borders are midpoints between neighbouring centers; the outer two
/// sit half the average center spacing beyond the first and last center.
/// A single center gets a bucket of unit width.
pub fn bucket_borders(centers: &[f64]) -> AnalysisResult<Vec<f64>> {
    if centers.is_empty() {
        return Err(AnalysisError::InvalidBuckets {
            message: "no bucket centers given".into(),
        });
    }
    if let Some(bad) = centers.iter().find(|c| !c.is_finite()) {
        return Err(AnalysisError::InvalidBuckets {
            message: format!("center {bad} is not finite"),
        });
    }
    if let Some(w) = centers.windows(2).find(|w| w[1] <= w[0]) {
        return Err(AnalysisError::InvalidBuckets {
            message: format!("centers must increase, found {} then {}", w[0], w[1]),
        });
    }

    let first = centers[0];
    let last = centers[centers.len() - 1];
    let half = if centers.len() == 1 {
        0.5
    } else {
        (last - first) / (centers.len() - 1) as f64 / 2.0
    };

    let mut borders = Vec::with_capacity(centers.len() + 1);
    borders.push(first - half);
    borders.extend(centers.windows(2).map(|w| (w[0] + w[1]) / 2.0));
    borders.push(last + half);
    Ok(borders)
}

/// Scale a population linearly onto `[0, 1]`. A constant population maps to zeros.
pub fn minmax_scale(scores: &[f64]) -> Vec<f64> {
    let (min, max) = scores
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    let range = max - min;
    if range.is_nan() || range <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|x| (x - min) / range).collect()
}

/// Bucket `scores` and compute their moments.
///
/// Scores outside the outer borders are counted in the nearest edge bucket.
pub fn histogram(
    name: &str,
    scores: &[f64],
    bucketing: &Bucketing,
) -> AnalysisResult<SimilarityDistribution> {
    let moments = moments(scores)?;
    let (centers, borders) = match bucketing {
        Bucketing::Uniform { buckets } => uniform_layout(scores, *buckets)?,
        Bucketing::Centers(centers) => (centers.clone(), bucket_borders(centers)?),
    };

    let mut counts = vec![0usize; centers.len()];
    let inner = &borders[1..borders.len() - 1];
    for &x in scores {
        let idx = inner.partition_point(|b| *b <= x);
        counts[idx] += 1;
    }

    tracing::debug!(name, buckets = centers.len(), samples = scores.len(), "built histogram");

    Ok(SimilarityDistribution {
        name: name.to_string(),
        buckets: centers
            .into_iter()
            .zip(counts)
            .map(|(value, frequency)| Bucket { value, frequency })
            .collect(),
        borders,
        moments,
    })
}

fn uniform_layout(scores: &[f64], buckets: usize) -> AnalysisResult<(Vec<f64>, Vec<f64>)> {
    if buckets == 0 {
        return Err(AnalysisError::InvalidBuckets {
            message: "bucket count must be positive".into(),
        });
    }
    let (min, max) = scores
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    if !min.is_finite() || !max.is_finite() {
        return Err(AnalysisError::InvalidBuckets {
            message: "scores must be finite".into(),
        });
    }

    let pad = if max > min { RANGE_PAD * (max - min) } else { 0.5 };
    let lo = min - pad;
    let width = (max + pad - lo) / buckets as f64;

    let borders: Vec<f64> = (0..=buckets).map(|i| lo + width * i as f64).collect();
    let centers = borders.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    Ok((centers, borders))
}
