//! Population moments of a score sample.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Mean, variance, Fisher skewness and excess kurtosis of a score population.
///
/// Skewness and kurtosis are NaN when the variance is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub mean: f64,
    pub variance: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

impl Moments {
    /// True when the population is constant, so correlation is undefined.
    pub fn is_degenerate(&self) -> bool {
        self.variance.is_nan() || self.variance <= 0.0
    }
}

/// Compute the four moments over the raw (unbucketed) population.
pub fn moments(scores: &[f64]) -> AnalysisResult<Moments> {
    if scores.is_empty() {
        return Err(AnalysisError::TooFewSamples {
            required: 1,
            actual: 0,
        });
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;

    let (m2, m3, m4) = scores.iter().fold((0.0, 0.0, 0.0), |(m2, m3, m4), &x| {
        let d = x - mean;
        let d2 = d * d;
        (m2 + d2, m3 + d2 * d, m4 + d2 * d2)
    });
    let (m2, m3, m4) = (m2 / n, m3 / n, m4 / n);

    let (skewness, kurtosis) = if m2 > 0.0 {
        (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
    } else {
        (f64::NAN, f64::NAN)
    };

    Ok(Moments {
        mean,
        variance: m2,
        skewness,
        kurtosis,
    })
}
