//! Correlation and regression between ground-truth and embedding scores.
//!
//! All three statistics are computed over the same index-aligned pair of
//! sequences. Significance uses Student's t with `n - 2` degrees of freedom
//! for Pearson, Spearman and the regression slope alike.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::moments::moments;
use super::special::student_t_sf;
use crate::error::{AnalysisError, AnalysisResult};

/// Smallest sample that leaves a degree of freedom for the t test.
pub const MIN_SAMPLES: usize = 3;

/// Alternative hypothesis for the significance tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alternative {
    /// Embedding similarity rises with structural similarity.
    #[default]
    Greater,
    Less,
    TwoSided,
}

impl Alternative {
    /// p-value for statistic `t` under this alternative.
    pub fn p_value(self, t: f64, df: f64) -> f64 {
        match self {
            Alternative::Greater => student_t_sf(t, df),
            Alternative::Less => student_t_sf(-t, df),
            Alternative::TwoSided => (2.0 * student_t_sf(t.abs(), df)).min(1.0),
        }
    }
}

impl fmt::Display for Alternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Alternative::Greater => "greater",
            Alternative::Less => "less",
            Alternative::TwoSided => "two_sided",
        })
    }
}

impl FromStr for Alternative {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greater" => Ok(Alternative::Greater),
            "less" => Ok(Alternative::Less),
            "two_sided" | "two-sided" => Ok(Alternative::TwoSided),
            other => Err(format!(
                "unknown alternative \"{other}\" (expected greater, less or two-sided)"
            )),
        }
    }
}

/// One embedding system versus ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub pearson_r: f64,
    pub pearson_p: f64,
    pub spearman_r: f64,
    pub spearman_p: f64,
    pub slope: f64,
    pub intercept: f64,
    pub regression_r: f64,
    pub regression_r2: f64,
    pub regression_p: f64,
    /// Standard error of the slope.
    pub stderr: f64,
    pub n: usize,
    pub alternative: Alternative,
}

/// Correlate `ground_truth` against `embedding`.
///
/// The two sequences must have equal length, at least [`MIN_SAMPLES`]
/// entries, and non-zero variance on both sides.
pub fn analyze(
    ground_truth: &[f64],
    embedding: &[f64],
    alternative: Alternative,
) -> AnalysisResult<CorrelationResult> {
    if ground_truth.len() != embedding.len() {
        return Err(AnalysisError::LengthMismatch {
            left: ground_truth.len(),
            right: embedding.len(),
        });
    }
    let n = ground_truth.len();
    if n < MIN_SAMPLES {
        return Err(AnalysisError::TooFewSamples {
            required: MIN_SAMPLES,
            actual: n,
        });
    }
    if moments(ground_truth)?.is_degenerate() {
        return Err(AnalysisError::DegenerateDistribution {
            name: "ground truth".into(),
        });
    }
    if moments(embedding)?.is_degenerate() {
        return Err(AnalysisError::DegenerateDistribution {
            name: "embedding".into(),
        });
    }

    let df = (n - 2) as f64;
    let lin = Linear::fit(ground_truth, embedding);
    let pearson_r = lin.r();
    let t = t_statistic(pearson_r, df);
    let pearson_p = alternative.p_value(t, df);

    let spearman_r = Linear::fit(&ranks(ground_truth), &ranks(embedding)).r();
    let spearman_p = alternative.p_value(t_statistic(spearman_r, df), df);

    // Ground truth regressed on the embedding score.
    let slope = lin.sxy / lin.syy;
    let stderr = ((1.0 - pearson_r * pearson_r).max(0.0) * lin.sxx / lin.syy / df).sqrt();

    let result = CorrelationResult {
        pearson_r,
        pearson_p,
        spearman_r,
        spearman_p,
        slope,
        intercept: lin.mean_x - slope * lin.mean_y,
        regression_r: pearson_r,
        regression_r2: pearson_r * pearson_r,
        regression_p: pearson_p,
        stderr,
        n,
        alternative,
    };
    tracing::debug!(
        n,
        pearson = result.pearson_r,
        spearman = result.spearman_r,
        %alternative,
        "correlated score sequences"
    );
    Ok(result)
}

/// Centered sums of squares and cross-products.
struct Linear {
    mean_x: f64,
    mean_y: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

impl Linear {
    fn fit(x: &[f64], y: &[f64]) -> Self {
        let n = x.len() as f64;
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;
        let (sxx, syy, sxy) = x.iter().zip(y).fold((0.0, 0.0, 0.0), |(sxx, syy, sxy), (a, b)| {
            let (dx, dy) = (a - mean_x, b - mean_y);
            (sxx + dx * dx, syy + dy * dy, sxy + dx * dy)
        });
        Self {
            mean_x,
            mean_y,
            sxx,
            syy,
            sxy,
        }
    }

    fn r(&self) -> f64 {
        (self.sxy / (self.sxx * self.syy).sqrt()).clamp(-1.0, 1.0)
    }
}

fn t_statistic(r: f64, df: f64) -> f64 {
    r * (df / ((1.0 - r) * (1.0 + r))).sqrt()
}

/// 1-based ranks; tied values share the average of their positions.
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut out = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let avg = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            out[idx] = avg;
        }
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_point_positive_correlation() {
        let gt = [0.1, 0.5, 0.9];
        let emb = [0.2, 0.4, 0.95];
        let res = analyze(&gt, &emb, Alternative::Greater).unwrap();
        assert!(res.pearson_r > 0.9);
        assert!((res.pearson_r - 0.965_567).abs() < 1e-5);
        // one degree of freedom leaves the test weak
        assert!((res.pearson_p - 0.083_77).abs() < 1e-4);
        assert!((res.spearman_r - 1.0).abs() < 1e-12);
        assert_eq!(res.n, 3);
    }

    #[test]
    fn strong_correlation_is_significant() {
        let gt: Vec<f64> = (0..20).map(|i| i as f64 / 20.0).collect();
        let emb: Vec<f64> = gt
            .iter()
            .enumerate()
            .map(|(i, x)| 2.0 * x + 0.1 + if i % 2 == 0 { 0.03 } else { -0.03 })
            .collect();
        let res = analyze(&gt, &emb, Alternative::Greater).unwrap();
        assert!(res.pearson_r > 0.99);
        assert!(res.pearson_p < 0.05);
        assert!(res.spearman_p < 0.05);
        assert!((res.slope - 0.5).abs() < 0.02);
        assert!((res.intercept + 0.05).abs() < 0.02);
        assert!((res.regression_r2 - res.pearson_r * res.pearson_r).abs() < 1e-12);
    }

    #[test]
    fn regression_predicts_ground_truth_from_embedding() {
        let gt = [1.0, 2.0, 3.0, 4.0];
        let emb = [2.0, 4.0, 5.0, 9.0];
        let res = analyze(&gt, &emb, Alternative::Greater).unwrap();
        assert!((res.slope - 11.0 / 26.0).abs() < 1e-12);
        assert!((res.intercept - (2.5 - 5.0 * 11.0 / 26.0)).abs() < 1e-12);
        assert!((res.stderr - (45.0f64 / 6760.0).sqrt()).abs() < 1e-12);
        assert!((res.regression_r2 - 121.0 / 130.0).abs() < 1e-12);
    }

    #[test]
    fn alternative_controls_tail() {
        let gt = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let emb = [6.0, 5.5, 4.0, 4.2, 2.0, 1.0];
        let greater = analyze(&gt, &emb, Alternative::Greater).unwrap();
        let less = analyze(&gt, &emb, Alternative::Less).unwrap();
        let two = analyze(&gt, &emb, Alternative::TwoSided).unwrap();
        assert!(greater.pearson_r < 0.0);
        assert!(greater.pearson_p > 0.9);
        assert!(less.pearson_p < 0.05);
        assert!((two.pearson_p - 2.0 * less.pearson_p).abs() < 1e-12);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let gt = [0.3, 0.1, 0.8, 0.5, 0.9, 0.2];
        let emb = [0.25, 0.2, 0.7, 0.6, 0.8, 0.1];
        let a = analyze(&gt, &emb, Alternative::Greater).unwrap();
        let b = analyze(&gt, &emb, Alternative::Greater).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn precondition_failures() {
        assert!(matches!(
            analyze(&[1.0, 2.0, 3.0], &[1.0, 2.0], Alternative::Greater),
            Err(AnalysisError::LengthMismatch { left: 3, right: 2 })
        ));
        assert!(matches!(
            analyze(&[1.0, 2.0], &[1.0, 2.0], Alternative::Greater),
            Err(AnalysisError::TooFewSamples { .. })
        ));
        assert!(matches!(
            analyze(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0], Alternative::Greater),
            Err(AnalysisError::DegenerateDistribution { .. })
        ));
    }

    #[test]
    fn perfect_correlation_has_zero_p() {
        let res = analyze(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0], Alternative::Greater).unwrap();
        assert!((res.pearson_r - 1.0).abs() < 1e-12);
        assert!(res.pearson_p < 1e-6);
        assert!(res.stderr.abs() < 1e-6);
    }

    #[test]
    fn ties_share_average_rank() {
        assert_eq!(ranks(&[3.0, 1.0, 3.0, 2.0]), vec![3.5, 1.0, 3.5, 2.0]);
    }

    #[test]
    fn alternative_parses() {
        assert_eq!("two-sided".parse::<Alternative>().unwrap(), Alternative::TwoSided);
        assert_eq!(Alternative::default(), Alternative::Greater);
        assert!("both".parse::<Alternative>().is_err());
    }
}
