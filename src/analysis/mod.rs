//! Similarity correlation analysis.
//!
//! Compares the pairwise structural similarity of programs with pairwise
//! distances in each embedding space:
//!
//! - [`moments`]: population mean, variance, skewness, excess kurtosis
//! - [`histogram`]: bucketed [`SimilarityDistribution`]s with derived borders
//! - [`correlation`]: Pearson, Spearman and linear regression with a
//!   configurable [`Alternative`]
//! - [`divergence`]: pointwise disagreement summaries
//! - [`file`]: the on-disk correlation input table
//!
//! Everything here is a pure function over in-memory score sequences.

pub mod correlation;
pub mod divergence;
pub mod file;
pub mod histogram;
pub mod moments;
pub mod special;

pub use correlation::{Alternative, CorrelationResult, analyze};
pub use divergence::{ScoreDivergence, divergence};
pub use file::CorrelationTable;
pub use histogram::{Bucket, Bucketing, SimilarityDistribution, bucket_borders, histogram, minmax_scale};
pub use moments::{Moments, moments};
