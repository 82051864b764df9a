//! All-pairs score sequences in condensed order.
//!
//! For `n` programs the `n (n - 1) / 2` unordered pairs `(i, j)`, `i < j`,
//! are laid out row-major: `(0,1), (0,2), ..., (0,n-1), (1,2), ...`. Every
//! score sequence produced here uses that order, so a structural sequence
//! and an embedding sequence built over the same id list are index-aligned.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anndists::dist::{DistL2, Distance};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::corpus::{Corpus, Feature};
use crate::error::{NeighborError, NeighborResult};
use crate::neighbors::{Neighbor, NeighborMap};
use crate::table::EmbeddingTable;

/// Distance between two WL feature-count vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralMetric {
    #[default]
    Euclidean,
    Manhattan,
}

impl fmt::Display for StructuralMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StructuralMetric::Euclidean => "euclidean",
            StructuralMetric::Manhattan => "manhattan",
        })
    }
}

impl FromStr for StructuralMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "euclidean" => Ok(StructuralMetric::Euclidean),
            "manhattan" => Ok(StructuralMetric::Manhattan),
            other => Err(format!("unknown structural metric \"{other}\"")),
        }
    }
}

/// Number of unordered pairs over `n` items.
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Position of pair `(i, j)`, `i < j < n`, in condensed order.
pub fn condensed_index(i: usize, j: usize, n: usize) -> usize {
    debug_assert!(i < j && j < n);
    i * n - i * (i + 1) / 2 + (j - i - 1)
}

/// Every pair `(i, j)` with `i < j < n`, in condensed order.
pub fn condensed_pairs(n: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(pair_count(n));
    for i in 0..n {
        for j in i + 1..n {
            pairs.push((i, j));
        }
    }
    pairs
}

/// Distance between two feature multisets, compared by per-feature counts.
pub fn feature_distance(a: &[Feature], b: &[Feature], metric: StructuralMetric) -> f64 {
    let mut counts: HashMap<Feature, (i64, i64)> = HashMap::new();
    for f in a {
        counts.entry(*f).or_default().0 += 1;
    }
    for f in b {
        counts.entry(*f).or_default().1 += 1;
    }

    match metric {
        StructuralMetric::Euclidean => (counts
            .values()
            .map(|(x, y)| (x - y).pow(2))
            .sum::<i64>() as f64)
            .sqrt(),
        StructuralMetric::Manhattan => counts.values().map(|(x, y)| (x - y).abs()).sum::<i64>() as f64,
    }
}

/// Structural distance for every program pair of `corpus`, in corpus order.
pub fn structural_distances(corpus: &Corpus, metric: StructuralMetric) -> Vec<f64> {
    let docs: Vec<&[Feature]> = corpus.documents().map(|(_, f)| f).collect();
    let scores: Vec<f64> = condensed_pairs(docs.len())
        .into_par_iter()
        .map(|(i, j)| feature_distance(docs[i], docs[j], metric))
        .collect();
    tracing::debug!(programs = docs.len(), pairs = scores.len(), %metric, "computed structural distances");
    scores
}

/// Euclidean embedding distance for every pair of `ids`, in `ids` order.
pub fn embedding_distances<S: AsRef<str>>(ids: &[S], table: &EmbeddingTable) -> NeighborResult<Vec<f64>> {
    let vectors = ids
        .iter()
        .map(|id| {
            let id = id.as_ref();
            table
                .get(id)
                .ok_or_else(|| NeighborError::UnknownIdentifier { id: id.to_string() })
        })
        .collect::<NeighborResult<Vec<&[f32]>>>()?;

    let metric = DistL2 {};
    Ok(condensed_pairs(vectors.len())
        .into_par_iter()
        .map(|(i, j)| metric.eval(vectors[i], vectors[j]) as f64)
        .collect())
}

/// `k` nearest other programs of every id, read off a condensed distance sequence.
///
/// Equal distances are broken by ascending identifier.
pub fn condensed_neighbors<S: AsRef<str> + Sync>(
    ids: &[S],
    distances: &[f64],
    k: usize,
) -> NeighborResult<NeighborMap> {
    let n = ids.len();
    if distances.len() != pair_count(n) {
        return Err(NeighborError::PairCount {
            programs: n,
            expected: pair_count(n),
            actual: distances.len(),
        });
    }
    if k == 0 || k >= n {
        return Err(NeighborError::InvalidK { k, size: n });
    }

    Ok((0..n)
        .into_par_iter()
        .map(|i| {
            let mut row: Vec<(usize, f64)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (j, distances[condensed_index(i.min(j), i.max(j), n)]))
                .collect();
            row.sort_by(|a, b| {
                a.1.total_cmp(&b.1)
                    .then_with(|| ids[a.0].as_ref().cmp(ids[b.0].as_ref()))
            });
            row.truncate(k);

            let list = row
                .into_iter()
                .map(|(j, d)| Neighbor {
                    id: ids[j].as_ref().to_string(),
                    distance: d as f32,
                })
                .collect();
            (ids[i].as_ref().to_string(), list)
        })
        .collect())
}
