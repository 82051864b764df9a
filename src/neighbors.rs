//! Exact Euclidean k-nearest-neighbor retrieval over an embedding table.
//!
//! The index is rebuilt for every query batch and never updated in place.
//! Rows are scanned in the table's iteration order (ascending program
//! identifier) and the ranking sort is stable, so equal distances are
//! broken by ascending identifier.

use std::collections::BTreeMap;
use std::path::Path;

use anndists::dist::{DistL2, Distance};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{NeighborError, NeighborResult, TableError};
use crate::table::EmbeddingTable;

/// One ranked neighbor of a query program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: String,
    pub distance: f32,
}

/// Neighbor lists keyed by query identifier.
pub type NeighborMap = BTreeMap<String, Vec<Neighbor>>;

/// Flat in-memory index over one embedding table.
pub struct NeighborIndex<'a> {
    table: &'a EmbeddingTable,
    ids: Vec<&'a str>,
    vectors: Vec<&'a [f32]>,
}

impl<'a> NeighborIndex<'a> {
    pub fn build(table: &'a EmbeddingTable) -> Self {
        let (ids, vectors): (Vec<&str>, Vec<&[f32]>) = table.iter().unzip();
        tracing::debug!(rows = ids.len(), dim = table.dim(), "built neighbor index");
        Self {
            table,
            ids,
            vectors,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn check_k(&self, k: usize) -> NeighborResult<()> {
        if k == 0 || k >= self.len() {
            return Err(NeighborError::InvalidK { k, size: self.len() });
        }
        Ok(())
    }

    /// The `k` nearest other rows to `id`, nearest first.
    pub fn nearest(&self, id: &str, k: usize) -> NeighborResult<Vec<Neighbor>> {
        self.check_k(k)?;
        let query = self
            .table
            .get(id)
            .ok_or_else(|| NeighborError::UnknownIdentifier { id: id.to_string() })?;
        Ok(self.rank(id, query, k))
    }

    /// Neighbors for every id in `query_ids`. Validates all ids and `k` first.
    pub fn query<S: AsRef<str>>(&self, query_ids: &[S], k: usize) -> NeighborResult<NeighborMap> {
        self.check_k(k)?;
        if let Some(missing) = query_ids
            .iter()
            .map(AsRef::as_ref)
            .find(|id| !self.table.contains(id))
        {
            return Err(NeighborError::UnknownIdentifier {
                id: missing.to_string(),
            });
        }

        query_ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                Ok((id.to_string(), self.nearest(id, k)?))
            })
            .collect()
    }

    /// Neighbors for every row of the table, computed in parallel.
    pub fn query_all(&self, k: usize) -> NeighborResult<NeighborMap> {
        self.check_k(k)?;
        Ok(self
            .ids
            .par_iter()
            .zip(self.vectors.par_iter())
            .map(|(id, vec)| (id.to_string(), self.rank(id, vec, k)))
            .collect())
    }

    fn rank(&self, self_id: &str, query: &[f32], k: usize) -> Vec<Neighbor> {
        let metric = DistL2 {};
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(i, _)| self.ids[*i] != self_id)
            .map(|(i, v)| (i, metric.eval(query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, distance)| Neighbor {
                id: self.ids[i].to_string(),
                distance,
            })
            .collect()
    }
}

/// `k` nearest neighbors for each requested id. Builds a fresh index.
pub fn query<S: AsRef<str>>(
    table: &EmbeddingTable,
    query_ids: &[S],
    k: usize,
) -> NeighborResult<NeighborMap> {
    NeighborIndex::build(table).query(query_ids, k)
}

/// Write `type,nn_0,...,nn_{k-1}` rows of neighbor identifiers, in table order.
pub fn write_neighbor_table(path: &Path, neighbors: &NeighborMap) -> NeighborResult<()> {
    let label = path.display().to_string();
    let csv_err = |e: csv::Error| TableError::Csv {
        path: label.clone(),
        message: e.to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TableError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let width = neighbors.values().map(Vec::len).max().unwrap_or(0);
    let mut out = csv::Writer::from_path(path).map_err(csv_err)?;

    let mut header = vec!["type".to_string()];
    header.extend((0..width).map(|i| format!("nn_{i}")));
    out.write_record(&header).map_err(csv_err)?;

    for (id, list) in neighbors {
        let mut record = vec![id.clone()];
        record.extend(list.iter().map(|n| n.id.clone()));
        record.resize(width + 1, String::new());
        out.write_record(&record).map_err(csv_err)?;
    }
    out.flush().map_err(|e| TableError::Io {
        path: label.clone(),
        source: e,
    })?;
    Ok(())
}

/// `(id, graph text)` pairs for a query and its neighbors, for an external renderer.
///
/// Rows without graph text are skipped.
pub fn graph_pairs<'t>(
    table: &'t EmbeddingTable,
    query_id: &'t str,
    neighbors: &'t [Neighbor],
) -> Vec<(&'t str, &'t str)> {
    std::iter::once(query_id)
        .chain(neighbors.iter().map(|n| n.id.as_str()))
        .filter_map(|id| table.graphviz(id).map(|g| (id, g)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_table() -> EmbeddingTable {
        let mut t = EmbeddingTable::new();
        t.insert("p1", vec![0.0, 1.0]).unwrap();
        t.insert("p2", vec![0.0, 1.1]).unwrap();
        t.insert("p3", vec![5.0, 5.0]).unwrap();
        t
    }

    #[test]
    fn nearest_other_record() {
        let table = scenario_table();
        let result = query(&table, &["p1"], 1).unwrap();
        let list = &result["p1"];
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "p2");
        assert!((list[0].distance - 0.1).abs() < 1e-5);
    }

    #[test]
    fn self_is_never_returned_and_distances_ascend() {
        let table = scenario_table();
        let index = NeighborIndex::build(&table);
        let all = index.query_all(2).unwrap();
        assert_eq!(all.len(), 3);
        for (id, list) in &all {
            assert_eq!(list.len(), 2);
            assert!(list.iter().all(|n| &n.id != id));
            assert!(list.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }

    #[test]
    fn duplicate_vectors_do_not_evict_neighbors() {
        let mut table = EmbeddingTable::new();
        table.insert("a", vec![1.0, 1.0]).unwrap();
        table.insert("b", vec![1.0, 1.0]).unwrap();
        table.insert("c", vec![2.0, 2.0]).unwrap();

        let list = NeighborIndex::build(&table).nearest("b", 2).unwrap();
        assert_eq!(list[0].id, "a");
        assert_eq!(list[0].distance, 0.0);
        assert_eq!(list[1].id, "c");
    }

    #[test]
    fn ties_break_by_identifier() {
        let mut table = EmbeddingTable::new();
        table.insert("q", vec![0.0]).unwrap();
        table.insert("z", vec![1.0]).unwrap();
        table.insert("m", vec![-1.0]).unwrap();

        let list = NeighborIndex::build(&table).nearest("q", 2).unwrap();
        let ids: Vec<&str> = list.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["m", "z"]);
    }

    #[test]
    fn invalid_k_is_rejected() {
        let table = scenario_table();
        assert!(matches!(
            query(&table, &["p1"], 0),
            Err(NeighborError::InvalidK { k: 0, size: 3 })
        ));
        assert!(matches!(
            query(&table, &["p1"], 3),
            Err(NeighborError::InvalidK { k: 3, .. })
        ));
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let table = scenario_table();
        let err = query(&table, &["p1", "nope"], 1).unwrap_err();
        assert!(matches!(err, NeighborError::UnknownIdentifier { ref id } if id == "nope"));
    }

    #[test]
    fn neighbor_table_file_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nn.csv");
        let table = scenario_table();
        let all = NeighborIndex::build(&table).query_all(1).unwrap();
        write_neighbor_table(&path, &all).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["type,nn_0", "p1,p2", "p2,p1", "p3,p2"]);
    }

    #[test]
    fn graph_pairs_follow_ranking() {
        let mut table = EmbeddingTable::new();
        table
            .insert_with_graph("a", vec![0.0], Some("digraph a {}".into()))
            .unwrap();
        table
            .insert_with_graph("b", vec![1.0], Some("digraph b {}".into()))
            .unwrap();
        table.insert("c", vec![3.0]).unwrap();

        let list = NeighborIndex::build(&table).nearest("a", 2).unwrap();
        let pairs = graph_pairs(&table, "a", &list);
        assert_eq!(pairs, vec![("a", "digraph a {}"), ("b", "digraph b {}")]);
    }
}
