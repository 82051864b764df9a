//! Embedding tables: program identifier → fixed-dimension vector.
//!
//! Rows are kept in a `BTreeMap`, so iteration is always ascending by
//! program identifier. That order is what gets persisted and what the
//! neighbor index scans, which keeps diffs and tie-breaking reproducible.
//!
//! File format: header `type[,graphviz],x_0,...,x_{d-1}`, one row per program,
//! no index column. Dimensionality is implied by the header width.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{TableError, TableResult};

const ID_COLUMN: &str = "type";
const GRAPH_COLUMN: &str = "graphviz";

#[derive(Debug, Clone, PartialEq)]
struct Row {
    vector: Vec<f32>,
    graphviz: Option<String>,
}

/// Sorted mapping from program identifier to embedding vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingTable {
    rows: BTreeMap<String, Row>,
    dim: Option<usize>,
}

impl EmbeddingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a vector. Fails on a dimension mismatch or a repeated identifier.
    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>) -> TableResult<()> {
        self.insert_with_graph(id, vector, None)
    }

    /// Insert a vector together with the program's graph rendering.
    pub fn insert_with_graph(
        &mut self,
        id: impl Into<String>,
        vector: Vec<f32>,
        graphviz: Option<String>,
    ) -> TableResult<()> {
        let id = id.into();
        match self.dim {
            Some(expected) if expected != vector.len() => {
                return Err(TableError::DimensionMismatch {
                    id,
                    expected,
                    actual: vector.len(),
                });
            }
            None => self.dim = Some(vector.len()),
            _ => {}
        }
        if self.rows.contains_key(&id) {
            return Err(TableError::DuplicateIdentifier { id });
        }
        self.rows.insert(id, Row { vector, graphviz });
        Ok(())
    }

    /// Vector dimensionality, `0` for an empty table.
    pub fn dim(&self) -> usize {
        self.dim.unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.rows.get(id).map(|r| r.vector.as_slice())
    }

    pub fn graphviz(&self, id: &str) -> Option<&str> {
        self.rows.get(id).and_then(|r| r.graphviz.as_deref())
    }

    /// Rows in ascending identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.rows
            .iter()
            .map(|(id, row)| (id.as_str(), row.vector.as_slice()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    fn has_graphs(&self) -> bool {
        self.rows.values().any(|r| r.graphviz.is_some())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the table to `path`, creating parent directories.
    pub fn write_csv(&self, path: &Path) -> TableResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TableError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let file = std::fs::File::create(path).map_err(|e| TableError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        self.write_to(file, &path.display().to_string())?;
        tracing::debug!(path = %path.display(), rows = self.len(), dim = self.dim(), "wrote embedding table");
        Ok(())
    }

    /// Serialize to any writer. `label` names the destination in errors.
    pub fn write_to<W: Write>(&self, writer: W, label: &str) -> TableResult<()> {
        let csv_err = |e: csv::Error| TableError::Csv {
            path: label.to_string(),
            message: e.to_string(),
        };
        let with_graph = self.has_graphs();
        let mut out = csv::Writer::from_writer(writer);

        let mut header = vec![ID_COLUMN.to_string()];
        if with_graph {
            header.push(GRAPH_COLUMN.to_string());
        }
        header.extend((0..self.dim()).map(|i| format!("x_{i}")));
        out.write_record(&header).map_err(csv_err)?;

        for (id, row) in &self.rows {
            let mut record = Vec::with_capacity(header.len());
            record.push(id.clone());
            if with_graph {
                record.push(row.graphviz.clone().unwrap_or_default());
            }
            record.extend(row.vector.iter().map(|v| v.to_string()));
            out.write_record(&record).map_err(csv_err)?;
        }

        out.flush().map_err(|e| TableError::Io {
            path: label.to_string(),
            source: e,
        })
    }

    /// Load a table written by [`write_csv`](Self::write_csv).
    pub fn read_csv(path: &Path) -> TableResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| TableError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::read_from(file, &path.display().to_string())
    }

    /// Parse from any reader. `label` names the source in errors.
    pub fn read_from<R: Read>(reader: R, label: &str) -> TableResult<Self> {
        let csv_err = |e: csv::Error| TableError::Csv {
            path: label.to_string(),
            message: e.to_string(),
        };
        let mut input = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let header = input.headers().map_err(csv_err)?.clone();
        if header.get(0) != Some(ID_COLUMN) {
            return Err(TableError::Header {
                path: label.to_string(),
                message: format!("first column must be `{ID_COLUMN}`"),
            });
        }
        let with_graph = header.get(1) == Some(GRAPH_COLUMN);
        let first_dim = if with_graph { 2 } else { 1 };
        for (offset, name) in header.iter().skip(first_dim).enumerate() {
            if name != format!("x_{offset}") {
                return Err(TableError::Header {
                    path: label.to_string(),
                    message: format!("expected column x_{offset}, found `{name}`"),
                });
            }
        }

        let mut table = Self::new();
        table.dim = Some(header.len() - first_dim);

        for record in input.records() {
            let record = record.map_err(csv_err)?;
            let id = record.get(0).unwrap_or_default().to_string();
            let graphviz = if with_graph {
                record
                    .get(1)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
            } else {
                None
            };
            let vector = record
                .iter()
                .enumerate()
                .skip(first_dim)
                .map(|(col, raw)| {
                    raw.trim().parse::<f32>().map_err(|_| TableError::InvalidValue {
                        path: label.to_string(),
                        column: header.get(col).unwrap_or_default().to_string(),
                        value: raw.to_string(),
                    })
                })
                .collect::<TableResult<Vec<f32>>>()?;
            table.insert_with_graph(id, vector, graphviz)?;
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_is_sorted_by_identifier() {
        let mut table = EmbeddingTable::new();
        table.insert("zeta", vec![1.0]).unwrap();
        table.insert("alpha", vec![2.0]).unwrap();
        table.insert("mid", vec![3.0]).unwrap();
        let ids: Vec<&str> = table.ids().collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn rejects_dimension_mismatch_and_duplicates() {
        let mut table = EmbeddingTable::new();
        table.insert("a", vec![0.0, 1.0]).unwrap();
        assert!(matches!(
            table.insert("b", vec![0.0]),
            Err(TableError::DimensionMismatch { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            table.insert("a", vec![1.0, 1.0]),
            Err(TableError::DuplicateIdentifier { .. })
        ));
    }

    #[test]
    fn header_and_row_layout() {
        let mut table = EmbeddingTable::new();
        table.insert("p2", vec![0.0, 1.1]).unwrap();
        table.insert("p1", vec![0.0, 1.0]).unwrap();

        let mut buf = Vec::new();
        table.write_to(&mut buf, "mem").unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "type,x_0,x_1");
        assert_eq!(lines[1], "p1,0,1");
        assert_eq!(lines[2], "p2,0,1.1");
    }

    #[test]
    fn graph_column_survives_quoting() {
        let mut table = EmbeddingTable::new();
        table
            .insert_with_graph(
                "a { color: red; }",
                vec![0.5],
                Some("digraph {\n  0 -> 1 [label=\"x,y\"];\n}".into()),
            )
            .unwrap();
        table.insert("b", vec![0.25]).unwrap();

        let mut buf = Vec::new();
        table.write_to(&mut buf, "mem").unwrap();
        assert!(String::from_utf8_lossy(&buf).starts_with("type,graphviz,x_0"));

        let back = EmbeddingTable::read_from(buf.as_slice(), "mem").unwrap();
        assert_eq!(back, table);
        assert!(back.graphviz("b").is_none());
    }

    #[test]
    fn read_rejects_bad_header() {
        let err = EmbeddingTable::read_from("id,x_0\na,1\n".as_bytes(), "mem").unwrap_err();
        assert!(matches!(err, TableError::Header { .. }));

        let err = EmbeddingTable::read_from("type,x_1\na,1\n".as_bytes(), "mem").unwrap_err();
        assert!(matches!(err, TableError::Header { .. }));
    }

    #[test]
    fn read_reports_unparseable_values() {
        let err = EmbeddingTable::read_from("type,x_0\na,nope\n".as_bytes(), "mem").unwrap_err();
        assert!(matches!(err, TableError::InvalidValue { .. }));
    }
}
