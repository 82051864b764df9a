//! The correlation input file: one ground-truth column and one score
//! column per embedding system, rows aligned by pair index.

use std::path::Path;

use crate::error::{AnalysisError, AnalysisResult, TableError};

/// Leading pair-index column, written but ignored on read.
const PAIR_COLUMN: &str = "pair";

/// Column-major score table keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationTable {
    ground_truth_name: String,
    ground_truth: Vec<f64>,
    systems: Vec<(String, Vec<f64>)>,
}

impl CorrelationTable {
    pub fn new(ground_truth_name: impl Into<String>, ground_truth: Vec<f64>) -> Self {
        Self {
            ground_truth_name: ground_truth_name.into(),
            ground_truth,
            systems: Vec::new(),
        }
    }

    /// Add one embedding system's scores. Must match the ground-truth length.
    pub fn add_system(&mut self, name: impl Into<String>, scores: Vec<f64>) -> AnalysisResult<()> {
        if scores.len() != self.ground_truth.len() {
            return Err(AnalysisError::LengthMismatch {
                left: self.ground_truth.len(),
                right: scores.len(),
            });
        }
        self.systems.push((name.into(), scores));
        Ok(())
    }

    pub fn ground_truth_name(&self) -> &str {
        &self.ground_truth_name
    }

    pub fn ground_truth(&self) -> &[f64] {
        &self.ground_truth
    }

    pub fn len(&self) -> usize {
        self.ground_truth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ground_truth.is_empty()
    }

    /// Embedding systems in column order.
    pub fn systems(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.systems.iter().map(|(n, s)| (n.as_str(), s.as_slice()))
    }

    pub fn system(&self, name: &str) -> AnalysisResult<&[f64]> {
        self.systems
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.as_slice())
            .ok_or_else(|| AnalysisError::MissingColumn {
                column: name.to_string(),
            })
    }

    pub fn write_csv(&self, path: &Path) -> AnalysisResult<()> {
        let label = path.display().to_string();
        let csv_err = |e: csv::Error| TableError::Csv {
            path: label.clone(),
            message: e.to_string(),
        };
        let mut out = csv::Writer::from_path(path).map_err(csv_err)?;

        let mut header = vec![PAIR_COLUMN.to_string(), self.ground_truth_name.clone()];
        header.extend(self.systems.iter().map(|(n, _)| n.clone()));
        out.write_record(&header).map_err(csv_err)?;

        for row in 0..self.len() {
            let mut record = vec![row.to_string(), self.ground_truth[row].to_string()];
            record.extend(self.systems.iter().map(|(_, s)| s[row].to_string()));
            out.write_record(&record).map_err(csv_err)?;
        }
        out.flush().map_err(|e| TableError::Io {
            path: label.clone(),
            source: e,
        })?;
        tracing::debug!(path = %label, rows = self.len(), systems = self.systems.len(), "wrote similarity scores");
        Ok(())
    }

    /// Read a score table, taking `ground_truth_column` as the reference and
    /// every other column (except `pair`) as an embedding system.
    pub fn read_csv(path: &Path, ground_truth_column: &str) -> AnalysisResult<Self> {
        let label = path.display().to_string();
        let csv_err = |e: csv::Error| TableError::Csv {
            path: label.clone(),
            message: e.to_string(),
        };
        let mut input = csv::Reader::from_path(path).map_err(csv_err)?;
        let header = input.headers().map_err(csv_err)?.clone();

        let gt_idx = header
            .iter()
            .position(|h| h == ground_truth_column)
            .ok_or_else(|| AnalysisError::MissingColumn {
                column: ground_truth_column.to_string(),
            })?;
        let system_cols: Vec<usize> = (0..header.len())
            .filter(|&i| i != gt_idx && &header[i] != PAIR_COLUMN)
            .collect();

        let mut ground_truth = Vec::new();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); system_cols.len()];
        for record in input.records() {
            let record = record.map_err(csv_err)?;
            let parse = |col: usize| -> AnalysisResult<f64> {
                let raw = record.get(col).unwrap_or_default();
                raw.trim().parse::<f64>().map_err(|_| {
                    TableError::InvalidValue {
                        path: label.clone(),
                        column: header[col].to_string(),
                        value: raw.to_string(),
                    }
                    .into()
                })
            };
            ground_truth.push(parse(gt_idx)?);
            for (slot, &col) in columns.iter_mut().zip(&system_cols) {
                slot.push(parse(col)?);
            }
        }

        let systems = system_cols
            .iter()
            .map(|&i| header[i].to_string())
            .zip(columns)
            .collect();
        Ok(Self {
            ground_truth_name: ground_truth_column.to_string(),
            ground_truth,
            systems,
        })
    }
}
