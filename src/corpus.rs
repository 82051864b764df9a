//! In-memory representation of a generated program corpus.
//!
//! A [`Corpus`] is always deduplicated: constructing one drops every record
//! whose identifier was already seen, keeping the first occurrence.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TableError, TableResult};
use crate::table::EmbeddingTable;

/// A single structural feature token (a Weisfeiler-Lehman label hash).
pub type Feature = u64;

/// One synthesized program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramRecord {
    /// Program source text, used as the identifier within a corpus.
    pub id: String,
    /// Optional DOT rendering of the program graph.
    #[serde(default)]
    pub graphviz: Option<String>,
    /// Structural feature tokens, order preserved, duplicates allowed.
    #[serde(default)]
    pub features: Vec<Feature>,
    /// Vectors the service computed, keyed by embedding-system name.
    #[serde(default)]
    pub embeddings: BTreeMap<String, Vec<f32>>,
    /// Whether the derivation stopped before reaching a complete program.
    #[serde(default)]
    pub is_partial: bool,
}

impl ProgramRecord {
    pub fn new(id: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            id: id.into(),
            graphviz: None,
            features,
            embeddings: BTreeMap::new(),
            is_partial: false,
        }
    }

    pub fn with_graphviz(mut self, graph: impl Into<String>) -> Self {
        self.graphviz = Some(graph.into());
        self
    }
}

/// Deduplicated, ordered collection of program records plus grammar metadata.
///
/// Deserializing goes through [`Corpus::from_records`], so a corpus loaded
/// from disk is deduplicated too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCorpus")]
pub struct Corpus {
    records: Vec<ProgramRecord>,
    grammar: Option<String>,
}

#[derive(Deserialize)]
struct RawCorpus {
    #[serde(default)]
    records: Vec<ProgramRecord>,
    #[serde(default)]
    grammar: Option<String>,
}

impl From<RawCorpus> for Corpus {
    fn from(raw: RawCorpus) -> Self {
        Corpus::from_records(raw.records, raw.grammar)
    }
}

impl Corpus {
    /// Build a corpus, removing records whose identifier repeats an earlier one.
    pub fn from_records(records: Vec<ProgramRecord>, grammar: Option<String>) -> Self {
        let raw = records.len();
        let mut seen = HashSet::with_capacity(raw);
        let records: Vec<ProgramRecord> = records
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();

        let dropped = raw - records.len();
        if dropped > 0 {
            tracing::debug!(raw, dropped, kept = records.len(), "deduplicated corpus");
        }

        Self { records, grammar }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ProgramRecord] {
        &self.records
    }

    pub fn grammar(&self) -> Option<&str> {
        self.grammar.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&ProgramRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Labeled documents in corpus order: `(program id, feature tokens)`.
    pub fn documents(&self) -> impl Iterator<Item = (&str, &[Feature])> {
        self.records
            .iter()
            .map(|r| (r.id.as_str(), r.features.as_slice()))
    }

    /// Number of records marked as partial derivations.
    pub fn partial_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_partial).count()
    }

    /// A copy of this corpus without partial derivations.
    pub fn complete_only(&self) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|r| !r.is_partial)
                .cloned()
                .collect(),
            grammar: self.grammar.clone(),
        }
    }

    /// Names of every embedding system present on at least one record.
    pub fn embedding_systems(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .flat_map(|r| r.embeddings.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Write the corpus as JSON.
    pub fn write_json(&self, path: &Path) -> TableResult<()> {
        let text = serde_json::to_string(self).map_err(|e| TableError::Json {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, text).map_err(|e| TableError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Load a corpus written by [`write_json`](Self::write_json).
    pub fn read_json(path: &Path) -> TableResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TableError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&text).map_err(|e| TableError::Json {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Lift service-computed vectors for `system` into a table.
    ///
    /// Records without a vector for `system` are skipped.
    pub fn embedding_table(&self, system: &str) -> TableResult<EmbeddingTable> {
        let mut table = EmbeddingTable::new();
        for record in &self.records {
            if let Some(vec) = record.embeddings.get(system) {
                table.insert_with_graph(record.id.clone(), vec.clone(), record.graphviz.clone())?;
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence() {
        let records = vec![
            ProgramRecord::new("a", vec![1, 2]),
            ProgramRecord::new("b", vec![3]),
            ProgramRecord::new("a", vec![9, 9, 9]),
            ProgramRecord::new("c", vec![]),
            ProgramRecord::new("b", vec![4]),
        ];
        let corpus = Corpus::from_records(records, None);

        // 5 raw records, 2 duplicates.
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.get("a").unwrap().features, vec![1, 2]);
        let ids: Vec<&str> = corpus.documents().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn complete_only_drops_partials() {
        let mut partial = ProgramRecord::new("p", vec![1]);
        partial.is_partial = true;
        let corpus = Corpus::from_records(
            vec![ProgramRecord::new("full", vec![1]), partial],
            Some("<grammar>".into()),
        );
        assert_eq!(corpus.partial_count(), 1);

        let complete = corpus.complete_only();
        assert_eq!(complete.len(), 1);
        assert_eq!(complete.grammar(), Some("<grammar>"));
    }

    #[test]
    fn loading_from_json_deduplicates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(
            &path,
            r#"{"records": [{"id": "x", "features": [1]}, {"id": "x", "features": [2]}, {"id": "y"}]}"#,
        )
        .unwrap();

        let corpus = Corpus::read_json(&path).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.get("x").unwrap().features, vec![1]);

        corpus.write_json(&path).unwrap();
        assert_eq!(Corpus::read_json(&path).unwrap(), corpus);
    }

    #[test]
    fn embedding_table_skips_records_without_system() {
        let mut a = ProgramRecord::new("a", vec![]);
        a.embeddings.insert("doc2vec".into(), vec![0.0, 1.0]);
        let b = ProgramRecord::new("b", vec![]);
        let corpus = Corpus::from_records(vec![a, b], None);

        assert_eq!(corpus.embedding_systems(), vec!["doc2vec".to_string()]);
        let table = corpus.embedding_table("doc2vec").unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.contains("a"));
    }
}
