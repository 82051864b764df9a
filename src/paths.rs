//! Results directory layout.
//!
//! Every experiment gets its own numbered directory under the language it
//! was generated for: `{results}/{language}/{id}/`. Ids start at 1 and the
//! next id is one past the largest numeric directory already present.

use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};
use crate::request::Language;

/// Root of all experiment output.
#[derive(Debug, Clone)]
pub struct ResultPaths {
    root: PathBuf,
}

impl ResultPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{language}/`
    pub fn language_dir(&self, language: Language) -> PathBuf {
        self.root.join(language.as_str())
    }

    /// Existing experiment ids for `language`, ascending.
    pub fn list_experiments(&self, language: Language) -> Vec<u64> {
        let mut ids: Vec<u64> = match std::fs::read_dir(self.language_dir(language)) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
                .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse().ok()))
                .collect(),
            Err(_) => Vec::new(),
        };
        ids.sort_unstable();
        ids
    }

    /// One past the largest existing id, or 1 for a fresh language directory.
    pub fn next_experiment_id(&self, language: Language) -> u64 {
        self.list_experiments(language).last().map_or(1, |max| max + 1)
    }

    /// Paths for experiment `id`, without touching the filesystem.
    pub fn experiment(&self, language: Language, id: u64) -> ExperimentPaths {
        let root = self.language_dir(language).join(id.to_string());
        ExperimentPaths {
            id,
            language,
            programs: root.join("programs.csv"),
            corpus: root.join("corpus.json"),
            similarity_scores: root.join("similarity_scores.csv"),
            ast_neighbors: root.join("ast_nn.csv"),
            report: root.join("report.json"),
            root,
        }
    }

    /// Allocate the next experiment id and create its directory.
    pub fn create_experiment(&self, language: Language) -> PipelineResult<ExperimentPaths> {
        let paths = self.experiment(language, self.next_experiment_id(language));
        paths.ensure_dirs()?;
        tracing::info!(id = paths.id, dir = %paths.root.display(), "created experiment directory");
        Ok(paths)
    }
}

/// File layout of one experiment.
#[derive(Debug, Clone)]
pub struct ExperimentPaths {
    pub id: u64,
    pub language: Language,
    /// `{results}/{language}/{id}/`
    pub root: PathBuf,
    /// `root/programs.csv`: index, program text, partial flag
    pub programs: PathBuf,
    /// `root/corpus.json`: the full deduplicated corpus, features included
    pub corpus: PathBuf,
    /// `root/similarity_scores.csv`: the correlation input table
    pub similarity_scores: PathBuf,
    /// `root/ast_nn.csv`: nearest programs by structural distance
    pub ast_neighbors: PathBuf,
    /// `root/report.json`
    pub report: PathBuf,
}

impl ExperimentPaths {
    /// `root/embeddings_{system}.csv`
    pub fn embeddings(&self, system: &str) -> PathBuf {
        self.root.join(format!("embeddings_{system}.csv"))
    }

    /// `root/embeddings_{system}_nn.csv`
    pub fn neighbors(&self, system: &str) -> PathBuf {
        self.root.join(format!("embeddings_{system}_nn.csv"))
    }

    /// Create the experiment directory. Idempotent.
    pub fn ensure_dirs(&self) -> PipelineResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| PipelineError::ResultsDir {
            path: self.root.display().to_string(),
            source: e,
        })
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }
}
