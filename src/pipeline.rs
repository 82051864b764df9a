//! Experiment orchestration: generate → train → score → analyze → report.
//!
//! Stages run one after another on the calling thread; only the trainer,
//! pairwise scoring and batch neighbor queries fan out internally. Any stage
//! error aborts the run and propagates unchanged. Nothing is retried.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::{
    Bucketing, CorrelationResult, CorrelationTable, ScoreDivergence, SimilarityDistribution,
    analyze, divergence, histogram,
};
use crate::client::GenerationClient;
use crate::config::EvalConfig;
use crate::corpus::Corpus;
use crate::error::{EvalResult, PipelineError, PipelineResult, TableError};
use crate::neighbors::{NeighborIndex, NeighborMap, write_neighbor_table};
use crate::pairwise::{condensed_neighbors, embedding_distances, structural_distances};
use crate::paths::{ExperimentPaths, ResultPaths};
use crate::request::{Expander, GenerationRequest, Language};
use crate::table::EmbeddingTable;
use crate::trainer::{self, TrainedModel};

/// Name under which the locally trained embeddings are reported.
pub const LOCAL_SYSTEM: &str = "pvdbow";

/// Everything computed for one experiment, persisted as `report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub programs: usize,
    pub pairs: usize,
    pub ast_distribution: SimilarityDistribution,
    pub embedding_distributions: Vec<SimilarityDistribution>,
    pub correlations: BTreeMap<String, CorrelationResult>,
    pub similarity_results: BTreeMap<String, ScoreDivergence>,
}

impl ExperimentReport {
    pub fn write_json(&self, path: &Path) -> PipelineResult<()> {
        let report_err = |message: String| PipelineError::Report {
            path: path.display().to_string(),
            message,
        };
        let text = serde_json::to_string_pretty(self).map_err(|e| report_err(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| report_err(e.to_string()))
    }

    pub fn read_json(path: &Path) -> PipelineResult<Self> {
        let report_err = |message: String| PipelineError::Report {
            path: path.display().to_string(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| report_err(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| report_err(e.to_string()))
    }
}

/// Where a finished experiment lives and what it found.
#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    pub paths: ExperimentPaths,
    pub report: ExperimentReport,
}

/// In-memory results of one evaluation, written only once complete.
struct Evaluation {
    tables: BTreeMap<String, EmbeddingTable>,
    neighbors: BTreeMap<String, NeighborMap>,
    ast_neighbors: Option<NeighborMap>,
    scores: CorrelationTable,
    report: ExperimentReport,
}

#[derive(Serialize)]
struct ProgramRow<'a> {
    idx: usize,
    program: &'a str,
    is_partial: bool,
}

/// Stage runner configured once from an [`EvalConfig`].
#[derive(Debug)]
pub struct Pipeline {
    config: EvalConfig,
    client: GenerationClient,
    results: ResultPaths,
}

impl Pipeline {
    pub fn new(config: EvalConfig) -> Self {
        let client = GenerationClient::new(config.endpoint.clone(), config.schema_version);
        let results = ResultPaths::new(config.results_dir.clone());
        Self {
            config,
            client,
            results,
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn results(&self) -> &ResultPaths {
        &self.results
    }

    /// Request a corpus for the request's language.
    pub fn generate(&self, expander: Expander, request: &GenerationRequest) -> EvalResult<Corpus> {
        Ok(self.client.generate(request.language(), expander, request)?)
    }

    /// Train local embeddings over `corpus`.
    pub fn train(&self, corpus: &Corpus) -> EvalResult<TrainedModel> {
        Ok(trainer::train(corpus, &self.config.trainer)?)
    }

    /// Pairwise structural scores plus one aligned distance column per system.
    pub fn score(
        &self,
        corpus: &Corpus,
        tables: &BTreeMap<String, EmbeddingTable>,
    ) -> EvalResult<CorrelationTable> {
        let ids: Vec<&str> = corpus.documents().map(|(id, _)| id).collect();
        let structural = structural_distances(corpus, self.config.structural_metric);
        let mut scores = CorrelationTable::new(self.config.ground_truth_column.clone(), structural);

        for (system, table) in tables {
            let distances = embedding_distances(&ids, table)?;
            scores.add_system(system.clone(), distances)?;
        }
        tracing::info!(
            programs = ids.len(),
            pairs = scores.len(),
            systems = tables.len(),
            "scored program pairs"
        );
        Ok(scores)
    }

    /// Distributions, correlations and divergences for every system column.
    pub fn analyze(&self, scores: &CorrelationTable) -> EvalResult<ExperimentReport> {
        let bucketing = Bucketing::Uniform {
            buckets: self.config.buckets,
        };
        let gt = scores.ground_truth();
        let ast_distribution = histogram(scores.ground_truth_name(), gt, &bucketing)?;

        let mut embedding_distributions = Vec::new();
        let mut correlations = BTreeMap::new();
        let mut similarity_results = BTreeMap::new();
        for (system, emb) in scores.systems() {
            embedding_distributions.push(histogram(system, emb, &bucketing)?);
            let result = analyze(gt, emb, self.config.alternative)?;
            tracing::info!(
                system,
                pearson = result.pearson_r,
                pearson_p = result.pearson_p,
                spearman = result.spearman_r,
                "correlation with ground truth"
            );
            correlations.insert(system.to_string(), result);
            similarity_results.insert(system.to_string(), divergence(gt, emb)?);
        }

        Ok(ExperimentReport {
            programs: programs_for_pairs(scores.len()),
            pairs: scores.len(),
            ast_distribution,
            embedding_distributions,
            correlations,
            similarity_results,
        })
    }

    /// Neighbors of every row, optionally exported to `out`.
    pub fn neighbors(&self, table: &EmbeddingTable, out: Option<&Path>) -> EvalResult<NeighborMap> {
        let all = NeighborIndex::build(table).query_all(self.config.neighbors)?;
        if let Some(path) = out {
            write_neighbor_table(path, &all)?;
        }
        Ok(all)
    }

    /// Generate a corpus and evaluate it end to end.
    pub fn run_experiment(
        &self,
        expander: Expander,
        request: &GenerationRequest,
    ) -> EvalResult<ExperimentOutcome> {
        let corpus = self.generate(expander, request)?;
        self.evaluate(&corpus, request.language())
    }

    /// Evaluate an already generated corpus into a fresh experiment directory.
    ///
    /// Everything that depends on the data is computed before the directory
    /// is created, so a failing stage leaves no experiment behind. If writing
    /// the artifacts fails, the half-written directory is removed.
    pub fn evaluate(&self, corpus: &Corpus, language: Language) -> EvalResult<ExperimentOutcome> {
        let trained = self.train(corpus)?;

        let mut tables = BTreeMap::new();
        tables.insert(LOCAL_SYSTEM.to_string(), trained.table);
        for system in corpus.embedding_systems() {
            if system == LOCAL_SYSTEM {
                tracing::warn!(system = %system, "service embeddings shadowed by the local system");
                continue;
            }
            let table = corpus.embedding_table(&system)?;
            if table.len() < corpus.len() {
                tracing::warn!(
                    system = %system,
                    covered = table.len(),
                    programs = corpus.len(),
                    "service embeddings do not cover every program, skipping system"
                );
                continue;
            }
            tables.insert(system, table);
        }

        let k = self.config.neighbors;
        let mut neighbors = BTreeMap::new();
        for (system, table) in &tables {
            if table.len() > k {
                neighbors.insert(system.clone(), NeighborIndex::build(table).query_all(k)?);
            } else {
                tracing::warn!(
                    system = %system,
                    rows = table.len(),
                    k,
                    "too few programs for neighbor export"
                );
            }
        }

        let scores = self.score(corpus, &tables)?;
        let ast_neighbors = if corpus.len() > k {
            let ids: Vec<&str> = corpus.documents().map(|(id, _)| id).collect();
            Some(condensed_neighbors(&ids, scores.ground_truth(), k)?)
        } else {
            None
        };
        let report = self.analyze(&scores)?;

        let evaluation = Evaluation {
            tables,
            neighbors,
            ast_neighbors,
            scores,
            report,
        };
        let paths = self.results.create_experiment(language)?;
        if let Err(err) = self.write_evaluation(corpus, &paths, &evaluation) {
            if let Err(cleanup) = std::fs::remove_dir_all(&paths.root) {
                tracing::warn!(dir = %paths.root.display(), error = %cleanup, "failed to remove incomplete experiment");
            }
            return Err(err);
        }
        tracing::info!(id = paths.id, dir = %paths.root.display(), "experiment complete");

        Ok(ExperimentOutcome {
            paths,
            report: evaluation.report,
        })
    }

    fn write_evaluation(
        &self,
        corpus: &Corpus,
        paths: &ExperimentPaths,
        evaluation: &Evaluation,
    ) -> EvalResult<()> {
        self.store_corpus(corpus, paths)?;

        for (system, table) in &evaluation.tables {
            table.write_csv(&paths.embeddings(system))?;
        }
        if let Some(local) = evaluation.tables.get(LOCAL_SYSTEM) {
            let trained = trainer::embedding_path(
                &paths.root,
                &self.config.trainer,
                corpus.len(),
                paths.language,
            );
            local.write_csv(&trained)?;
        }
        for (system, all) in &evaluation.neighbors {
            write_neighbor_table(&paths.neighbors(system), all)?;
        }
        if let Some(all) = &evaluation.ast_neighbors {
            write_neighbor_table(&paths.ast_neighbors, all)?;
        }

        evaluation.scores.write_csv(&paths.similarity_scores)?;
        evaluation.report.write_json(&paths.report)?;
        Ok(())
    }

    /// Write `programs.csv` and `corpus.json` for an experiment.
    pub fn store_corpus(&self, corpus: &Corpus, paths: &ExperimentPaths) -> EvalResult<()> {
        paths.ensure_dirs()?;
        let label = paths.programs.display().to_string();
        let csv_err = |e: csv::Error| TableError::Csv {
            path: label.clone(),
            message: e.to_string(),
        };
        let mut out = csv::Writer::from_path(&paths.programs).map_err(csv_err)?;
        for (idx, record) in corpus.records().iter().enumerate() {
            out.serialize(ProgramRow {
                idx,
                program: &record.id,
                is_partial: record.is_partial,
            })
            .map_err(csv_err)?;
        }
        out.flush().map_err(|e| TableError::Io {
            path: label.clone(),
            source: e,
        })?;

        corpus.write_json(&paths.corpus)?;
        tracing::debug!(programs = corpus.len(), dir = %paths.root.display(), "stored corpus");
        Ok(())
    }
}

/// Invert `n (n - 1) / 2`.
fn programs_for_pairs(pairs: usize) -> usize {
    let n = ((1.0 + (1.0 + 8.0 * pairs as f64).sqrt()) / 2.0).round() as usize;
    if pairs == 0 { 0 } else { n }
}
