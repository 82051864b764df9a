//! Embedding trainer: one fixed-size vector per program from its feature tokens.
//!
//! Documents are the corpus's feature-token bags tagged by program identifier.
//! The context window is zero, so token order never matters. Training runs on
//! a dedicated rayon pool of `workers` threads; with one worker and a fixed
//! seed the output is bit-for-bit reproducible, with more workers it is
//! reproducible up to update interleaving.

pub mod dbow;
pub mod vocab;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::corpus::{Corpus, Feature};
use crate::error::{TrainError, TrainResult};
use crate::request::Language;
use crate::table::EmbeddingTable;

use self::dbow::{DbowModel, SgdParams};
use self::vocab::Vocabulary;

/// Trainer hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Vector dimensionality.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Features seen fewer times than this are dropped from the vocabulary.
    #[serde(default = "default_min_count")]
    pub min_count: u64,
    /// Down-sampling rate for frequent features; `0` disables it.
    #[serde(default = "default_sample")]
    pub sample: f64,
    /// Initial learning rate.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Floor the learning rate decays toward. The last epoch still runs one
    /// decay step above it.
    #[serde(default = "default_min_alpha")]
    pub min_alpha: f32,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Noise samples per positive update.
    #[serde(default = "default_negative")]
    pub negative: usize,
    /// Maximum L2 norm of any single gradient update.
    #[serde(default = "default_clip")]
    pub clip: f32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_dimensions() -> usize {
    128
}
fn default_min_count() -> u64 {
    5
}
fn default_sample() -> f64 {
    1e-4
}
fn default_alpha() -> f32 {
    0.025
}
fn default_min_alpha() -> f32 {
    0.0001
}
fn default_epochs() -> usize {
    10
}
fn default_workers() -> usize {
    8
}
fn default_negative() -> usize {
    64
}
fn default_clip() -> f32 {
    5.0
}
fn default_seed() -> u64 {
    1
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            min_count: default_min_count(),
            sample: default_sample(),
            alpha: default_alpha(),
            min_alpha: default_min_alpha(),
            epochs: default_epochs(),
            workers: default_workers(),
            negative: default_negative(),
            clip: default_clip(),
            seed: default_seed(),
        }
    }
}

impl TrainerConfig {
    /// Reject out-of-range parameters before any work starts.
    pub fn validate(&self) -> TrainResult<()> {
        fn invalid(field: &'static str, message: impl Into<String>) -> TrainResult<()> {
            Err(TrainError::InvalidConfig {
                field,
                message: message.into(),
            })
        }

        if self.dimensions == 0 {
            return invalid("dimensions", "must be > 0");
        }
        if self.min_count == 0 {
            return invalid("min_count", "must be >= 1");
        }
        if !self.sample.is_finite() || self.sample < 0.0 {
            return invalid("sample", format!("must be finite and >= 0, got {}", self.sample));
        }
        if !self.alpha.is_finite() || self.alpha <= 0.0 {
            return invalid("alpha", format!("must be finite and > 0, got {}", self.alpha));
        }
        if !self.min_alpha.is_finite() || self.min_alpha < 0.0 || self.min_alpha > self.alpha {
            return invalid(
                "min_alpha",
                format!("must lie in [0, alpha], got {}", self.min_alpha),
            );
        }
        if self.epochs == 0 {
            return invalid("epochs", "must be > 0");
        }
        if self.workers == 0 {
            return invalid("workers", "must be > 0");
        }
        if self.negative == 0 {
            return invalid("negative", "must be > 0");
        }
        if !self.clip.is_finite() || self.clip <= 0.0 {
            return invalid("clip", format!("must be finite and > 0, got {}", self.clip));
        }
        Ok(())
    }

    /// Learning rate for `epoch`, decaying linearly from `alpha` toward `min_alpha`.
    pub fn alpha_at(&self, epoch: usize) -> f32 {
        let progress = epoch as f32 / self.epochs as f32;
        self.alpha - (self.alpha - self.min_alpha) * progress
    }
}

/// Result of a training run.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub table: EmbeddingTable,
    pub vocabulary_size: usize,
    pub epochs_run: usize,
    /// Mean loss per scored pair in the last epoch.
    pub final_loss: f64,
}

/// Train one vector per program in `corpus`.
///
/// Programs whose tokens were all pruned by `min_count` still get a vector;
/// it simply keeps its random initialization.
pub fn train(corpus: &Corpus, config: &TrainerConfig) -> TrainResult<TrainedModel> {
    config.validate()?;
    if corpus.is_empty() {
        return Err(TrainError::EmptyCorpus);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .map_err(|e| TrainError::WorkerPool {
            message: e.to_string(),
        })?;

    let raw: Vec<&[Feature]> = corpus.documents().map(|(_, doc)| doc).collect();

    let vocab = pool.install(|| Vocabulary::build(&raw, config.min_count, config.sample));
    let docs: Vec<Vec<usize>> = raw.iter().map(|d| vocab.encode(d)).collect();
    let empty_docs = docs.iter().filter(|d| d.is_empty()).count();

    tracing::info!(
        documents = docs.len(),
        vocabulary = vocab.len(),
        empty_docs,
        dim = config.dimensions,
        epochs = config.epochs,
        workers = config.workers,
        "training document embeddings"
    );
    if empty_docs > 0 {
        tracing::warn!(
            empty_docs,
            min_count = config.min_count,
            "some programs have no retained features and keep their initial vectors"
        );
    }

    let mut model = DbowModel::new(
        docs.len(),
        vocab.len(),
        SgdParams {
            dim: config.dimensions,
            negative: config.negative,
            clip: config.clip,
            seed: config.seed,
        },
    );

    let mut final_loss = 0.0;
    for epoch in 0..config.epochs {
        let alpha = config.alpha_at(epoch);
        final_loss = pool.install(|| model.epoch(&docs, &vocab, epoch, alpha));
        tracing::debug!(epoch = epoch + 1, alpha, loss = final_loss, "epoch complete");
    }

    let mut table = EmbeddingTable::new();
    for (record, vector) in corpus.records().iter().zip(model.into_vectors()) {
        table.insert_with_graph(record.id.clone(), vector, record.graphviz.clone())?;
    }

    Ok(TrainedModel {
        table,
        vocabulary_size: vocab.len(),
        epochs_run: config.epochs,
        final_loss,
    })
}

/// Deterministic file name encoding the training parameters.
pub fn embedding_path(
    dir: &Path,
    config: &TrainerConfig,
    documents: usize,
    language: Language,
) -> PathBuf {
    dir.join(format!(
        "embeddings_doc2vec_d{}_e{}_n{}_{}.csv",
        config.dimensions, config.epochs, documents, language
    ))
}

/// Train and persist the table under `dir`. Returns the model and the file written.
pub fn train_to_dir(
    corpus: &Corpus,
    config: &TrainerConfig,
    dir: &Path,
    language: Language,
) -> TrainResult<(TrainedModel, PathBuf)> {
    let model = train(corpus, config)?;
    let path = embedding_path(dir, config, corpus.len(), language);
    model.table.write_csv(&path)?;
    tracing::info!(path = %path.display(), rows = model.table.len(), "wrote embeddings");
    Ok((model, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::ProgramRecord;

    fn small_config() -> TrainerConfig {
        TrainerConfig {
            dimensions: 16,
            min_count: 1,
            sample: 0.0,
            alpha: 0.05,
            epochs: 40,
            workers: 1,
            negative: 5,
            seed: 42,
            ..Default::default()
        }
    }

    /// Two families of programs over disjoint feature alphabets.
    fn clustered_corpus() -> Corpus {
        let mut records = Vec::new();
        for i in 0..10u64 {
            let a: Vec<Feature> = (0..30).map(|j| 1 + (i + j) % 8).collect();
            let b: Vec<Feature> = (0..30).map(|j| 101 + (i * 3 + j) % 8).collect();
            records.push(ProgramRecord::new(format!("a{i}"), a));
            records.push(ProgramRecord::new(format!("b{i}"), b));
        }
        Corpus::from_records(records, None)
    }

    fn dist(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
    }

    #[test]
    fn every_program_gets_a_vector_of_the_right_size() {
        let mut corpus_records = clustered_corpus().records().to_vec();
        // Only rare tokens: pruned by min_count, still embedded.
        corpus_records.push(ProgramRecord::new("rare", vec![9999]));
        let corpus = Corpus::from_records(corpus_records, None);
        let config = TrainerConfig {
            min_count: 2,
            epochs: 2,
            ..small_config()
        };

        let model = train(&corpus, &config).unwrap();
        assert_eq!(model.table.len(), corpus.len());
        for (id, _) in corpus.documents() {
            assert_eq!(model.table.get(id).unwrap().len(), config.dimensions);
        }
    }

    #[test]
    fn empty_corpus_is_rejected() {
        let err = train(&Corpus::empty(), &small_config()).unwrap_err();
        assert!(matches!(err, TrainError::EmptyCorpus));
    }

    #[test]
    fn invalid_config_is_rejected_before_training() {
        let corpus = clustered_corpus();
        for config in [
            TrainerConfig { dimensions: 0, ..small_config() },
            TrainerConfig { epochs: 0, ..small_config() },
            TrainerConfig { workers: 0, ..small_config() },
            TrainerConfig { alpha: -1.0, ..small_config() },
            TrainerConfig { min_alpha: 1.0, ..small_config() },
            TrainerConfig { sample: f64::NAN, ..small_config() },
        ] {
            assert!(matches!(
                train(&corpus, &config),
                Err(TrainError::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn single_worker_runs_are_reproducible() {
        let corpus = clustered_corpus();
        let a = train(&corpus, &small_config()).unwrap();
        let b = train(&corpus, &small_config()).unwrap();
        assert_eq!(a.table, b.table);
    }

    #[test]
    fn multi_worker_runs_are_complete() {
        let corpus = clustered_corpus();
        let config = TrainerConfig {
            workers: 4,
            ..small_config()
        };
        let model = train(&corpus, &config).unwrap();
        assert_eq!(model.table.len(), corpus.len());
        assert!(model.table.iter().all(|(_, v)| v.iter().all(|x| x.is_finite())));
    }

    #[test]
    fn programs_sharing_features_embed_closer() {
        let corpus = clustered_corpus();
        let model = train(&corpus, &small_config()).unwrap();
        let t = &model.table;

        let mut intra = Vec::new();
        let mut inter = Vec::new();
        for i in 0..10 {
            for j in (i + 1)..10 {
                let (ai, aj) = (format!("a{i}"), format!("a{j}"));
                intra.push(dist(t.get(&ai).unwrap(), t.get(&aj).unwrap()));
            }
            for j in 0..10 {
                let (ai, bj) = (format!("a{i}"), format!("b{j}"));
                inter.push(dist(t.get(&ai).unwrap(), t.get(&bj).unwrap()));
            }
        }
        let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
        assert!(mean(&intra) < mean(&inter));
    }

    #[test]
    fn learning_rate_decays_linearly() {
        let config = TrainerConfig {
            alpha: 0.1,
            min_alpha: 0.0,
            epochs: 4,
            ..Default::default()
        };
        assert!((config.alpha_at(0) - 0.1).abs() < 1e-7);
        assert!((config.alpha_at(2) - 0.05).abs() < 1e-7);
        // the final epoch stops one step short of min_alpha
        assert!((config.alpha_at(3) - 0.025).abs() < 1e-7);
        assert!(config.alpha_at(3) > config.min_alpha);
    }

    #[test]
    fn output_path_encodes_parameters() {
        let config = TrainerConfig {
            dimensions: 64,
            epochs: 3,
            ..Default::default()
        };
        let path = embedding_path(Path::new("out"), &config, 250, Language::Karel);
        assert_eq!(
            path,
            Path::new("out").join("embeddings_doc2vec_d64_e3_n250_karel.csv")
        );
    }
}
