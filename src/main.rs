//! astembed CLI: embedding-evaluation harness for synthesized programs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use astembed::analysis::{Alternative, Bucketing, CorrelationTable, analyze, histogram};
use astembed::config::EvalConfig;
use astembed::corpus::Corpus;
use astembed::neighbors::{self, NeighborIndex};
use astembed::pipeline::Pipeline;
use astembed::request::{Expander, GenerationRequest, Language, LanguageParams, SchemaVersion};
use astembed::table::EmbeddingTable;
use astembed::trainer;

#[derive(Parser)]
#[command(name = "astembed", version, about = "Evaluate program embeddings against AST similarity")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the synthesis service endpoint.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Language family: css, tacosched, tacoexpr, karel.
    #[arg(long)]
    language: Language,

    /// Expansion strategy: montecarlo or ml.
    #[arg(long, default_value = "montecarlo")]
    expander: Expander,

    /// Number of programs to synthesize.
    #[arg(long, default_value = "100")]
    count: u64,

    /// Weisfeiler-Lehman refinement rounds.
    #[arg(long, default_value = "3")]
    wl_degree: u32,

    /// Embedding systems the service should compute (repeatable).
    #[arg(long = "embedding")]
    embeddings: Vec<String>,

    /// Also request DOT renderings of each program.
    #[arg(long)]
    graphviz: bool,

    /// Keep partial derivations in the corpus.
    #[arg(long)]
    partial: bool,
}

impl GenerateArgs {
    fn request(&self) -> GenerationRequest {
        let mut req = GenerationRequest::new(LanguageParams::defaults_for(self.language))
            .count(self.count)
            .wl_degree(self.wl_degree)
            .with_features()
            .with_grammar();
        if self.graphviz {
            req = req.with_graphviz();
        }
        if self.partial {
            req = req.with_partial_graphs();
        }
        for system in &self.embeddings {
            req = req.with_embedding(system.clone());
        }
        req
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Request a corpus and store it as a new experiment.
    Generate(GenerateArgs),

    /// Train local embeddings over a stored corpus.
    Train {
        /// `corpus.json` written by `generate`.
        #[arg(long)]
        corpus: PathBuf,

        /// Language the corpus was generated for (names the output file).
        #[arg(long)]
        language: Language,

        /// Output directory.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Nearest neighbors in an embedding table.
    Neighbors {
        /// Embedding table file.
        #[arg(long)]
        table: PathBuf,

        /// Neighbors per program.
        #[arg(long, short)]
        k: Option<usize>,

        /// Query program ids (repeatable); all rows when omitted.
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Write a neighbor table instead of printing.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Correlate every system column of a score table with the ground truth.
    Correlate {
        /// Correlation input file (e.g. `similarity_scores.csv`).
        #[arg(long)]
        scores: PathBuf,

        /// Ground-truth column name.
        #[arg(long)]
        column: Option<String>,

        /// greater, less or two-sided.
        #[arg(long)]
        alternative: Option<Alternative>,
    },

    /// Histogram and moments of every column of a score table.
    Histogram {
        #[arg(long)]
        scores: PathBuf,

        #[arg(long)]
        column: Option<String>,

        /// Number of uniform buckets.
        #[arg(long, conflicts_with = "centers")]
        buckets: Option<usize>,

        /// Explicit bucket centers, comma-separated and increasing.
        #[arg(long, value_delimiter = ',')]
        centers: Vec<f64>,
    },

    /// Generate, train, score and analyze in one run.
    Experiment(GenerateArgs),

    /// Print the effective configuration as TOML.
    Config {
        /// Write it to this file instead.
        #[arg(long)]
        save: Option<PathBuf>,

        /// Force the response schema version.
        #[arg(long)]
        schema: Option<u8>,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = EvalConfig::load_or_default(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }

    match cli.command {
        Commands::Generate(args) => {
            let pipeline = Pipeline::new(config);
            let corpus = pipeline.generate(args.expander, &args.request())?;
            let paths = pipeline.results().create_experiment(args.language)?;
            pipeline.store_corpus(&corpus, &paths)?;
            println!(
                "Stored {} programs ({} partial) in {}",
                corpus.len(),
                corpus.partial_count(),
                paths.root.display()
            );
        }

        Commands::Train {
            corpus,
            language,
            out,
        } => {
            let corpus = Corpus::read_json(&corpus)?;
            let (model, path) = trainer::train_to_dir(&corpus, &config.trainer, &out, language)?;
            println!(
                "Trained {} vectors (vocabulary {}, final loss {:.4}) -> {}",
                model.table.len(),
                model.vocabulary_size,
                model.final_loss,
                path.display()
            );
        }

        Commands::Neighbors { table, k, ids, out } => {
            let table = EmbeddingTable::read_csv(&table)?;
            let k = k.unwrap_or(config.neighbors);
            let index = NeighborIndex::build(&table);
            let results = if ids.is_empty() {
                index.query_all(k)?
            } else {
                index.query(&ids, k)?
            };

            match out {
                Some(path) => {
                    neighbors::write_neighbor_table(&path, &results)?;
                    println!("Wrote neighbors of {} programs to {}", results.len(), path.display());
                }
                None => {
                    for (id, list) in &results {
                        println!("{id}");
                        for (rank, n) in list.iter().enumerate() {
                            println!("  {:>3}. {:.6}  {}", rank + 1, n.distance, n.id);
                        }
                    }
                }
            }
        }

        Commands::Correlate {
            scores,
            column,
            alternative,
        } => {
            let column = column.unwrap_or(config.ground_truth_column);
            let alternative = alternative.unwrap_or(config.alternative);
            let table = CorrelationTable::read_csv(&scores, &column)?;

            let mut results = std::collections::BTreeMap::new();
            for (system, emb) in table.systems() {
                results.insert(system.to_string(), analyze(table.ground_truth(), emb, alternative)?);
            }
            println!("{}", serde_json::to_string_pretty(&results).into_diagnostic()?);
        }

        Commands::Histogram {
            scores,
            column,
            buckets,
            centers,
        } => {
            let column = column.unwrap_or(config.ground_truth_column);
            let table = CorrelationTable::read_csv(&scores, &column)?;
            let bucketing = if centers.is_empty() {
                Bucketing::Uniform {
                    buckets: buckets.unwrap_or(config.buckets),
                }
            } else {
                Bucketing::Centers(centers)
            };

            let mut dists = vec![histogram(table.ground_truth_name(), table.ground_truth(), &bucketing)?];
            for (system, emb) in table.systems() {
                dists.push(histogram(system, emb, &bucketing)?);
            }
            println!("{}", serde_json::to_string_pretty(&dists).into_diagnostic()?);
        }

        Commands::Experiment(args) => {
            let pipeline = Pipeline::new(config);
            let outcome = pipeline.run_experiment(args.expander, &args.request())?;
            println!("Experiment {} -> {}", outcome.paths.id, outcome.paths.root.display());
            for (system, corr) in &outcome.report.correlations {
                println!(
                    "  {system:<16} pearson {:+.4} (p={:.3e})  spearman {:+.4} (p={:.3e})  r2 {:.4}",
                    corr.pearson_r, corr.pearson_p, corr.spearman_r, corr.spearman_p, corr.regression_r2
                );
            }
        }

        Commands::Config { save, schema } => {
            match schema {
                Some(1) => config.schema_version = SchemaVersion::V1,
                Some(2) => config.schema_version = SchemaVersion::V2,
                Some(other) => miette::bail!("unsupported schema version {other} (expected 1 or 2)"),
                None => {}
            }
            match save {
                Some(path) => {
                    config.save(&path)?;
                    println!("Wrote configuration to {}", path.display());
                }
                None => println!("{}", toml::to_string_pretty(&config).into_diagnostic()?),
            }
        }
    }

    Ok(())
}
