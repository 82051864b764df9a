//! Rich diagnostic error types for the evaluation harness.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. Every failure is terminal
//! for the operation that raised it: nothing in this crate retries.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the harness.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum EvalError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Neighbor(#[from] NeighborError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;

// ---------------------------------------------------------------------------
// Generation client errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ClientError {
    #[error("generation service returned status {status}")]
    #[diagnostic(
        code(astembed::client::service),
        help(
            "The synthesis service rejected the request. The raw response body is \
             attached for diagnostics; check the language parameter block and the \
             expander name, then re-run the stage."
        )
    )]
    Service { status: u16, body: String },

    #[error("transport failure talking to {url}: {message}")]
    #[diagnostic(
        code(astembed::client::transport),
        help("Is the synthesis service running and reachable at the configured endpoint?")
    )]
    Transport { url: String, message: String },

    #[error("response does not match the v{version} schema: {message}")]
    #[diagnostic(
        code(astembed::client::schema),
        help(
            "A required field is missing or malformed. Make sure the configured \
             schema version matches the server (v1 returns parallel arrays, v2 \
             returns per-program records)."
        )
    )]
    SchemaMismatch { version: u8, message: String },

    #[error("failed to serialize generation request: {message}")]
    #[diagnostic(code(astembed::client::request))]
    Request { message: String },
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

// ---------------------------------------------------------------------------
// Embedding table errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TableError {
    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(astembed::table::io),
        help("Check that the results directory exists and is writable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("delimited table error in {path}: {message}")]
    #[diagnostic(
        code(astembed::table::csv),
        help("The file is not a well-formed delimited table. Regenerate it with `astembed train`.")
    )]
    Csv { path: String, message: String },

    #[error("malformed corpus file {path}: {message}")]
    #[diagnostic(
        code(astembed::table::json),
        help("Corpus files are written by `astembed generate`; regenerate the corpus.")
    )]
    Json { path: String, message: String },

    #[error("malformed header in {path}: {message}")]
    #[diagnostic(
        code(astembed::table::header),
        help("Expected `type[,graphviz],x_0,x_1,...`.")
    )]
    Header { path: String, message: String },

    #[error("dimension mismatch for \"{id}\": expected {expected}, got {actual}")]
    #[diagnostic(
        code(astembed::table::dim_mismatch),
        help("Every vector in an embedding table must have the same dimensionality.")
    )]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate program identifier \"{id}\"")]
    #[diagnostic(
        code(astembed::table::duplicate),
        help("Deduplicate the corpus before building a table from it.")
    )]
    DuplicateIdentifier { id: String },

    #[error("invalid value {value:?} in column {column} of {path}")]
    #[diagnostic(code(astembed::table::value))]
    InvalidValue {
        path: String,
        column: String,
        value: String,
    },
}

pub type TableResult<T> = std::result::Result<T, TableError>;

// ---------------------------------------------------------------------------
// Trainer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TrainError {
    #[error("invalid trainer configuration: {field}: {message}")]
    #[diagnostic(
        code(astembed::train::config),
        help("All trainer parameters must be positive and within range.")
    )]
    InvalidConfig { field: &'static str, message: String },

    #[error("corpus has no documents to train on")]
    #[diagnostic(
        code(astembed::degenerate::empty_corpus),
        help(
            "The generation request produced zero programs. Increase `count` \
             or check that the service returned features."
        )
    )]
    EmptyCorpus,

    #[error("failed to start worker pool: {message}")]
    #[diagnostic(code(astembed::train::pool))]
    WorkerPool { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Table(#[from] TableError),
}

pub type TrainResult<T> = std::result::Result<T, TrainError>;

// ---------------------------------------------------------------------------
// Nearest-neighbor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum NeighborError {
    #[error("unknown program identifier \"{id}\"")]
    #[diagnostic(
        code(astembed::neighbors::unknown_id),
        help("The identifier is not a row of the embedding table being queried.")
    )]
    UnknownIdentifier { id: String },

    #[error("invalid k = {k} for a table of {size} rows")]
    #[diagnostic(
        code(astembed::neighbors::invalid_k),
        help("k must satisfy 0 < k < table size.")
    )]
    InvalidK { k: usize, size: usize },

    #[error("{actual} pairwise distances given for {programs} programs, expected {expected}")]
    #[diagnostic(
        code(astembed::neighbors::pair_count),
        help("Condensed distances hold one value per unordered pair, n (n - 1) / 2 in total.")
    )]
    PairCount {
        programs: usize,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Table(#[from] TableError),
}

pub type NeighborResult<T> = std::result::Result<T, NeighborError>;

// ---------------------------------------------------------------------------
// Analysis errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AnalysisError {
    #[error("distribution \"{name}\" has zero variance")]
    #[diagnostic(
        code(astembed::degenerate::zero_variance),
        help(
            "Correlation is undefined for a constant score population. \
             Check the moments before correlating."
        )
    )]
    DegenerateDistribution { name: String },

    #[error("score sequences are not index-aligned: {left} vs {right} values")]
    #[diagnostic(
        code(astembed::analysis::length_mismatch),
        help("Position i in both sequences must refer to the same program pair.")
    )]
    LengthMismatch { left: usize, right: usize },

    #[error("need at least {required} samples, got {actual}")]
    #[diagnostic(code(astembed::analysis::too_few))]
    TooFewSamples { required: usize, actual: usize },

    #[error("invalid bucket centers: {message}")]
    #[diagnostic(
        code(astembed::analysis::buckets),
        help("Bucket centers must be finite and strictly increasing.")
    )]
    InvalidBuckets { message: String },

    #[error("column \"{column}\" not found in correlation input")]
    #[diagnostic(
        code(astembed::analysis::column),
        help("The correlation input needs a ground-truth column and one column per embedding system.")
    )]
    MissingColumn { column: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Table(#[from] TableError),
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(astembed::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(astembed::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(code(astembed::config::write))]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("failed to prepare results directory {path}")]
    #[diagnostic(
        code(astembed::pipeline::results_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    ResultsDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report {path}: {message}")]
    #[diagnostic(code(astembed::pipeline::report))]
    Report { path: String, message: String },

    #[error("no embeddings available for system \"{system}\"")]
    #[diagnostic(
        code(astembed::pipeline::missing_system),
        help("Request the system via `return_embeddings` or train it locally first.")
    )]
    MissingSystem { system: String },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
