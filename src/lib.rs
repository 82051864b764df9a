// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # astembed
//!
//! An offline harness that measures how well learned embeddings of
//! synthesized programs preserve their structural (AST) similarity.
//!
//! ## Architecture
//!
//! - **Generation client** (`client`, `request`): typed requests to the
//!   program-synthesis service, v1/v2 response adapters
//! - **Corpus** (`corpus`): deduplicated program records and feature tokens
//! - **Trainer** (`trainer`): PV-DBOW document embeddings with negative sampling
//! - **Neighbors** (`neighbors`): exact Euclidean k-NN over an embedding table
//! - **Analysis** (`analysis`, `pairwise`): moments, histograms, correlation
//!   and regression between structural and embedding distances
//! - **Pipeline** (`pipeline`, `paths`, `config`): stage orchestration and the
//!   on-disk results layout
//!
//! ## Library usage
//!
//! ```no_run
//! use astembed::config::EvalConfig;
//! use astembed::pipeline::Pipeline;
//! use astembed::request::{CssParams, Expander, GenerationRequest, LanguageParams};
//!
//! let pipeline = Pipeline::new(EvalConfig::default());
//! let request = GenerationRequest::new(LanguageParams::Css(CssParams::default()))
//!     .count(200)
//!     .with_features();
//! let outcome = pipeline.run_experiment(Expander::MonteCarlo, &request).unwrap();
//! println!("{:?}", outcome.report.correlations);
//! ```

pub mod analysis;
pub mod client;
pub mod config;
pub mod corpus;
pub mod error;
pub mod neighbors;
pub mod pairwise;
pub mod paths;
pub mod pipeline;
pub mod request;
pub mod table;
pub mod trainer;
