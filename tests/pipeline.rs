//! End-to-end runs of the evaluation pipeline.
//!
//! The synthesis service is replaced by a one-shot local responder, so these
//! tests exercise the real client, trainer, neighbor export, scoring and
//! report writing against a temporary results directory.

mod common;

use astembed::analysis::CorrelationTable;
use astembed::config::EvalConfig;
use astembed::corpus::{Corpus, ProgramRecord};
use astembed::error::{EvalError, TrainError};
use astembed::pipeline::{ExperimentReport, LOCAL_SYSTEM, Pipeline};
use astembed::request::{CssParams, Expander, GenerationRequest, Language, LanguageParams};
use astembed::table::EmbeddingTable;
use astembed::trainer;

fn test_config(results: &std::path::Path, endpoint: String) -> EvalConfig {
    let mut config = EvalConfig {
        endpoint,
        results_dir: results.to_path_buf(),
        neighbors: 3,
        buckets: 8,
        ..Default::default()
    };
    config.trainer.dimensions = 8;
    config.trainer.min_count = 1;
    config.trainer.epochs = 5;
    config.trainer.workers = 2;
    config.trainer.negative = 3;
    config
}

/// Programs whose "server" embedding is exactly their feature-count vector,
/// so that system's distances equal the structural ones.
fn v2_body(programs: usize) -> String {
    let records: Vec<serde_json::Value> = (0..programs)
        .map(|i| {
            let ones = i + 1;
            let twos = i % 3;
            let mut features = vec![1u64; ones];
            features.extend(std::iter::repeat(2u64).take(twos));
            serde_json::json!({
                "program": format!("rule{i} {{ color: c{i}; }}"),
                "graphviz": format!("digraph p{i} {{}}"),
                "features": features,
                "embeddings": {"server": [ones as f32, twos as f32]},
            })
        })
        .collect();
    serde_json::json!({ "programs": records, "grammar": "css" }).to_string()
}

fn css_request(count: u64) -> GenerationRequest {
    GenerationRequest::new(LanguageParams::Css(CssParams::default()))
        .count(count)
        .with_features()
        .with_graphviz()
        .with_embedding("server")
}

#[test]
fn full_experiment_writes_every_artifact() {
    let dir = tempfile::TempDir::new().unwrap();
    let (url, server) = common::serve_once("200 OK", v2_body(12));
    let config = test_config(dir.path(), url);
    let pipeline = Pipeline::new(config.clone());

    let outcome = pipeline
        .run_experiment(Expander::MonteCarlo, &css_request(12))
        .unwrap();
    server.join().unwrap();

    let paths = &outcome.paths;
    assert_eq!(paths.id, 1);
    assert_eq!(paths.root, dir.path().join("css").join("1"));
    for file in [
        paths.programs.clone(),
        paths.corpus.clone(),
        paths.similarity_scores.clone(),
        paths.report.clone(),
        paths.ast_neighbors.clone(),
        trainer::embedding_path(&paths.root, &config.trainer, 12, Language::Css),
        paths.embeddings(LOCAL_SYSTEM),
        paths.neighbors(LOCAL_SYSTEM),
        paths.embeddings("server"),
        paths.neighbors("server"),
    ] {
        assert!(file.is_file(), "missing {}", file.display());
    }

    // Every program of the corpus got a local vector of the configured size.
    let local = EmbeddingTable::read_csv(&paths.embeddings(LOCAL_SYSTEM)).unwrap();
    assert_eq!(local.len(), 12);
    assert_eq!(local.dim(), 8);
    assert!(local.graphviz("rule0 { color: c0; }").is_some());

    // 12 programs -> 66 aligned pairs per column.
    let scores = CorrelationTable::read_csv(&paths.similarity_scores, "ast").unwrap();
    assert_eq!(scores.len(), 66);
    assert_eq!(scores.system("server").unwrap().len(), 66);

    let report = &outcome.report;
    assert_eq!(report.programs, 12);
    assert_eq!(report.pairs, 66);
    assert_eq!(report.embedding_distributions.len(), 2);
    let server_corr = &report.correlations["server"];
    assert!(server_corr.pearson_r > 0.999);
    assert!(server_corr.pearson_p < 0.05);
    assert!(report.correlations[LOCAL_SYSTEM].pearson_r.is_finite());
    assert!(report.similarity_results["server"].mean_abs_diff < 1e-5);

    let back = ExperimentReport::read_json(&paths.report).unwrap();
    assert_eq!(back.pairs, report.pairs);
    assert_eq!(back.correlations.len(), report.correlations.len());

    let nn = std::fs::read_to_string(paths.neighbors("server")).unwrap();
    assert!(nn.starts_with("type,nn_0,nn_1,nn_2\n"));
    assert_eq!(nn.lines().count(), 13);

    // Structural neighbors: program i's token-1 count is i + 1, so rule0's
    // nearest structural neighbor is rule1.
    let ast = std::fs::read_to_string(&paths.ast_neighbors).unwrap();
    assert!(ast.starts_with("type,nn_0,nn_1,nn_2\n"));
    assert_eq!(ast.lines().count(), 13);
    let row = ast
        .lines()
        .find(|l| l.starts_with("rule0 "))
        .unwrap();
    assert!(row.starts_with("rule0 { color: c0; },rule1 { color: c1; },"));
}

#[test]
fn experiment_ids_increase_per_language() {
    let dir = tempfile::TempDir::new().unwrap();
    let corpus = Corpus::from_records(
        (0..5u64)
            .map(|i| {
                let mut record = ProgramRecord::new(format!("p{i}"), vec![1; i as usize + 1]);
                record.embeddings.insert("server".into(), vec![i as f32]);
                record
            })
            .collect(),
        Some("css".into()),
    );
    let pipeline = Pipeline::new(test_config(dir.path(), "http://unused".into()));

    let first = pipeline.evaluate(&corpus, Language::Css).unwrap();
    let second = pipeline.evaluate(&corpus, Language::Css).unwrap();
    let other = pipeline.evaluate(&corpus, Language::TacoExpression).unwrap();

    assert_eq!(first.paths.id, 1);
    assert_eq!(second.paths.id, 2);
    assert_eq!(other.paths.id, 1);
    assert_eq!(Corpus::read_json(&second.paths.corpus).unwrap(), corpus);
}

#[test]
fn zero_count_request_yields_empty_corpus_and_no_training() {
    let dir = tempfile::TempDir::new().unwrap();
    let (url, server) = common::serve_once("200 OK", r#"{"programs": []}"#.to_string());
    let pipeline = Pipeline::new(test_config(dir.path(), url));

    let corpus = pipeline
        .generate(Expander::MonteCarlo, &css_request(0))
        .unwrap();
    server.join().unwrap();
    assert!(corpus.is_empty());
    assert_eq!(corpus.len(), 0);

    let err = pipeline.train(&corpus).unwrap_err();
    assert!(matches!(err, EvalError::Train(TrainError::EmptyCorpus)));
}

#[test]
fn service_failure_aborts_without_partial_output() {
    let dir = tempfile::TempDir::new().unwrap();
    let (url, server) = common::serve_once("503 Service Unavailable", "busy".to_string());
    let pipeline = Pipeline::new(test_config(dir.path(), url));

    let err = pipeline
        .run_experiment(Expander::MonteCarlo, &css_request(10))
        .unwrap_err();
    server.join().unwrap();
    assert!(matches!(err, EvalError::Client(_)));
    assert!(pipeline.results().list_experiments(Language::Css).is_empty());
}

#[test]
fn neighbors_stage_excludes_self() {
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = Pipeline::new(test_config(dir.path(), "http://unused".into()));

    let mut table = EmbeddingTable::new();
    for (i, x) in [0.0f32, 0.1, 0.3, 2.0, 2.2].iter().enumerate() {
        table.insert(format!("p{i}"), vec![*x, 0.0]).unwrap();
    }
    let out = dir.path().join("nn.csv");
    let all = pipeline.neighbors(&table, Some(&out)).unwrap();

    assert_eq!(all.len(), 5);
    for (id, list) in &all {
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|n| &n.id != id));
    }
    assert_eq!(all["p3"][0].id, "p4");
    assert!(out.is_file());
}

#[test]
fn records_built_in_memory_evaluate_offline() {
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = Pipeline::new(test_config(dir.path(), "http://unused".into()));
    let corpus = Corpus::from_records(
        (0..6)
            .map(|i| ProgramRecord::new(format!("p{i}"), (0..=i as u64).collect()))
            .collect(),
        None,
    );

    let outcome = pipeline.evaluate(&corpus, Language::Karel).unwrap();
    assert_eq!(outcome.report.pairs, 15);
    assert_eq!(outcome.report.correlations.len(), 1);
    assert!(outcome.report.correlations.contains_key(LOCAL_SYSTEM));
}
