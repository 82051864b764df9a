//! Blocking client for the program-synthesis service.
//!
//! One generation call is one synchronous `POST` with no timeout, retry, or
//! backoff. Non-200 responses and transport failures surface as
//! [`ClientError`] with the raw status and body kept for diagnostics.
//!
//! The service speaks two incompatible response schemas. Each has its own
//! adapter ([`ResponseV1`], [`ResponseV2`]) that normalizes into the single
//! [`Corpus`] shape, so nothing downstream ever branches on the schema.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::corpus::{Corpus, Feature, ProgramRecord};
use crate::error::{ClientError, ClientResult};
use crate::request::{Expander, GenerationRequest, Language, SchemaVersion};

// ---------------------------------------------------------------------------
// Response adapters
// ---------------------------------------------------------------------------

/// A schema-specific response body that can be normalized into a [`Corpus`].
pub trait ResponseAdapter: for<'de> Deserialize<'de> {
    const VERSION: SchemaVersion;

    fn into_corpus(self) -> ClientResult<Corpus>;
}

/// v1 body: parallel arrays indexed by program position.
#[derive(Debug, Deserialize)]
pub struct ResponseV1 {
    programs: Vec<String>,
    #[serde(default)]
    features: Vec<Vec<Feature>>,
    #[serde(default)]
    grammar: Option<String>,
}

impl ResponseAdapter for ResponseV1 {
    const VERSION: SchemaVersion = SchemaVersion::V1;

    fn into_corpus(self) -> ClientResult<Corpus> {
        if !self.features.is_empty() && self.features.len() != self.programs.len() {
            return Err(ClientError::SchemaMismatch {
                version: Self::VERSION.number(),
                message: format!(
                    "{} programs but {} feature lists",
                    self.programs.len(),
                    self.features.len()
                ),
            });
        }

        let mut features = self.features.into_iter();
        let records = self
            .programs
            .into_iter()
            .map(|program| ProgramRecord::new(program, features.next().unwrap_or_default()))
            .collect();

        Ok(Corpus::from_records(records, self.grammar))
    }
}

/// v2 body: one object per program.
#[derive(Debug, Deserialize)]
pub struct ResponseV2 {
    programs: Vec<ProgramV2>,
    #[serde(default)]
    grammar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProgramV2 {
    #[serde(default)]
    program: Option<String>,
    #[serde(default)]
    graphviz: Option<String>,
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default)]
    embeddings: BTreeMap<String, Vec<f32>>,
    #[serde(default)]
    is_partial: bool,
}

impl ResponseAdapter for ResponseV2 {
    const VERSION: SchemaVersion = SchemaVersion::V2;

    fn into_corpus(self) -> ClientResult<Corpus> {
        let records = self
            .programs
            .into_iter()
            .enumerate()
            .map(|(idx, p)| {
                let id = p.program.ok_or_else(|| ClientError::SchemaMismatch {
                    version: Self::VERSION.number(),
                    message: format!("program {idx} has no `program` text"),
                })?;
                Ok(ProgramRecord {
                    id,
                    graphviz: p.graphviz,
                    features: p.features,
                    embeddings: p.embeddings,
                    is_partial: p.is_partial,
                })
            })
            .collect::<ClientResult<Vec<_>>>()?;

        Ok(Corpus::from_records(records, self.grammar))
    }
}

fn decode<R: ResponseAdapter>(body: &str) -> ClientResult<Corpus> {
    let parsed: R = serde_json::from_str(body).map_err(|e| ClientError::SchemaMismatch {
        version: R::VERSION.number(),
        message: e.to_string(),
    })?;
    parsed.into_corpus()
}

/// Parse a successful response body with the adapter for `version`.
pub fn parse_response(version: SchemaVersion, body: &str) -> ClientResult<Corpus> {
    match version {
        SchemaVersion::V1 => decode::<ResponseV1>(body),
        SchemaVersion::V2 => decode::<ResponseV2>(body),
    }
}

// ---------------------------------------------------------------------------
// GenerationClient
// ---------------------------------------------------------------------------

/// HTTP client bound to one synthesis-service endpoint and schema version.
pub struct GenerationClient {
    endpoint: String,
    version: SchemaVersion,
    http: ureq::Agent,
}

impl GenerationClient {
    pub fn new(endpoint: impl Into<String>, version: SchemaVersion) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            version,
            http: ureq::Agent::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// `{endpoint}/v{version}/generate/{language}/{expander}`
    pub fn url(&self, language: Language, expander: Expander) -> String {
        format!(
            "{}/v{}/generate/{}/{}",
            self.endpoint,
            self.version.number(),
            language,
            expander
        )
    }

    /// Request a corpus. Blocks until the service answers or the connection fails.
    pub fn generate(
        &self,
        language: Language,
        expander: Expander,
        request: &GenerationRequest,
    ) -> ClientResult<Corpus> {
        if request.language() != language {
            tracing::warn!(
                path_language = %language,
                block_language = %request.language(),
                "request parameter block does not match the path language"
            );
        }

        let url = self.url(language, expander);
        let body = serde_json::to_value(request).map_err(|e| ClientError::Request {
            message: e.to_string(),
        })?;

        tracing::info!(%url, count = request.count, "requesting corpus");

        let resp = match self
            .http
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(body)
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                return Err(ClientError::Service { status, body });
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(ClientError::Transport {
                    url,
                    message: t.to_string(),
                });
            }
        };

        let status = resp.status();
        let text = resp.into_string().map_err(|e| ClientError::Transport {
            url: url.clone(),
            message: format!("failed to read response body: {e}"),
        })?;
        if status != 200 {
            return Err(ClientError::Service { status, body: text });
        }

        let corpus = parse_response(self.version, &text)?;
        tracing::info!(
            programs = corpus.len(),
            partial = corpus.partial_count(),
            "received corpus"
        );
        Ok(corpus)
    }
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("endpoint", &self.endpoint)
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_parallel_arrays_normalize() {
        let body = r#"{
            "programs": ["p1", "p2", "p1"],
            "features": [[1, 2], [3], [1, 2]],
            "grammar": "S -> a",
            "edge_lists": []
        }"#;
        let corpus = parse_response(SchemaVersion::V1, body).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.grammar(), Some("S -> a"));
        assert_eq!(corpus.get("p2").unwrap().features, vec![3]);
        assert!(corpus.get("p1").unwrap().graphviz.is_none());
    }

    #[test]
    fn v1_without_features_defaults_to_empty() {
        let corpus = parse_response(SchemaVersion::V1, r#"{"programs": ["a"]}"#).unwrap();
        assert!(corpus.get("a").unwrap().features.is_empty());
    }

    #[test]
    fn v1_misaligned_arrays_are_a_schema_error() {
        let err = parse_response(
            SchemaVersion::V1,
            r#"{"programs": ["a", "b"], "features": [[1]]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::SchemaMismatch { version: 1, .. }));
    }

    #[test]
    fn v2_records_carry_optional_fields() {
        let body = r#"{
            "programs": [
                {"program": "a", "graphviz": "digraph {}", "features": [7], "is_partial": true,
                 "embeddings": {"doc2vec": [0.5, 0.25]}},
                {"program": "b", "features": [8, 8]}
            ],
            "grammar": null,
            "language": "css"
        }"#;
        let corpus = parse_response(SchemaVersion::V2, body).unwrap();
        assert_eq!(corpus.len(), 2);
        let a = corpus.get("a").unwrap();
        assert!(a.is_partial);
        assert_eq!(a.graphviz.as_deref(), Some("digraph {}"));
        assert_eq!(a.embeddings["doc2vec"], vec![0.5, 0.25]);
        let b = corpus.get("b").unwrap();
        assert!(b.embeddings.is_empty());
        assert!(b.graphviz.is_none());
    }

    #[test]
    fn v2_missing_programs_field_is_a_schema_error() {
        let err = parse_response(SchemaVersion::V2, r#"{"grammar": "x"}"#).unwrap_err();
        assert!(matches!(err, ClientError::SchemaMismatch { version: 2, .. }));
    }

    #[test]
    fn v2_record_without_text_is_a_schema_error() {
        let err =
            parse_response(SchemaVersion::V2, r#"{"programs": [{"features": [1]}]}"#).unwrap_err();
        assert!(matches!(err, ClientError::SchemaMismatch { .. }));
    }

    #[test]
    fn url_follows_versioned_pattern() {
        let client = GenerationClient::new("http://localhost:8080/", SchemaVersion::V2);
        assert_eq!(
            client.url(Language::TacoSchedule, Expander::MonteCarlo),
            "http://localhost:8080/v2/generate/tacosched/montecarlo"
        );
    }
}
