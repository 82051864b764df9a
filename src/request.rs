//! Typed contract for requesting synthetic program corpora.
//!
//! A [`GenerationRequest`] always carries exactly one [`LanguageParams`]
//! block. The block is a tagged union flattened into the request body, so
//! it serializes under its own key (`"css": {...}`, `"taco_schedule": {...}`)
//! and the other language keys are simply absent on the wire.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Path segments
// ---------------------------------------------------------------------------

/// Target language family understood by the synthesis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "css")]
    Css,
    #[serde(rename = "tacosched")]
    TacoSchedule,
    #[serde(rename = "tacoexpr")]
    TacoExpression,
    #[serde(rename = "karel")]
    Karel,
}

impl Language {
    /// URL path segment for this language.
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Css => "css",
            Language::TacoSchedule => "tacosched",
            Language::TacoExpression => "tacoexpr",
            Language::Karel => "karel",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "css" => Ok(Language::Css),
            "tacosched" | "taco_schedule" => Ok(Language::TacoSchedule),
            "tacoexpr" | "taco_expression" => Ok(Language::TacoExpression),
            "karel" => Ok(Language::Karel),
            other => Err(format!(
                "unknown language \"{other}\" (expected css, tacosched, tacoexpr or karel)"
            )),
        }
    }
}

/// Program expansion strategy used by the synthesis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Expander {
    #[default]
    #[serde(rename = "montecarlo")]
    MonteCarlo,
    #[serde(rename = "ml")]
    Ml,
}

impl Expander {
    pub fn as_str(self) -> &'static str {
        match self {
            Expander::MonteCarlo => "montecarlo",
            Expander::Ml => "ml",
        }
    }
}

impl std::fmt::Display for Expander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Expander {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "montecarlo" | "mc" => Ok(Expander::MonteCarlo),
            "ml" => Ok(Expander::Ml),
            other => Err(format!(
                "unknown expander \"{other}\" (expected montecarlo or ml)"
            )),
        }
    }
}

/// Response schema version; selects both the URL prefix and the response adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    /// Parallel `programs` / `features` arrays.
    V1,
    /// Per-program records.
    #[default]
    V2,
}

impl SchemaVersion {
    pub fn number(self) -> u8 {
        match self {
            SchemaVersion::V1 => 1,
            SchemaVersion::V2 => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Language parameter blocks
// ---------------------------------------------------------------------------

/// Grammar revision tag carried by every language block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrammarVersion {
    #[default]
    ExhaustiveV1,
}

/// Symbol pools for the markup/style language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CssParams {
    #[serde(default)]
    pub version: GrammarVersion,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub ids: Vec<String>,
}

impl Default for CssParams {
    fn default() -> Self {
        Self {
            version: GrammarVersion::default(),
            colors: vec!["#842d5b".into(), "#20b01c".into(), "rgb(39, 37, 193)".into()],
            classes: vec!["foo".into(), "bar".into(), "baz".into()],
            ids: vec!["main".into(), "header".into(), "footer".into()],
        }
    }
}

/// Index-variable pools for the tensor-scheduling DSL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacoScheduleParams {
    #[serde(default)]
    pub version: GrammarVersion,
    #[serde(default)]
    pub index_variables: Vec<String>,
    #[serde(default)]
    pub workspace_index_variables: Vec<String>,
    #[serde(default)]
    pub fused_index_variables: Vec<String>,
    #[serde(default)]
    pub split_factor_variables: Vec<String>,
    #[serde(default)]
    pub divide_factor_variables: Vec<String>,
    #[serde(default)]
    pub unroll_factor_variables: Vec<String>,
}

impl Default for TacoScheduleParams {
    fn default() -> Self {
        Self {
            version: GrammarVersion::default(),
            index_variables: vec!["i".into()],
            workspace_index_variables: vec!["j".into()],
            fused_index_variables: vec!["k".into()],
            split_factor_variables: vec!["l".into()],
            divide_factor_variables: vec!["m".into()],
            unroll_factor_variables: vec!["n".into()],
        }
    }
}

/// Operand and index pools for tensor-algebra expressions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TacoExpressionParams {
    #[serde(default)]
    pub version: GrammarVersion,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub indices: Vec<String>,
}

/// The robot-control DSL has a fixed vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KarelParams {
    #[serde(default)]
    pub version: GrammarVersion,
}

/// Exactly one language-specific parameter block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageParams {
    Css(CssParams),
    TacoSchedule(TacoScheduleParams),
    TacoExpression(TacoExpressionParams),
    Karel(KarelParams),
}

impl LanguageParams {
    /// The language whose grammar these parameters configure.
    pub fn language(&self) -> Language {
        match self {
            LanguageParams::Css(_) => Language::Css,
            LanguageParams::TacoSchedule(_) => Language::TacoSchedule,
            LanguageParams::TacoExpression(_) => Language::TacoExpression,
            LanguageParams::Karel(_) => Language::Karel,
        }
    }

    /// Default parameter block for a language.
    pub fn defaults_for(language: Language) -> Self {
        match language {
            Language::Css => LanguageParams::Css(CssParams::default()),
            Language::TacoSchedule => LanguageParams::TacoSchedule(TacoScheduleParams::default()),
            Language::TacoExpression => {
                LanguageParams::TacoExpression(TacoExpressionParams::default())
            }
            Language::Karel => LanguageParams::Karel(KarelParams::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Training hyperparameters forwarded to the service
// ---------------------------------------------------------------------------

/// General training hyperparameters for server-side embedding systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_n_epochs")]
    pub n_epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Multiplicative per-epoch learning-rate drop.
    #[serde(default = "default_learning_rate_drop")]
    pub learning_rate_drop: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_batch_size() -> usize {
    256
}
fn default_n_epochs() -> usize {
    10
}
fn default_learning_rate() -> f64 {
    0.001
}
fn default_learning_rate_drop() -> f64 {
    1.0
}
fn default_seed() -> u64 {
    10
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            n_epochs: default_n_epochs(),
            learning_rate: default_learning_rate(),
            learning_rate_drop: default_learning_rate_drop(),
            seed: default_seed(),
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationRequest
// ---------------------------------------------------------------------------

/// Body of a generation call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(default = "default_count")]
    pub count: u64,
    #[serde(default)]
    pub return_edge_lists: bool,
    #[serde(default)]
    pub return_features: bool,
    #[serde(default)]
    pub return_graphviz: bool,
    #[serde(default)]
    pub return_grammar: bool,
    #[serde(default)]
    pub return_partial_graphs: bool,
    /// Embedding systems the service should additionally compute.
    #[serde(default)]
    pub return_embeddings: Vec<String>,
    /// Weisfeiler-Lehman refinement rounds for feature extraction.
    #[serde(default = "default_wl_degree")]
    pub wl_degree: u32,
    #[serde(flatten)]
    pub language: LanguageParams,
    #[serde(flatten)]
    pub training: TrainingParams,
}

fn default_count() -> u64 {
    1
}
fn default_wl_degree() -> u32 {
    3
}

impl GenerationRequest {
    /// Start a request for the given language block with everything else defaulted.
    pub fn new(language: LanguageParams) -> Self {
        Self {
            count: default_count(),
            return_edge_lists: false,
            return_features: false,
            return_graphviz: false,
            return_grammar: false,
            return_partial_graphs: false,
            return_embeddings: Vec::new(),
            wl_degree: default_wl_degree(),
            language,
            training: TrainingParams::default(),
        }
    }

    pub fn count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn wl_degree(mut self, degree: u32) -> Self {
        self.wl_degree = degree;
        self
    }

    pub fn with_features(mut self) -> Self {
        self.return_features = true;
        self
    }

    pub fn with_graphviz(mut self) -> Self {
        self.return_graphviz = true;
        self
    }

    pub fn with_grammar(mut self) -> Self {
        self.return_grammar = true;
        self
    }

    pub fn with_edge_lists(mut self) -> Self {
        self.return_edge_lists = true;
        self
    }

    pub fn with_partial_graphs(mut self) -> Self {
        self.return_partial_graphs = true;
        self
    }

    pub fn with_embedding(mut self, system: impl Into<String>) -> Self {
        self.return_embeddings.push(system.into());
        self
    }

    pub fn training(mut self, training: TrainingParams) -> Self {
        self.training = training;
        self
    }

    /// Language selected by the active parameter block.
    pub fn language(&self) -> Language {
        self.language.language()
    }
}
