//! Reconstruction candidates and the per-request candidate set
//!
//! A `Candidate` is immutable once received. A later final message for the
//! same id replaces the stored value wholesale, keeping its arrival position so
//! that tie-breaking by arrival order stays stable across replays.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the score used to rank candidates
pub const COMBINED_SCORE: &str = "combined";

/// Model uncertainty estimate attached to a candidate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UncertaintyScores {
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, alias = "epistemic_uncertainty")]
    pub epistemic_uncertainty: f64,
    #[serde(default, alias = "aleatoric_uncertainty")]
    pub aleatoric_uncertainty: f64,
}

/// Reference to a grammar rule that supports a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarRule {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One proposed reconstruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(alias = "candidate_id", alias = "candidateId")]
    pub id: String,
    #[serde(default, alias = "source_text")]
    pub source_text: String,
    #[serde(default, alias = "generated_text", alias = "sanskrit_text")]
    pub generated_text: String,
    #[serde(default, alias = "iast")]
    pub transliteration: String,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default, rename = "uncertaintyScores", alias = "uncertainty_scores")]
    pub uncertainty: UncertaintyScores,
    #[serde(default, alias = "generation_strategy")]
    pub generation_strategy: String,
    #[serde(
        default,
        alias = "grammar_rules",
        alias = "sutras",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub grammar_rules: Vec<GrammarRule>,
    #[serde(
        default,
        alias = "morph_seg",
        alias = "morph_segments",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub morph_segments: Vec<String>,
    #[serde(default, alias = "literal_gloss", skip_serializing_if = "Option::is_none")]
    pub literal_gloss: Option<String>,
    #[serde(
        default,
        alias = "idiomatic_translation",
        skip_serializing_if = "Option::is_none"
    )]
    pub idiomatic_translation: Option<String>,
}

impl Candidate {
    /// Create a bare candidate with only an id and generated text
    pub fn new(id: impl Into<String>, generated_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_text: String::new(),
            generated_text: generated_text.into(),
            transliteration: String::new(),
            scores: BTreeMap::new(),
            uncertainty: UncertaintyScores::default(),
            generation_strategy: String::new(),
            grammar_rules: Vec::new(),
            morph_segments: Vec::new(),
            literal_gloss: None,
            idiomatic_translation: None,
        }
    }

    /// Builder-style helper to set a named score
    pub fn with_score(mut self, name: &str, value: f64) -> Self {
        self.scores.insert(name.to_string(), value);
        self
    }

    /// Builder-style helper to set the uncertainty estimate
    pub fn with_uncertainty(mut self, uncertainty: UncertaintyScores) -> Self {
        self.uncertainty = uncertainty;
        self
    }

    /// Look up a named score, ignoring non-finite values
    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores.get(name).copied().filter(|v| v.is_finite())
    }

    /// The ranking scalar, if the server supplied a usable one
    pub fn combined_score(&self) -> Option<f64> {
        self.score(COMBINED_SCORE)
    }

    pub fn confidence(&self) -> Option<f64> {
        Some(self.uncertainty.confidence).filter(|v| v.is_finite())
    }
}

/// Result of merging a candidate into a set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// Ordered candidates produced by one reconstruction request
///
/// Ids are unique within the set. Order is arrival order.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    request_id: Option<String>,
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    /// Create an empty set, optionally bound to a request
    pub fn new(request_id: Option<String>) -> Self {
        Self {
            request_id,
            candidates: Vec::new(),
        }
    }

    /// Request this set belongs to
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Bind an unbound set to a request; returns false if already bound elsewhere
    pub(crate) fn bind(&mut self, request_id: &str) -> bool {
        match &self.request_id {
            Some(existing) => existing == request_id,
            None => {
                self.request_id = Some(request_id.to_string());
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn get(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert a candidate, replacing any existing one with the same id in place
    pub fn upsert(&mut self, candidate: Candidate) -> Upsert {
        match self.candidates.iter_mut().find(|c| c.id == candidate.id) {
            Some(slot) => {
                *slot = candidate;
                Upsert::Replaced
            }
            None => {
                self.candidates.push(candidate);
                Upsert::Inserted
            }
        }
    }
}
