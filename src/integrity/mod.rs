//! Content integrity checking
//!
//! Compares a generated rewrite against the scraped source it was produced
//! from and flags rewrites that copy too much of the source:
//! - Both texts are chunked independently on sentence boundaries
//! - Every source chunk is scored against every generated chunk
//! - The worst pair is kept (as excerpts) for the operator to inspect
//! - The source is fingerprinted so a verdict can be traced to its input

use crate::chunk::{chunk_text, compute_text_hash, DEFAULT_TARGET_WORDS};
use crate::config::{default_excerpt_chars, default_similarity_threshold, IntegrityConfig};
use crate::error::{Error, Result};
use crate::similarity::{round_score, similarity};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Stylistic angle used when rewriting source content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMode {
    /// Lead with comfort, communication and the visit itself
    #[default]
    PatientExperience,
    /// Lead with treatments, technology and credentials
    ClinicalScope,
}

impl RewriteMode {
    /// Prompt guidance for this mode
    pub fn guidance(&self) -> &'static str {
        match self {
            RewriteMode::PatientExperience => {
                "Emphasize the patient experience: comfort, communication, scheduling and what a first visit feels like."
            }
            RewriteMode::ClinicalScope => {
                "Emphasize clinical scope: treatments offered, equipment and technology, and practitioner credentials."
            }
        }
    }
}

impl std::fmt::Display for RewriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RewriteMode::PatientExperience => write!(f, "patient_experience"),
            RewriteMode::ClinicalScope => write!(f, "clinical_scope"),
        }
    }
}

impl FromStr for RewriteMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "patient_experience" => Ok(RewriteMode::PatientExperience),
            "clinical_scope" => Ok(RewriteMode::ClinicalScope),
            _ => Err(Error::Validation(format!("Unknown rewrite mode: {}", s))),
        }
    }
}

/// Integrity verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityStatus {
    Passed,
    Flagged,
}

impl std::fmt::Display for IntegrityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityStatus::Passed => write!(f, "passed"),
            IntegrityStatus::Flagged => write!(f, "flagged"),
        }
    }
}

/// The most similar source/generated chunk pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPair {
    pub source_chunk: String,
    pub generated_chunk: String,
    pub similarity: f64,
}

/// Verdict for one generation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityResult {
    pub source_hash: String,
    pub max_similarity: f64,
    pub worst_chunk_pair: Option<ChunkPair>,
    pub status: IntegrityStatus,
    pub rewrite_mode: RewriteMode,
}

impl IntegrityResult {
    pub fn is_flagged(&self) -> bool {
        self.status == IntegrityStatus::Flagged
    }
}

/// Chunk-pair plagiarism checker
#[derive(Debug, Clone)]
pub struct IntegrityChecker {
    threshold: f64,
    target_words: usize,
    excerpt_chars: usize,
}

impl Default for IntegrityChecker {
    fn default() -> Self {
        Self {
            threshold: default_similarity_threshold(),
            target_words: DEFAULT_TARGET_WORDS,
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

impl IntegrityChecker {
    pub fn new(config: &IntegrityConfig) -> Self {
        Self {
            threshold: config.similarity_threshold,
            target_words: config.chunk_target_words,
            excerpt_chars: config.excerpt_chars,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Check a generated text against its source
    pub fn check(&self, source: &str, generated: &str, mode: RewriteMode) -> Result<IntegrityResult> {
        if source.trim().is_empty() {
            return Err(Error::Validation("source text is required".to_string()));
        }
        if generated.trim().is_empty() {
            return Err(Error::Validation("generated text is required".to_string()));
        }

        let source_chunks: Vec<String> = chunk_text(source, self.target_words).collect();
        let generated_chunks: Vec<String> = chunk_text(generated, self.target_words).collect();

        debug!(
            source_chunks = source_chunks.len(),
            generated_chunks = generated_chunks.len(),
            "Computing chunk similarity"
        );

        let mut max_score = 0.0;
        let mut worst: Option<(&str, &str, f64)> = None;

        for source_chunk in &source_chunks {
            for generated_chunk in &generated_chunks {
                let score = similarity(source_chunk, generated_chunk);
                if score > max_score {
                    max_score = score;
                    worst = Some((source_chunk, generated_chunk, score));
                }
            }
        }

        let max_similarity = round_score(max_score);
        let status = if max_similarity >= self.threshold {
            IntegrityStatus::Flagged
        } else {
            IntegrityStatus::Passed
        };

        Ok(IntegrityResult {
            source_hash: compute_text_hash(source),
            max_similarity,
            worst_chunk_pair: worst.map(|(s, g, score)| ChunkPair {
                source_chunk: excerpt(s, self.excerpt_chars),
                generated_chunk: excerpt(g, self.excerpt_chars),
                similarity: round_score(score),
            }),
            status,
            rewrite_mode: mode,
        })
    }
}

/// Truncate to `max_chars` characters, marking the cut with an ellipsis
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
