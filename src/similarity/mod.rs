//! Lexical similarity between two text chunks
//!
//! The blended score weights character trigrams above word overlap: trigrams
//! catch phrase-level copying that survives light word substitution.

use regex::Regex;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::OnceLock;

/// Weight of word-set similarity in the blended score
pub const WORD_WEIGHT: f64 = 0.3;

/// Weight of character n-gram similarity in the blended score
pub const NGRAM_WEIGHT: f64 = 0.7;

/// Character n-gram size
pub const NGRAM_SIZE: usize = 3;

/// Tokens of this many characters or fewer are ignored
const MIN_TOKEN_CHARS: usize = 2;

fn non_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\W+").expect("static regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Jaccard index of two sets; 0 when both are empty
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Lower-cased word tokens longer than two characters
pub fn word_set(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    non_word_re()
        .split(&lower)
        .filter(|w| w.chars().count() > MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// All overlapping character n-grams of the lower-cased, whitespace-collapsed text
pub fn ngram_set(text: &str, n: usize) -> HashSet<String> {
    let lower = text.to_lowercase();
    let normalized = whitespace_re().replace_all(&lower, " ");
    let chars: Vec<char> = normalized.chars().collect();
    if n == 0 || chars.len() < n {
        return HashSet::new();
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Jaccard similarity of the word sets
pub fn word_similarity(a: &str, b: &str) -> f64 {
    jaccard(&word_set(a), &word_set(b))
}

/// Jaccard similarity of the character n-gram sets
pub fn ngram_similarity(a: &str, b: &str, n: usize) -> f64 {
    jaccard(&ngram_set(a, n), &ngram_set(b, n))
}

/// Blended similarity in [0, 1].
///
/// A side with no usable tokens contributes 0, so identical text only scores
/// 1.0 when it has a word longer than two characters and at least
/// `NGRAM_SIZE` characters.
pub fn similarity(a: &str, b: &str) -> f64 {
    let word = word_similarity(a, b);
    let ngram = ngram_similarity(a, b, NGRAM_SIZE);
    (word * WORD_WEIGHT + ngram * NGRAM_WEIGHT).clamp(0.0, 1.0)
}

/// Round a score to three decimals for reporting
pub fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}
