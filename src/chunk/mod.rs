//! Sentence-aligned text chunking
//!
//! Splits long text into bounded segments for pairwise comparison:
//! - Chunks never break inside a sentence
//! - A chunk closes when the next sentence would push it past the word target
//! - Chunking is lazy and restartable (the iterator is `Clone`)
//! - Content fingerprints use blake3

mod boundaries;

pub use boundaries::*;

use blake3::Hasher;

/// Default chunk size in words
pub const DEFAULT_TARGET_WORDS: usize = 400;

/// Lazy sequence of sentence-aligned chunks
#[derive(Debug, Clone)]
pub struct SentenceChunks<'a> {
    source: &'a str,
    sentences: Sentences<'a>,
    carry: Option<&'a str>,
    target_words: usize,
    emitted: bool,
}

impl<'a> Iterator for SentenceChunks<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut chunk = String::new();
        let mut words = 0;

        loop {
            let Some(sentence) = self.carry.take().or_else(|| self.sentences.next()) else {
                break;
            };
            let sentence_words = word_count(sentence);

            if !chunk.is_empty() && words + sentence_words > self.target_words {
                self.carry = Some(sentence);
                break;
            }

            if !chunk.is_empty() {
                chunk.push(' ');
            }
            chunk.push_str(sentence);
            words += sentence_words;
        }

        if !chunk.is_empty() {
            self.emitted = true;
            return Some(chunk);
        }

        // Non-empty input with no sentence content still yields itself once
        if !self.emitted && !self.source.is_empty() {
            self.emitted = true;
            return Some(self.source.to_string());
        }

        None
    }
}

/// Chunk text on sentence boundaries with a target size in words
pub fn chunk_text(text: &str, target_words: usize) -> SentenceChunks<'_> {
    SentenceChunks {
        source: text,
        sentences: Sentences::new(text),
        carry: None,
        target_words: target_words.max(1),
        emitted: false,
    }
}

/// Compute a content fingerprint of the full text
pub fn compute_text_hash(text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}
