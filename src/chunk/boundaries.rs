//! Sentence boundary detection for chunking

/// Returns true for characters that can terminate a sentence
pub fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Iterator over the sentences of a text.
///
/// A sentence ends at `.`, `!` or `?` immediately followed by whitespace; the
/// whitespace run after it is consumed. Yielded sentences are trimmed and never
/// empty. Text without terminal punctuation comes back as one sentence.
#[derive(Debug, Clone)]
pub struct Sentences<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Sentences<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for Sentences<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.text.len() {
            let rest = &self.text[self.pos..];
            let mut chars = rest.char_indices().peekable();
            let mut end = rest.len();
            let mut resume = rest.len();

            while let Some((_, c)) = chars.next() {
                if !is_terminal(c) {
                    continue;
                }
                if let Some(&(j, next)) = chars.peek() {
                    if next.is_whitespace() {
                        end = j;
                        resume = rest[j..]
                            .char_indices()
                            .find(|(_, ch)| !ch.is_whitespace())
                            .map(|(k, _)| j + k)
                            .unwrap_or(rest.len());
                        break;
                    }
                }
            }

            let sentence = rest[..end].trim();
            self.pos += resume;
            if !sentence.is_empty() {
                return Some(sentence);
            }
        }
        None
    }
}

/// Count whitespace-separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
