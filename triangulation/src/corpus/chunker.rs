//! Sentence-aware word chunker.
//!
//! Text is packed sentence by sentence into chunks of at most
//! `chunk_size_words` words. A sentence longer than the budget is hard-split
//! at word boundaries. Each chunk after the first starts with up to
//! `overlap_words` trailing words of its predecessor, shrunk when needed so
//! no chunk exceeds the budget.
//!
//! Output depends only on the input text and the two parameters; dedup and
//! chunk identifiers rely on that.

use crate::config::ChunkingConfig;

/// Error type for chunker construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkerError {
    #[error("chunk size must be at least one word")]
    ZeroChunkSize,
}

/// Sentence terminators recognised at the end of a word.
const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Closing punctuation allowed after a terminator (`end."`, `(see above.)`).
const TRAILING_CLOSERS: [char; 4] = ['"', '\'', ')', ']'];

/// Word chunker with fixed size and overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size_words: usize,
    overlap_words: usize,
}

impl Chunker {
    /// Create a chunker; overlap is clamped below the chunk size so every
    /// chunk contributes at least one new word.
    pub fn new(chunk_size_words: usize, overlap_words: usize) -> Result<Self, ChunkerError> {
        if chunk_size_words == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        Ok(Self {
            chunk_size_words,
            overlap_words: overlap_words.min(chunk_size_words - 1),
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkerError> {
        Self::new(config.chunk_size_words, config.overlap_words)
    }

    pub fn chunk_size_words(&self) -> usize {
        self.chunk_size_words
    }

    pub fn overlap_words(&self) -> usize {
        self.overlap_words
    }

    /// Split text into chunk strings.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }
        if words.len() <= self.chunk_size_words {
            return vec![words.join(" ")];
        }

        let units = self.packing_units(&words);

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::with_capacity(self.chunk_size_words);
        // Words added since the last overlap seed; a chunk made only of
        // overlap is never emitted.
        let mut fresh = 0usize;

        for unit in units {
            if fresh > 0 && current.len() + unit.len() > self.chunk_size_words {
                chunks.push(current.join(" "));
                let keep = self
                    .overlap_words
                    .min(self.chunk_size_words.saturating_sub(unit.len()))
                    .min(current.len());
                let tail = current.split_off(current.len() - keep);
                current = tail;
                fresh = 0;
            }
            current.extend_from_slice(unit);
            fresh += unit.len();
        }

        if fresh > 0 {
            chunks.push(current.join(" "));
        }

        chunks
    }

    /// Sentences, with oversized sentences hard-split into pieces that still
    /// leave room for a full overlap.
    fn packing_units<'a>(&self, words: &'a [&'a str]) -> Vec<&'a [&'a str]> {
        let piece_len = (self.chunk_size_words - self.overlap_words).max(1);
        let mut units = Vec::new();
        for sentence in split_sentences(words) {
            if sentence.len() > self.chunk_size_words {
                units.extend(sentence.chunks(piece_len));
            } else {
                units.push(sentence);
            }
        }
        units
    }
}

/// Chunk `text` with the given parameters.
pub fn chunk(
    text: &str,
    chunk_size_words: usize,
    overlap_words: usize,
) -> Result<Vec<String>, ChunkerError> {
    Ok(Chunker::new(chunk_size_words, overlap_words)?.chunk(text))
}

/// Group words into sentences; the final sentence may lack a terminator.
fn split_sentences<'a>(words: &'a [&'a str]) -> Vec<&'a [&'a str]> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (i, word) in words.iter().enumerate() {
        if ends_sentence(word) {
            sentences.push(&words[start..=i]);
            start = i + 1;
        }
    }
    if start < words.len() {
        sentences.push(&words[start..]);
    }
    sentences
}

fn ends_sentence(word: &str) -> bool {
    word.trim_end_matches(TRAILING_CLOSERS)
        .ends_with(SENTENCE_TERMINATORS)
}
