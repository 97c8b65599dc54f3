use crate::config::RagConfig;
use crate::document::Document;
use crate::error::{RagError, Result};
use crate::tokenizer::Tokenizer;
use log::{debug, info};
use std::sync::Arc;

/// Cut points tried in order: paragraph, line, sentence end, word, any character.
pub const DEFAULT_SEPARATORS: [&str; 7] = ["\n\n", "\n", ". ", "? ", "! ", " ", ""];

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// The text content of this chunk
    pub text: String,
    /// Position of this chunk among the chunks of its source
    pub index: usize,
    /// Label of the document this chunk was cut from
    pub source: String,
}

/// Coarse pass: character-bounded chunks cut at the best available boundary.
///
/// Each chunk holds at most `chunk_size` characters. A cut is placed at the last
/// occurrence of the highest-priority separator inside the budget, and the next
/// chunk restarts up to `chunk_overlap` characters before that cut (at a word
/// start when one is available) so that context spanning the cut survives.
#[derive(Debug, Clone)]
pub struct CharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl CharacterSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(CharacterSplitter {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator priority list. An arbitrary character cut is
    /// always the last resort, whether or not `""` is listed.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Split text into trimmed, non-empty chunks
    pub fn split(&self, text: &str) -> Vec<String> {
        let index = CharIndex::new(text);
        let total = index.len();
        let mut chunks = Vec::new();
        let mut start = index.skip_whitespace(0);

        while start < total {
            if total - start <= self.chunk_size {
                push_trimmed(&mut chunks, index.slice(start, total));
                break;
            }

            let cut = self.find_cut(&index, start);
            push_trimmed(&mut chunks, index.slice(start, cut));
            start = self.next_start(&index, start, cut);
        }

        chunks
    }

    /// Character position to end the chunk starting at `start`. The cut always
    /// lands past `start + chunk_overlap` so the following chunk moves forward.
    fn find_cut(&self, index: &CharIndex<'_>, start: usize) -> usize {
        let lowest = start + self.chunk_overlap + 1;
        let highest = start + self.chunk_size;
        let window_offset = index.byte(start);
        let window = index.slice(start, highest);

        for separator in &self.separators {
            if separator.is_empty() {
                return highest;
            }
            if let Some(found) = window.rfind(separator.as_str()) {
                let cut = index.position(window_offset + found + separator.len());
                if cut >= lowest {
                    return cut;
                }
            }
        }

        highest
    }

    fn next_start(&self, index: &CharIndex<'_>, start: usize, cut: usize) -> usize {
        if self.chunk_overlap == 0 {
            return index.skip_whitespace(cut);
        }

        let window_start = cut - self.chunk_overlap;
        debug_assert!(window_start > start);

        let mut next = window_start;
        if next > 0 && !index.is_whitespace(next - 1) {
            // Mid-word: begin the overlap at the following word instead
            while next < cut && !index.is_whitespace(next) {
                next += 1;
            }
        }
        while next < cut && index.is_whitespace(next) {
            next += 1;
        }

        if next >= cut {
            next = window_start;
            while next < cut && index.is_whitespace(next) {
                next += 1;
            }
        }

        if next >= cut {
            index.skip_whitespace(cut)
        } else {
            next
        }
    }
}

fn push_trimmed(chunks: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        chunks.push(piece.to_string());
    }
}

/// Character positions of a string mapped to byte offsets.
struct CharIndex<'a> {
    text: &'a str,
    /// Byte offset of every character, plus `text.len()` as a final entry
    offsets: Vec<usize>,
    whitespace: Vec<bool>,
}

impl<'a> CharIndex<'a> {
    fn new(text: &'a str) -> Self {
        let mut offsets = Vec::with_capacity(text.len() + 1);
        let mut whitespace = Vec::with_capacity(text.len());
        for (offset, c) in text.char_indices() {
            offsets.push(offset);
            whitespace.push(c.is_whitespace());
        }
        offsets.push(text.len());

        CharIndex {
            text,
            offsets,
            whitespace,
        }
    }

    fn len(&self) -> usize {
        self.whitespace.len()
    }

    fn byte(&self, position: usize) -> usize {
        self.offsets[position]
    }

    fn position(&self, byte: usize) -> usize {
        self.offsets.binary_search(&byte).unwrap_or_else(|p| p)
    }

    fn slice(&self, from: usize, to: usize) -> &'a str {
        &self.text[self.offsets[from]..self.offsets[to]]
    }

    fn is_whitespace(&self, position: usize) -> bool {
        self.whitespace[position]
    }

    fn skip_whitespace(&self, mut position: usize) -> usize {
        while position < self.len() && self.whitespace[position] {
            position += 1;
        }
        position
    }
}

/// Fine pass: windows of at most `tokens_per_chunk` tokens, consecutive windows
/// sharing `chunk_overlap` tokens.
#[derive(Clone)]
pub struct TokenSplitter {
    tokenizer: Arc<dyn Tokenizer>,
    tokens_per_chunk: usize,
    chunk_overlap: usize,
}

impl TokenSplitter {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        tokens_per_chunk: usize,
        chunk_overlap: usize,
    ) -> Result<Self> {
        if tokens_per_chunk == 0 || chunk_overlap >= tokens_per_chunk {
            return Err(RagError::Config(format!(
                "token overlap ({}) must be less than tokens_per_chunk ({})",
                chunk_overlap, tokens_per_chunk
            )));
        }

        Ok(TokenSplitter {
            tokenizer,
            tokens_per_chunk,
            chunk_overlap,
        })
    }

    pub fn split(&self, text: &str) -> Result<Vec<String>> {
        let spans = self.tokenizer.token_spans(text)?;
        let step = self.tokens_per_chunk - self.chunk_overlap;
        let mut pieces = Vec::new();
        let mut start = 0;

        while start < spans.len() {
            let end = (start + self.tokens_per_chunk).min(spans.len());
            pieces.push(text[spans[start].start..spans[end - 1].end].to_string());
            if end == spans.len() {
                break;
            }
            start += step;
        }

        Ok(pieces)
    }
}

/// Drop chunks whose trimmed text is not longer than `min_chars` characters
pub fn filter_short_chunks(chunks: Vec<Chunk>, min_chars: usize) -> Vec<Chunk> {
    chunks
        .into_iter()
        .filter(|chunk| chunk.text.trim().chars().count() > min_chars)
        .collect()
}

/// Runs both chunking passes and the filter over a document.
#[derive(Clone)]
pub struct DocumentChunker {
    coarse: CharacterSplitter,
    fine: TokenSplitter,
    min_chunk_chars: usize,
}

impl DocumentChunker {
    pub fn new(config: &RagConfig, tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        config.validate()?;
        Ok(DocumentChunker {
            coarse: CharacterSplitter::new(config.chunk_size, config.chunk_overlap)?,
            fine: TokenSplitter::new(tokenizer, config.tokens_per_chunk, config.token_overlap)?,
            min_chunk_chars: config.min_chunk_chars,
        })
    }

    /// Split a document into embedding-sized chunks, dropping noise
    pub fn chunk_document(&self, document: &Document) -> Result<Vec<Chunk>> {
        let coarse = self.coarse.split(&document.text());

        let mut fine = Vec::new();
        for piece in &coarse {
            fine.extend(self.fine.split(piece)?);
        }
        debug!(
            "{}: {} coarse chunks, {} token chunks",
            document.label,
            coarse.len(),
            fine.len()
        );

        let chunks = fine
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                text,
                index,
                source: document.label.clone(),
            })
            .collect::<Vec<_>>();
        let total = chunks.len();

        let kept = filter_short_chunks(chunks, self.min_chunk_chars);
        info!(
            "Split {} into {} chunks ({} dropped as too short)",
            document.label,
            kept.len(),
            total - kept.len()
        );

        Ok(kept)
    }
}
