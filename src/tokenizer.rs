//! Token counting for the fine chunking pass.
//!
//! The fine pass exists so that no chunk exceeds the embedding model's input
//! limit, so the tokenizer used here has to be the one the embedding model
//! uses. [`HfTokenizer`] loads that tokenizer from a `tokenizer.json`;
//! [`WordTokenizer`] is the built-in fallback.

use crate::error::{RagError, Result};
use std::ops::Range;
use std::path::Path;

/// Splits text into tokens, reporting each token as a byte range of the input.
pub trait Tokenizer: Send + Sync {
    /// Byte spans of the tokens of `text`, in order and non-overlapping.
    fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>>;

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.token_spans(text)?.len())
    }
}

/// Words and punctuation marks as tokens.
///
/// A token is either a maximal run of characters that are neither whitespace
/// nor ASCII punctuation, or a single ASCII punctuation character. Any slice
/// that starts and ends on token boundaries re-tokenizes to the same tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>> {
        let mut spans = Vec::new();
        let mut word_start: Option<usize> = None;

        for (idx, c) in text.char_indices() {
            if c.is_whitespace() || c.is_ascii_punctuation() {
                if let Some(start) = word_start.take() {
                    spans.push(start..idx);
                }
                if c.is_ascii_punctuation() {
                    spans.push(idx..idx + c.len_utf8());
                }
            } else if word_start.is_none() {
                word_start = Some(idx);
            }
        }

        if let Some(start) = word_start {
            spans.push(start..text.len());
        }

        Ok(spans)
    }
}

/// A HuggingFace tokenizer loaded from a `tokenizer.json` file.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            RagError::Tokenizer(format!("failed to load {}: {}", path.display(), e))
        })?;
        Ok(HfTokenizer { inner })
    }
}

impl Tokenizer for HfTokenizer {
    fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>> {
        // Special tokens are added by the model at embedding time, not part of the text
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| RagError::Tokenizer(e.to_string()))?;

        Ok(encoding
            .get_offsets()
            .iter()
            .filter(|(start, end)| start < end)
            .map(|&(start, end)| start..end)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens<'a>(text: &'a str) -> Vec<&'a str> {
        WordTokenizer
            .token_spans(text)
            .unwrap()
            .into_iter()
            .map(|span| &text[span])
            .collect()
    }

    #[test]
    fn test_word_tokenizer_splits_words_and_punctuation() {
        assert_eq!(
            tokens("Hello, world! It's   fine."),
            vec!["Hello", ",", "world", "!", "It", "'", "s", "fine", "."]
        );
    }

    #[test]
    fn test_word_tokenizer_handles_unicode() {
        assert_eq!(tokens("naïve café"), vec!["naïve", "café"]);
        assert_eq!(WordTokenizer.count_tokens("").unwrap(), 0);
        assert_eq!(WordTokenizer.count_tokens("  \n ").unwrap(), 0);
    }

    #[test]
    fn test_word_tokenizer_slices_retokenize_identically() {
        let text = "Refund requests, once approved, take 5-7 business days.";
        let spans = WordTokenizer.token_spans(text).unwrap();
        let slice = &text[spans[2].start..spans[8].end];
        assert_eq!(WordTokenizer.count_tokens(slice).unwrap(), 7);
    }

    #[test]
    fn test_hf_tokenizer_missing_file() {
        let err = HfTokenizer::from_file("/nonexistent/tokenizer.json")
            .err()
            .unwrap();
        assert!(matches!(err, RagError::Tokenizer(_)));
    }
}
