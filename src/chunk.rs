//! Token-window chunking.
//!
//! Splits a document into overlapping windows of whitespace tokens:
//!
//! ```text
//! tokens:  t0 t1 t2 t3 t4 t5 t6 t7 t8 t9
//! size 4, overlap 1
//! chunk 0: t0 t1 t2 t3
//! chunk 1:          t3 t4 t5 t6
//! chunk 2:                   t6 t7 t8 t9
//! ```
//!
//! A window that does not reach the end of the text is pulled back to the
//! last sentence end (`.`, `!`, `?`) within its final 50 tokens, and the next
//! window starts `overlap` tokens before that cut.

use crate::error::{Error, Result};
use crate::hierarchy::{Chunk, MetadataValue};

/// How far back a window may be pulled to end on a sentence.
const SENTENCE_LOOKBACK: usize = 50;

/// Splits text into overlapping [`Chunk`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

impl TextChunker {
    /// Chunker with `chunk_size` tokens per window and `chunk_overlap` shared.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::invalid("chunk_size", "must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::invalid(
                "chunk_overlap",
                format!("chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"),
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Tokens per window.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Tokens shared by consecutive windows.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Chunk one document. Blank text yields no chunks.
    ///
    /// Each chunk carries `chunk_id`, `start_token` and `end_token`
    /// (exclusive) metadata.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let n = tokens.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < n {
            let end = (start + self.chunk_size).min(n);
            let cut = if end < n {
                sentence_cut(&tokens, start, end)
            } else {
                end
            };

            let chunk = Chunk::new(tokens[start..cut].join(" "))
                .with_metadata("chunk_id", MetadataValue::from(chunks.len()))
                .with_metadata("start_token", MetadataValue::from(start))
                .with_metadata("end_token", MetadataValue::from(cut));
            chunks.push(chunk);

            if cut == n {
                break;
            }
            start = cut.saturating_sub(self.chunk_overlap).max(start + 1);
        }

        chunks
    }
}

/// End of the window `[start, end)`, moved back to just after the last
/// sentence-ending token in the final [`SENTENCE_LOOKBACK`] tokens.
fn sentence_cut(tokens: &[&str], start: usize, end: usize) -> usize {
    let floor = end - SENTENCE_LOOKBACK.min(end - start);
    (floor..end)
        .rev()
        .find(|&i| tokens[i].ends_with(['.', '!', '?']))
        .map_or(end, |i| i + 1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, unused_results)]
mod tests {
    use super::*;

    fn meta(c: &Chunk, key: &str) -> i64 {
        c.metadata[key].as_i64().unwrap()
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(matches!(
            TextChunker::new(10, 10),
            Err(Error::InvalidParameter { name: "chunk_overlap", .. })
        ));
        assert!(TextChunker::new(10, 12).is_err());
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(10, 9).is_ok());
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let c = TextChunker::new(4, 1).unwrap();
        assert!(c.chunk("").is_empty());
        assert!(c.chunk(" \n\t ").is_empty());
    }

    #[test]
    fn test_windows_and_overlap() {
        let c = TextChunker::new(4, 1).unwrap();
        let chunks = c.chunk("a b c d e f g h i j");
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["a b c d", "d e f g", "g h i j"]);
        assert_eq!(meta(&chunks[1], "chunk_id"), 1);
        assert_eq!(meta(&chunks[1], "start_token"), 3);
        assert_eq!(meta(&chunks[1], "end_token"), 7);
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let c = TextChunker::default();
        let chunks = c.chunk("Revenue rose 4%.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Revenue rose 4%.");
        assert_eq!(meta(&chunks[0], "end_token"), 3);
    }

    #[test]
    fn test_window_backs_off_to_sentence_end() {
        let c = TextChunker::new(6, 0).unwrap();
        let chunks = c.chunk("One two three. Four five six seven eight.");
        assert_eq!(chunks[0].text, "One two three.");
        assert_eq!(chunks[1].text, "Four five six seven eight.");
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_every_token_covered() {
        let text: String = (0..200).map(|i| format!("w{i} ")).collect();
        let c = TextChunker::new(30, 7).unwrap();
        let chunks = c.chunk(&text);
        let mut covered = vec![false; 200];
        for ch in &chunks {
            for t in meta(ch, "start_token")..meta(ch, "end_token") {
                covered[t as usize] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
        assert_eq!(meta(chunks.last().unwrap(), "end_token"), 200);
    }
}
