//! Offline capability adapters.
//!
//! None of these call a model. They exist so an index can be built and
//! queried without network access, and so tests are deterministic.
//!
//! | Adapter | Strategy |
//! |---------|----------|
//! | [`HashingEmbedder`] | signed feature hashing of word tokens (xxh64), L2-normalized |
//! | [`ExtractiveSummarizer`] | leading sentences up to a length budget |
//! | [`ConcatSummarizer`] | joins inputs with a separator, truncates |
//! | [`ExtractiveAnswerer`] | context sentences ranked by token overlap with the question |
//! | [`FnEmbedder`] / [`FnSummarizer`] | wrap closures |

use std::collections::HashSet;

use xxhash_rust::xxh64::xxh64;

use super::{Answer, Answerer, Embedder, Summarizer};
use crate::error::{Error, Result};

/// Lower-cased alphanumeric word tokens.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Split text into trimmed sentences ending at `.`, `!`, `?` or a newline.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let end = i + c.len_utf8();
            let s = text[start..end].trim();
            if !s.is_empty() && s != "." {
                out.push(s);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Truncate to at most `max` characters, appending `...` when cut.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Deterministic feature-hashing embedder.
///
/// Each token is hashed with xxh64; the low bits pick a bucket and the top
/// bit picks the sign. The resulting vector is L2-normalized, so cosine
/// similarity reflects shared vocabulary.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    seed: u64,
}

impl HashingEmbedder {
    /// Embedder producing vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self { dimension, seed: 0 }
    }

    /// Set the hash seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashingEmbedder {
    fn create_embedding(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::EmptyText);
        }
        if self.dimension == 0 {
            return Err(Error::invalid("dimension", "must be > 0"));
        }

        let mut v = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let h = xxh64(token.as_bytes(), self.seed);
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}

/// Summary made of the leading sentences of the inputs.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    max_sentences: usize,
}

impl ExtractiveSummarizer {
    /// At most three sentences.
    pub fn new() -> Self {
        Self { max_sentences: 3 }
    }

    /// Set the sentence limit.
    pub fn with_max_sentences(mut self, n: usize) -> Self {
        self.max_sentences = n.max(1);
        self
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, texts: &[&str], max_length: usize) -> Result<String> {
        let combined = texts.join("\n");
        let all = sentences(&combined);
        let Some(first) = all.first() else {
            return Err(Error::capability("summarization", "no text to summarize"));
        };

        let mut summary = truncate_chars(first, max_length.max(4));
        for s in all.iter().skip(1).take(self.max_sentences.saturating_sub(1)) {
            if summary.chars().count() + 1 + s.chars().count() > max_length {
                break;
            }
            summary.push(' ');
            summary.push_str(s);
        }
        Ok(summary)
    }
}

/// A simple concatenation summarizer (for testing).
#[derive(Debug, Clone, Default)]
pub struct ConcatSummarizer {
    /// Separator between items.
    pub separator: String,
    /// Maximum length (truncate if exceeded).
    pub max_len: Option<usize>,
}

impl ConcatSummarizer {
    /// Create a new concatenation summarizer.
    pub fn new() -> Self {
        Self {
            separator: " | ".to_string(),
            max_len: None,
        }
    }

    /// Set separator.
    pub fn with_separator(mut self, sep: impl Into<String>) -> Self {
        self.separator = sep.into();
        self
    }

    /// Set maximum length. The per-call `max_length` still applies.
    pub fn with_max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }
}

impl Summarizer for ConcatSummarizer {
    fn summarize(&self, texts: &[&str], max_length: usize) -> Result<String> {
        let joined = texts
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(&self.separator);
        if joined.is_empty() {
            return Err(Error::capability("summarization", "no text to summarize"));
        }

        let limit = self.max_len.map_or(max_length, |m| m.min(max_length));
        Ok(truncate_chars(&joined, limit.max(4)))
    }
}

/// Answers with the context sentences sharing the most words with the question.
#[derive(Debug, Clone)]
pub struct ExtractiveAnswerer {
    max_sentences: usize,
}

const NO_ANSWER: &str = "The provided context does not contain enough information to answer this question.";

impl ExtractiveAnswerer {
    /// At most three sentences per answer.
    pub fn new() -> Self {
        Self { max_sentences: 3 }
    }

    /// Set the sentence limit.
    pub fn with_max_sentences(mut self, n: usize) -> Self {
        self.max_sentences = n.max(1);
        self
    }
}

impl Default for ExtractiveAnswerer {
    fn default() -> Self {
        Self::new()
    }
}

impl Answerer for ExtractiveAnswerer {
    fn answer_question(&self, context: &str, question: &str) -> Result<Answer> {
        let wanted: HashSet<String> = tokens(question).filter(|t| t.chars().count() > 2).collect();

        // Drop the `[Document i]` / `[Sub-document i.j]` headers.
        let body: String = context
            .lines()
            .filter(|l| {
                let l = l.trim_start();
                !(l.starts_with("[Document ") || l.starts_with("[Sub-document "))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut scored: Vec<(usize, &str, f64)> = sentences(&body)
            .into_iter()
            .enumerate()
            .map(|(pos, s)| {
                let have: HashSet<String> = tokens(s).collect();
                let hits = wanted.iter().filter(|w| have.contains(*w)).count();
                let score = if wanted.is_empty() {
                    0.0
                } else {
                    hits as f64 / wanted.len() as f64
                };
                (pos, s, score)
            })
            .filter(|(_, _, score)| *score > 0.0)
            .collect();

        if scored.is_empty() {
            return Ok(Answer {
                answer: NO_ANSWER.to_string(),
                confidence: 0.0,
                context: context.to_string(),
                question: question.to_string(),
            });
        }

        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        let confidence = scored[0].2.clamp(0.0, 1.0);
        scored.truncate(self.max_sentences);
        scored.sort_by_key(|(pos, _, _)| *pos);

        Ok(Answer {
            answer: scored.iter().map(|(_, s, _)| *s).collect::<Vec<_>>().join(" "),
            confidence,
            context: context.to_string(),
            question: question.to_string(),
        })
    }
}

/// An embedder backed by a closure.
pub struct FnEmbedder<F> {
    f: F,
    dimension: Option<usize>,
}

impl<F> FnEmbedder<F>
where
    F: Fn(&str) -> Result<Vec<f32>> + Send + Sync,
{
    /// Create an embedder from a function.
    pub fn new(f: F) -> Self {
        Self { f, dimension: None }
    }

    /// Declare the output dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

impl<F> Embedder for FnEmbedder<F>
where
    F: Fn(&str) -> Result<Vec<f32>> + Send + Sync,
{
    fn create_embedding(&self, text: &str) -> Result<Vec<f32>> {
        (self.f)(text)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

/// A function-based summarizer.
#[derive(Clone)]
pub struct FnSummarizer<F> {
    f: F,
}

impl<F> FnSummarizer<F> {
    /// Create a summarizer from a function.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Summarizer for FnSummarizer<F>
where
    F: Fn(&[&str], usize) -> Result<String> + Send + Sync,
{
    fn summarize(&self, texts: &[&str], max_length: usize) -> Result<String> {
        (self.f)(texts, max_length)
    }
}

/// Create a summarizer from a closure.
pub fn from_fn<F>(f: F) -> FnSummarizer<F>
where
    F: Fn(&[&str], usize) -> Result<String> + Send + Sync,
{
    FnSummarizer::new(f)
}
