//! Model capabilities consumed by tree building and querying.
//!
//! The core never talks to a model directly. It needs three things:
//!
//! | Trait | Used by | Contract |
//! |-------|---------|----------|
//! | [`Embedder`] | builder, retriever | text → fixed-length vector; blank text is an error |
//! | [`Summarizer`] | builder | texts → one non-empty summary, bounded by `max_length` |
//! | [`Answerer`] | index facade | (context, question) → [`Answer`] |
//!
//! All methods are blocking and all traits are `Send + Sync`, so one set of
//! adapters can be shared across threads behind an `Arc`.
//!
//! Adapters:
//!
//! - [`local`]: deterministic, offline implementations (feature hashing,
//!   extractive summaries, overlap-ranked answers) plus closure adapters.
//! - `openai` (feature `openai`): OpenAI-compatible HTTP endpoints.
//!
//! [`Capabilities::from_config`] picks one set at construction time.

pub mod local;
#[cfg(feature = "openai")]
pub mod openai;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::IndexConfig;
use crate::error::Result;

pub use local::{
    from_fn, ConcatSummarizer, ExtractiveAnswerer, ExtractiveSummarizer, FnEmbedder, FnSummarizer,
    HashingEmbedder,
};

/// Turns text into a vector.
pub trait Embedder: Send + Sync {
    /// Embed one text. Blank text fails with [`crate::Error::EmptyText`].
    fn create_embedding(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch, one vector per text, in order.
    fn create_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.create_embedding(t)).collect()
    }

    /// Output dimension, when known up front.
    fn dimension(&self) -> Option<usize> {
        None
    }
}

/// Condenses a group of texts into one summary.
pub trait Summarizer: Send + Sync {
    /// Summarize `texts`, aiming for at most `max_length` units (characters
    /// for local adapters, tokens for model-backed ones).
    fn summarize(&self, texts: &[&str], max_length: usize) -> Result<String>;
}

/// Answers a question from retrieved context.
pub trait Answerer: Send + Sync {
    /// Produce an answer grounded in `context`.
    fn answer_question(&self, context: &str, question: &str) -> Result<Answer>;
}

/// An answer with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Answer text.
    pub answer: String,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    /// Context the answer was drawn from.
    pub context: String,
    /// The question asked.
    pub question: String,
}

impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    fn create_embedding(&self, text: &str) -> Result<Vec<f32>> {
        (**self).create_embedding(text)
    }

    fn create_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).create_embeddings(texts)
    }

    fn dimension(&self) -> Option<usize> {
        (**self).dimension()
    }
}

impl<T: Summarizer + ?Sized> Summarizer for Arc<T> {
    fn summarize(&self, texts: &[&str], max_length: usize) -> Result<String> {
        (**self).summarize(texts, max_length)
    }
}

impl<T: Answerer + ?Sized> Answerer for Arc<T> {
    fn answer_question(&self, context: &str, question: &str) -> Result<Answer> {
        (**self).answer_question(context, question)
    }
}

/// One embedder, summarizer and answerer, shared by an index.
#[derive(Clone)]
pub struct Capabilities {
    /// Embedding capability.
    pub embedder: Arc<dyn Embedder>,
    /// Summarization capability.
    pub summarizer: Arc<dyn Summarizer>,
    /// Question answering capability.
    pub answerer: Arc<dyn Answerer>,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("embedding_dimension", &self.embedder.dimension())
            .finish_non_exhaustive()
    }
}

impl Capabilities {
    /// Bundle explicit adapters.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        summarizer: Arc<dyn Summarizer>,
        answerer: Arc<dyn Answerer>,
    ) -> Self {
        Self {
            embedder,
            summarizer,
            answerer,
        }
    }

    /// Offline adapters: hashing embedder of `dimension`, extractive
    /// summarizer and answerer.
    pub fn local(dimension: usize) -> Self {
        Self::new(
            Arc::new(HashingEmbedder::new(dimension)),
            Arc::new(ExtractiveSummarizer::new()),
            Arc::new(ExtractiveAnswerer::new()),
        )
    }

    /// HTTP adapters when an API key is configured and the `openai` feature
    /// is compiled in; local adapters otherwise.
    pub fn from_config(config: &IndexConfig) -> Self {
        #[cfg(feature = "openai")]
        {
            if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
                info!(base = %config.api_base, "using OpenAI-compatible capabilities");
                return Self::new(
                    Arc::new(openai::OpenAiEmbedder::new(
                        &config.api_base,
                        key,
                        &config.embedding_model,
                    )),
                    Arc::new(openai::OpenAiSummarizer::new(
                        &config.api_base,
                        key,
                        &config.summarization_model,
                    )),
                    Arc::new(openai::OpenAiAnswerer::new(
                        &config.api_base,
                        key,
                        &config.answer_model,
                    )),
                );
            }
        }

        info!(
            dimension = config.embedding_dimension,
            api_key_set = config.api_key.is_some(),
            "using local capabilities"
        );
        Self::local(config.embedding_dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_batch_embeds_in_order() {
        let e = FnEmbedder::new(|t: &str| Ok(vec![t.len() as f32]));
        let out = e.create_embeddings(&["a", "bbb"]).unwrap();
        assert_eq!(out, vec![vec![1.0], vec![3.0]]);
    }

    #[test]
    fn test_from_config_without_key_is_local() {
        let config = IndexConfig::default().with_embedding_dimension(32);
        let caps = Capabilities::from_config(&config);
        assert_eq!(caps.embedder.dimension(), Some(32));
    }

    #[test]
    fn test_arc_forwarding() {
        let caps = Capabilities::local(16);
        let v = caps.embedder.create_embedding("revenue grew").unwrap();
        assert_eq!(v.len(), 16);
        let s = caps.summarizer.summarize(&["One. Two."], 200).unwrap();
        assert!(!s.is_empty());
    }
}
