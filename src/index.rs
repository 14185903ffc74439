//! The index facade: chunk, embed, build, query, persist.
//!
//! ```text
//! documents ──chunk──► chunks ──embed (batches of 100)──► TreeBuilder ──► tree
//!                                                                        │
//! question ──► Retriever ──► context ──► Answerer ──► QueryResponse ◄────┘
//! ```
//!
//! The index holds at most one tree. A new tree replaces the old one only
//! after its build (or load) succeeds.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::capability::{Answer, Capabilities};
use crate::chunk::TextChunker;
use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::hierarchy::{Chunk, HierarchyTree, TreeBuilder, TreeStats};
use crate::retrieve::{RetrievalMethod, Retriever};

/// Texts sent to the embedder per call.
pub const EMBEDDING_BATCH_SIZE: usize = 100;

/// Characters of node text kept in [`RetrievedNode::text_preview`].
const PREVIEW_CHARS: usize = 200;

/// A retrieved node as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedNode {
    /// Node id.
    pub node_id: String,
    /// Node level.
    pub level: usize,
    /// Cosine similarity to the question.
    pub score: f32,
    /// First 200 characters of the text, with `...` when cut.
    pub text_preview: String,
}

/// Result of [`HierarchicalIndex::query`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// Answer with its context and question.
    pub answer: Answer,
    /// Nodes the context was built from, best first.
    pub retrieved_nodes: Vec<RetrievedNode>,
    /// Method used.
    pub retrieval_method: RetrievalMethod,
}

/// A hierarchical index over a document collection.
#[derive(Debug)]
pub struct HierarchicalIndex {
    config: IndexConfig,
    capabilities: Capabilities,
    tree: Option<HierarchyTree>,
}

impl HierarchicalIndex {
    /// Empty index using `capabilities`.
    pub fn new(config: IndexConfig, capabilities: Capabilities) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            capabilities,
            tree: None,
        })
    }

    /// Empty index with capabilities chosen by [`Capabilities::from_config`].
    pub fn from_config(config: IndexConfig) -> Result<Self> {
        let capabilities = Capabilities::from_config(&config);
        Self::new(config, capabilities)
    }

    /// Configuration in use.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Capabilities in use.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The current tree, if one has been built or loaded.
    pub fn tree(&self) -> Option<&HierarchyTree> {
        self.tree.as_ref()
    }

    /// Chunk each document, then [`HierarchicalIndex::add_chunks`].
    pub fn add_documents<I, S>(&mut self, documents: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let chunker = TextChunker::new(self.config.chunk_size, self.config.chunk_overlap)?;
        let mut n_docs = 0;
        let mut chunks = Vec::new();
        for doc in documents {
            chunks.extend(chunker.chunk(doc.as_ref()));
            n_docs += 1;
        }
        info!(documents = n_docs, chunks = chunks.len(), "chunked documents");
        self.add_chunks(chunks)
    }

    /// Embed `chunks` and build a new tree over them.
    ///
    /// On error the previous tree, if any, is kept.
    pub fn add_chunks(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Err(Error::EmptyInput);
        }
        let started = Instant::now();

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBEDDING_BATCH_SIZE) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let batch_embeddings = self.capabilities.embedder.create_embeddings(&texts)?;
            if batch_embeddings.len() != texts.len() {
                return Err(Error::capability(
                    "embedding",
                    format!("expected {} embeddings, got {}", texts.len(), batch_embeddings.len()),
                ));
            }
            embeddings.extend(batch_embeddings);
        }
        info!(
            chunks = chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "embedded chunks"
        );

        let builder = TreeBuilder::new(
            self.config.tree.clone(),
            self.capabilities.embedder.as_ref(),
            self.capabilities.summarizer.as_ref(),
        );
        let tree = builder.build(&chunks, &embeddings)?;
        if self.tree.is_some() {
            info!("replacing existing tree");
        }
        self.tree = Some(tree);
        Ok(())
    }

    /// Answer `question` from the tree.
    ///
    /// `method` and `k` default to the configured retriever settings.
    pub fn query(
        &self,
        question: &str,
        method: Option<RetrievalMethod>,
        k: Option<usize>,
    ) -> Result<QueryResponse> {
        let tree = self.require_tree()?;
        let method = method.unwrap_or(self.config.retriever.method);

        let retriever = Retriever::new(tree, self.capabilities.embedder.as_ref())
            .with_config(self.config.retriever.clone());
        let hits = retriever.retrieve(question, method, k)?;
        let context = retriever.render_context(&hits, true);
        let answer = self.capabilities.answerer.answer_question(&context, question)?;

        let retrieved_nodes = hits
            .iter()
            .map(|h| RetrievedNode {
                node_id: h.node.id.clone(),
                level: h.node.level,
                score: h.score,
                text_preview: preview(&h.node.text),
            })
            .collect();

        Ok(QueryResponse {
            answer,
            retrieved_nodes,
            retrieval_method: method,
        })
    }

    /// Normalize the configured metadata keys on every node.
    pub fn normalize_metadata(&mut self) -> Result<usize> {
        let keys = self.config.tree.clustering.metadata_keys.clone();
        let tree = self
            .tree
            .as_mut()
            .ok_or_else(|| Error::invalid("tree", "no documents added"))?;
        Ok(tree.normalize_metadata(&keys))
    }

    /// Save the tree into `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        self.require_tree()?.save(dir)
    }

    /// Replace the tree with one saved in `dir`.
    ///
    /// Fails, keeping the current tree, when the saved embeddings do not
    /// match the embedder's declared dimension.
    pub fn load(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let tree = HierarchyTree::load(dir)?;
        if let (Some(expected), Some(found)) = (self.capabilities.embedder.dimension(), tree.dimension()) {
            if expected != found {
                warn!(expected, found, "saved tree does not match embedder dimension");
                return Err(Error::DimensionMismatch { expected, found });
            }
        }
        self.tree = Some(tree);
        Ok(())
    }

    /// Node counts of the current tree.
    pub fn statistics(&self) -> Option<TreeStats> {
        self.tree.as_ref().map(HierarchyTree::stats)
    }

    fn require_tree(&self) -> Result<&HierarchyTree> {
        self.tree
            .as_ref()
            .ok_or_else(|| Error::invalid("tree", "no documents added; call add_documents first"))
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, unused_results)]
mod tests {
    use super::*;

    #[test]
    fn test_preview() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(250);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 203);
        assert!(p.ends_with("..."));
        assert_eq!(preview(&"x".repeat(200)), "x".repeat(200));
    }

    #[test]
    fn test_query_without_tree_fails() {
        let index = HierarchicalIndex::new(IndexConfig::default(), Capabilities::local(16)).unwrap();
        assert!(matches!(
            index.query("anything", None, None),
            Err(Error::InvalidParameter { name: "tree", .. })
        ));
        assert!(index.statistics().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = IndexConfig::default().with_chunking(10, 20);
        assert!(HierarchicalIndex::new(config, Capabilities::local(16)).is_err());
    }
}
