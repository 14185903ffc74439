//! Retrieval over a built tree.
//!
//! Two strategies, both ranking by cosine similarity to the query:
//!
//! | Method | Candidates | Cost |
//! |--------|------------|------|
//! | [`RetrievalMethod::TreeTraversal`] | roots, then children of each level's top-k | O(k · branching · depth) |
//! | [`RetrievalMethod::CollapsedTree`] | every node, flat | O(N) |
//!
//! Traversal follows the coarse-to-fine path a reader would take; the
//! collapsed search lets a leaf outrank a summary when it matches better.
//!
//! Sorting is stable everywhere, so equal scores keep candidate order
//! (arena order for the collapsed search).

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capability::Embedder;
use crate::error::{Error, Result};
use crate::hierarchy::{HierarchyTree, Node};

/// Child previews listed under each context block.
const MAX_CHILD_PREVIEWS: usize = 3;

/// How to search the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// Top-down: score a level, keep top-k, descend into their children.
    #[default]
    TreeTraversal,
    /// Flat: score every node.
    CollapsedTree,
}

impl RetrievalMethod {
    /// Wire name (`tree_traversal` / `collapsed_tree`).
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMethod::TreeTraversal => "tree_traversal",
            RetrievalMethod::CollapsedTree => "collapsed_tree",
        }
    }
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tree_traversal" => Ok(RetrievalMethod::TreeTraversal),
            "collapsed_tree" => Ok(RetrievalMethod::CollapsedTree),
            other => Err(Error::UnknownRetrievalMethod(other.to_string())),
        }
    }
}

/// Retriever defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Results returned when no `k` is given.
    pub top_k: usize,
    /// Method used when none is given.
    pub method: RetrievalMethod,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            method: RetrievalMethod::TreeTraversal,
        }
    }
}

impl RetrieverConfig {
    /// Set default k.
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// Set default method.
    pub fn with_method(mut self, method: RetrievalMethod) -> Self {
        self.method = method;
        self
    }
}

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na.sqrt() * nb.sqrt())) as f32
}

/// A retrieved node with its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredNode<'t> {
    /// The node.
    pub node: &'t Node,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Searches a tree with query embeddings from an [`Embedder`].
pub struct Retriever<'t> {
    tree: &'t HierarchyTree,
    embedder: &'t dyn Embedder,
    config: RetrieverConfig,
}

impl<'t> Retriever<'t> {
    /// Retriever with default configuration.
    pub fn new(tree: &'t HierarchyTree, embedder: &'t dyn Embedder) -> Self {
        Self {
            tree,
            embedder,
            config: RetrieverConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: RetrieverConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default k.
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Embed `query` and search. `k` defaults to the configured `top_k`.
    pub fn retrieve(
        &self,
        query: &str,
        method: RetrievalMethod,
        k: Option<usize>,
    ) -> Result<Vec<ScoredNode<'t>>> {
        let embedding = self.embedder.create_embedding(query)?;
        self.retrieve_by_embedding(&embedding, method, k)
    }

    /// Search with a precomputed query embedding.
    pub fn retrieve_by_embedding(
        &self,
        query: &[f32],
        method: RetrievalMethod,
        k: Option<usize>,
    ) -> Result<Vec<ScoredNode<'t>>> {
        if let Some(dim) = self.tree.dimension() {
            if query.len() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    found: query.len(),
                });
            }
        }
        let k = k.unwrap_or(self.config.top_k);
        let results = match method {
            RetrievalMethod::TreeTraversal => self.tree_traversal(query, k),
            RetrievalMethod::CollapsedTree => self.collapsed_tree(query, k),
        };
        debug!(%method, k, returned = results.len(), "retrieved");
        Ok(results)
    }

    /// Search and render the hits as answer context.
    pub fn retrieve_with_context(
        &self,
        query: &str,
        method: RetrievalMethod,
        k: Option<usize>,
        include_children: bool,
    ) -> Result<String> {
        let results = self.retrieve(query, method, k)?;
        Ok(self.render_context(&results, include_children))
    }

    /// Render hits as numbered blocks, each optionally followed by up to
    /// three child texts.
    ///
    /// ```text
    /// [Document 1] (Relevance: 0.912)
    /// <node text>
    ///   [Sub-document 1.1]
    ///   <child text>
    ///
    /// [Document 2] ...
    /// ```
    pub fn render_context(&self, results: &[ScoredNode<'_>], include_children: bool) -> String {
        let mut parts: Vec<String> = Vec::new();
        for (i, hit) in results.iter().enumerate() {
            parts.push(format!("[Document {}] (Relevance: {:.3})", i + 1, hit.score));
            parts.push(hit.node.text.clone());
            if include_children {
                let children = self.tree.children_of(hit.node);
                for (j, child) in children.iter().take(MAX_CHILD_PREVIEWS).enumerate() {
                    parts.push(format!("  [Sub-document {}.{}]", i + 1, j + 1));
                    parts.push(format!("  {}", child.text));
                }
            }
            parts.push(String::new());
        }
        parts.join("\n")
    }

    fn tree_traversal(&self, query: &[f32], k: usize) -> Vec<ScoredNode<'t>> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current: Vec<&'t Node> = self.tree.root_nodes();
        let mut retrieved: Vec<ScoredNode<'t>> = Vec::new();

        while !current.is_empty() {
            // Only first visits expand, so each node's children are queued once.
            let fresh: Vec<ScoredNode<'t>> = top_k(score_all(query, &current), k)
                .into_iter()
                .filter(|h| seen.insert(h.node.id.as_str()))
                .collect();

            let mut next: Vec<&'t Node> = Vec::new();
            let mut queued: HashSet<&str> = HashSet::new();
            for hit in &fresh {
                for child in self.tree.children_of(hit.node) {
                    if !seen.contains(child.id.as_str()) && queued.insert(child.id.as_str()) {
                        next.push(child);
                    }
                }
            }

            retrieved.extend(fresh);
            current = next;
        }

        top_k(retrieved, k)
    }

    fn collapsed_tree(&self, query: &[f32], k: usize) -> Vec<ScoredNode<'t>> {
        let all: Vec<&'t Node> = self.tree.all_nodes().iter().collect();
        top_k(score_all(query, &all), k)
    }
}

fn score_all<'t>(query: &[f32], nodes: &[&'t Node]) -> Vec<ScoredNode<'t>> {
    nodes
        .iter()
        .map(|&node| ScoredNode {
            node,
            score: cosine_similarity(query, &node.embedding),
        })
        .collect()
}

/// Stable descending sort, truncated to `k`.
fn top_k(mut hits: Vec<ScoredNode<'_>>, k: usize) -> Vec<ScoredNode<'_>> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(k);
    hits
}
