//! Index configuration.
//!
//! [`IndexConfig`] gathers everything an index needs: tree building,
//! clustering, retrieval defaults, chunking and capability selection.
//! Values come from [`Default`], `with_*` builders, or `CANOPY_*`
//! environment variables via [`IndexConfig::from_env`].
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CANOPY_MAX_DEPTH` | `tree.max_depth` |
//! | `CANOPY_MIN_CLUSTER_SIZE` | `tree.clustering.min_cluster_size` |
//! | `CANOPY_MAX_CLUSTER_SIZE` | `tree.clustering.max_cluster_size` |
//! | `CANOPY_REDUCTION_DIMENSION` | `tree.clustering.reduction_dimension` |
//! | `CANOPY_SUMMARIZATION_LENGTH` | `tree.summarization_length` |
//! | `CANOPY_USE_METADATA_CLUSTERING` | `tree.clustering.use_metadata_clustering` |
//! | `CANOPY_METADATA_KEYS` | `tree.clustering.metadata_keys` (comma-separated) |
//! | `CANOPY_TOP_K` | `retriever.top_k` |
//! | `CANOPY_TRAVERSAL_METHOD` | `retriever.method` |
//! | `CANOPY_CHUNK_SIZE` | `chunk_size` |
//! | `CANOPY_CHUNK_OVERLAP` | `chunk_overlap` |
//! | `CANOPY_EMBEDDING_DIMENSION` | `embedding_dimension` |
//! | `CANOPY_API_KEY` | `api_key` |
//! | `CANOPY_API_BASE` | `api_base` |
//! | `CANOPY_EMBEDDING_MODEL` | `embedding_model` |
//! | `CANOPY_SUMMARIZATION_MODEL` | `summarization_model` |
//! | `CANOPY_ANSWER_MODEL` | `answer_model` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hierarchy::TreeConfig;
use crate::retrieve::{RetrievalMethod, RetrieverConfig};

/// Configuration for a [`crate::HierarchicalIndex`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Tree building and clustering.
    pub tree: TreeConfig,
    /// Retrieval defaults.
    pub retriever: RetrieverConfig,
    /// Tokens per chunk.
    pub chunk_size: usize,
    /// Tokens shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Output dimension of the local hashing embedder.
    pub embedding_dimension: usize,
    /// API key for the HTTP adapters. Never serialized.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Endpoint base URL.
    pub api_base: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Summarization model name.
    pub summarization_model: String,
    /// Answer model name.
    pub answer_model: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            tree: TreeConfig::default(),
            retriever: RetrieverConfig::default(),
            chunk_size: 512,
            chunk_overlap: 50,
            embedding_dimension: 384,
            api_key: None,
            api_base: "https://api.openai.com".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            summarization_model: "gpt-3.5-turbo".to_string(),
            answer_model: "gpt-4-turbo-preview".to_string(),
        }
    }
}

impl fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexConfig")
            .field("tree", &self.tree)
            .field("retriever", &self.retriever)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("embedding_dimension", &self.embedding_dimension)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("embedding_model", &self.embedding_model)
            .field("summarization_model", &self.summarization_model)
            .field("answer_model", &self.answer_model)
            .finish()
    }
}

impl IndexConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `CANOPY_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`IndexConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let clustering = &mut config.tree.clustering;

        set_parsed(&lookup, "CANOPY_MAX_DEPTH", &mut config.tree.max_depth)?;
        set_parsed(&lookup, "CANOPY_SUMMARIZATION_LENGTH", &mut config.tree.summarization_length)?;
        set_parsed(&lookup, "CANOPY_MIN_CLUSTER_SIZE", &mut clustering.min_cluster_size)?;
        set_parsed(&lookup, "CANOPY_MAX_CLUSTER_SIZE", &mut clustering.max_cluster_size)?;
        set_parsed(&lookup, "CANOPY_REDUCTION_DIMENSION", &mut clustering.reduction_dimension)?;

        if let Some(val) = lookup("CANOPY_USE_METADATA_CLUSTERING") {
            clustering.use_metadata_clustering = parse_bool("CANOPY_USE_METADATA_CLUSTERING", &val)?;
        }
        if let Some(val) = lookup("CANOPY_METADATA_KEYS") {
            clustering.metadata_keys = val
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }

        set_parsed(&lookup, "CANOPY_TOP_K", &mut config.retriever.top_k)?;
        if let Some(val) = lookup("CANOPY_TRAVERSAL_METHOD") {
            config.retriever.method = val.trim().parse::<RetrievalMethod>()?;
        }

        set_parsed(&lookup, "CANOPY_CHUNK_SIZE", &mut config.chunk_size)?;
        set_parsed(&lookup, "CANOPY_CHUNK_OVERLAP", &mut config.chunk_overlap)?;
        set_parsed(&lookup, "CANOPY_EMBEDDING_DIMENSION", &mut config.embedding_dimension)?;

        config.api_key = lookup("CANOPY_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(val) = lookup("CANOPY_API_BASE") {
            config.api_base = val;
        }
        if let Some(val) = lookup("CANOPY_EMBEDDING_MODEL") {
            config.embedding_model = val;
        }
        if let Some(val) = lookup("CANOPY_SUMMARIZATION_MODEL") {
            config.summarization_model = val;
        }
        if let Some(val) = lookup("CANOPY_ANSWER_MODEL") {
            config.answer_model = val;
        }

        Ok(config)
    }

    /// Replace the tree configuration.
    pub fn with_tree(mut self, tree: TreeConfig) -> Self {
        self.tree = tree;
        self
    }

    /// Replace the retriever configuration.
    pub fn with_retriever(mut self, retriever: RetrieverConfig) -> Self {
        self.retriever = retriever;
        self
    }

    /// Set chunk size and overlap.
    pub fn with_chunking(mut self, size: usize, overlap: usize) -> Self {
        self.chunk_size = size;
        self.chunk_overlap = overlap;
        self
    }

    /// Set the local embedder's dimension.
    pub fn with_embedding_dimension(mut self, dimension: usize) -> Self {
        self.embedding_dimension = dimension;
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the endpoint base URL.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Check field ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.tree.validate()?;
        if self.retriever.top_k == 0 {
            return Err(Error::invalid("top_k", "must be > 0"));
        }
        if self.chunk_size == 0 {
            return Err(Error::invalid("chunk_size", "must be > 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::invalid(
                "chunk_overlap",
                format!(
                    "chunk_overlap ({}) must be less than chunk_size ({})",
                    self.chunk_overlap, self.chunk_size
                ),
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(Error::invalid("embedding_dimension", "must be > 0"));
        }
        Ok(())
    }
}

fn set_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    slot: &mut T,
) -> Result<()>
where
    T::Err: fmt::Display,
{
    if let Some(val) = lookup(name) {
        *slot = val
            .trim()
            .parse()
            .map_err(|e: T::Err| Error::invalid(name, format!("{val:?}: {e}")))?;
    }
    Ok(())
}

fn parse_bool(name: &'static str, val: &str) -> Result<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::invalid(name, format!("{val:?} is not a boolean"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, unused_results)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = IndexConfig::default();
        assert_eq!(c.chunk_size, 512);
        assert_eq!(c.chunk_overlap, 50);
        assert_eq!(c.retriever.top_k, 10);
        assert_eq!(c.tree.max_depth, 3);
        assert!(c.tree.clustering.use_metadata_clustering);
        assert_eq!(c.tree.clustering.metadata_keys, ["sector", "company", "year"]);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let c = IndexConfig::from_lookup(lookup(&[
            ("CANOPY_MAX_DEPTH", "5"),
            ("CANOPY_MIN_CLUSTER_SIZE", " 3 "),
            ("CANOPY_TOP_K", "4"),
            ("CANOPY_TRAVERSAL_METHOD", "collapsed_tree"),
            ("CANOPY_USE_METADATA_CLUSTERING", "FALSE"),
            ("CANOPY_METADATA_KEYS", "company, year,"),
            ("CANOPY_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(c.tree.max_depth, 5);
        assert_eq!(c.tree.clustering.min_cluster_size, 3);
        assert_eq!(c.retriever.top_k, 4);
        assert_eq!(c.retriever.method, RetrievalMethod::CollapsedTree);
        assert!(!c.tree.clustering.use_metadata_clustering);
        assert_eq!(c.tree.clustering.metadata_keys, ["company", "year"]);
        assert_eq!(c.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_from_lookup_rejects_malformed() {
        let err = IndexConfig::from_lookup(lookup(&[("CANOPY_CHUNK_SIZE", "big")])).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "CANOPY_CHUNK_SIZE", .. }));
        assert!(IndexConfig::from_lookup(lookup(&[("CANOPY_TRAVERSAL_METHOD", "bfs")])).is_err());
        assert!(IndexConfig::from_lookup(lookup(&[("CANOPY_USE_METADATA_CLUSTERING", "maybe")])).is_err());
    }

    #[test]
    fn test_validate_overlap() {
        let c = IndexConfig::default().with_chunking(100, 100);
        assert!(matches!(c.validate(), Err(Error::InvalidParameter { name: "chunk_overlap", .. })));
    }

    #[test]
    fn test_api_key_not_serialized_or_printed() {
        let c = IndexConfig::default().with_api_key("sk-secret");
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(!format!("{c:?}").contains("sk-secret"));

        let back: IndexConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.api_key, None);
        assert_eq!(back.tree, c.tree);
    }
}
