//! # canopy
//!
//! Hierarchical multi-resolution index over a document collection.
//!
//! Passages are embedded, softly clustered, and each cluster is summarized
//! into a parent node. Repeating this per level gives a tree whose upper
//! levels hold summaries and whose leaves hold source text:
//!
//! ```text
//! level 2              [root summary]
//!                     /              \
//! level 1     [summary A]          [summary B]
//!             /    |    \          /    |    \
//! level 0   c0    c1    c2       c2    c3    c4     (c2 in both: soft)
//! ```
//!
//! Queries either descend from the roots (tree traversal) or score every
//! node at once (collapsed tree); the best nodes become the context handed
//! to the answer capability.
//!
//! | Module | Role |
//! |---|---|
//! | [`capability`] | embedding, summarization and answer traits with local and HTTP adapters |
//! | [`chunk`] | overlapping token windows |
//! | [`cluster`] | reduction, GMM / k-means, metadata grouping |
//! | [`hierarchy`] | nodes, tree construction, validation, persistence |
//! | [`retrieve`] | tree traversal and collapsed-tree search |
//! | [`index`] | the facade tying the pieces together |
//!
//! ```no_run
//! use canopy::{Capabilities, HierarchicalIndex, IndexConfig};
//!
//! let mut index = HierarchicalIndex::new(IndexConfig::default(), Capabilities::local(384))?;
//! index.add_documents(["Crude output rose.", "Bank margins widened."])?;
//! let response = index.query("What happened to crude output?", None, None)?;
//! println!("{}", response.answer.answer);
//! # Ok::<(), canopy::Error>(())
//! ```

pub mod capability;
pub mod chunk;
pub mod cluster;
pub mod config;
/// Error types used across `canopy`.
pub mod error;
pub mod hierarchy;
pub mod index;
pub mod retrieve;


pub use capability::{Answer, Answerer, Capabilities, Embedder, Summarizer};
pub use chunk::TextChunker;
pub use cluster::{ClusterStrategy, ClusteringAlgorithm, ClusteringConfig, RaptorClustering};
pub use config::IndexConfig;
pub use error::{Error, Result};
pub use hierarchy::{Chunk, HealthCheck, HierarchyTree, Node, TreeBuilder, TreeConfig};
pub use index::{HierarchicalIndex, QueryResponse, RetrievedNode};
pub use retrieve::{RetrievalMethod, Retriever, RetrieverConfig};
