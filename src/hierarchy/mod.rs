//! Hierarchical structures for multi-resolution retrieval.
//!
//! # The Core Insight
//!
//! Information exists at multiple scales. A single question might need:
//!
//! ```text
//! Question                        │ Scale Needed
//! ────────────────────────────────┼──────────────────────
//! "What was Q3 revenue?"          │ Single passage (leaf)
//! "Summarize the energy sector"   │ Cluster summary (level 1-2)
//! "How do the banks compare?"     │ Cross-cluster synthesis (root)
//! ```
//!
//! A [`HierarchyTree`] keeps every scale: leaves hold the original passages,
//! each level above holds summaries of clusters of the level below.
//!
//! # Layout
//!
//! ```text
//! level 2          level_2_cluster_0
//!                  /               \
//! level 1   level_1_cluster_0   level_1_cluster_1
//!            /    |     \          /       \
//! level 0  leaf_0 leaf_1 leaf_2  leaf_2   leaf_3
//! ```
//!
//! Nodes live in an arena and reference children by id. Under soft
//! clustering a leaf can sit under two parents (`leaf_2` above); it is
//! stored once.
//!
//! # Module Overview
//!
//! | Module | Provides |
//! |--------|----------|
//! | `node` | [`Node`], [`Chunk`], [`Metadata`] |
//! | `tree` | [`HierarchyTree`] arena and accessors |
//! | `builder` | [`TreeBuilder`]: cluster, summarize, embed, repeat |
//! | `persist` | `save`/`load` as `tree.json` + `tree.bin` |
//! | `validate` | [`HealthCheck`] for built or loaded trees |
//!
//! # References
//!
//! - Sarthi et al. (2024). "RAPTOR: Recursive Abstractive Processing for
//!   Tree-Organized Retrieval." ICLR 2024.

mod builder;
mod node;
mod persist;
mod tree;
mod validate;

pub use builder::{TreeBuilder, TreeConfig};
pub use node::{cluster_id, leaf_id, Chunk, Metadata, MetadataValue, Node};
pub use persist::{BIN_FILE, JSON_FILE};
pub use tree::{HierarchyTree, TreeStats};
pub use validate::{
    validate_tree_structure, HealthCheck, HealthReport, Severity, ValidationIssue,
    ValidationReport,
};
