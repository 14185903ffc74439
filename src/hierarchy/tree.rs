//! Arena-backed hierarchy.
//!
//! Nodes live in one `Vec` in creation order (leaves first, then each level's
//! parents in cluster order). Children are referenced by id and resolved
//! through an id → position index, so a child listed under several parents
//! is stored once.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use super::builder::TreeConfig;
use super::node::{MetadataValue, Node};
use crate::cluster::normalize_metadata_value;
use crate::error::{Error, Result};

/// A built hierarchy: leaves at level 0, summaries above, roots on top.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyTree {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    root_ids: Vec<String>,
    leaf_ids: Vec<String>,
    config: TreeConfig,
}

/// Node counts of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    /// Total nodes.
    pub total_nodes: usize,
    /// Leaf nodes.
    pub leaf_nodes: usize,
    /// Root nodes.
    pub root_nodes: usize,
    /// Node count per level.
    pub levels: BTreeMap<usize, usize>,
    /// Highest level present (0 for a leaves-only tree).
    pub tree_depth: usize,
}

impl HierarchyTree {
    /// Assemble a tree, checking that ids are unique and every reference resolves.
    pub(crate) fn from_parts(
        nodes: Vec<Node>,
        root_ids: Vec<String>,
        leaf_ids: Vec<String>,
        config: TreeConfig,
    ) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (pos, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), pos).is_some() {
                return Err(Error::invalid("node_id", format!("duplicate node id {}", node.id)));
            }
        }

        let referenced = nodes
            .iter()
            .flat_map(|n| n.children.iter())
            .chain(root_ids.iter())
            .chain(leaf_ids.iter());
        for id in referenced {
            if !index.contains_key(id) {
                return Err(Error::NodeNotFound(id.clone()));
            }
        }

        Ok(Self {
            nodes,
            index,
            root_ids,
            leaf_ids,
            config,
        })
    }

    /// Configuration the tree was built with.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Root ids, in creation order.
    pub fn root_ids(&self) -> &[String] {
        &self.root_ids
    }

    /// Leaf ids, in chunk order.
    pub fn leaf_ids(&self) -> &[String] {
        &self.leaf_ids
    }

    /// Root nodes (the top level).
    pub fn root_nodes(&self) -> Vec<&Node> {
        self.resolve(&self.root_ids)
    }

    /// Leaf nodes (level 0).
    pub fn leaf_nodes(&self) -> Vec<&Node> {
        self.resolve(&self.leaf_ids)
    }

    /// Every node, in creation order.
    pub fn all_nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Look up a node by id.
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&pos| &self.nodes[pos])
    }

    /// Children of `node`, in order.
    pub fn children_of(&self, node: &Node) -> Vec<&Node> {
        self.resolve(&node.children)
    }

    /// Nodes on `level`, in creation order.
    pub fn nodes_at_level(&self, level: usize) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.level == level).collect()
    }

    /// Number of levels (max level + 1; 0 when empty).
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.level + 1).max().unwrap_or(0)
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if tree is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Embedding dimensionality shared by all nodes.
    pub fn dimension(&self) -> Option<usize> {
        self.nodes.first().map(Node::dimension)
    }

    /// Text of every node, in creation order.
    pub fn all_texts(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.text.as_str()).collect()
    }

    /// Embedding of every node, in creation order.
    pub fn all_embeddings(&self) -> Vec<&[f32]> {
        self.nodes.iter().map(|n| n.embedding.as_slice()).collect()
    }

    /// Node counts.
    pub fn stats(&self) -> TreeStats {
        let mut levels = BTreeMap::new();
        for node in &self.nodes {
            *levels.entry(node.level).or_insert(0) += 1;
        }
        TreeStats {
            total_nodes: self.nodes.len(),
            leaf_nodes: self.leaf_ids.len(),
            root_nodes: self.root_ids.len(),
            tree_depth: levels.keys().next_back().copied().unwrap_or(0),
            levels,
        }
    }

    /// Ids reachable from the roots.
    pub fn reachable_ids(&self) -> HashSet<&str> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = self.root_ids.iter().map(String::as_str).collect();
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                if let Some(node) = self.get_node(id) {
                    stack.extend(node.children.iter().map(String::as_str));
                }
            }
        }
        seen
    }

    /// Replace a node's metadata.
    pub fn set_metadata(&mut self, id: &str, metadata: super::Metadata) -> Result<()> {
        let pos = *self
            .index
            .get(id)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))?;
        self.nodes[pos].metadata = metadata;
        Ok(())
    }

    /// Rewrite `keys` on every node to their grouping form (trimmed,
    /// lower-cased text, `unknown` when blank). Absent keys stay absent.
    ///
    /// Returns the number of values changed.
    pub fn normalize_metadata(&mut self, keys: &[String]) -> usize {
        let mut changed = 0;
        for node in &mut self.nodes {
            for key in keys {
                if let Some(value) = node.metadata.get_mut(key) {
                    let normalized = MetadataValue::Text(normalize_metadata_value(Some(&*value)));
                    if *value != normalized {
                        *value = normalized;
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    fn resolve<'a>(&'a self, ids: &[String]) -> Vec<&'a Node> {
        ids.iter().filter_map(|id| self.get_node(id)).collect()
    }
}
