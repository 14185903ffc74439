//! RAPTOR-style recursive tree construction.
//!
//! RAPTOR (Recursive Abstractive Processing for Tree-Organized Retrieval)
//! builds a tree by:
//! 1. Clustering items at each level
//! 2. Summarizing each cluster
//! 3. Recursively building higher levels from summaries
//!
//! ```text
//! while level < max_depth and |current| > 1:
//!     |current| ≤ min_cluster_size  → stop
//!     clusters = strategy.cluster_level(current)
//!     clusters empty                → stop
//!     |clusters| ≥ |current|        → stop (level would not shrink)
//!     for each cluster c:
//!         summary   = summarize(texts of c, summarization_length)
//!         embedding = embed(summary)
//!         parent    = level_{L+1}_cluster_{c}
//!     current = parents
//! roots = current
//! ```
//!
//! A build either returns a complete tree or an error; nothing is retried
//! and no partial tree escapes.
//!
//! ## References
//!
//! Sarthi et al. (2024). "RAPTOR: Recursive Abstractive Processing for
//! Tree-Organized Retrieval." ICLR 2024.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::node::{Chunk, Node};
use super::tree::HierarchyTree;
use crate::capability::{Embedder, Summarizer};
use crate::cluster::metadata::shared_metadata;
use crate::cluster::{ClusterStrategy, ClusteringConfig, RaptorClustering};
use crate::error::{Error, Result};
use crate::retrieve::cosine_similarity;

/// Configuration for building a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Maximum number of summary levels above the leaves.
    pub max_depth: usize,
    /// Length bound handed to the summarizer.
    pub summarization_length: usize,
    /// Per-level clustering.
    pub clustering: ClusteringConfig,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            summarization_length: 200,
            clustering: ClusteringConfig::default(),
        }
    }
}

impl TreeConfig {
    /// Create a new tree configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the summary length bound.
    pub fn with_summarization_length(mut self, len: usize) -> Self {
        self.summarization_length = len;
        self
    }

    /// Replace the clustering configuration.
    pub fn with_clustering(mut self, clustering: ClusteringConfig) -> Self {
        self.clustering = clustering;
        self
    }

    /// Set minimum cluster size.
    pub fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.clustering.min_cluster_size = size;
        self
    }

    /// Set maximum cluster size.
    pub fn with_max_cluster_size(mut self, size: usize) -> Self {
        self.clustering.max_cluster_size = size;
        self
    }

    /// Set reduction dimension.
    pub fn with_reduction_dimension(mut self, dim: usize) -> Self {
        self.clustering.reduction_dimension = dim;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.summarization_length == 0 {
            return Err(Error::invalid("summarization_length", "must be > 0"));
        }
        self.clustering.validate()
    }
}

/// Builds a [`HierarchyTree`] from chunks and their embeddings.
pub struct TreeBuilder<'a> {
    config: TreeConfig,
    embedder: &'a dyn Embedder,
    summarizer: &'a dyn Summarizer,
    strategy: Box<dyn ClusterStrategy + 'a>,
}

impl<'a> TreeBuilder<'a> {
    /// Builder using [`RaptorClustering`] with `config.clustering`.
    pub fn new(config: TreeConfig, embedder: &'a dyn Embedder, summarizer: &'a dyn Summarizer) -> Self {
        let strategy = Box::new(RaptorClustering::new(config.clustering.clone()));
        Self {
            config,
            embedder,
            summarizer,
            strategy,
        }
    }

    /// Replace the clustering strategy.
    pub fn with_strategy(mut self, strategy: impl ClusterStrategy + 'a) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Build a tree. `embeddings[i]` must be the embedding of `chunks[i]`.
    pub fn build(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<HierarchyTree> {
        if chunks.is_empty() {
            return Err(Error::EmptyInput);
        }
        if chunks.len() != embeddings.len() {
            return Err(Error::DimensionMismatch {
                expected: chunks.len(),
                found: embeddings.len(),
            });
        }
        let dim = embeddings[0].len();
        if dim == 0 {
            return Err(Error::invalid("embeddings", "embedding dimension must be > 0"));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found: bad.len(),
            });
        }

        let started = Instant::now();
        let mut nodes: Vec<Node> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk, emb))| Node::leaf(i, chunk.text.clone(), emb.clone(), chunk.metadata.clone()))
            .collect();
        let leaf_ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        info!(leaves = nodes.len(), dim, max_depth = self.config.max_depth, "building tree");

        let mut current: Vec<usize> = (0..nodes.len()).collect();
        let mut level = 0;

        while level < self.config.max_depth && current.len() > 1 {
            let level_started = Instant::now();
            if current.len() <= self.config.clustering.min_cluster_size {
                debug!(level, nodes = current.len(), "level at or below minimum cluster size");
                break;
            }

            let parents = self.build_level(&nodes, &current, level + 1, dim)?;
            if parents.is_empty() {
                debug!(level, "no reducing clusters; stopping");
                break;
            }

            let first = nodes.len();
            let n_parents = parents.len();
            nodes.extend(parents);
            current = (first..nodes.len()).collect();
            level += 1;

            info!(
                level,
                nodes = n_parents,
                elapsed_ms = level_started.elapsed().as_millis() as u64,
                "built level"
            );
        }

        let root_ids: Vec<String> = current.iter().map(|&p| nodes[p].id.clone()).collect();
        info!(
            total_nodes = nodes.len(),
            roots = root_ids.len(),
            levels = level + 1,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tree complete"
        );

        HierarchyTree::from_parts(nodes, root_ids, leaf_ids, self.config.clone())
    }

    /// Cluster, summarize and embed one level.
    fn build_level(
        &self,
        nodes: &[Node],
        current: &[usize],
        target_level: usize,
        dim: usize,
    ) -> Result<Vec<Node>> {
        let level_nodes: Vec<&Node> = current.iter().map(|&p| &nodes[p]).collect();
        let level_embeddings: Vec<Vec<f32>> = level_nodes.iter().map(|n| n.embedding.clone()).collect();

        let clusters = self
            .strategy
            .cluster_level(&level_nodes, &level_embeddings, target_level)?;
        debug!(target_level, nodes = level_nodes.len(), clusters = clusters.len(), "clustered level");
        if clusters.iter().all(Vec::is_empty) {
            return Ok(Vec::new());
        }
        let clusters = attach_uncovered(clusters, &level_embeddings);

        // Metadata groups that all match one-to-one would only copy the level.
        let non_empty = clusters.iter().filter(|c| !c.is_empty()).count();
        if non_empty >= level_nodes.len() {
            debug!(target_level, clusters = non_empty, "clustering does not shrink the level");
            return Ok(Vec::new());
        }

        let clustering = &self.config.clustering;
        let keys = clustering
            .key_policy
            .active_keys(&clustering.metadata_keys, target_level);
        let mut parents = Vec::with_capacity(clusters.len());

        for (cluster_idx, cluster) in clusters.iter().enumerate() {
            if cluster.is_empty() {
                continue;
            }
            let members: Vec<&Node> = cluster
                .iter()
                .map(|&i| {
                    level_nodes.get(i).copied().ok_or_else(|| {
                        Error::invalid(
                            "cluster",
                            format!("index {i} out of range for a level of {}", level_nodes.len()),
                        )
                    })
                })
                .collect::<Result<_>>()?;

            let texts: Vec<&str> = members.iter().map(|n| n.text.as_str()).collect();
            let summary = self
                .summarizer
                .summarize(&texts, self.config.summarization_length)?;
            if summary.trim().is_empty() {
                return Err(Error::capability(
                    "summarization",
                    format!("empty summary for level {target_level} cluster {cluster_idx}"),
                ));
            }

            let embedding = self.embedder.create_embedding(&summary)?;
            if embedding.len() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    found: embedding.len(),
                });
            }

            let children = members.iter().map(|n| n.id.clone()).collect();
            let mut parent = Node::internal(target_level, cluster_idx, summary, embedding, children);
            for (k, v) in shared_metadata(&members, keys) {
                parent.metadata.entry(k).or_insert(v);
            }
            parents.push(parent);
        }

        Ok(parents)
    }
}

/// Add every node no cluster claimed to the cluster whose centroid is most
/// similar, so each node of the level gets a parent.
fn attach_uncovered(mut clusters: Vec<Vec<usize>>, embeddings: &[Vec<f32>]) -> Vec<Vec<usize>> {
    let mut covered = vec![false; embeddings.len()];
    for &i in clusters.iter().flatten() {
        if let Some(c) = covered.get_mut(i) {
            *c = true;
        }
    }
    if covered.iter().all(|&c| c) {
        return clusters;
    }

    let dim = embeddings.first().map_or(0, Vec::len);
    let centroids: Vec<Vec<f32>> = clusters
        .iter()
        .map(|members| {
            let mut centroid = vec![0.0f32; dim];
            let in_range: Vec<&Vec<f32>> = members.iter().filter_map(|&i| embeddings.get(i)).collect();
            for e in &in_range {
                for (c, &x) in centroid.iter_mut().zip(e.iter()) {
                    *c += x;
                }
            }
            if !in_range.is_empty() {
                let n = in_range.len() as f32;
                centroid.iter_mut().for_each(|c| *c /= n);
            }
            centroid
        })
        .collect();

    let mut touched = vec![false; clusters.len()];
    let mut attached = 0;
    for (i, _) in covered.iter().enumerate().filter(|(_, &c)| !c) {
        let best = centroids
            .iter()
            .enumerate()
            .filter(|(c, _)| !clusters[*c].is_empty())
            .map(|(c, centroid)| (c, cosine_similarity(&embeddings[i], centroid)))
            .fold(None, |best: Option<(usize, f32)>, (c, s)| match best {
                Some((_, bs)) if bs >= s => best,
                _ => Some((c, s)),
            });
        if let Some((c, _)) = best {
            clusters[c].push(i);
            touched[c] = true;
            attached += 1;
        }
    }
    for (members, _) in clusters.iter_mut().zip(&touched).filter(|(_, &t)| t) {
        members.sort_unstable();
    }
    debug!(attached, "attached unclustered nodes to nearest cluster");
    clusters
}

#[cfg(test)]
#[allow(clippy::unwrap_used, unused_results)]
mod tests {
    use super::*;
    use crate::capability::{from_fn, ConcatSummarizer, FnEmbedder};
    use crate::hierarchy::MetadataValue;

    /// Groups consecutive positions into fixed-size clusters.
    struct Chunked(usize);

    impl ClusterStrategy for Chunked {
        fn cluster_level(&self, nodes: &[&Node], _e: &[Vec<f32>], _l: usize) -> Result<Vec<Vec<usize>>> {
            Ok((0..nodes.len())
                .collect::<Vec<_>>()
                .chunks(self.0)
                .map(|c| c.to_vec())
                .collect())
        }
    }

    fn len_embedder() -> FnEmbedder<impl Fn(&str) -> Result<Vec<f32>> + Send + Sync> {
        FnEmbedder::new(|t: &str| Ok(vec![t.len() as f32, 1.0]))
    }

    fn chunks(n: usize) -> (Vec<Chunk>, Vec<Vec<f32>>) {
        let chunks: Vec<Chunk> = (0..n).map(|i| Chunk::new(format!("passage {i}"))).collect();
        let emb = (0..n).map(|i| vec![i as f32, 1.0]).collect();
        (chunks, emb)
    }

    #[test]
    fn test_tree_config_default() {
        let config = TreeConfig::default();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.summarization_length, 200);
        assert_eq!(config.clustering.min_cluster_size, 5);
        assert_eq!(config.clustering.max_cluster_size, 100);
        assert_eq!(config.clustering.reduction_dimension, 10);
    }

    #[test]
    fn test_empty_input_rejected() {
        let e = len_embedder();
        let s = ConcatSummarizer::new();
        let b = TreeBuilder::new(TreeConfig::default(), &e, &s);
        assert!(matches!(b.build(&[], &[]), Err(Error::EmptyInput)));
    }

    #[test]
    fn test_length_and_dimension_mismatch_rejected() {
        let e = len_embedder();
        let s = ConcatSummarizer::new();
        let b = TreeBuilder::new(TreeConfig::default(), &e, &s);
        let (c, mut emb) = chunks(3);
        assert!(b.build(&c, &emb[..2]).is_err());
        emb[1] = vec![1.0];
        assert!(matches!(
            b.build(&c, &emb),
            Err(Error::DimensionMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_single_chunk_is_its_own_root() {
        let e = len_embedder();
        let s = ConcatSummarizer::new();
        let b = TreeBuilder::new(TreeConfig::default(), &e, &s);
        let (c, emb) = chunks(1);
        let tree = b.build(&c, &emb).unwrap();
        assert_eq!(tree.root_ids(), tree.leaf_ids());
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_small_level_not_clustered() {
        let e = len_embedder();
        let s = ConcatSummarizer::new();
        let b = TreeBuilder::new(TreeConfig::default(), &e, &s);
        let (c, emb) = chunks(5);
        let tree = b.build(&c, &emb).unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.root_nodes().len(), 5);
    }

    #[test]
    fn test_custom_strategy_levels_and_ids() {
        let e = len_embedder();
        let s = ConcatSummarizer::new().with_separator(" + ");
        let config = TreeConfig::default().with_min_cluster_size(1).with_max_depth(5);
        let b = TreeBuilder::new(config, &e, &s).with_strategy(Chunked(3));
        let (c, emb) = chunks(9);
        let tree = b.build(&c, &emb).unwrap();

        // 9 leaves → 3 parents → 1 root
        assert_eq!(tree.nodes_at_level(1).len(), 3);
        assert_eq!(tree.root_ids(), ["level_2_cluster_0"]);
        let p = tree.get_node("level_1_cluster_1").unwrap();
        assert_eq!(p.children, ["leaf_3", "leaf_4", "leaf_5"]);
        assert_eq!(p.text, "passage 3 + passage 4 + passage 5");
        assert_eq!(p.metadata["num_children"], MetadataValue::Int(3));
        assert_eq!(p.metadata["cluster_idx"], MetadataValue::Int(1));
    }

    #[test]
    fn test_max_depth_bounds_levels() {
        let e = len_embedder();
        let s = ConcatSummarizer::new();
        let config = TreeConfig::default().with_min_cluster_size(1).with_max_depth(1);
        let b = TreeBuilder::new(config, &e, &s).with_strategy(Chunked(2));
        let (c, emb) = chunks(8);
        let tree = b.build(&c, &emb).unwrap();
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.root_nodes().len(), 4);
    }

    #[test]
    fn test_summarizer_error_propagates() {
        let e = len_embedder();
        let s = from_fn(|_: &[&str], _: usize| Err(Error::capability("summarization", "quota")));
        let config = TreeConfig::default().with_min_cluster_size(1);
        let b = TreeBuilder::new(config, &e, &s).with_strategy(Chunked(2));
        let (c, emb) = chunks(4);
        let err = b.build(&c, &emb).unwrap_err();
        assert!(matches!(err, Error::Capability { capability: "summarization", .. }));
    }

    #[test]
    fn test_empty_summary_rejected() {
        let e = len_embedder();
        let s = from_fn(|_: &[&str], _: usize| Ok("  ".to_string()));
        let config = TreeConfig::default().with_min_cluster_size(1);
        let b = TreeBuilder::new(config, &e, &s).with_strategy(Chunked(2));
        let (c, emb) = chunks(4);
        assert!(matches!(b.build(&c, &emb), Err(Error::Capability { .. })));
    }

    #[test]
    fn test_summary_dimension_mismatch_rejected() {
        let e = FnEmbedder::new(|_: &str| Ok(vec![0.0; 7]));
        let s = ConcatSummarizer::new();
        let config = TreeConfig::default().with_min_cluster_size(1);
        let b = TreeBuilder::new(config, &e, &s).with_strategy(Chunked(2));
        let (c, emb) = chunks(4);
        assert!(matches!(b.build(&c, &emb), Err(Error::DimensionMismatch { expected: 2, found: 7 })));
    }

    #[test]
    fn test_parent_inherits_agreed_metadata() {
        let e = len_embedder();
        let s = ConcatSummarizer::new();
        let config = TreeConfig::default().with_min_cluster_size(1).with_max_depth(1);
        let b = TreeBuilder::new(config, &e, &s).with_strategy(Chunked(2));
        let c = vec![
            Chunk::new("a").with_metadata("sector", "Energy").with_metadata("year", 2022i64),
            Chunk::new("b").with_metadata("sector", "energy").with_metadata("year", 2023i64),
        ];
        let emb = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let tree = b.build(&c, &emb).unwrap();
        let root = &tree.root_nodes()[0];
        assert_eq!(root.metadata["sector"], MetadataValue::Text("Energy".into()));
        assert!(!root.metadata.contains_key("year"));
    }

    /// 16 passages in 8 (sector, company, year) groups of two. `co3` and
    /// `co4` file for a single year.
    fn filings() -> (Vec<Chunk>, Vec<Vec<f32>>) {
        let groups = [
            ("energy", "co0", 2016i64),
            ("energy", "co0", 2017),
            ("energy", "co1", 2016),
            ("energy", "co1", 2017),
            ("finance", "co2", 2016),
            ("finance", "co2", 2017),
            ("finance", "co3", 2016),
            ("finance", "co4", 2016),
        ];
        let chunks: Vec<Chunk> = (0..16)
            .map(|i| {
                let (sector, company, year) = groups[i / 2];
                Chunk::new(format!("filing {i}"))
                    .with_metadata("sector", sector)
                    .with_metadata("company", company)
                    .with_metadata("year", year)
            })
            .collect();
        let emb = (0..16).map(|i| vec![i as f32, 1.0]).collect();
        (chunks, emb)
    }

    #[test]
    fn test_fixed_key_policy_stops_when_groups_stop_merging() {
        let e = len_embedder();
        let s = ConcatSummarizer::new();
        let b = TreeBuilder::new(TreeConfig::default(), &e, &s);
        let (c, emb) = filings();
        let tree = b.build(&c, &emb).unwrap();

        let stats = tree.stats();
        assert_eq!(stats.levels.len(), 2);
        assert_eq!(stats.levels[&1], 8);
        assert_eq!(tree.root_ids().len(), 8);
        assert!(tree.root_nodes().iter().all(|r| r.level == 1 && r.children.len() == 2));
    }

    #[test]
    fn test_progressive_key_policy_merges_upward() {
        use crate::cluster::MetadataKeyPolicy;

        let e = len_embedder();
        let s = ConcatSummarizer::new();
        let clustering = ClusteringConfig::default()
            .with_min_cluster_size(1)
            .with_key_policy(MetadataKeyPolicy::Progressive);
        let b = TreeBuilder::new(TreeConfig::default().with_clustering(clustering), &e, &s);
        let (c, emb) = filings();
        let tree = b.build(&c, &emb).unwrap();

        let levels: Vec<usize> = tree.stats().levels.values().copied().collect();
        assert_eq!(levels, [16, 8, 5, 2]);

        for node in tree.nodes_at_level(1) {
            assert!(node.metadata.contains_key("year"));
        }
        for node in tree.nodes_at_level(2) {
            assert!(node.metadata.contains_key("company"));
            assert!(!node.metadata.contains_key("year"));
        }
        for node in tree.nodes_at_level(3) {
            assert!(node.metadata.contains_key("sector"));
            assert!(!node.metadata.contains_key("company"));
        }
    }

    #[test]
    fn test_non_shrinking_level_is_discarded() {
        struct Singletons;
        impl ClusterStrategy for Singletons {
            fn cluster_level(&self, nodes: &[&Node], _e: &[Vec<f32>], _l: usize) -> Result<Vec<Vec<usize>>> {
                Ok((0..nodes.len()).map(|i| vec![i]).collect())
            }
        }
        let e = len_embedder();
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let s = from_fn(|t: &[&str], _: usize| {
            calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Ok(t.join(" "))
        });
        let config = TreeConfig::default().with_min_cluster_size(1);
        let b = TreeBuilder::new(config, &e, &s).with_strategy(Singletons);
        let (c, emb) = chunks(6);
        let tree = b.build(&c, &emb).unwrap();
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.root_ids(), tree.leaf_ids());
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn test_attach_uncovered_joins_nearest_cluster() {
        let emb = vec![
            vec![1.0, 0.0],
            vec![0.9, 0.1],
            vec![0.1, 0.9],
            vec![0.0, 1.0],
            vec![0.05, 1.0],
        ];
        let clusters = attach_uncovered(vec![vec![0, 1], vec![3, 4]], &emb);
        assert_eq!(clusters, vec![vec![0, 1], vec![2, 3, 4]]);

        let untouched = attach_uncovered(vec![vec![0, 1, 2], vec![3, 4]], &emb);
        assert_eq!(untouched, vec![vec![0, 1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_every_node_reachable_when_strategy_skips_nodes() {
        struct SkipLast;
        impl ClusterStrategy for SkipLast {
            fn cluster_level(&self, nodes: &[&Node], _e: &[Vec<f32>], _l: usize) -> Result<Vec<Vec<usize>>> {
                Ok(vec![(0..nodes.len() - 1).collect()])
            }
        }
        let e = len_embedder();
        let s = ConcatSummarizer::new();
        let config = TreeConfig::default().with_min_cluster_size(1);
        let b = TreeBuilder::new(config, &e, &s).with_strategy(SkipLast);
        let (c, emb) = chunks(4);
        let tree = b.build(&c, &emb).unwrap();
        assert_eq!(tree.reachable_ids().len(), tree.len());
        assert_eq!(tree.root_nodes()[0].children.len(), 4);
    }

    #[test]
    fn test_twelve_leaves_two_groups_kmeans() {
        use crate::cluster::{ClusteringAlgorithm, Kmeans};

        let e = FnEmbedder::new(|t: &str| {
            Ok(if t.contains("oil") { vec![1.0, 0.0, 0.0] } else { vec![0.0, 0.0, 1.0] })
        });
        let s = ConcatSummarizer::new().with_max_len(60);
        let clustering = ClusteringConfig::default()
            .with_algorithm(ClusteringAlgorithm::KMeans)
            .with_min_cluster_size(5);
        let config = TreeConfig::default().with_clustering(clustering).with_max_depth(3);
        let b = TreeBuilder::new(config, &e, &s);

        let mut c = Vec::new();
        let mut emb = Vec::new();
        for i in 0..6 {
            c.push(Chunk::new(format!("oil output {i}")));
            emb.push(vec![1.0, 0.01 * i as f32, 0.0]);
        }
        for i in 0..6 {
            c.push(Chunk::new(format!("bank lending {i}")));
            emb.push(vec![0.0, 0.01 * i as f32, 1.0]);
        }

        let tree = b.build(&c, &emb).unwrap();
        let level1 = tree.nodes_at_level(1);
        assert!(!level1.is_empty() && level1.len() < 12);
        assert!(tree.depth() <= 4);

        // Sanity: the hard partition on raw embeddings splits the groups.
        let labels = Kmeans::new(2).with_seed(42).fit(&emb).unwrap().labels;
        assert_ne!(labels[0], labels[6]);
    }
}
