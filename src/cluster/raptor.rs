//! RAPTOR clustering pipeline.
//!
//! Combines reduction, model selection and assignment into the per-level
//! clustering step of tree construction:
//!
//! ```text
//! N ≤ min_cluster_size ─────────────────────────► [0..N)  (one cluster)
//!        │
//!        ▼
//! reduce to min(dim, N-2) ──► GMM (BIC-selected k) ──► p > threshold
//!                        └──► k-means (k = N / min) ─► argmin distance
//!        │
//!        ▼
//! drop clusters with |C| < min_cluster_size
//! ```
//!
//! Soft assignment means one passage can feed several summaries. A passage
//! whose best membership is below the threshold is left out here; the tree
//! builder attaches it to the nearest cluster.
//!
//! ## References
//!
//! Sarthi et al. (2024). "RAPTOR: Recursive Abstractive Processing for
//! Tree-Organized Retrieval." ICLR 2024.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::gmm::Gmm;
use super::kmeans::Kmeans;
use super::metadata::{any_node_has_keys, group_by_metadata, MetadataKeyPolicy};
use super::reduce::{ManifoldReducer, Metric};
use super::traits::ClusterStrategy;
use crate::error::{Error, Result};
use crate::hierarchy::Node;

/// Assignment algorithm used after reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringAlgorithm {
    /// Soft assignment from a BIC-selected Gaussian mixture.
    #[default]
    GaussianMixture,
    /// Hard partition with k = clamp(N / min_cluster_size, 1, 10).
    #[serde(rename = "kmeans")]
    KMeans,
}

/// Configuration for [`RaptorClustering`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Metadata groups larger than this are sub-clustered by embedding.
    pub max_cluster_size: usize,
    /// Clusters smaller than this are dropped; levels this small are not clustered.
    pub min_cluster_size: usize,
    /// Target dimension for manifold reduction.
    pub reduction_dimension: usize,
    /// Membership probability a point must exceed to join a cluster.
    pub threshold: f64,
    /// Upper bound (exclusive) on the BIC search.
    pub max_clusters: usize,
    /// Assignment algorithm.
    pub algorithm: ClusteringAlgorithm,
    /// Distance for the reduction's neighbour graph.
    pub metric: Metric,
    /// Group by metadata before clustering by embedding.
    pub use_metadata_clustering: bool,
    /// Metadata keys, most general first.
    pub metadata_keys: Vec<String>,
    /// Which keys stay active above level 1.
    pub key_policy: MetadataKeyPolicy,
    /// Seed for the GMM and k-means.
    pub seed: u64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_cluster_size: 100,
            min_cluster_size: 5,
            reduction_dimension: 10,
            threshold: 0.5,
            max_clusters: 50,
            algorithm: ClusteringAlgorithm::GaussianMixture,
            metric: Metric::Cosine,
            use_metadata_clustering: true,
            metadata_keys: vec!["sector".into(), "company".into(), "year".into()],
            key_policy: MetadataKeyPolicy::Fixed,
            seed: 42,
        }
    }
}

impl ClusteringConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum cluster size.
    pub fn with_max_cluster_size(mut self, size: usize) -> Self {
        self.max_cluster_size = size;
        self
    }

    /// Set minimum cluster size.
    pub fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.min_cluster_size = size;
        self
    }

    /// Set reduction dimension.
    pub fn with_reduction_dimension(mut self, dim: usize) -> Self {
        self.reduction_dimension = dim;
        self
    }

    /// Set membership threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the BIC search bound.
    pub fn with_max_clusters(mut self, max_clusters: usize) -> Self {
        self.max_clusters = max_clusters;
        self
    }

    /// Set the assignment algorithm.
    pub fn with_algorithm(mut self, algorithm: ClusteringAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the reduction metric.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Enable or disable metadata grouping.
    pub fn with_metadata_clustering(mut self, enabled: bool) -> Self {
        self.use_metadata_clustering = enabled;
        self
    }

    /// Set metadata keys.
    pub fn with_metadata_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the key policy.
    pub fn with_key_policy(mut self, policy: MetadataKeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.min_cluster_size == 0 {
            return Err(Error::invalid("min_cluster_size", "must be > 0"));
        }
        if self.max_cluster_size < self.min_cluster_size {
            return Err(Error::invalid(
                "max_cluster_size",
                format!(
                    "{} is below min_cluster_size {}",
                    self.max_cluster_size, self.min_cluster_size
                ),
            ));
        }
        if self.reduction_dimension == 0 {
            return Err(Error::invalid("reduction_dimension", "must be > 0"));
        }
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(Error::invalid("threshold", "must be in [0, 1)"));
        }
        Ok(())
    }
}

/// The default [`ClusterStrategy`]: reduction, BIC model selection,
/// threshold assignment and optional metadata grouping.
#[derive(Debug, Clone, Default)]
pub struct RaptorClustering {
    config: ClusteringConfig,
}

impl RaptorClustering {
    /// Create a clusterer.
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Pick k by minimum BIC over `k ∈ [1, min(max_k, N))`.
    ///
    /// The candidate set is at least `{1}`.
    pub fn optimal_k(&self, embeddings: &[Vec<f32>], max_k: usize) -> Result<usize> {
        let n = embeddings.len();
        if n == 0 {
            return Err(Error::EmptyInput);
        }

        let upper = max_k.min(n).max(2);
        let mut best_k = 1;
        let mut best_bic = f64::INFINITY;

        for k in 1..upper {
            let fit = Gmm::new()
                .with_n_components(k)
                .with_seed(self.config.seed)
                .fit(embeddings)?;
            let bic = fit.bic();
            if bic < best_bic {
                best_bic = bic;
                best_k = k;
            }
        }

        debug!(n, max_k, k = best_k, bic = best_bic, "selected cluster count");
        Ok(best_k)
    }

    /// Soft clustering: a point joins every cluster where its membership
    /// probability exceeds `threshold`. Points in no cluster are dropped.
    pub fn gmm_clustering(&self, embeddings: &[Vec<f32>], threshold: f64) -> Result<Vec<Vec<usize>>> {
        let k = self.optimal_k(embeddings, self.config.max_clusters)?;
        let fit = Gmm::new()
            .with_n_components(k)
            .with_seed(self.config.seed)
            .fit(embeddings)?;

        let mut clusters: Vec<Vec<usize>> = vec![Vec::new(); fit.n_components()];
        let mut unassigned = 0usize;
        for (i, probs) in fit.responsibilities.iter().enumerate() {
            let mut joined = false;
            for (c, &p) in probs.iter().enumerate() {
                if p > threshold {
                    clusters[c].push(i);
                    joined = true;
                }
            }
            if !joined {
                unassigned += 1;
            }
        }

        if unassigned > 0 {
            debug!(unassigned, threshold, "points below threshold in every cluster");
        }

        clusters.retain(|c| !c.is_empty());
        Ok(clusters)
    }

    /// Hard partition with seeded k-means, `k = clamp(N / min_cluster_size, 1, 10)`.
    pub fn kmeans_clustering(&self, embeddings: &[Vec<f32>]) -> Result<Vec<Vec<usize>>> {
        let n = embeddings.len();
        if n == 0 {
            return Err(Error::EmptyInput);
        }

        let k = (n / self.config.min_cluster_size.max(1)).clamp(1, 10).min(n);
        let clusters = Kmeans::new(k)
            .with_seed(self.config.seed)
            .fit(embeddings)?
            .partition();

        debug!(n, k, clusters = clusters.len(), "k-means partition");
        Ok(clusters)
    }

    /// Reduce, cluster and drop undersized clusters.
    ///
    /// At or below `min_cluster_size` points, returns one cluster of everything.
    pub fn perform_clustering(
        &self,
        embeddings: &[Vec<f32>],
        dim: usize,
        threshold: f64,
    ) -> Result<Vec<Vec<usize>>> {
        let n = embeddings.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        if n <= self.config.min_cluster_size {
            return Ok(vec![(0..n).collect()]);
        }

        let reduced;
        let points = if n >= 3 {
            reduced = ManifoldReducer::global(dim)
                .with_metric(self.config.metric)
                .reduce(embeddings)?;
            &reduced[..]
        } else {
            embeddings
        };

        let mut clusters = match self.config.algorithm {
            ClusteringAlgorithm::GaussianMixture => self.gmm_clustering(points, threshold)?,
            ClusteringAlgorithm::KMeans => self.kmeans_clustering(points)?,
        };

        let before = clusters.len();
        clusters.retain(|c| c.len() >= self.config.min_cluster_size);
        if clusters.len() < before {
            warn!(
                dropped = before - clusters.len(),
                kept = clusters.len(),
                min_cluster_size = self.config.min_cluster_size,
                "dropped undersized clusters"
            );
        }

        Ok(clusters)
    }

    /// Group by metadata, then sub-cluster only groups above `max_cluster_size`.
    ///
    /// Metadata groups themselves are never size-filtered.
    pub fn perform_metadata_clustering(
        &self,
        nodes: &[&Node],
        embeddings: &[Vec<f32>],
        dim: usize,
        threshold: f64,
        keys: &[String],
    ) -> Result<Vec<Vec<usize>>> {
        if nodes.len() != embeddings.len() {
            return Err(Error::DimensionMismatch {
                expected: nodes.len(),
                found: embeddings.len(),
            });
        }

        let groups = group_by_metadata(nodes, keys);
        debug!(groups = groups.len(), keys = ?keys, "metadata groups");

        let mut clusters = Vec::new();
        for (key, members) in groups {
            if members.len() <= self.config.min_cluster_size
                || members.len() <= self.config.max_cluster_size
            {
                clusters.push(members);
                continue;
            }

            let sub: Vec<Vec<f32>> = members.iter().map(|&i| embeddings[i].clone()).collect();
            let sub_clusters = self.perform_clustering(&sub, dim, threshold)?;
            debug!(group = ?key, size = members.len(), sub_clusters = sub_clusters.len(), "split oversized group");

            for sub_cluster in sub_clusters {
                clusters.push(sub_cluster.into_iter().map(|j| members[j]).collect());
            }
        }

        Ok(clusters)
    }

    /// Route to metadata grouping or the plain pipeline.
    ///
    /// Metadata grouping applies when it is enabled, the key set active for
    /// `target_level` is non-empty, and some node carries one of those keys.
    pub fn cluster_with_context(
        &self,
        nodes: &[&Node],
        embeddings: &[Vec<f32>],
        target_level: usize,
    ) -> Result<Vec<Vec<usize>>> {
        let keys = self
            .config
            .key_policy
            .active_keys(&self.config.metadata_keys, target_level);

        let dim = self.config.reduction_dimension;
        let threshold = self.config.threshold;

        if self.config.use_metadata_clustering && !keys.is_empty() && any_node_has_keys(nodes, keys) {
            self.perform_metadata_clustering(nodes, embeddings, dim, threshold, keys)
        } else {
            self.perform_clustering(embeddings, dim, threshold)
        }
    }
}

impl ClusterStrategy for RaptorClustering {
    fn cluster_level(
        &self,
        nodes: &[&Node],
        embeddings: &[Vec<f32>],
        target_level: usize,
    ) -> Result<Vec<Vec<usize>>> {
        self.cluster_with_context(nodes, embeddings, target_level)
    }
}
