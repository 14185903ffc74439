//! Clustering traits.

use crate::error::Result;
use crate::hierarchy::Node;

/// Trait for clustering algorithms.
pub trait Clustering {
    /// Fit the model to data and return cluster assignments.
    ///
    /// Returns a vector of cluster labels, one per input point.
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>>;

    /// Get the number of clusters.
    fn n_clusters(&self) -> usize;
}

/// Trait for soft clustering algorithms that return probabilities.
pub trait SoftClustering: Clustering {
    /// Fit and return soft cluster assignments (probabilities).
    ///
    /// Returns a matrix where entry \[i\]\[k\] is the probability that
    /// point i belongs to cluster k.
    fn fit_predict_proba(&self, data: &[Vec<f32>]) -> Result<Vec<Vec<f64>>>;
}

/// Groups one tree level into the clusters that become the next level's parents.
///
/// The tree builder calls this once per level. Each returned cluster is a list
/// of positions into `nodes`/`embeddings`. Under soft assignment a position may
/// appear in several clusters, or in none. An empty result ends tree growth.
pub trait ClusterStrategy: Send + Sync {
    /// Cluster the nodes of one level.
    ///
    /// `target_level` is the level the resulting parents will occupy (1 for
    /// clusters of leaves).
    fn cluster_level(
        &self,
        nodes: &[&Node],
        embeddings: &[Vec<f32>],
        target_level: usize,
    ) -> Result<Vec<Vec<usize>>>;
}
