//! Clustering algorithms for grouping passages before summarization.
//!
//! Each tree level is partitioned by this module; every partition becomes one
//! summary node on the level above.
//!
//! ## Hard vs Soft Clustering
//!
//! **Hard clustering** assigns each item to exactly one cluster. Simple, but
//! loses information when items genuinely span multiple groups.
//!
//! **Soft clustering** gives each item a probability distribution over clusters.
//! A text chunk might be 60% about "revenue", 30% about "guidance",
//! 10% about "headcount". An item joins every cluster whose probability
//! clears a threshold, so one passage can feed several summaries.
//!
//! ## Pipeline
//!
//! ```text
//! embeddings (N × d)
//!     │
//!     ▼
//! ManifoldReducer        kNN graph → Laplacian eigenmaps (N × dim)
//!     │
//!     ▼
//! optimal_k              argmin BIC over k ∈ [1, min(max_k, N))
//!     │
//!     ▼
//! Gmm / Kmeans           soft threshold or hard partition
//!     │
//!     ▼
//! size filter            drop clusters below min_cluster_size
//! ```
//!
//! With metadata clustering enabled, nodes are first grouped by normalized
//! metadata keys (sector, company, year, ...) and only oversized groups go
//! through the pipeline above. See [`metadata`].
//!
//! ## Algorithms
//!
//! ### Gaussian Mixture Model (GMM)
//!
//! Models data as a mixture of k Gaussian distributions:
//!
//! ```text
//! P(x) = Σ π_k × N(x | μ_k, Σ_k)
//! ```
//!
//! **EM Algorithm**:
//! 1. **E-step**: Compute P(cluster k | point x) for each point
//! 2. **M-step**: Update μ, Σ, π to maximize likelihood
//! 3. Repeat until convergence
//!
//! ### K-means
//!
//! Assign each point to the nearest centroid, then move centroids to the
//! mean of their points. Repeat.
//!
//! ```text
//! J = Σ_k Σ_{x ∈ C_k} ||x - μ_k||²
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use canopy::cluster::{Kmeans, Gmm, Clustering, SoftClustering};
//!
//! let data = vec![
//!     vec![0.0, 0.0],
//!     vec![0.1, 0.1],
//!     vec![10.0, 10.0],
//!     vec![10.1, 10.1],
//! ];
//!
//! // Hard clustering with K-means
//! let labels = Kmeans::new(2).with_seed(42).fit_predict(&data).unwrap();
//! assert_eq!(labels[0], labels[1]);  // First two together
//! assert_ne!(labels[0], labels[2]);  // Separate from last two
//!
//! // Soft clustering with GMM
//! let probs = Gmm::new()
//!     .with_n_components(2)
//!     .with_seed(42)
//!     .fit_predict_proba(&data)
//!     .unwrap();
//! // probs[i][k] = P(point i belongs to cluster k)
//! assert_eq!(probs.len(), 4);
//! ```

mod gmm;
mod kmeans;
pub mod metadata;
mod raptor;
mod reduce;
mod traits;

pub use gmm::{Gmm, GmmFit};
pub use kmeans::{Kmeans, KmeansFit};
pub use metadata::{group_by_metadata, normalize_metadata_value, MetadataKeyPolicy};
pub use raptor::{ClusteringAlgorithm, ClusteringConfig, RaptorClustering};
pub use reduce::{ManifoldReducer, Metric};
pub use traits::{ClusterStrategy, Clustering, SoftClustering};

use crate::error::{Error, Result};
use ndarray::Array2;

/// Pack row vectors into an `n × d` matrix, rejecting empty or ragged input.
pub(crate) fn to_matrix(data: &[Vec<f32>]) -> Result<Array2<f32>> {
    if data.is_empty() {
        return Err(Error::EmptyInput);
    }

    let n = data.len();
    let d = data[0].len();

    let mut flat: Vec<f32> = Vec::with_capacity(n * d);
    for point in data {
        if point.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: point.len(),
            });
        }
        flat.extend(point);
    }
    Array2::from_shape_vec((n, d), flat).map_err(|e| Error::Other(e.to_string()))
}
