//! Seeded k-means partition.
//!
//! Two callers use it:
//!
//! | Caller | Uses |
//! |---|---|
//! | [`RaptorClustering::kmeans_clustering`](super::RaptorClustering::kmeans_clustering) | [`KmeansFit::partition`]: every passage in exactly one cluster |
//! | [`Gmm::fit`](super::Gmm::fit) | [`KmeansFit::labels`]: one-hot starting responsibilities |
//!
//! Both need the same input to give the same tree, so the generator is always
//! seeded (42 unless overridden) and no step draws from thread randomness.
//!
//! ```text
//! seed:    k-means++ over a running nearest-centroid distance D(x)
//! repeat:  assign each point to its nearest centroid (ties → lower index)
//!          recompute centroids; an emptied centroid jumps to the point
//!          farthest from its own centroid
//! until:   no label changes, or max_iter
//! ```

use ndarray::{Array2, ArrayView1};
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::to_matrix;
use super::traits::Clustering;
use crate::error::{Error, Result};

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 42;

/// Hard k-means over embedding rows.
#[derive(Debug, Clone)]
pub struct Kmeans {
    k: usize,
    max_iter: usize,
    seed: u64,
}

/// Result of [`Kmeans::fit`].
#[derive(Debug, Clone)]
pub struct KmeansFit {
    /// Cluster of each point, in `0..k`.
    pub labels: Vec<usize>,
    /// `k × d` centroids.
    pub centroids: Array2<f32>,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
    /// Lloyd iterations run.
    pub n_iter: usize,
}

impl KmeansFit {
    /// Points grouped by label, in label order, empty clusters removed.
    pub fn partition(&self) -> Vec<Vec<usize>> {
        let mut clusters = vec![Vec::new(); self.centroids.nrows()];
        for (i, &label) in self.labels.iter().enumerate() {
            clusters[label].push(i);
        }
        clusters.retain(|c| !c.is_empty());
        clusters
    }
}

impl Kmeans {
    /// `k` clusters, 100 iterations, seed 42.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 100,
            seed: DEFAULT_SEED,
        }
    }

    /// Set the iteration cap.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Run k-means on `data`.
    pub fn fit(&self, data: &[Vec<f32>]) -> Result<KmeansFit> {
        if self.k == 0 {
            return Err(Error::invalid("k", "must be > 0"));
        }
        let x = to_matrix(data)?;
        let n = x.nrows();
        if self.k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = plus_plus(&x, self.k, &mut rng);
        let mut labels = vec![usize::MAX; n];
        let mut n_iter = 0;

        for _ in 0..self.max_iter {
            n_iter += 1;
            let next = assign(&x, &centroids);
            if next == labels {
                break;
            }
            labels = next;
            centroids = update(&x, &labels, &centroids);
        }

        let inertia = labels
            .iter()
            .enumerate()
            .map(|(i, &c)| f64::from(sq_dist(x.row(i), centroids.row(c))))
            .sum();

        Ok(KmeansFit {
            labels,
            centroids,
            inertia,
            n_iter,
        })
    }
}

impl Clustering for Kmeans {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>> {
        Ok(self.fit(data)?.labels)
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}

fn sq_dist(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// k-means++ seeding. Duplicate-heavy data (all D(x) = 0) takes the next
/// unused row instead of sampling.
fn plus_plus(x: &Array2<f32>, k: usize, rng: &mut StdRng) -> Array2<f32> {
    let n = x.nrows();
    let mut centroids = Array2::zeros((k, x.ncols()));
    let mut chosen = Vec::with_capacity(k);

    let first = rng.random_range(0..n);
    centroids.row_mut(0).assign(&x.row(first));
    chosen.push(first);

    let mut nearest: Vec<f64> = (0..n).map(|i| f64::from(sq_dist(x.row(i), x.row(first)))).collect();

    for c in 1..k {
        let total: f64 = nearest.iter().sum();
        let pick = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut acc = 0.0;
            nearest
                .iter()
                .position(|&d| {
                    acc += d;
                    acc >= target && d > 0.0
                })
                .unwrap_or(n - 1)
        } else {
            (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
        };

        centroids.row_mut(c).assign(&x.row(pick));
        chosen.push(pick);
        for (i, d) in nearest.iter_mut().enumerate() {
            *d = d.min(f64::from(sq_dist(x.row(i), x.row(pick))));
        }
    }
    centroids
}

fn nearest_centroid(point: ArrayView1<'_, f32>, centroids: &Array2<f32>) -> usize {
    let mut best = (0, f32::INFINITY);
    for (c, row) in centroids.rows().into_iter().enumerate() {
        let d = sq_dist(point, row);
        if d < best.1 {
            best = (c, d);
        }
    }
    best.0
}

fn assign(x: &Array2<f32>, centroids: &Array2<f32>) -> Vec<usize> {
    #[cfg(feature = "parallel")]
    {
        (0..x.nrows())
            .into_par_iter()
            .map(|i| nearest_centroid(x.row(i), centroids))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..x.nrows()).map(|i| nearest_centroid(x.row(i), centroids)).collect()
    }
}

fn update(x: &Array2<f32>, labels: &[usize], previous: &Array2<f32>) -> Array2<f32> {
    let k = previous.nrows();
    let mut sums = Array2::<f32>::zeros(previous.dim());
    let mut counts = vec![0usize; k];
    for (i, &c) in labels.iter().enumerate() {
        let mut row = sums.row_mut(c);
        row += &x.row(i);
        counts[c] += 1;
    }

    for c in 0..k {
        if counts[c] > 0 {
            sums.row_mut(c).mapv_inplace(|v| v / counts[c] as f32);
        } else {
            let far = (0..x.nrows())
                .max_by(|&a, &b| {
                    sq_dist(x.row(a), previous.row(labels[a]))
                        .total_cmp(&sq_dist(x.row(b), previous.row(labels[b])))
                })
                .unwrap_or(0);
            sums.row_mut(c).assign(&x.row(far));
        }
    }
    sums
}

#[cfg(test)]
#[allow(clippy::unwrap_used, unused_results)]
mod tests {
    use super::*;
    use crate::capability::{Embedder, HashingEmbedder};

    fn passages() -> Vec<Vec<f32>> {
        let e = HashingEmbedder::new(32);
        let texts = [
            "crude oil output rose",
            "crude oil prices fell",
            "oil refinery output",
            "bank lending grew",
            "bank deposits grew",
            "lending margins at the bank",
        ];
        texts.iter().map(|t| e.create_embedding(t).unwrap()).collect()
    }

    #[test]
    fn test_partition_covers_each_point_once() {
        let emb = passages();
        let fit = Kmeans::new(3).fit(&emb).unwrap();
        let mut seen: Vec<usize> = fit.partition().into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..emb.len()).collect::<Vec<_>>());
        assert!(fit.labels.iter().all(|&l| l < 3));
    }

    #[test]
    fn test_same_seed_same_partition() {
        let emb = passages();
        let a = Kmeans::new(2).with_seed(9).fit(&emb).unwrap();
        let b = Kmeans::new(2).with_seed(9).fit(&emb).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.centroids, b.centroids);
    }

    #[test]
    fn test_separated_groups_split() {
        let data = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.1],
        ];
        let labels = Kmeans::new(2).fit_predict(&data).unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_duplicates_with_k_equal_n() {
        let data = vec![vec![1.0, 1.0]; 3];
        let fit = Kmeans::new(3).fit(&data).unwrap();
        assert_eq!(fit.labels.len(), 3);
        assert_eq!(fit.inertia, 0.0);
        assert_eq!(fit.partition().iter().map(Vec::len).sum::<usize>(), 3);
    }

    #[test]
    fn test_invalid_k() {
        let data = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        assert!(Kmeans::new(0).fit(&data).is_err());
        assert!(matches!(
            Kmeans::new(5).fit(&data),
            Err(Error::InvalidClusterCount { requested: 5, n_items: 2 })
        ));
        assert!(matches!(Kmeans::new(1).fit(&[]), Err(Error::EmptyInput)));
    }
}
